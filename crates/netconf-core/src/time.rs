//! Human readable elapsed-time formatting for round-trip diagnostics.

use std::time::Duration;

/// Formats a duration as `"1 hr 2 min 3 sec 4 ms"`.
///
/// Leading zero units are omitted, but once a larger unit is printed every
/// smaller one follows. Milliseconds are always present.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours} hr "));
    }
    if mins > 0 || !out.is_empty() {
        out.push_str(&format!("{mins} min "));
    }
    if secs > 0 || !out.is_empty() {
        out.push_str(&format!("{secs} sec "));
    }
    out.push_str(&format!("{ms} ms"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_only() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "0 ms");
        assert_eq!(format_elapsed(Duration::from_millis(999)), "999 ms");
    }

    #[test]
    fn seconds_and_millis() {
        assert_eq!(format_elapsed(Duration::from_millis(1_250)), "1 sec 250 ms");
    }

    #[test]
    fn lower_units_follow_higher_ones() {
        assert_eq!(
            format_elapsed(Duration::from_millis(3_600_000)),
            "1 hr 0 min 0 sec 0 ms"
        );
        assert_eq!(format_elapsed(Duration::from_millis(60_007)), "1 min 0 sec 7 ms");
    }

    #[test]
    fn long_duration() {
        assert_eq!(
            format_elapsed(Duration::from_millis(152_330_222)),
            "42 hr 18 min 50 sec 222 ms"
        );
    }
}
