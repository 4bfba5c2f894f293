//! Password references in `config.toml`.
//!
//! A `password` value may point outside the file:
//! - `pass::path/in/store` reads the first line of `pass show path/in/store`
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - anything else is the password itself

use std::process::Command;

/// Where a secret value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef<'a> {
    Pass(&'a str),
    Env(&'a str),
    Plain(&'a str),
}

impl<'a> SecretRef<'a> {
    pub fn parse(value: &'a str) -> Self {
        if let Some(path) = value.strip_prefix("pass::") {
            Self::Pass(path)
        } else if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else {
            Self::Plain(value)
        }
    }

    /// Resolves the reference to the secret text.
    pub fn resolve(&self) -> Result<String, String> {
        match self {
            Self::Pass(path) => pass_show(path),
            Self::Env(var) => {
                std::env::var(var).map_err(|_| format!("environment variable `{var}` is not set"))
            }
            Self::Plain(value) => Ok((*value).to_string()),
        }
    }
}

/// Resolves a config value that may be a secret reference.
pub fn resolve(value: &str) -> Result<String, String> {
    SecretRef::parse(value).resolve()
}

fn pass_show(path: &str) -> Result<String, String> {
    let output = Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| format!("failed to run `pass show {path}`: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "`pass show {path}` failed ({}): {}",
            output.status,
            stderr.trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| format!("`pass show {path}` produced no output"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixes() {
        assert_eq!(SecretRef::parse("pass::lab/r1"), SecretRef::Pass("lab/r1"));
        assert_eq!(SecretRef::parse("env::R1_PW"), SecretRef::Env("R1_PW"));
        assert_eq!(SecretRef::parse("admin"), SecretRef::Plain("admin"));
        assert_eq!(SecretRef::parse("pass:"), SecretRef::Plain("pass:"));
    }

    #[test]
    fn plain_and_env_resolve() {
        assert_eq!(resolve("s3cret").unwrap(), "s3cret");

        unsafe {
            std::env::set_var("_NETCONF_TOOL_TEST_PASSWORD", "from-env");
        }
        assert_eq!(resolve("env::_NETCONF_TOOL_TEST_PASSWORD").unwrap(), "from-env");
        unsafe {
            std::env::remove_var("_NETCONF_TOOL_TEST_PASSWORD");
        }
    }

    #[test]
    fn missing_env_var_errors() {
        let err = resolve("env::_NETCONF_TOOL_UNSET_VAR_31337").unwrap_err();
        assert!(err.contains("not set"));
    }
}
