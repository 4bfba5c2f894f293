//! Core types: capabilities, base version negotiation, tracing, timing

pub mod capabilities;
pub mod time;
pub mod tracing;

pub use capabilities::{
    BASE_1_0, BASE_1_1, BaseVersion, Capabilities, Capability, MissingCapability, negotiate_base,
};
pub use time::format_elapsed;
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
