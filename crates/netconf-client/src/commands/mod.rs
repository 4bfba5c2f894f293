//! Command implementations.

pub mod callhome;
pub mod config;
pub mod session;
