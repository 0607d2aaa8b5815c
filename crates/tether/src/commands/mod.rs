//! Command handlers: bridge CLI args -> manager / config -> output formatting.

pub mod config_cmd;
pub mod simulate;
