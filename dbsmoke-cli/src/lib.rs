//! dbsmoke CLI library
//!
//! Split from `main.rs` so integration tests can drive the command handlers.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
