//! Command-line interface
//!
//! Handlers for the `multisig` binary.

pub mod commands;

pub use commands::*;
