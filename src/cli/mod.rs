//! CLI module for swarmr - command-line interface.
//!
//! One command: run a sprint. Flags override the config file's sprint
//! defaults.

pub mod commands;

pub use commands::Cli;
