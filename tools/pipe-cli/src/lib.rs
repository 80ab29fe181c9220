//! # Pipe CLI
//!
//! Library half of the `pipe` binary: configuration loading, account key
//! management and the subcommands, kept here so they can be tested without
//! a terminal.

pub mod account;
pub mod commands;
pub mod config;
pub mod error;

pub use config::CliConfig;
pub use error::CliError;
