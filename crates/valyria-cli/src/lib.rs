//! # valyria-cli
//!
//! Command-line interface for the Valyria guardian service.
//!
//! ## Commands
//!
//! - `valyria serve`: Start the HTTP API (the default)
//! - `valyria status`: Query a running server
//! - `valyria config`: Show the effective configuration
//! - `valyria doctor`: Check configuration, database and workspace
//! - `valyria version`: Show version and build info

pub mod commands;

pub use commands::Cli;
