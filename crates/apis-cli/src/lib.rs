//! # APIS CLI
//!
//! Command-line front end for the APIS hive-monitoring dashboard server.
//!
//! Credentials never outlive the process, so every invocation signs in
//! first: a password prompt when the server uses session cookies, or a
//! browser round trip through a loopback callback when it delegates to an
//! identity provider. The command then runs through the same request
//! pipeline the dashboard uses.

pub mod auth;
pub mod cli;
pub mod error;
pub mod output;
pub mod terminal;

pub use cli::*;
pub use error::*;
