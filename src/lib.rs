//! credpipe - credential cache for unattended backups
//!
//! A per-user daemon keeps backup secrets in memory and hands them to
//! scheduled jobs over a private named pipe. Lookups fall back through the
//! system keyring and an interactive prompt.

pub mod cli;
pub mod config;
pub mod context;
pub mod credentials;
pub mod env;
pub mod error;
pub mod service;
pub mod supervisor;
pub mod transport;
pub mod ui;

pub use error::{CredpipeError, CredpipeResult};
