//! # netfast-cli
//!
//! Command-line front end for the NetFast agent.
//!
//! ## Features
//!
//! - **Filter control**: apply, remove and inspect the active DNS filter
//! - **Foreground agent**: `netfast run` monitors integrity and walks the user
//!   through warnings
//! - **Settings**: toggle monitoring options in the config file
//! - **Multiple output formats**: Pretty tables, JSON, YAML

pub mod cli;
pub mod config;
pub mod output;

pub use cli::run;
