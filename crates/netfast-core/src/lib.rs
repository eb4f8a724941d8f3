//! Core types for the NetFast enforcement agent.
//!
//! This crate holds everything the agent needs that does not touch the host:
//!
//! - **Profiles**: the built-in table of filtering resolvers and the shared
//!   address matcher ([`ProfileTable`])
//! - **Types**: observations, monitoring configuration, escalation state,
//!   violation events and sponsor notifications
//! - **Errors**: the [`FilterError`] taxonomy and the single owner of the
//!   permission heuristic ([`classify_failure`])
//!
//! # Example
//!
//! ```rust,ignore
//! use netfast_core::ProfileTable;
//!
//! let table = ProfileTable::builtin();
//! let hit = table.match_output("nameserver 208.67.222.222");
//! assert_eq!(hit.map(|p| p.name.as_str()), Some("opendns"));
//! ```

pub mod classify;
mod error;
pub mod types;

pub use classify::{classify_failure, FailureKind};
pub use error::{FilterError, Result};
pub use types::*;
