//! Shared vocabulary for the pentest-assistant workspace.
//!
//! Grounded on `trustify-common`: the small, dependency-light crate every
//! other module in the workspace builds on. Unlike the teacher, this crate
//! carries no database or web-framework code — just the value types,
//! error taxonomy, and configuration loader that `model`, `ingest`, and
//! `commands` all share.

pub mod config;
pub mod cve;
pub mod error;
pub mod scope;
pub mod severity;
pub mod time;

pub use config::Config;
pub use cve::{CveId, CveUtils};
pub use error::Error;
pub use scope::ScopePolicy;
pub use severity::Severity;
