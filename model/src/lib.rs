//! The project/vulnerability data engine (`spec.md` §3-§4.5, §6.3).
//!
//! Grounded on the teacher's `modules/fundamental` + `entity` split, but
//! collapsed into a single in-memory crate: there is no database here,
//! `ProjectManager` plays the role `sea_orm::DatabaseConnection` plays
//! in the teacher, and `persistence` plays the role migrations/storage
//! play there.

pub mod manager;
pub mod persistence;
pub mod project;
pub mod service_map;
pub mod tree;
pub mod vulnerability;

pub use manager::ProjectManager;
pub use project::Project;
pub use tree::{Stats, VulnerabilityTree};
pub use vulnerability::{BurpFindingInput, Source, Status, Vulnerability};
