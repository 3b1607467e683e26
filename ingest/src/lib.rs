//! File/directory scanning and Burp Suite import (`spec.md` §4.6-§4.8).
//!
//! Grounded on the teacher's `modules/ingestor` crate: a parser for one
//! external wire format plus a coordinator that fans work out across a
//! worker pool and accumulates results behind a single-writer lock.

pub mod burp;
pub mod file_analyzer;
pub mod gatherer;
pub mod session;

pub use burp::{BurpIssue, BurpParseResult, BurpSuiteParser};
pub use file_analyzer::{DataItem, DataKind, ExtractedData, FileAnalyzer, FileType};
pub use gatherer::InformationGatherer;
pub use session::{GatherSession, QueryFilter, SessionState};
