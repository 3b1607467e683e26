//! Natural-language command routing (`spec.md` §4.9-§4.10, §6.2).
//!
//! Grounded on the teacher's adapter-trait + orchestrator pattern for
//! external services it does not implement itself (the CSAF/SBOM ingest
//! pipelines delegate to pluggable storage backends the same way this
//! crate delegates to collaborator adapters it never runs).

pub mod adapters;
pub mod gathering_processor;
pub mod orchestrator;
pub mod project_processor;

pub use adapters::{
    BinaryAnalyzerAdapter, EmbeddingAdapter, LlmAdapter, NearestMatch, UnavailableBinaryAnalyzer,
    UnavailableEmbedding, UnavailableLlm, UnavailableVectorDb, VectorDbAdapter,
};
pub use gathering_processor::InformationGatheringCommandProcessor;
pub use orchestrator::Orchestrator;
pub use project_processor::ProjectCommandProcessor;
