use pentest_common::error::Error;
use std::path::Path;

/// `spec.md` §6.2: `generate(prompt, max_tokens) -> Result<string, LlmError>`.
/// Prompt length ≤ 8192 characters; output ≤ 4096 (truncated). At most one
/// concurrent call per adapter instance — implementations that wrap a
/// real model handle should serialize internally (e.g. behind a `Mutex`),
/// the way the teacher's long-lived connection pools do.
pub trait LlmAdapter: Send + Sync {
    fn generate(&self, prompt: &str, max_tokens: Option<u32>) -> Result<String, Error>;
}

/// `spec.md` §6.2: `embed(text) -> Result<Vec<f32>, EmbedError>`.
/// Dimensionality is fixed per configuration and must never silently
/// change across calls.
pub trait EmbeddingAdapter: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, Error>;
}

/// One result row from `VectorDbAdapter::query_nearest`.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestMatch {
    pub id: String,
    pub distance: f32,
}

/// `spec.md` §6.2: HTTP adapter with JSON bodies; 10s connect / 30s read
/// timeout (enforced by the real implementation, not this contract).
pub trait VectorDbAdapter: Send + Sync {
    fn add(&self, collection: &str, id: &str, doc: &str, embedding: &[f32]) -> Result<(), Error>;
    fn query_nearest(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<NearestMatch>, Error>;
    fn delete_collection(&self, name: &str) -> Result<(), Error>;
}

/// `spec.md` §6.2: `run_script(binary_path, script_name, args) -> string`
/// (combined stdout/stderr), enforcing a configurable timeout.
pub trait BinaryAnalyzerAdapter: Send + Sync {
    fn run_script(&self, binary_path: &Path, script_name: &str, args: &[String]) -> Result<String, Error>;
}

/// The stub every collaborator category falls back to until a real
/// adapter is wired in (`spec.md` §1: these are external services, out
/// of scope for the core engine). Each stub fails every call with the
/// category's designated "unavailable" error so the `Orchestrator` can
/// report it verbatim rather than silently degrading.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLlm;

impl LlmAdapter for UnavailableLlm {
    fn generate(&self, _prompt: &str, _max_tokens: Option<u32>) -> Result<String, Error> {
        Err(Error::LlmUnavailable("no LLM backend configured".to_string()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableEmbedding;

impl EmbeddingAdapter for UnavailableEmbedding {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, Error> {
        Err(Error::LlmUnavailable("no embedding backend configured".to_string()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableVectorDb;

impl VectorDbAdapter for UnavailableVectorDb {
    fn add(&self, _collection: &str, _id: &str, _doc: &str, _embedding: &[f32]) -> Result<(), Error> {
        Err(Error::VectorDbUnavailable("no vector database configured".to_string()))
    }

    fn query_nearest(
        &self,
        _collection: &str,
        _embedding: &[f32],
        _top_k: usize,
    ) -> Result<Vec<NearestMatch>, Error> {
        Err(Error::VectorDbUnavailable("no vector database configured".to_string()))
    }

    fn delete_collection(&self, _name: &str) -> Result<(), Error> {
        // Idempotent per the spec's recommendation (§9 Open Questions):
        // deleting an already-absent collection is not an error.
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBinaryAnalyzer;

impl BinaryAnalyzerAdapter for UnavailableBinaryAnalyzer {
    fn run_script(&self, path: &Path, _script_name: &str, _args: &[String]) -> Result<String, Error> {
        Err(Error::BinaryNotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_llm_fails_every_call() {
        assert!(matches!(UnavailableLlm.generate("hi", None), Err(Error::LlmUnavailable(_))));
    }

    #[test]
    fn unavailable_vector_db_delete_collection_is_idempotent() {
        assert!(UnavailableVectorDb.delete_collection("anything").is_ok());
    }

    #[test]
    fn unavailable_binary_analyzer_reports_path() {
        let err = UnavailableBinaryAnalyzer
            .run_script(Path::new("/opt/ghidra"), "script.py", &[])
            .unwrap_err();
        match err {
            Error::BinaryNotFound(p) => assert_eq!(p, Path::new("/opt/ghidra")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
