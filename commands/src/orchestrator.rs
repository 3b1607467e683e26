use crate::adapters::{BinaryAnalyzerAdapter, EmbeddingAdapter, LlmAdapter, VectorDbAdapter};
use crate::gathering_processor::InformationGatheringCommandProcessor;
use crate::project_processor::ProjectCommandProcessor;
use regex::Regex;
use std::sync::{Arc, LazyLock};

static BINARY_KEYWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(ghidra|analyze|binary|reverse engineer|function|extract)\b").unwrap());
static EMBEDDING_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\b(embed|vector|generate|convert)\b.*"(?P<text>[^"]+)""#).unwrap());
static VECTOR_DB_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(search|find|similar|query|database|db|vectordb|chroma)\b").unwrap()
});
static LLM_KEYWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(llm|generate|text|ai|response)\b").unwrap());
static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]*)""#).unwrap());

fn collaborator_error(category: &str, reason: impl std::fmt::Display) -> String {
    format!("[ERROR] {category}: {reason}")
}

/// Single entry point, dispatching by the fixed precedence in `spec.md`
/// §4.10. Holds only references to collaborators and the two command
/// processors — all mutable state lives behind `ProjectManager` and
/// `InformationGatherer`, which the processors were built with.
pub struct Orchestrator {
    project: ProjectCommandProcessor,
    gathering: InformationGatheringCommandProcessor,
    llm: Arc<dyn LlmAdapter>,
    embedding: Arc<dyn EmbeddingAdapter>,
    vector_db: Arc<dyn VectorDbAdapter>,
    binary_analyzer: Arc<dyn BinaryAnalyzerAdapter>,
    llm_system_prompt: String,
    vector_db_top_k: usize,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project: ProjectCommandProcessor,
        gathering: InformationGatheringCommandProcessor,
        llm: Arc<dyn LlmAdapter>,
        embedding: Arc<dyn EmbeddingAdapter>,
        vector_db: Arc<dyn VectorDbAdapter>,
        binary_analyzer: Arc<dyn BinaryAnalyzerAdapter>,
        llm_system_prompt: String,
        vector_db_top_k: usize,
    ) -> Self {
        Orchestrator {
            project,
            gathering,
            llm,
            embedding,
            vector_db,
            binary_analyzer,
            llm_system_prompt,
            vector_db_top_k,
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn process(&self, line: &str) -> String {
        if self.project.matches(line) {
            return self.project.process(line);
        }
        if self.gathering.matches(line) {
            return self.gathering.process(line);
        }
        if BINARY_KEYWORDS.is_match(line) {
            return self.dispatch_binary_analysis(line);
        }
        if let Some(captures) = EMBEDDING_REQUEST.captures(line) {
            return self.dispatch_embedding(&captures["text"]);
        }
        if VECTOR_DB_KEYWORDS.is_match(line) {
            return self.dispatch_vector_search(line);
        }
        if LLM_KEYWORDS.is_match(line) {
            return self.dispatch_llm(line);
        }
        self.dispatch_general_chat(line)
    }

    fn dispatch_binary_analysis(&self, line: &str) -> String {
        let quoted: Vec<&str> = QUOTED.captures_iter(line).map(|c| c.get(1).unwrap().as_str()).collect();
        let Some(binary_path) = quoted.first() else {
            return collaborator_error("binary-analysis", "no binary path given (expected a quoted path)");
        };
        let script_name = quoted.get(1).copied().unwrap_or("analyze.py");
        let args: Vec<String> = quoted.iter().skip(2).map(|s| s.to_string()).collect();

        match self.binary_analyzer.run_script(std::path::Path::new(binary_path), script_name, &args) {
            Ok(output) => output,
            Err(e) => collaborator_error("binary-analysis", e),
        }
    }

    fn dispatch_embedding(&self, text: &str) -> String {
        match self.embedding.embed(text) {
            Ok(vector) => format!("embedded {} characters into a {}-dimensional vector", text.len(), vector.len()),
            Err(e) => collaborator_error("embedding", e),
        }
    }

    fn dispatch_vector_search(&self, line: &str) -> String {
        let query_text = QUOTED
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| line.to_string());

        let embedding = match self.embedding.embed(&query_text) {
            Ok(v) => v,
            Err(e) => return collaborator_error("vector-database", e),
        };
        match self.vector_db.query_nearest("default", &embedding, self.vector_db_top_k) {
            Ok(matches) => {
                if matches.is_empty() {
                    "no matches found".to_string()
                } else {
                    matches
                        .iter()
                        .map(|m| format!("{} (distance {:.4})", m.id, m.distance))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Err(e) => collaborator_error("vector-database", e),
        }
    }

    fn dispatch_llm(&self, line: &str) -> String {
        match self.llm.generate(line, None) {
            Ok(text) => text,
            Err(e) => collaborator_error("llm", e),
        }
    }

    fn dispatch_general_chat(&self, line: &str) -> String {
        let prompt = format!("{}\n\n{}", self.llm_system_prompt, line);
        match self.llm.generate(&prompt, None) {
            Ok(text) => text,
            Err(e) => collaborator_error("llm", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{UnavailableBinaryAnalyzer, UnavailableEmbedding, UnavailableLlm, UnavailableVectorDb};
    use pentest_common::scope::ScopePolicy;
    use pentest_ingest::InformationGatherer;
    use pentest_model::ProjectManager;

    fn orchestrator() -> Orchestrator {
        let manager = Arc::new(ProjectManager::new());
        let gatherer = Arc::new(InformationGatherer::new(manager.clone()));
        Orchestrator::new(
            ProjectCommandProcessor::new(manager),
            InformationGatheringCommandProcessor::new(gatherer, ScopePolicy::default()),
            Arc::new(UnavailableLlm),
            Arc::new(UnavailableEmbedding),
            Arc::new(UnavailableVectorDb),
            Arc::new(UnavailableBinaryAnalyzer),
            "You are a helpful penetration-testing assistant.".to_string(),
            5,
        )
    }

    #[test]
    fn project_commands_take_precedence() {
        let o = orchestrator();
        let response = o.process(r#"create project "Audit""#);
        assert!(response.starts_with("created"));
    }

    #[test]
    fn unavailable_llm_is_reported_verbatim_not_silently_substituted() {
        let o = orchestrator();
        let response = o.process("tell me a joke");
        assert!(response.starts_with("[ERROR] llm:"));
    }

    #[test]
    fn unavailable_binary_analyzer_is_reported() {
        let o = orchestrator();
        let response = o.process(r#"analyze binary "/bin/ls""#);
        assert!(response.starts_with("[ERROR] binary-analysis:"));
    }

    #[test]
    fn unavailable_vector_db_is_reported() {
        let o = orchestrator();
        let response = o.process(r#"search for "sql injection""#);
        assert!(response.starts_with("[ERROR] vector-database:"));
    }
}
