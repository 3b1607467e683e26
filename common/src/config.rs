use crate::scope::ScopePolicy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Vector-database adapter configuration (`spec.md` §6.4).
#[derive(Debug, Clone)]
pub struct VectorDbConfig {
    pub endpoint: String,
    pub top_k: usize,
}

/// Binary-analyzer adapter configuration (`spec.md` §6.2, §6.4).
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub headless_path: PathBuf,
    pub project_dir: PathBuf,
    pub project_name: String,
    pub timeout_ms: u64,
}

/// LLM adapter configuration (`spec.md` §6.4).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub prompt_prefix: String,
}

/// The fully-resolved configuration for one process, combining every key
/// from `spec.md` §6.4.
///
/// Grounded on the teacher's `trustd` binaries, which flatten
/// `clap::Args` config structs (`Database`, `StorageConfig`) into the
/// CLI while keeping the actual value resolution in the struct itself
/// rather than scattered across call sites.
#[derive(Debug, Clone)]
pub struct Config {
    pub vector_db: VectorDbConfig,
    pub analyzer: AnalyzerConfig,
    pub project_data_file: PathBuf,
    pub embedding_backend_type: String,
    pub llm: LlmConfig,
    pub scope: ScopePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            vector_db: VectorDbConfig {
                endpoint: "http://localhost:8000".into(),
                top_k: 5,
            },
            analyzer: AnalyzerConfig {
                headless_path: PathBuf::from("analyzeHeadless"),
                project_dir: PathBuf::from("./.analyzer"),
                project_name: "pentest-assistant".into(),
                timeout_ms: 300_000,
            },
            project_data_file: PathBuf::from("./projects.dat"),
            embedding_backend_type: "local".into(),
            llm: LlmConfig {
                prompt_prefix: "You are a helpful penetration-testing assistant.".into(),
            },
            scope: ScopePolicy::default(),
        }
    }
}

impl Config {
    /// Loads configuration with precedence env > config file > built-in
    /// default, exactly as `spec.md` §6.4 specifies. `path`, if given,
    /// names a `key = value` text file; unknown keys are ignored.
    pub fn load(path: Option<&Path>) -> Config {
        let file_values = path
            .and_then(|p| std::fs::read_to_string(p).ok())
            .map(|content| parse_key_value_file(&content))
            .unwrap_or_default();

        let mut config = Config::default();

        config.vector_db.endpoint = resolve("vectordb.endpoint", &file_values)
            .unwrap_or(config.vector_db.endpoint);
        if let Some(top_k) = resolve("vectordb.top_k", &file_values).and_then(|v| v.parse().ok()) {
            config.vector_db.top_k = top_k;
        }

        config.analyzer.headless_path = resolve("ghidra.headless.path", &file_values)
            .map(PathBuf::from)
            .unwrap_or(config.analyzer.headless_path);
        config.analyzer.project_dir = resolve("ghidra.project.dir", &file_values)
            .map(PathBuf::from)
            .unwrap_or(config.analyzer.project_dir);
        config.analyzer.project_name = resolve("ghidra.project.name", &file_values)
            .unwrap_or(config.analyzer.project_name);
        if let Some(timeout) = resolve("ghidra.timeout.ms", &file_values).and_then(|v| v.parse().ok())
        {
            config.analyzer.timeout_ms = timeout;
        }

        config.project_data_file = resolve("project.data.file", &file_values)
            .map(PathBuf::from)
            .unwrap_or(config.project_data_file);

        config.embedding_backend_type = resolve("embedding.backend.type", &file_values)
            .unwrap_or(config.embedding_backend_type);

        config.llm.prompt_prefix =
            resolve("llm.prompt.prefix", &file_values).unwrap_or(config.llm.prompt_prefix);

        let allowed_roots = resolve("scope.allowed_roots", &file_values)
            .map(|v| v.split(',').map(PathBuf::from).collect())
            .unwrap_or_default();
        let blocked_globs = resolve("scope.blocked_globs", &file_values)
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        let max_file_bytes = resolve("scope.max_file_bytes", &file_values)
            .and_then(|v| v.parse().ok())
            .unwrap_or(64 * 1024 * 1024);
        let follow_symlinks = resolve("scope.follow_symlinks", &file_values)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        config.scope = ScopePolicy::new(allowed_roots, blocked_globs, max_file_bytes, follow_symlinks);

        config
    }

    /// The Burp XML size cap default, §4.6: 128 MB unless overridden.
    pub const DEFAULT_BURP_MAX_BYTES: u64 = 128 * 1024 * 1024;
}

fn parse_key_value_file(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// env var name for `key` is the uppercased key with `.` replaced by `_`.
fn env_var_name(key: &str) -> String {
    key.to_ascii_uppercase().replace('.', "_")
}

fn resolve(key: &str, file_values: &HashMap<String, String>) -> Option<String> {
    std::env::var(env_var_name(key))
        .ok()
        .or_else(|| file_values.get(key).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn env_var_name_replaces_dots_and_uppercases() {
        assert_eq!(env_var_name("vectordb.top_k"), "VECTORDB.TOP_K".replace('.', "_"));
        assert_eq!(env_var_name("ghidra.timeout.ms"), "GHIDRA_TIMEOUT_MS");
    }

    #[test]
    fn file_value_used_when_no_env_var() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "vectordb.endpoint = http://db.example:9000").unwrap();
        let config = Config::load(Some(file.path()));
        assert_eq!(config.vector_db.endpoint, "http://db.example:9000");
    }

    #[test]
    fn env_var_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "vectordb.endpoint = http://from-file:9000").unwrap();
        // SAFETY: test runs single-threaded w.r.t. this var; scoped to this test only.
        unsafe { std::env::set_var("VECTORDB_ENDPOINT", "http://from-env:9000") };
        let config = Config::load(Some(file.path()));
        unsafe { std::env::remove_var("VECTORDB_ENDPOINT") };
        assert_eq!(config.vector_db.endpoint, "http://from-env:9000");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "totally.unknown.key = 42").unwrap();
        // Should not panic, and defaults should remain intact.
        let config = Config::load(Some(file.path()));
        assert_eq!(config.vector_db.top_k, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/path.conf")));
        assert_eq!(config.vector_db.top_k, 5);
    }
}
