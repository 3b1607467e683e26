use crate::burp::BurpSuiteParser;
use crate::file_analyzer::FileAnalyzer;
use crate::session::{GatherSession, QueryFilter, SessionState};
use model::BurpFindingInput;
use parking_lot::RwLock;
use pentest_common::error::{warn_sentence, Error};
use pentest_common::scope::ScopePolicy;
use pentest_model as model;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Coordinates file/directory scans and Burp imports across sessions
/// (`spec.md` §4.8).
///
/// Grounded on the teacher's ingestor/collector split (one long-lived
/// coordinator, short-lived per-request sessions). `sessions` mirrors
/// `ProjectManager`'s per-entity locking: the outer map lock is only
/// held to look up or insert a session `Arc`, each session then
/// single-writer on its own accumulators.
pub struct InformationGatherer {
    sessions: RwLock<BTreeMap<String, Arc<GatherSession>>>,
    analyzer: FileAnalyzer,
    burp_parser: BurpSuiteParser,
    manager: Arc<model::ProjectManager>,
}

impl InformationGatherer {
    pub fn new(manager: Arc<model::ProjectManager>) -> Self {
        InformationGatherer {
            sessions: RwLock::new(BTreeMap::new()),
            analyzer: FileAnalyzer::default(),
            burp_parser: BurpSuiteParser::default(),
            manager,
        }
    }

    fn get(&self, session_id: &str) -> Result<Arc<GatherSession>, Error> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::NameNotFound(session_id.to_string()))
    }

    fn require_active(&self, session_id: &str) -> Result<Arc<GatherSession>, Error> {
        let session = self.get(session_id)?;
        if session.state() != SessionState::Active {
            return Err(Error::NameNotFound(format!(
                "session {session_id} is not active"
            )));
        }
        Ok(session)
    }

    /// `spec.md` §4.8 `start`: `CREATED → ACTIVE` happens before the id
    /// is ever handed back, so every session a caller can reach is
    /// immediately usable.
    #[tracing::instrument(skip(self, scope))]
    pub fn start(&self, project_name: Option<&str>, scope: ScopePolicy) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(GatherSession::new(
            id.clone(),
            project_name.map(str::to_string),
            scope,
        ));
        session.set_state(SessionState::Active);
        self.sessions.write().insert(id.clone(), session);
        id
    }

    #[tracing::instrument(skip(self))]
    pub fn analyze_file(&self, session_id: &str, path: &Path) -> Result<(), Error> {
        let session = self.require_active(session_id)?;
        let data = self.analyzer.analyze(path, session.scope())?;
        session.record(data);
        Ok(())
    }

    /// `spec.md` §4.8 `analyze_directory`: iterative traversal with
    /// symlink-cycle detection via a canonical-path visited set; any
    /// entry whose canonical form escapes the scope root aborts the
    /// whole operation rather than being silently skipped.
    #[tracing::instrument(skip(self))]
    pub fn analyze_directory(
        &self,
        session_id: &str,
        path: &Path,
        recursive: bool,
    ) -> Result<(), Error> {
        let session = self.require_active(session_id)?;
        let scope = session.scope();

        if !scope.is_in_scope(path) {
            return Err(Error::OutOfScope(path.to_path_buf()));
        }
        let root_canonical = path
            .canonicalize()
            .map_err(|_| Error::PathEscape(path.to_path_buf()))?;

        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut files = Vec::new();

        let mut walker = walkdir::WalkDir::new(path).follow_links(scope.follow_symlinks);
        if !recursive {
            walker = walker.max_depth(1);
        }

        for entry in walker {
            let entry = entry.map_err(|e| Error::MalformedXml(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let entry_path = entry.path();
            let Ok(canonical) = entry_path.canonicalize() else {
                continue;
            };
            if !canonical.starts_with(&root_canonical) {
                return Err(Error::PathEscape(entry_path.to_path_buf()));
            }
            if !visited.insert(canonical) {
                continue; // already visited via a symlink cycle
            }
            if !scope.is_in_scope(entry_path) {
                continue;
            }
            files.push(entry_path.to_path_buf());
        }

        for result in self.analyzer.analyze_many(&files, scope) {
            match result {
                Ok(data) => session.record(data),
                Err(_) => continue,
            }
        }
        Ok(())
    }

    /// `spec.md` §4.8 `import_burp`: runs §4.6, converts each finding
    /// via §4.3, and — when the session has an associated project —
    /// inserts the resulting `Vulnerability` values through
    /// `ProjectManager`.
    #[tracing::instrument(skip(self))]
    pub fn import_burp(&self, session_id: &str, path: &Path) -> Result<Vec<String>, Error> {
        let session = self.require_active(session_id)?;
        let parsed = self.burp_parser.parse(path)?;

        let mut warnings = parsed.warnings.clone();
        for issue in &parsed.findings {
            let false_positive = issue.severity.eq_ignore_ascii_case("false positive");
            let input = BurpFindingInput {
                name: issue.name.clone(),
                host: issue.host.clone(),
                location: if issue.location.is_empty() {
                    None
                } else {
                    Some(issue.location.clone())
                },
                severity_label: issue.severity.clone(),
                issue_background: issue.issue_background.clone(),
                issue_detail: issue.issue_detail.clone(),
                false_positive,
            };
            match model::Vulnerability::from_burp(&input) {
                Ok(vulnerability) => {
                    if let Some(project) = session.project_name() {
                        if let Err(e) = self.manager.add_vulnerability(project, vulnerability) {
                            warnings.push(warn_sentence(e.to_string()));
                        }
                    }
                }
                Err(e) => warnings.push(warn_sentence(e.to_string())),
            }
        }

        session.record_burp_import(parsed);
        Ok(warnings)
    }

    pub fn query(
        &self,
        session_id: &str,
        filter: &QueryFilter,
    ) -> Result<Vec<crate::file_analyzer::DataItem>, Error> {
        let session = self.get(session_id)?;
        Ok(session.query(filter))
    }

    #[tracing::instrument(skip(self))]
    pub fn close(&self, session_id: &str) -> Result<(), Error> {
        let session = self.get(session_id)?;
        session.set_state(SessionState::Closed);
        Ok(())
    }

    pub fn session(&self, session_id: &str) -> Result<Arc<GatherSession>, Error> {
        self.get(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn scope_for(dir: &Path) -> ScopePolicy {
        ScopePolicy::new(vec![dir.to_path_buf()], vec![], 1024 * 1024, false)
    }

    #[test]
    fn start_produces_active_session() {
        let manager = Arc::new(model::ProjectManager::new());
        let gatherer = InformationGatherer::new(manager);
        let id = gatherer.start(None, ScopePolicy::default());
        let session = gatherer.session(&id).unwrap();
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn analyze_file_accumulates_and_counts() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("app.conf");
        fs::write(&file, "password = hunter2").unwrap();

        let manager = Arc::new(model::ProjectManager::new());
        let gatherer = InformationGatherer::new(manager);
        let id = gatherer.start(None, scope_for(dir.path()));
        gatherer.analyze_file(&id, &file).unwrap();

        let session = gatherer.session(&id).unwrap();
        assert_eq!(session.files_analyzed(), 1);
    }

    #[test]
    fn operations_on_closed_session_fail() {
        let manager = Arc::new(model::ProjectManager::new());
        let gatherer = InformationGatherer::new(manager);
        let id = gatherer.start(None, ScopePolicy::default());
        gatherer.close(&id).unwrap();
        let err = gatherer.analyze_file(&id, Path::new("/tmp/x")).unwrap_err();
        assert!(matches!(err, Error::NameNotFound(_)));
    }

    #[test]
    fn analyze_directory_recursive_walks_subdirectories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("top.conf"), "password=a").unwrap();
        fs::write(dir.path().join("sub/nested.conf"), "password=b").unwrap();

        let manager = Arc::new(model::ProjectManager::new());
        let gatherer = InformationGatherer::new(manager);
        let id = gatherer.start(None, scope_for(dir.path()));
        gatherer.analyze_directory(&id, dir.path(), true).unwrap();

        let session = gatherer.session(&id).unwrap();
        assert_eq!(session.files_analyzed(), 2);
    }

    #[test]
    fn analyze_directory_non_recursive_skips_subdirectories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("top.conf"), "password=a").unwrap();
        fs::write(dir.path().join("sub/nested.conf"), "password=b").unwrap();

        let manager = Arc::new(model::ProjectManager::new());
        let gatherer = InformationGatherer::new(manager);
        let id = gatherer.start(None, scope_for(dir.path()));
        gatherer.analyze_directory(&id, dir.path(), false).unwrap();

        let session = gatherer.session(&id).unwrap();
        assert_eq!(session.files_analyzed(), 1);
    }

    #[test]
    fn import_burp_inserts_into_associated_project() {
        let manager = Arc::new(model::ProjectManager::new());
        manager.create("Audit", None).unwrap();
        let gatherer = InformationGatherer::new(manager.clone());

        let dir = tempdir().unwrap();
        let xml_path = dir.path().join("scan.xml");
        fs::write(
            &xml_path,
            r#"<?xml version="1.0"?><issues><issue><name>SQLi</name><host>10.0.0.1</host><severity>High</severity><issueBackground>bg</issueBackground></issue></issues>"#,
        )
        .unwrap();

        let id = gatherer.start(Some("Audit"), scope_for(dir.path()));
        gatherer.import_burp(&id, &xml_path).unwrap();

        let count = manager.with_project("Audit", |p| p.tree().len()).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn query_filters_by_kind() {
        use crate::file_analyzer::DataKind;

        let dir = tempdir().unwrap();
        let file = dir.path().join("app.conf");
        fs::write(&file, "password=hunter2\nurl=https://example.com").unwrap();

        let manager = Arc::new(model::ProjectManager::new());
        let gatherer = InformationGatherer::new(manager);
        let id = gatherer.start(None, scope_for(dir.path()));
        gatherer.analyze_file(&id, &file).unwrap();

        let results = gatherer
            .query(
                &id,
                &QueryFilter {
                    kind: Some(DataKind::Credential),
                    target: None,
                    pattern: None,
                },
            )
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
