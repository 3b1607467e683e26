use pentest_common::scope::ScopePolicy;
use pentest_ingest::{DataKind, InformationGatherer, QueryFilter};
use parking_lot::Mutex;
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::{Arc, LazyLock};

enum ListKind {
    Passwords,
    ApiKeys,
    Endpoints,
    BurpVulnerabilities,
}

enum Command {
    GatherInfo { project: String },
    AnalyzeFile { path: String },
    AnalyzeDirectory { path: String, recursive: bool },
    ImportBurp { path: String, project: Option<String> },
    ListSession { id: String },
    ShowSession { id: String },
    CloseSession { id: String },
    ListKind { kind: ListKind, project: Option<String> },
}

type Builder = fn(&Captures) -> Command;

struct Rule {
    regex: Regex,
    build: Builder,
}

/// The information-gathering grammar (`spec.md` §4.9): `gather info on`,
/// `analyze file/directory`, `import burp data`, session inspection, and
/// the `list <kind>` family.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule {
            regex: Regex::new(r#"(?i)^gather info on "(?P<project>[^"]+)"$"#).unwrap(),
            build: |c| Command::GatherInfo { project: c["project"].to_string() },
        },
        Rule {
            regex: Regex::new(r#"(?i)^analyze file "(?P<path>[^"]+)"$"#).unwrap(),
            build: |c| Command::AnalyzeFile { path: c["path"].to_string() },
        },
        Rule {
            regex: Regex::new(r#"(?i)^analyze directory "(?P<path>[^"]+)"(?P<recursive> recursively)?$"#).unwrap(),
            build: |c| Command::AnalyzeDirectory {
                path: c["path"].to_string(),
                recursive: c.name("recursive").is_some(),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^import burp data from "(?P<path>[^"]+)"(?: into project "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::ImportBurp {
                path: c["path"].to_string(),
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r"(?i)^list gathering session (?P<id>\S+)$").unwrap(),
            build: |c| Command::ListSession { id: c["id"].to_string() },
        },
        Rule {
            regex: Regex::new(r"(?i)^show gathering session (?P<id>\S+)$").unwrap(),
            build: |c| Command::ShowSession { id: c["id"].to_string() },
        },
        Rule {
            regex: Regex::new(r"(?i)^close gathering session (?P<id>\S+)$").unwrap(),
            build: |c| Command::CloseSession { id: c["id"].to_string() },
        },
        Rule {
            regex: Regex::new(r#"(?i)^list passwords(?: in "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::ListKind {
                kind: ListKind::Passwords,
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^list api keys(?: in "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::ListKind {
                kind: ListKind::ApiKeys,
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^list endpoints(?: in "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::ListKind {
                kind: ListKind::Endpoints,
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^list burp vulnerabilities(?: in "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::ListKind {
                kind: ListKind::BurpVulnerabilities,
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
    ]
});

fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    RULES.iter().find_map(|rule| rule.regex.captures(line).map(|c| (rule.build)(&c)))
}

/// Natural-language command grammar over `InformationGatherer`
/// (`spec.md` §4.9). Keeps a "current gathering session" pointer the
/// same way `ProjectManager` keeps a current project, so `analyze
/// file`/`analyze directory` can omit a session id in the common case
/// of one gathering pass at a time.
pub struct InformationGatheringCommandProcessor {
    gatherer: Arc<InformationGatherer>,
    default_scope: ScopePolicy,
    current: Mutex<Option<String>>,
}

impl InformationGatheringCommandProcessor {
    pub fn new(gatherer: Arc<InformationGatherer>, default_scope: ScopePolicy) -> Self {
        InformationGatheringCommandProcessor {
            gatherer,
            default_scope,
            current: Mutex::new(None),
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        parse(line).is_some()
    }

    #[tracing::instrument(skip(self))]
    pub fn process(&self, line: &str) -> String {
        match parse(line) {
            Some(cmd) => self.execute(cmd),
            None => "[ERROR] unrecognized gathering command".to_string(),
        }
    }

    fn require_current(&self) -> Result<String, String> {
        self.current
            .lock()
            .clone()
            .ok_or_else(|| "[ERROR] no active gathering session".to_string())
    }

    fn execute(&self, cmd: Command) -> String {
        match cmd {
            Command::GatherInfo { project } => {
                let id = self.gatherer.start(Some(&project), self.default_scope.clone());
                *self.current.lock() = Some(id.clone());
                format!("started gathering session {id} for project \"{project}\"")
            }
            Command::AnalyzeFile { path } => {
                let session = match self.require_current() {
                    Ok(s) => s,
                    Err(e) => return e,
                };
                match self.gatherer.analyze_file(&session, Path::new(&path)) {
                    Ok(()) => format!("analyzed file \"{path}\""),
                    Err(e) => e.as_user_sentence(),
                }
            }
            Command::AnalyzeDirectory { path, recursive } => {
                let session = match self.require_current() {
                    Ok(s) => s,
                    Err(e) => return e,
                };
                match self.gatherer.analyze_directory(&session, Path::new(&path), recursive) {
                    Ok(()) => format!("analyzed directory \"{path}\""),
                    Err(e) => e.as_user_sentence(),
                }
            }
            Command::ImportBurp { path, project } => {
                let (session, owned) = match project {
                    Some(project) => (
                        self.gatherer.start(Some(&project), self.default_scope.clone()),
                        true,
                    ),
                    None => match self.require_current() {
                        Ok(s) => (s, false),
                        Err(e) => return e,
                    },
                };
                let result = self.gatherer.import_burp(&session, Path::new(&path));
                if owned {
                    let _ = self.gatherer.close(&session);
                }
                match result {
                    Ok(warnings) => {
                        let findings = self
                            .gatherer
                            .session(&session)
                            .ok()
                            .and_then(|s| s.burp_imports().last().map(|r| r.findings.len()))
                            .unwrap_or(0);
                        format!("imported {findings} findings from \"{path}\" ({} warnings)", warnings.len())
                    }
                    Err(e) => e.as_user_sentence(),
                }
            }
            Command::ListSession { id } | Command::ShowSession { id } => {
                match self.gatherer.session(&id) {
                    Ok(session) => format!(
                        "session {} project={} state={:?} files_analyzed={} burp_imports={}",
                        session.id(),
                        session.project_name().unwrap_or("-"),
                        session.state(),
                        session.files_analyzed(),
                        session.burp_imports().len(),
                    ),
                    Err(e) => e.as_user_sentence(),
                }
            }
            Command::CloseSession { id } => match self.gatherer.close(&id) {
                Ok(()) => format!("closed gathering session {id}"),
                Err(e) => e.as_user_sentence(),
            },
            Command::ListKind { kind, project } => self.render_list_kind(kind, project),
        }
    }

    fn matching_sessions(&self, project: Option<&str>) -> Vec<Arc<pentest_ingest::GatherSession>> {
        let current = self.current.lock().clone();
        self.gatherer
            .session_ids()
            .into_iter()
            .filter_map(|id| self.gatherer.session(&id).ok())
            .filter(|session| match project {
                Some(project) => session.project_name() == Some(project),
                None => current.as_deref() == Some(session.id()),
            })
            .collect()
    }

    fn render_list_kind(&self, kind: ListKind, project: Option<String>) -> String {
        let sessions = self.matching_sessions(project.as_deref());
        if sessions.is_empty() {
            return "no matching gathering session".to_string();
        }

        if let ListKind::BurpVulnerabilities = kind {
            let mut lines = Vec::new();
            for session in &sessions {
                for import in session.burp_imports() {
                    for issue in &import.findings {
                        lines.push(format!("{} [{}] {}", issue.name, issue.severity, issue.host));
                    }
                }
            }
            return if lines.is_empty() { "no burp vulnerabilities".to_string() } else { lines.join("\n") };
        }

        let data_kind = match kind {
            ListKind::Passwords => DataKind::Credential,
            ListKind::ApiKeys => DataKind::ApiKey,
            ListKind::Endpoints => DataKind::Endpoint,
            ListKind::BurpVulnerabilities => unreachable!(),
        };
        let filter = QueryFilter { kind: Some(data_kind), target: None, pattern: None };
        let mut lines = Vec::new();
        for session in &sessions {
            for item in session.query(&filter) {
                lines.push(item.display);
            }
        }
        if lines.is_empty() {
            "no matching items".to_string()
        } else {
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentest_model::ProjectManager;
    use std::fs;
    use tempfile::tempdir;

    fn processor(dir: &Path) -> InformationGatheringCommandProcessor {
        let manager = Arc::new(ProjectManager::new());
        let gatherer = Arc::new(InformationGatherer::new(manager));
        let scope = ScopePolicy::new(vec![dir.to_path_buf()], vec![], 1024 * 1024, false);
        InformationGatheringCommandProcessor::new(gatherer, scope)
    }

    #[test]
    fn unknown_line_does_not_match() {
        let dir = tempdir().unwrap();
        let p = processor(dir.path());
        assert!(!p.matches("what's the weather"));
    }

    #[test]
    fn gather_then_analyze_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("app.conf");
        fs::write(&file, "password=hunter2").unwrap();

        let p = processor(dir.path());
        let started = p.process(r#"gather info on "Audit""#);
        assert!(started.starts_with("started gathering session"));

        let response = p.process(&format!("analyze file \"{}\"", file.display()));
        assert!(response.starts_with("analyzed file"));
    }

    #[test]
    fn analyze_without_session_reports_error() {
        let dir = tempdir().unwrap();
        let p = processor(dir.path());
        let response = p.process(r#"analyze file "/tmp/whatever""#);
        assert!(response.starts_with("[ERROR]"));
    }

    #[test]
    fn list_passwords_after_analyze() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("app.conf");
        fs::write(&file, "password=hunter2").unwrap();

        let p = processor(dir.path());
        p.process(r#"gather info on "Audit""#);
        p.process(&format!("analyze file \"{}\"", file.display()));

        let response = p.process("list passwords");
        assert!(response.contains("REDACTED"));
    }
}
