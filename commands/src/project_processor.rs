use pentest_common::cve::CveUtils;
use pentest_common::severity::Severity;
use pentest_model::{ProjectManager, Vulnerability};
use regex::{Captures, Regex};
use std::sync::{Arc, LazyLock};

enum Command {
    CreateProject { name: String, description: Option<String> },
    RenameProject { old: String, new: String },
    DeleteProject { name: String },
    SelectProject { name: String },
    ClearCurrent,
    ListProjects,
    AddTarget { project: Option<String>, target: String },
    RemoveTarget { project: Option<String>, target: String },
    AddVulnerability { project: Option<String>, name: String, target: String },
    ListVulnerabilities { project: Option<String> },
    ShowVulnerability { project: Option<String>, id: String },
    SearchVulnerability { project: Option<String>, query: String },
    ShowCve { project: Option<String>, cve: String },
    GenerateReport { project: Option<String> },
}

fn quoted_or_bare<'t>(c: &Captures<'t>, quoted: &str, bare: &str) -> Option<&'t str> {
    c.name(quoted).or_else(|| c.name(bare)).map(|m| m.as_str())
}

type Builder = fn(&Captures) -> Command;

struct Rule {
    regex: Regex,
    build: Builder,
}

/// The project grammar, in priority order (`spec.md` §4.9): "at minimum
/// create/rename/delete/select project; add/remove target;
/// add/list/show/search vulnerability; show CVE id; generate report;
/// list projects; set/clear current." First match wins, so more
/// specific patterns (e.g. "set current project") are listed ahead of
/// anything that could be confused with a looser one.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule {
            regex: Regex::new(r#"(?i)^create project "(?P<name>[^"]+)"(?: with description "(?P<desc>[^"]*)")?$"#).unwrap(),
            build: |c| Command::CreateProject {
                name: c["name"].to_string(),
                description: c.name("desc").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^rename project "(?P<old>[^"]+)" to "(?P<new>[^"]+)"$"#).unwrap(),
            build: |c| Command::RenameProject { old: c["old"].to_string(), new: c["new"].to_string() },
        },
        Rule {
            regex: Regex::new(r#"(?i)^delete project "(?P<name>[^"]+)"$"#).unwrap(),
            build: |c| Command::DeleteProject { name: c["name"].to_string() },
        },
        Rule {
            regex: Regex::new(r#"(?i)^(?:select|set current) project "(?P<name>[^"]+)"$"#).unwrap(),
            build: |c| Command::SelectProject { name: c["name"].to_string() },
        },
        Rule {
            regex: Regex::new(r"(?i)^clear current project$").unwrap(),
            build: |_| Command::ClearCurrent,
        },
        Rule {
            regex: Regex::new(r"(?i)^list projects$").unwrap(),
            build: |_| Command::ListProjects,
        },
        Rule {
            regex: Regex::new(r#"(?i)^add target "(?P<target>[^"]+)"(?: to project "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::AddTarget {
                target: c["target"].to_string(),
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^remove target "(?P<target>[^"]+)"(?: from project "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::RemoveTarget {
                target: c["target"].to_string(),
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^add vulnerability "(?P<name>[^"]+)" to (?:"(?P<target_q>[^"]+)"|(?P<target_u>[^\s"]+))(?: in project "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::AddVulnerability {
                name: c["name"].to_string(),
                target: quoted_or_bare(c, "target_q", "target_u").unwrap_or_default().to_string(),
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^list vulnerabilities(?: in project "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::ListVulnerabilities { project: c.name("project").map(|m| m.as_str().to_string()) },
        },
        Rule {
            regex: Regex::new(r#"(?i)^show vulnerability "(?P<id>[^"]+)"(?: in project "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::ShowVulnerability {
                id: c["id"].to_string(),
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^search vulnerability "(?P<query>[^"]+)"(?: in project "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::SearchVulnerability {
                query: c["query"].to_string(),
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^show cve (?P<cve>[A-Za-z0-9\-]+)(?: in project "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::ShowCve {
                cve: c["cve"].to_string(),
                project: c.name("project").map(|m| m.as_str().to_string()),
            },
        },
        Rule {
            regex: Regex::new(r#"(?i)^generate report(?: for project "(?P<project>[^"]+)")?$"#).unwrap(),
            build: |c| Command::GenerateReport { project: c.name("project").map(|m| m.as_str().to_string()) },
        },
    ]
});

fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    RULES.iter().find_map(|rule| rule.regex.captures(line).map(|c| (rule.build)(&c)))
}

/// Natural-language command grammar over `ProjectManager` (`spec.md`
/// §4.9). First-match-wins over a fixed ordered pattern list; unknown
/// input makes `matches` return `false` so the `Orchestrator` can try
/// the next category.
pub struct ProjectCommandProcessor {
    manager: Arc<ProjectManager>,
}

impl ProjectCommandProcessor {
    pub fn new(manager: Arc<ProjectManager>) -> Self {
        ProjectCommandProcessor { manager }
    }

    pub fn matches(&self, line: &str) -> bool {
        parse(line).is_some()
    }

    #[tracing::instrument(skip(self))]
    pub fn process(&self, line: &str) -> String {
        match parse(line) {
            Some(cmd) => self.execute(cmd),
            None => "[ERROR] unrecognized project command".to_string(),
        }
    }

    fn resolve_project(&self, explicit: Option<String>) -> Result<String, String> {
        if let Some(name) = explicit {
            return Ok(name);
        }
        self.manager
            .current()
            .ok_or_else(|| "[ERROR] no current project selected".to_string())
    }

    fn execute(&self, cmd: Command) -> String {
        match cmd {
            Command::CreateProject { name, description } => {
                match self.manager.create(&name, description.as_deref()) {
                    Ok(()) => format!("created project \"{name}\""),
                    Err(e) => e.as_user_sentence(),
                }
            }
            Command::RenameProject { old, new } => match self.manager.rename(&old, &new) {
                Ok(()) => format!("renamed project \"{old}\" to \"{new}\""),
                Err(e) => e.as_user_sentence(),
            },
            Command::DeleteProject { name } => match self.manager.delete(&name) {
                Ok(()) => format!("deleted project \"{name}\""),
                Err(e) => e.as_user_sentence(),
            },
            Command::SelectProject { name } => match self.manager.select(&name) {
                Ok(()) => format!("current project is now \"{name}\""),
                Err(e) => e.as_user_sentence(),
            },
            Command::ClearCurrent => {
                self.manager.deselect();
                "current project cleared".to_string()
            }
            Command::ListProjects => {
                let names = self.manager.list_names();
                if names.is_empty() {
                    "no projects".to_string()
                } else {
                    names.join("\n")
                }
            }
            Command::AddTarget { project, target } => {
                let project = match self.resolve_project(project) {
                    Ok(p) => p,
                    Err(e) => return e,
                };
                match self.manager.add_target(&project, &target) {
                    Ok(()) => format!("added target \"{target}\" to \"{project}\""),
                    Err(e) => e.as_user_sentence(),
                }
            }
            Command::RemoveTarget { project, target } => {
                let project = match self.resolve_project(project) {
                    Ok(p) => p,
                    Err(e) => return e,
                };
                match self.manager.remove_target(&project, &target) {
                    Ok(removed) => format!(
                        "removed target \"{target}\" from \"{project}\" ({} vulnerabilities removed)",
                        removed.len()
                    ),
                    Err(e) => e.as_user_sentence(),
                }
            }
            Command::AddVulnerability { project, name, target } => {
                let project = match self.resolve_project(project) {
                    Ok(p) => p,
                    Err(e) => return e,
                };
                match Vulnerability::with_cve_convention(&name, "", Severity::Low, &target, None) {
                    Ok(v) => {
                        let display = v.display_name(true);
                        match self.manager.add_vulnerability(&project, v) {
                            Ok(()) => format!("added vulnerability {display} to \"{target}\" in \"{project}\""),
                            Err(e) => e.as_user_sentence(),
                        }
                    }
                    Err(e) => e.as_user_sentence(),
                }
            }
            Command::ListVulnerabilities { project } => {
                let project = match self.resolve_project(project) {
                    Ok(p) => p,
                    Err(e) => return e,
                };
                self.manager
                    .with_project(&project, |p| render_snapshot(p.tree().snapshot()))
                    .unwrap_or_else(|e| e.as_user_sentence())
            }
            Command::ShowVulnerability { project, id } => {
                let project = match self.resolve_project(project) {
                    Ok(p) => p,
                    Err(e) => return e,
                };
                self.manager
                    .with_project(&project, |p| match p.tree().get(&id) {
                        Some(v) => render_vuln_line(v),
                        None => format!("[ERROR] no vulnerability with id {id}"),
                    })
                    .unwrap_or_else(|e| e.as_user_sentence())
            }
            Command::SearchVulnerability { project, query } => {
                let project = match self.resolve_project(project) {
                    Ok(p) => p,
                    Err(e) => return e,
                };
                self.manager
                    .with_project(&project, |p| render_snapshot(p.tree().search_description(&query, true)))
                    .unwrap_or_else(|e| e.as_user_sentence())
            }
            Command::ShowCve { project, cve } => {
                let cve_id = match CveUtils::normalize(&cve) {
                    Ok(id) => id,
                    Err(e) => return e.as_user_sentence(),
                };
                let project = match self.resolve_project(project) {
                    Ok(p) => p,
                    Err(e) => return e,
                };
                self.manager
                    .with_project(&project, |p| {
                        let found = p.tree().find_by_cve(&cve_id);
                        if found.is_empty() {
                            format!("no findings for {cve_id}")
                        } else {
                            render_snapshot(found)
                        }
                    })
                    .unwrap_or_else(|e| e.as_user_sentence())
            }
            Command::GenerateReport { project } => {
                let project = match self.resolve_project(project) {
                    Ok(p) => p,
                    Err(e) => return e,
                };
                self.manager
                    .with_project(&project, |p| {
                        let stats = p.tree().stats();
                        let mut lines = vec![format!("Report for \"{}\"", p.name())];
                        lines.push(format!("total findings: {}", stats.total));
                        for severity in Severity::ALL {
                            lines.push(format!(
                                "  {severity}: {}",
                                stats.by_severity.get(&severity).copied().unwrap_or(0)
                            ));
                        }
                        lines.push(format!("distinct CVEs: {}", stats.distinct_cves));
                        lines.join("\n")
                    })
                    .unwrap_or_else(|e| e.as_user_sentence())
            }
        }
    }
}

fn render_vuln_line(v: &Vulnerability) -> String {
    format!(
        "{} [{}] {} status={} tags={}",
        v.display_name(true),
        v.severity(),
        v.target(),
        v.status().as_str(),
        v.tags().iter().cloned().collect::<Vec<_>>().join(",")
    )
}

fn render_snapshot(vulns: Vec<&Vulnerability>) -> String {
    if vulns.is_empty() {
        return "no vulnerabilities".to_string();
    }
    vulns.into_iter().map(render_vuln_line).collect::<Vec<_>>().join("\n")
}
