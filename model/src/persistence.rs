use crate::manager::ProjectManager;
use crate::project::Project;
use crate::vulnerability::{Source, Status, Vulnerability};
use chrono::{DateTime, Utc};
use pentest_common::cve::CveId;
use pentest_common::error::{warn_sentence, Error};
use pentest_common::severity::Severity;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// `spec.md` §6.3's text format, write-through on explicit save.
///
/// Grounded on the teacher's `csaf`/`cyclonedx` ingestion, which always
/// treats a record as line-delimited and tolerant of unknown keys on
/// read; the persistence Open Question in `spec.md` §9 is resolved here
/// in favor of atomic writes (temp file + rename), since the spec
/// recommends it to satisfy round-trip invariant 7 under a crash.
pub fn persist_all(manager: &ProjectManager, path: &Path) -> Result<(), Error> {
    let mut buffer = String::new();
    for project in manager.all_projects() {
        let project = project.read();
        write_project(&mut buffer, &project);
    }

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = tempfile::Builder::new()
        .prefix(".pentest-assistant-")
        .tempfile_in(dir.unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(buffer.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn write_project(out: &mut String, project: &Project) {
    out.push_str(&format!("== PROJECT {} ==\n", project.name()));
    out.push_str(&format!("desc: {}\n", escape_newlines(project.description())));
    out.push_str(&format!(
        "targets: {}\n",
        project.targets().iter().cloned().collect::<Vec<_>>().join(",")
    ));
    for (key, value) in project.metadata() {
        out.push_str(&format!("meta.{key}={value}\n"));
    }
    out.push_str("---\n");
    for v in project.tree().snapshot() {
        out.push_str(&format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}\n",
            v.id(),
            v.cve_id().map(CveId::as_str).unwrap_or(""),
            v.name(),
            v.severity(),
            v.target(),
            v.location().unwrap_or(""),
            v.status().as_str(),
            v.discovered_at().to_rfc3339(),
            v.updated_at().to_rfc3339(),
            v.tags().iter().cloned().collect::<Vec<_>>().join(";"),
        ));
    }
    out.push_str(&format!("== END {} ==\n", project.name()));
}

fn escape_newlines(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape_newlines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Loads every project from `path`, replacing the manager's state.
/// Malformed vulnerability lines are skipped and logged, never fatal;
/// an I/O error reading the file itself is fatal (`spec.md` §7).
pub fn load_all(manager: &ProjectManager, path: &Path) -> Result<Vec<String>, Error> {
    let content = std::fs::read_to_string(path)?;
    let mut warnings = Vec::new();
    let mut projects = BTreeMap::new();

    let mut lines = content.lines().peekable();
    while let Some(line) = lines.next() {
        let Some(name) = line
            .strip_prefix("== PROJECT ")
            .and_then(|rest| rest.strip_suffix(" =="))
        else {
            continue;
        };

        let Ok(mut project) = Project::new(name, "") else {
            warnings.push(warn_sentence(format!("skipping project with empty name near {line:?}")));
            continue;
        };

        for line in lines.by_ref() {
            if line == "---" {
                break;
            }
            if let Some(desc) = line.strip_prefix("desc: ") {
                project.set_description(unescape_newlines(desc));
            } else if let Some(targets) = line.strip_prefix("targets: ") {
                for target in targets.split(',').filter(|t| !t.is_empty()) {
                    if let Err(e) = project.add_target(target) {
                        warnings.push(warn_sentence(format!("skipping target {target:?}: {e}")));
                    }
                }
            } else if let Some(rest) = line.strip_prefix("meta.") {
                if let Some((key, value)) = rest.split_once('=') {
                    project.set_metadata(key, value);
                }
            }
        }

        for line in lines.by_ref() {
            if line.starts_with("== END ") {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match parse_vulnerability_line(line) {
                Ok(v) => {
                    if let Err(e) = project.add_vulnerability(v) {
                        warnings.push(warn_sentence(format!("skipping record: {e}")));
                    }
                }
                Err(e) => warnings.push(warn_sentence(format!("{e}: {line:?}"))),
            }
        }

        projects.insert(project.name().to_string(), project);
    }

    manager.replace_all(projects);
    Ok(warnings)
}

fn parse_vulnerability_line(line: &str) -> Result<Vulnerability, Error> {
    let fields: Vec<&str> = line.split('|').collect();
    let [id, cve, name, severity, target, location, status, discovered, updated, tags] =
        fields.as_slice()
    else {
        return Err(Error::CorruptRecord("wrong field count".to_string()));
    };

    let cve_id = if cve.is_empty() {
        None
    } else {
        Some(CveId::parse(cve).map_err(|_| Error::CorruptRecord(format!("bad cve {cve:?}")))?)
    };
    let severity = parse_severity(severity)
        .ok_or_else(|| Error::CorruptRecord(format!("bad severity {severity:?}")))?;
    let status = Status::parse(status)
        .ok_or_else(|| Error::CorruptRecord(format!("bad status {status:?}")))?;
    let discovered_at = parse_timestamp(discovered)?;
    let updated_at = parse_timestamp(updated)?;
    let location = if location.is_empty() {
        None
    } else {
        Some(location.to_string())
    };
    let tags = tags
        .split(';')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    if id.is_empty() || target.is_empty() {
        return Err(Error::CorruptRecord("missing id or target".to_string()));
    }

    Ok(Vulnerability::from_persisted(
        id.to_string(),
        cve_id,
        name.to_string(),
        severity,
        target.to_string(),
        location,
        status,
        discovered_at,
        updated_at,
        tags,
        String::new(),
        Source::Imported,
    ))
}

fn parse_severity(s: &str) -> Option<Severity> {
    Severity::ALL.into_iter().find(|sev| sev.to_string() == s)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::CorruptRecord(format!("bad timestamp {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_preserves_projects_targets_and_vulnerabilities() {
        let manager = ProjectManager::new();
        manager.create("P1", Some("a demo project")).unwrap();
        manager.add_target("P1", "a.example").unwrap();
        manager.add_target("P1", "b.example").unwrap();

        let with_cve = Vulnerability::with_cve_convention(
            "CVE-2021-44228",
            "Log4Shell",
            Severity::Critical,
            "a.example",
            None,
        )
        .unwrap();
        let without_cve =
            Vulnerability::with_cve_convention("Weak password policy", "desc", Severity::Low, "b.example", None)
                .unwrap();
        let mut tagged =
            Vulnerability::with_cve_convention("Open SMB share", "desc", Severity::Medium, "a.example", None)
                .unwrap();
        tagged.add_tag("internal");
        tagged.add_tag("needs-followup");

        manager.add_vulnerability("P1", with_cve).unwrap();
        manager.add_vulnerability("P1", without_cve).unwrap();
        manager.add_vulnerability("P1", tagged).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("projects.dat");
        persist_all(&manager, &path).unwrap();

        let loaded = ProjectManager::new();
        let warnings = load_all(&loaded, &path).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");

        assert_eq!(loaded.list_names(), vec!["P1".to_string()]);
        loaded
            .with_project("P1", |p| {
                assert_eq!(p.description(), "a demo project");
                assert_eq!(p.targets().len(), 2);
                assert_eq!(p.tree().len(), 3);
                let cve = CveId::parse("CVE-2021-44228").unwrap();
                assert_eq!(p.tree().find_by_cve(&cve).len(), 1);
            })
            .unwrap();
    }

    #[test]
    fn malformed_vulnerability_line_is_skipped_with_warning() {
        let manager = ProjectManager::new();
        manager.create("P1", None).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("projects.dat");
        std::fs::write(
            &path,
            "== PROJECT P1 ==\ndesc: \ntargets: \n---\nnot-enough-fields\n== END P1 ==\n",
        )
        .unwrap();

        let loaded = ProjectManager::new();
        let warnings = load_all(&loaded, &path).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("[WARN]"));
        loaded.with_project("P1", |p| assert_eq!(p.tree().len(), 0)).unwrap();
    }

    #[test]
    fn description_newlines_round_trip() {
        let manager = ProjectManager::new();
        manager.create("P1", Some("line one\nline two")).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("projects.dat");
        persist_all(&manager, &path).unwrap();

        let loaded = ProjectManager::new();
        load_all(&loaded, &path).unwrap();
        loaded
            .with_project("P1", |p| assert_eq!(p.description(), "line one\nline two"))
            .unwrap();
    }
}
