use chrono::{DateTime, Utc};
use pentest_common::cve::{CveId, CveUtils};
use pentest_common::error::Error;
use pentest_common::severity::Severity;
use pentest_common::time;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Lifecycle state of a single finding (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Status {
    Open,
    InProgress,
    Fixed,
    FalsePositive,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "OPEN",
            Status::InProgress => "IN_PROGRESS",
            Status::Fixed => "FIXED",
            Status::FalsePositive => "FALSE_POSITIVE",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "OPEN" => Some(Status::Open),
            "IN_PROGRESS" => Some(Status::InProgress),
            "FIXED" => Some(Status::Fixed),
            "FALSE_POSITIVE" => Some(Status::FalsePositive),
            _ => None,
        }
    }
}

/// Where a `Vulnerability` came from (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Source {
    Manual,
    Burp,
    FileScan,
    Imported,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Manual => "MANUAL",
            Source::Burp => "BURP",
            Source::FileScan => "FILE_SCAN",
            Source::Imported => "IMPORTED",
        }
    }

    pub fn parse(s: &str) -> Option<Source> {
        match s {
            "MANUAL" => Some(Source::Manual),
            "BURP" => Some(Source::Burp),
            "FILE_SCAN" => Some(Source::FileScan),
            "IMPORTED" => Some(Source::Imported),
            _ => None,
        }
    }
}

/// A single finding. Identity fields (`id`, `cve_id`, `name`, `target`,
/// `discovered_at`, `source`) are immutable once constructed; only
/// `description`, `severity`, `location`, `tags`, and `status` may
/// change (`spec.md` §4.3).
#[derive(Debug, Clone)]
pub struct Vulnerability {
    id: String,
    name: String,
    description: String,
    severity: Severity,
    target: String,
    location: Option<String>,
    cve_id: Option<CveId>,
    tags: BTreeSet<String>,
    status: Status,
    discovered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    source: Source,
}

/// Minimal shape of a parsed Burp issue, deliberately independent of the
/// `ingest` crate's `BurpParseResult` type so `model` never depends on
/// `ingest` (grounded on the teacher's `common -> modules/*` one-way
/// dependency direction).
#[derive(Debug, Clone, Default)]
pub struct BurpFindingInput {
    pub name: String,
    pub host: String,
    pub location: Option<String>,
    pub severity_label: String,
    pub issue_background: String,
    pub issue_detail: String,
    pub false_positive: bool,
}

impl Vulnerability {
    /// Applies the CVE-naming convention (`spec.md` §4.1) and constructs
    /// a new `Vulnerability` with a fresh unique id.
    pub fn with_cve_convention(
        proposed_name: &str,
        description: &str,
        severity: Severity,
        target: &str,
        explicit_cve: Option<&str>,
    ) -> Result<Vulnerability, Error> {
        if target.trim().is_empty() {
            return Err(Error::EmptyField("target"));
        }
        let (name, cve_id) = CveUtils::determine_best_name(proposed_name, description, explicit_cve)?;
        if name.trim().is_empty() {
            return Err(Error::EmptyField("name"));
        }
        let now = time::now();
        Ok(Vulnerability {
            id: Uuid::new_v4().to_string(),
            name,
            description: description.to_string(),
            severity,
            target: target.to_string(),
            location: None,
            cve_id,
            tags: BTreeSet::new(),
            status: Status::Open,
            discovered_at: now,
            updated_at: now,
            source: Source::Manual,
        })
    }

    /// Converts a parsed Burp Suite issue into a `Vulnerability`
    /// (`spec.md` §4.3). Severity comes from §4.6's mapping; both the
    /// issue name and its background/detail text feed the CVE-naming
    /// convention.
    pub fn from_burp(finding: &BurpFindingInput) -> Result<Vulnerability, Error> {
        let description = format!(
            "{}\n{}",
            finding.issue_background.trim(),
            finding.issue_detail.trim()
        )
        .trim()
        .to_string();

        let mut v = Self::with_cve_convention(
            &finding.name,
            &description,
            Severity::from_burp_label(&finding.severity_label),
            &finding.host,
            None,
        )?;
        v.location = finding.location.clone();
        v.source = Source::Burp;
        if finding.false_positive {
            v.tags.insert("false_positive".to_string());
        }
        Ok(v)
    }

    /// Reconstructs a `Vulnerability` exactly as persisted (`spec.md`
    /// §6.3). Bypasses the CVE-naming convention because the record was
    /// already settled at write time; re-deriving it here could silently
    /// change identity fields on load.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: String,
        cve_id: Option<CveId>,
        name: String,
        severity: Severity,
        target: String,
        location: Option<String>,
        status: Status,
        discovered_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        tags: BTreeSet<String>,
        description: String,
        source: Source,
    ) -> Vulnerability {
        Vulnerability {
            id,
            name,
            description,
            severity,
            target,
            location,
            cve_id,
            tags,
            status,
            discovered_at,
            updated_at,
            source,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn severity(&self) -> Severity {
        self.severity
    }
    pub fn target(&self) -> &str {
        &self.target
    }
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
    pub fn cve_id(&self) -> Option<&CveId> {
        self.cve_id.as_ref()
    }
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }
    pub fn status(&self) -> Status {
        self.status
    }
    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    pub fn source(&self) -> Source {
        self.source
    }

    /// `spec.md` §4.1 display rule.
    pub fn display_name(&self, with_context: bool) -> String {
        CveUtils::format_display(self.cve_id.as_ref(), &self.name, with_context)
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> String {
        let previous = std::mem::replace(&mut self.description, description.into());
        self.touch();
        previous
    }

    pub fn set_severity(&mut self, severity: Severity) -> Severity {
        let previous = std::mem::replace(&mut self.severity, severity);
        self.touch();
        previous
    }

    pub fn set_location(&mut self, location: Option<String>) -> Option<String> {
        let previous = std::mem::replace(&mut self.location, location);
        self.touch();
        previous
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let inserted = self.tags.insert(tag.into());
        if inserted {
            self.touch();
        }
        inserted
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let removed = self.tags.remove(tag);
        if removed {
            self.touch();
        }
        removed
    }

    pub fn set_status(&mut self, status: Status) -> Status {
        let previous = std::mem::replace(&mut self.status, status);
        self.touch();
        previous
    }

    fn touch(&mut self) {
        self.updated_at = time::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cve_in_proposed_name_is_promoted() {
        let v = Vulnerability::with_cve_convention(
            "CVE-2021-44228: Log4Shell",
            "remote code execution via JNDI lookup",
            Severity::Low,
            "10.0.0.1",
            None,
        )
        .unwrap();
        assert_eq!(v.name(), "CVE-2021-44228");
        assert_eq!(v.cve_id().unwrap().as_str(), "CVE-2021-44228");
        assert_eq!(v.target(), "10.0.0.1");
    }

    #[test]
    fn empty_target_rejected() {
        let err =
            Vulnerability::with_cve_convention("XSS on /login", "desc", Severity::Medium, "  ", None)
                .unwrap_err();
        assert!(matches!(err, Error::EmptyField("target")));
    }

    #[test]
    fn mutation_updates_updated_at_and_returns_previous() {
        let mut v = Vulnerability::with_cve_convention(
            "Weak password policy",
            "desc",
            Severity::Low,
            "host",
            None,
        )
        .unwrap();
        let before = v.updated_at();
        let previous = v.set_severity(Severity::High);
        assert_eq!(previous, Severity::Low);
        assert_eq!(v.severity(), Severity::High);
        assert!(v.updated_at() > before);
        assert!(v.updated_at() >= v.discovered_at());
    }

    #[test]
    fn from_burp_maps_severity_and_tags_false_positive() {
        let finding = BurpFindingInput {
            name: "SQL Injection".into(),
            host: "10.0.0.5".into(),
            location: Some("/search".into()),
            severity_label: "False positive".into(),
            issue_background: "background".into(),
            issue_detail: "detail".into(),
            false_positive: true,
        };
        let v = Vulnerability::from_burp(&finding).unwrap();
        assert_eq!(v.severity(), Severity::Low);
        assert!(v.tags().contains("false_positive"));
        assert_eq!(v.source(), Source::Burp);
    }

    #[test]
    fn identity_fields_immutable_through_api() {
        // There is no setter for id/name/target/cve_id/discovered_at/source;
        // this test documents the invariant by exercising the accessor
        // surface and asserting it is read-only by construction.
        let v = Vulnerability::with_cve_convention(
            "Weak password policy",
            "desc",
            Severity::Low,
            "host",
            None,
        )
        .unwrap();
        let id = v.id().to_string();
        let target = v.target().to_string();
        let mut v = v;
        v.set_description("new desc");
        assert_eq!(v.id(), id);
        assert_eq!(v.target(), target);
    }
}
