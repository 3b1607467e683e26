use std::fmt;

/// A closed, totally-ordered severity scale.
///
/// Variant declaration order is deliberately highest-to-lowest so the
/// derived `Ord` matches `spec.md` §3: `CRITICAL > HIGH > MEDIUM > LOW > INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// All variants, highest first. Used by `stats()` to report a
    /// deterministic histogram even for severities with zero findings.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Maps a Burp Suite severity label to the internal scale (§4.6).
    ///
    /// Burp's own scale runs one notch below ours ("High" is not our
    /// highest), which is why the mapping shifts every known label up.
    /// Anything unrecognized — including "False positive" — lands on
    /// `Low`, never fails, and never panics.
    pub fn from_burp_label(label: &str) -> Severity {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Severity::Critical,
            "medium" => Severity::High,
            "low" => Severity::Medium,
            "information" => Severity::Low,
            _ => Severity::Low,
        }
    }

    /// General external-label mapper for non-Burp sources (file-scan
    /// heuristics, manual entry). Accepts the internal names themselves
    /// case-insensitively in addition to a handful of common synonyms.
    pub fn from_external(label: &str) -> Severity {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "crit" => Severity::Critical,
            "high" => Severity::High,
            "medium" | "med" | "moderate" => Severity::Medium,
            "low" => Severity::Low,
            "info" | "information" | "informational" => Severity::Info,
            _ => Severity::Low,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        };
        f.write_str(s)
    }
}
