use crate::error::Error;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// `^CVE-\d{4}-\d{4,}$`, anchored, case-insensitive via `(?i)`.
///
/// A single linear-time regex (no nested quantifiers, no alternation
/// inside a repeated group) so matching is O(n) with no catastrophic
/// backtracking, per `spec.md` §4.1 ("no backtracking required").
static CVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)CVE-(\d{4})-(\d{4,})").unwrap());

/// A validated, canonically-uppercased CVE identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CveId(String);

impl CveId {
    /// Parses and normalizes `s`, requiring the *entire* string to be a
    /// CVE reference (not merely to contain one — use
    /// [`CveUtils::extract`] for substring search).
    pub fn parse(s: &str) -> Result<CveId, Error> {
        let trimmed = s.trim();
        let Some(m) = CVE_PATTERN.find(trimmed) else {
            return Err(Error::InvalidCveFormat(s.to_string()));
        };
        if m.start() != 0 || m.end() != trimmed.len() {
            return Err(Error::InvalidCveFormat(s.to_string()));
        }
        Ok(CveId(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validation, normalization, extraction, and display-name arbitration
/// for CVE identifiers (`spec.md` §4.1).
pub struct CveUtils;

impl CveUtils {
    /// `true` iff `s`, considered as a whole, matches the CVE pattern.
    pub fn is_valid(s: &str) -> bool {
        CveId::parse(s).is_ok()
    }

    /// Uppercases and validates `s`, failing on any deviation from the
    /// canonical pattern.
    pub fn normalize(s: &str) -> Result<CveId, Error> {
        CveId::parse(s)
    }

    /// Returns the first CVE reference found anywhere in `text`, or
    /// `None`. Scans left to right; the first match wins when a text
    /// contains more than one reference.
    pub fn extract(text: &str) -> Option<CveId> {
        CVE_PATTERN
            .find(text)
            .map(|m| CveId(m.as_str().to_ascii_uppercase()))
    }

    /// Settles the `(name, cve_id)` pair for a new `Vulnerability`
    /// (`spec.md` §4.1). Priority:
    ///   1. an explicit CVE supplied by the caller,
    ///   2. a CVE found in `proposed_name`,
    ///   3. a CVE found in `description`,
    ///   4. the cleaned `proposed_name` with no CVE.
    ///
    /// Per the Open Question resolved in `SPEC_FULL.md` §"SUPPLEMENTAL
    /// FEATURES", CVE extraction considers only `proposed_name` and
    /// `description` — never any other field.
    pub fn determine_best_name(
        proposed_name: &str,
        description: &str,
        explicit_cve: Option<&str>,
    ) -> Result<(String, Option<CveId>), Error> {
        if let Some(explicit) = explicit_cve {
            let cve = CveId::parse(explicit)?;
            let name = cve.to_string();
            return Ok((name, Some(cve)));
        }

        if let Some(cve) = Self::extract(proposed_name) {
            let name = cve.to_string();
            return Ok((name, Some(cve)));
        }

        if let Some(cve) = Self::extract(description) {
            let name = cve.to_string();
            return Ok((name, Some(cve)));
        }

        Ok((Self::clean_name(proposed_name), None))
    }

    /// Trims, collapses internal whitespace, and strips a leading
    /// `"CVE-…: "` label from a name that did not end up promoted to a
    /// real CVE identity (e.g. "CVE-BOGUS: something" has no valid CVE
    /// but still reads oddly with the prefix left in).
    fn clean_name(proposed_name: &str) -> String {
        let collapsed = proposed_name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(rest) = collapsed
            .strip_prefix("CVE-")
            .and_then(|r| r.split_once(": "))
            .map(|(_, rest)| rest)
        {
            rest.to_string()
        } else {
            collapsed
        }
    }

    /// `spec.md` §4.1: show the CVE if present (optionally with the
    /// descriptive name in parens when it differs), else the name.
    ///
    /// `with_context` controls whether a distinct descriptive name is
    /// appended; it has no effect when `name == cve_id.to_string()`,
    /// which is the common case enforced by the `Vulnerability`
    /// invariant in `spec.md` §3.
    pub fn format_display(cve_id: Option<&CveId>, name: &str, with_context: bool) -> String {
        match cve_id {
            Some(cve) => {
                if with_context && name != cve.as_str() {
                    format!("{cve} ({name})")
                } else {
                    cve.to_string()
                }
            }
            None => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("CVE-2021-44228", true)]
    #[case("cve-2021-44228", true)]
    #[case("CVE-2021-44228-extra", false)]
    #[case("CVE-99-1234", false)]
    #[case("CVE-2021-123", false)]
    #[case("", false)]
    #[case("not a cve at all", false)]
    fn validity(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(CveUtils::is_valid(input), expected);
    }

    #[test]
    fn normalize_uppercases() {
        let id = CveUtils::normalize("cve-2021-44228").unwrap();
        assert_eq!(id.as_str(), "CVE-2021-44228");
    }

    #[test]
    fn extract_first_of_several_wins() {
        let text = "relates to CVE-2021-44228 and also CVE-2022-0001";
        let found = CveUtils::extract(text).unwrap();
        assert_eq!(found.as_str(), "CVE-2021-44228");
    }

    #[test]
    fn extract_none_on_empty() {
        assert!(CveUtils::extract("").is_none());
    }

    #[test]
    fn round_trip_extract_of_normalize() {
        for s in ["cve-2021-44228", "CVE-2023-0001", "cve-1999-0001"] {
            let normalized = CveUtils::normalize(s).unwrap();
            let extracted = CveUtils::extract(normalized.as_str()).unwrap();
            assert_eq!(extracted, normalized);
        }
    }

    #[test]
    fn determine_best_name_explicit_cve_wins() {
        let (name, cve) =
            CveUtils::determine_best_name("Log4Shell", "mentions CVE-2022-0001", Some("CVE-2021-44228"))
                .unwrap();
        assert_eq!(name, "CVE-2021-44228");
        assert_eq!(cve.unwrap().as_str(), "CVE-2021-44228");
    }

    #[test]
    fn determine_best_name_promotes_from_proposed_name() {
        let (name, cve) =
            CveUtils::determine_best_name("CVE-2021-44228: Log4Shell", "some description", None)
                .unwrap();
        assert_eq!(name, "CVE-2021-44228");
        assert_eq!(cve.unwrap().as_str(), "CVE-2021-44228");
    }

    #[test]
    fn determine_best_name_promotes_from_description() {
        let (name, cve) =
            CveUtils::determine_best_name("Log4Shell RCE", "see CVE-2021-44228 advisory", None)
                .unwrap();
        assert_eq!(name, "CVE-2021-44228");
        assert_eq!(cve.unwrap().as_str(), "CVE-2021-44228");
    }

    #[test]
    fn determine_best_name_falls_back_to_cleaned_name() {
        let (name, cve) =
            CveUtils::determine_best_name("  Weak   Password   Policy  ", "no cve here", None)
                .unwrap();
        assert_eq!(name, "Weak Password Policy");
        assert!(cve.is_none());
    }

    #[test]
    fn format_display_prefers_cve() {
        let cve = CveId::parse("CVE-2021-44228").unwrap();
        assert_eq!(
            CveUtils::format_display(Some(&cve), "CVE-2021-44228", false),
            "CVE-2021-44228"
        );
    }

    #[test]
    fn format_display_falls_back_to_name() {
        assert_eq!(
            CveUtils::format_display(None, "Weak Password Policy", false),
            "Weak Password Policy"
        );
    }
}
