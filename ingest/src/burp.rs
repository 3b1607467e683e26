use base64::Engine;
use pentest_common::config::Config;
use pentest_common::error::{warn_sentence, Error};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// One `<issue>` from a Burp Suite scanner export, before conversion to
/// a `Vulnerability` (`spec.md` §4.6).
#[derive(Debug, Clone, Default)]
pub struct BurpIssue {
    pub r#type: String,
    pub name: String,
    pub host: String,
    pub path: String,
    pub location: String,
    pub severity: String,
    pub confidence: String,
    pub issue_background: String,
    pub remediation_background: String,
    pub issue_detail: String,
    pub remediation_detail: String,
    pub request: Option<String>,
    pub response: Option<String>,
}

/// The parser's output (`spec.md` §4.6).
#[derive(Debug, Clone, Default)]
pub struct BurpParseResult {
    pub findings: Vec<BurpIssue>,
    pub targets: Vec<String>,
    pub source_path: PathBuf,
    pub warnings: Vec<String>,
}

/// Hardened Burp Suite XML export reader (`spec.md` §4.6, §6.1).
///
/// Grounded on the teacher's `quick-xml` workspace dependency (carried
/// even though the retrieved teacher sources happen not to exercise it
/// directly — it's in `Cargo.toml` for the SBOM/CSAF XML variants this
/// retrieval pack didn't keep). `quick-xml`'s reader has no DTD/entity
/// expansion of its own, but issue §6.1/§8 scenario S3 requires an
/// explicit, defense-in-depth rejection of any DOCTYPE — this parser
/// treats seeing one as fatal rather than silently ignoring it.
#[derive(Debug, Clone)]
pub struct BurpSuiteParser {
    max_bytes: u64,
    request_response_truncate: usize,
}

impl Default for BurpSuiteParser {
    fn default() -> Self {
        BurpSuiteParser {
            max_bytes: Config::DEFAULT_BURP_MAX_BYTES,
            request_response_truncate: 4096,
        }
    }
}

impl BurpSuiteParser {
    pub fn new(max_bytes: u64, request_response_truncate: usize) -> Self {
        BurpSuiteParser {
            max_bytes,
            request_response_truncate,
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn parse(&self, path: &Path) -> Result<BurpParseResult, Error> {
        let metadata = std::fs::metadata(path)?;
        if metadata.len() > self.max_bytes {
            return Err(Error::FileTooLarge {
                size: metadata.len(),
                limit: self.max_bytes,
            });
        }
        let bytes = std::fs::read(path)?;
        self.parse_bytes(&bytes, path.to_path_buf())
    }

    /// Parses an in-memory export, useful for tests and for callers that
    /// already have the bytes (e.g. an upload handler).
    pub fn parse_bytes(&self, bytes: &[u8], source_path: PathBuf) -> Result<BurpParseResult, Error> {
        if bytes.len() as u64 > self.max_bytes {
            return Err(Error::FileTooLarge {
                size: bytes.len() as u64,
                limit: self.max_bytes,
            });
        }

        let mut reader = Reader::from_reader(bytes);
        {
            let config = reader.config_mut();
            config.trim_text_start = true;
            config.trim_text_end = true;
        }

        let mut buf = Vec::new();
        let mut findings = Vec::new();
        let mut warnings = Vec::new();
        let mut targets = BTreeSet::new();
        let mut target_order = Vec::new();

        let mut seen_root = false;
        let mut current: Option<BurpIssue> = None;
        let mut tag_stack: Vec<String> = Vec::new();
        let mut rr_base64 = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Err(e) => return Err(Error::MalformedXml(e.to_string())),
                Ok(Event::Eof) => break,
                Ok(Event::DocType(_)) => {
                    return Err(Error::MalformedXml(
                        "DOCTYPE declarations are rejected".to_string(),
                    ));
                }
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if !seen_root {
                        if name != "issues" {
                            return Err(Error::NotABurpExport(format!(
                                "root element is {name:?}, expected \"issues\""
                            )));
                        }
                        seen_root = true;
                    }
                    if name == "issue" {
                        current = Some(BurpIssue::default());
                    }
                    if name == "request" || name == "response" {
                        rr_base64 = e
                            .attributes()
                            .flatten()
                            .any(|a| a.key.as_ref() == b"base64" && a.value.as_ref() == b"true");
                    }
                    tag_stack.push(name);
                }
                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if !seen_root && name != "issues" {
                        return Err(Error::NotABurpExport(format!(
                            "root element is {name:?}, expected \"issues\""
                        )));
                    }
                    // an empty element has no text; nothing further to record
                }
                Ok(Event::Text(text)) => {
                    let Some(parent) = tag_stack.last() else {
                        continue;
                    };
                    let Some(issue) = current.as_mut() else {
                        continue;
                    };
                    let raw = text.unescape().unwrap_or_default().to_string();
                    match parent.as_str() {
                        "type" => issue.r#type = raw,
                        "name" => issue.name = raw,
                        "host" => issue.host = raw,
                        "path" => issue.path = raw,
                        "location" => issue.location = raw,
                        "severity" => issue.severity = raw,
                        "confidence" => issue.confidence = raw,
                        "issueBackground" => issue.issue_background = raw,
                        "remediationBackground" => issue.remediation_background = raw,
                        "issueDetail" => issue.issue_detail = raw,
                        "remediationDetail" => issue.remediation_detail = raw,
                        "request" => {
                            issue.request = Some(self.decode_request_response(&raw, rr_base64));
                        }
                        "response" => {
                            issue.response = Some(self.decode_request_response(&raw, rr_base64));
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    tag_stack.pop();
                    if name == "issue" {
                        if let Some(issue) = current.take() {
                            if issue.name.trim().is_empty() {
                                warnings.push(warn_sentence("skipping issue with no <name>"));
                                continue;
                            }
                            if !issue.host.is_empty() && targets.insert(issue.host.clone()) {
                                target_order.push(issue.host.clone());
                            }
                            findings.push(issue);
                        }
                    }
                }
                _ => {}
            }
            buf.clear();
        }

        if !seen_root {
            return Err(Error::NotABurpExport("no root element found".to_string()));
        }

        Ok(BurpParseResult {
            findings,
            targets: target_order,
            source_path,
            warnings,
        })
    }

    fn decode_request_response(&self, raw: &str, is_base64: bool) -> String {
        let decoded = if is_base64 {
            base64::engine::general_purpose::STANDARD
                .decode(raw.trim())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .unwrap_or_else(|| raw.to_string())
        } else {
            raw.to_string()
        };
        if decoded.len() > self.request_response_truncate {
            let cut = decoded
                .char_indices()
                .map(|(i, c)| i + c.len_utf8())
                .take_while(|&end| end <= self.request_response_truncate)
                .last()
                .unwrap_or(0);
            decoded[..cut].to_string()
        } else {
            decoded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_xml(severities: &[&str]) -> String {
        let mut issues = String::new();
        for (i, sev) in severities.iter().enumerate() {
            issues.push_str(&format!(
                r#"<issue>
                    <type>{i}</type>
                    <name>Issue {i}</name>
                    <host>10.0.0.{i}</host>
                    <path>/a</path>
                    <location>https://10.0.0.{i}/a</location>
                    <severity>{sev}</severity>
                    <confidence>Certain</confidence>
                    <issueBackground>background {i}</issueBackground>
                    <issueDetail>detail {i}</issueDetail>
                </issue>"#
            ));
        }
        format!("<?xml version=\"1.0\"?><issues>{issues}</issues>")
    }

    #[test]
    fn parses_three_severities_in_order() {
        let parser = BurpSuiteParser::default();
        let xml = sample_xml(&["High", "Medium", "Information"]);
        let result = parser.parse_bytes(xml.as_bytes(), PathBuf::from("scan.xml")).unwrap();
        assert_eq!(result.findings.len(), 3);
        assert_eq!(result.findings[0].severity, "High");
        assert_eq!(result.findings[1].severity, "Medium");
        assert_eq!(result.findings[2].severity, "Information");
        assert_eq!(result.targets, vec!["10.0.0.0", "10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn rejects_doctype() {
        let parser = BurpSuiteParser::default();
        let xml = r#"<?xml version="1.0"?><!DOCTYPE issues [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><issues></issues>"#;
        let err = parser.parse_bytes(xml.as_bytes(), PathBuf::from("evil.xml")).unwrap_err();
        assert!(matches!(err, Error::MalformedXml(_)));
    }

    #[test]
    fn rejects_non_issues_root() {
        let parser = BurpSuiteParser::default();
        let xml = r#"<?xml version="1.0"?><report></report>"#;
        let err = parser.parse_bytes(xml.as_bytes(), PathBuf::from("scan.xml")).unwrap_err();
        assert!(matches!(err, Error::NotABurpExport(_)));
    }

    #[test]
    fn rejects_oversized_file() {
        let parser = BurpSuiteParser::new(10, 100);
        let xml = sample_xml(&["High"]);
        let err = parser.parse_bytes(xml.as_bytes(), PathBuf::from("scan.xml")).unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { .. }));
    }

    #[test]
    fn missing_name_is_skipped_with_warning() {
        let parser = BurpSuiteParser::default();
        let xml = r#"<?xml version="1.0"?><issues><issue><host>a</host><severity>High</severity></issue></issues>"#;
        let result = parser.parse_bytes(xml.as_bytes(), PathBuf::from("scan.xml")).unwrap();
        assert!(result.findings.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn decodes_base64_request_response() {
        let parser = BurpSuiteParser::default();
        let encoded = base64::engine::general_purpose::STANDARD.encode("GET / HTTP/1.1");
        let xml = format!(
            r#"<?xml version="1.0"?><issues><issue><name>n</name><host>h</host><severity>High</severity><request base64="true">{encoded}</request></issue></issues>"#
        );
        let result = parser.parse_bytes(xml.as_bytes(), PathBuf::from("scan.xml")).unwrap();
        assert_eq!(result.findings[0].request.as_deref(), Some("GET / HTTP/1.1"));
    }
}
