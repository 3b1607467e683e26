/// Maps a `location` string to the service/protocol bucket it belongs to
/// (`spec.md` §4.4's `service_of`).
///
/// The port table is deliberately a plain constant rather than config
/// plumbed through `Config` — the spec calls it "configuration" in the
/// sense that it's data, not behavior, which is exactly how this module
/// treats it: a table a deployer could swap without touching the tree's
/// logic, kept local because nothing else in the workspace needs it.
const PORT_SERVICES: &[(u16, &str)] = &[
    (20, "FTP"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "TELNET"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (139, "SMB"),
    (143, "IMAP"),
    (389, "LDAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (1433, "MSSQL"),
    (1521, "ORACLE"),
    (3306, "MYSQL"),
    (3389, "RDP"),
    (5432, "POSTGRES"),
    (5900, "VNC"),
    (6379, "REDIS"),
    (8080, "HTTP"),
    (8443, "HTTPS"),
    (9200, "ELASTICSEARCH"),
    (27017, "MONGODB"),
];

pub const UNKNOWN_SERVICE: &str = "_unknown_";

/// Resolves the service bucket for a leaf location.
///
/// - A URL-shaped location (`scheme://...`) yields its scheme, uppercased.
/// - A `host:port[/...]` location maps the port through [`PORT_SERVICES`].
/// - Anything else falls back to [`UNKNOWN_SERVICE`].
pub fn service_of(location: Option<&str>) -> String {
    let Some(location) = location else {
        return UNKNOWN_SERVICE.to_string();
    };
    let location = location.trim();
    if location.is_empty() {
        return UNKNOWN_SERVICE.to_string();
    }

    if let Some((scheme, _rest)) = location.split_once("://") {
        if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
            return scheme.to_ascii_uppercase();
        }
    }

    if let Some(port) = extract_port(location) {
        if let Some((_, service)) = PORT_SERVICES.iter().find(|(p, _)| *p == port) {
            return service.to_string();
        }
    }

    UNKNOWN_SERVICE.to_string()
}

fn extract_port(location: &str) -> Option<u16> {
    let after_host = location.split('/').next().unwrap_or(location);
    let (_, port_str) = after_host.rsplit_once(':')?;
    port_str.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://example.com/app", "HTTPS")]
    #[case("http://example.com", "HTTP")]
    #[case("10.0.0.1:22", "SSH")]
    #[case("10.0.0.1:22/whatever", "SSH")]
    #[case("10.0.0.1:9999", UNKNOWN_SERVICE)]
    #[case("no-port-no-scheme", UNKNOWN_SERVICE)]
    fn mapping(#[case] location: &str, #[case] expected: &str) {
        assert_eq!(service_of(Some(location)), expected);
    }

    #[test]
    fn none_location_is_unknown() {
        assert_eq!(service_of(None), UNKNOWN_SERVICE);
    }
}
