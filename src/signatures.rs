// Attack signature catalogs
// Classifies captured strings and bytes against fixed pattern sets

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

/// Suspicious URL path fragments probed by web scanners
const HTTP_PATHS: &[&str] = &["/wp-admin", "/wp-login", "/admin", "/shell", "/cmd"];

/// SQL injection seeds that show up in query strings
const HTTP_QUERY_PATTERNS: &[&str] = &["' or '1'='1", "' or 1=1--", "union select", "select * from"];

/// SQL injection patterns matched against MySQL queries
const MYSQL_INJECTION: &[(&str, &str)] = &[
    (r"'.*or.*'.*='.*", "SQL Injection (OR bypass)"),
    (r"union.*select", "Union-based SQLi"),
    (r"sleep\s*\(\d+\)", "Time-based SQLi"),
    (r"benchmark\s*\(", "Benchmark-based SQLi"),
    (r"load_file\s*\(.*\)", "File read attempt"),
    (r"into\s+outfile", "File write attempt"),
    (r"into\s+dumpfile", "File dump attempt"),
    (r"xp_cmdshell", "Command execution attempt"),
    (r"exec\s*\(", "Code execution attempt"),
    (r"--\s*$", "SQL comment injection"),
    (r"/\*.*\*/", "SQL comment obfuscation"),
];

/// Destructive or privilege-related SQL operations
const MYSQL_SENSITIVE: &[(&str, &str)] = &[
    ("drop table", "Table deletion attempt"),
    ("drop database", "Database deletion attempt"),
    ("delete from", "Data deletion attempt"),
    ("truncate table", "Table truncation attempt"),
    ("grant ", "Privilege grant attempt"),
    ("revoke ", "Privilege revoke attempt"),
    ("create user", "User creation attempt"),
    ("alter user", "User modification attempt"),
];

/// Byte markers of known RDP attack tooling
const RDP_MARKERS: &[&str] = &[
    "BlueKeep",
    "CVE-2019-0708",
    "MS_T120",
    "rdpwrap",
    "shterm",
    "hydra",
    "ncrack",
];

/// The compiled signature catalogs.
///
/// Built once at startup and shared read-only between workers. A pattern
/// that fails to compile aborts construction, so a broken catalog can
/// never reach the first packet.
pub struct Signatures {
    mysql_injection: Vec<(Regex, &'static str)>,
}

impl Signatures {
    pub fn new() -> Result<Self> {
        let mysql_injection = MYSQL_INJECTION
            .iter()
            .map(|(pattern, label)| {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("invalid signature pattern {pattern:?}"))?;
                Ok((regex, *label))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { mysql_injection })
    }

    /// First suspicious path fragment contained in an URL path, if any
    pub fn classify_http_path(&self, path: &str) -> Option<&'static str> {
        let path = path.to_lowercase();
        HTTP_PATHS.iter().find(|p| path.contains(**p)).copied()
    }

    /// First SQL injection seed contained in a query string, if any
    pub fn classify_http_query(&self, query: &str) -> Option<&'static str> {
        let query = query.to_lowercase();
        HTTP_QUERY_PATTERNS
            .iter()
            .find(|p| query.contains(**p))
            .copied()
    }

    /// Labels of all injection patterns matching a SQL query
    pub fn classify_injection(&self, query: &str) -> Vec<&'static str> {
        let query = query.trim();
        self.mysql_injection
            .iter()
            .filter(|(regex, _)| regex.is_match(query))
            .map(|(_, label)| *label)
            .collect()
    }

    /// Labels of all sensitive SQL operations contained in a query
    pub fn classify_sensitive(&self, query: &str) -> Vec<&'static str> {
        let query = query.to_lowercase();
        MYSQL_SENSITIVE
            .iter()
            .filter(|(pattern, _)| query.contains(pattern))
            .map(|(_, label)| *label)
            .collect()
    }

    /// Attack tool markers found in a raw RDP payload
    pub fn classify_rdp(&self, data: &[u8]) -> Vec<&'static str> {
        RDP_MARKERS
            .iter()
            .filter(|marker| {
                let needle = marker.as_bytes();
                data.windows(needle.len()).any(|window| window == needle)
            })
            .copied()
            .collect()
    }
}
