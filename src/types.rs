// Shared type vocabulary
// Service tags, observation records and the resolved startup configuration

use chrono::{DateTime, Local};
use std::fmt;

/// Services this honeypot can impersonate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Ssh,
    Http,
    Mysql,
    Rdp,
}

impl ServiceType {
    /// Get service name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Ssh => "SSH",
            ServiceType::Http => "HTTP",
            ServiceType::Mysql => "MySQL",
            ServiceType::Rdp => "RDP",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a capture observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single capture record emitted by a session worker
///
/// Observations are immutable once emitted. The message carries the
/// human-readable line that ends up in the log stream; `attrs` holds the
/// structured fields extracted from the session (credentials, paths,
/// queries) for programmatic consumers.
#[derive(Debug, Clone)]
pub struct Observation {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub service: ServiceType,
    pub remote: String,
    pub message: String,
    pub attrs: Vec<(&'static str, String)>,
}

impl Observation {
    pub fn new(
        severity: Severity,
        service: ServiceType,
        remote: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            severity,
            service,
            remote: remote.into(),
            message: message.into(),
            attrs: Vec::new(),
        }
    }

    /// Attach a structured attribute
    pub fn with_attr(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((key, value.into()));
        self
    }

    /// Look up a structured attribute by key
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Which services to run and on which ports, resolved from the CLI
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub ssh_port: Option<u16>,
    pub http_port: Option<u16>,
    pub mysql_port: Option<u16>,
    pub rdp_port: Option<u16>,
}

impl ServiceConfig {
    /// The enabled services with their ports, in startup order
    pub fn enabled(&self) -> Vec<(ServiceType, u16)> {
        let mut services = Vec::new();
        if let Some(port) = self.ssh_port {
            services.push((ServiceType::Ssh, port));
        }
        if let Some(port) = self.http_port {
            services.push((ServiceType::Http, port));
        }
        if let Some(port) = self.mysql_port {
            services.push((ServiceType::Mysql, port));
        }
        if let Some(port) = self.rdp_port {
            services.push((ServiceType::Rdp, port));
        }
        services
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_attrs() {
        let obs = Observation::new(Severity::Warning, ServiceType::Http, "1.2.3.4:9999", "login")
            .with_attr("username", "admin")
            .with_attr("password", "admin123");

        assert_eq!(obs.attr("username"), Some("admin"));
        assert_eq!(obs.attr("password"), Some("admin123"));
        assert_eq!(obs.attr("missing"), None);
    }

    #[test]
    fn test_service_names() {
        assert_eq!(ServiceType::Mysql.as_str(), "MySQL");
        assert_eq!(ServiceType::Ssh.to_string(), "SSH");
    }

    #[test]
    fn test_enabled_services() {
        let config = ServiceConfig {
            ssh_port: Some(2222),
            mysql_port: Some(3306),
            ..Default::default()
        };

        let enabled = config.enabled();
        assert_eq!(enabled.len(), 2);
        assert_eq!(enabled[0], (ServiceType::Ssh, 2222));
        assert_eq!(enabled[1], (ServiceType::Mysql, 3306));
    }
}
