// Command line surface
// Flag parsing, validation and resolution into the service configuration

use crate::types::ServiceConfig;
use clap::Parser;

/// Multi-service deception honeypot
#[derive(Parser, Debug)]
#[command(
    name = "netsnare",
    version,
    about = "Multi-service deception honeypot",
    after_help = "Examples:\n  netsnare --ssh\n  netsnare --all --ssh-port 2222 --http-port 8080\n  netsnare --mysql --rdp"
)]
pub struct Args {
    /// Start the SSH honeypot
    #[arg(long)]
    pub ssh: bool,

    /// Start the HTTP honeypot (WordPress)
    #[arg(long)]
    pub http: bool,

    /// Start the MySQL database honeypot
    #[arg(long)]
    pub mysql: bool,

    /// Start the RDP honeypot
    #[arg(long)]
    pub rdp: bool,

    /// Start all honeypot services
    #[arg(long)]
    pub all: bool,

    /// Port for the SSH honeypot
    #[arg(long, default_value_t = 2222)]
    pub ssh_port: u32,

    /// Port for the HTTP honeypot
    #[arg(long, default_value_t = 8080)]
    pub http_port: u32,

    /// Port for the MySQL honeypot
    #[arg(long, default_value_t = 3306)]
    pub mysql_port: u32,

    /// Port for the RDP honeypot
    #[arg(long, default_value_t = 3389)]
    pub rdp_port: u32,
}

impl Args {
    /// Check the argument combination; returns one message per problem.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !(self.ssh || self.http || self.mysql || self.rdp || self.all) {
            errors.push(
                "You must specify at least one service: --ssh, --http, --mysql, --rdp, or --all"
                    .to_string(),
            );
        }

        for (name, port) in [
            ("ssh-port", self.ssh_port),
            ("http-port", self.http_port),
            ("mysql-port", self.mysql_port),
            ("rdp-port", self.rdp_port),
        ] {
            if port < 1 || port > 65535 {
                errors.push(format!("Invalid {name}: {port}. Must be between 1-65535"));
            }
        }

        errors
    }

    /// Resolve validated arguments into the service configuration.
    /// `--all` switches every service on.
    pub fn resolve(&self) -> ServiceConfig {
        ServiceConfig {
            ssh_port: (self.ssh || self.all).then_some(self.ssh_port as u16),
            http_port: (self.http || self.all).then_some(self.http_port as u16),
            mysql_port: (self.mysql || self.all).then_some(self.mysql_port as u16),
            rdp_port: (self.rdp || self.all).then_some(self.rdp_port as u16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_at_least_one_service() {
        let args = Args::parse_from(["netsnare"]);
        let errors = args.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("at least one service"));
    }

    #[test]
    fn test_rejects_out_of_range_ports() {
        let args = Args::parse_from(["netsnare", "--ssh", "--ssh-port", "0"]);
        assert!(args.validate()[0].contains("Invalid ssh-port: 0"));

        let args = Args::parse_from(["netsnare", "--mysql", "--mysql-port", "65536"]);
        assert!(args.validate()[0].contains("Invalid mysql-port: 65536"));
    }

    #[test]
    fn test_valid_single_service() {
        let args = Args::parse_from(["netsnare", "--mysql", "--mysql-port", "3307"]);
        assert!(args.validate().is_empty());

        let config = args.resolve();
        assert_eq!(config.mysql_port, Some(3307));
        assert_eq!(config.ssh_port, None);
    }

    #[test]
    fn test_all_enables_every_service_with_defaults() {
        let args = Args::parse_from(["netsnare", "--all"]);
        assert!(args.validate().is_empty());

        let config = args.resolve();
        assert_eq!(config.ssh_port, Some(2222));
        assert_eq!(config.http_port, Some(8080));
        assert_eq!(config.mysql_port, Some(3306));
        assert_eq!(config.rdp_port, Some(3389));
    }
}
