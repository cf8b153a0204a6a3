// Fake content catalog
// The static data served to clients to keep the deception coherent

/// Version string advertised by the MySQL impersonator
pub const MYSQL_SERVER_VERSION: &str = "5.7.29-log";

/// Databases reported by SHOW DATABASES
pub const FAKE_DATABASES: &[&str] = &[
    "information_schema",
    "mysql",
    "performance_schema",
    "sys",
    "test",
    "wordpress",
    "production",
    "users_db",
];

/// Tables reported by SHOW TABLES for a given database.
///
/// Unknown databases fall back to the `test` catalog so the reply never
/// looks empty.
pub fn tables_for(database: &str) -> &'static [&'static str] {
    match database {
        "mysql" => &["user", "db", "tables_priv", "columns_priv", "proc_priv"],
        "wordpress" => &["wp_users", "wp_posts", "wp_options", "wp_comments", "wp_postmeta"],
        "production" => &["accounts", "transactions", "payments", "sessions"],
        "users_db" => &["user_credentials", "user_profiles", "user_sessions"],
        _ => &["users", "products", "orders", "customers", "invoices"],
    }
}

/// Identification string sent by the SSH transport
pub const SSH_SERVER_ID: &str = "SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6";

/// Path of the persisted SSH host key
pub const SSH_HOST_KEY_PATH: &str = "ssh_host_key";

pub const SHELL_WELCOME: &str =
    "Welcome to Ubuntu 22.04.3 LTS (GNU/Linux 5.15.0-91-generic x86_64)\r\n\r\n";
pub const SHELL_LAST_LOGIN: &str = "Last login: Mon Jan  6 14:32:18 2025 from 192.168.1.100\r\n";
pub const SHELL_PROMPT: &str = "honeypot@ubuntu:~$ ";

/// Canned output for a shell command line.
///
/// Lookup is by the first whitespace token, lowercased; `uname -a` is the
/// one entry keyed on two tokens. Returns `None` for anything outside the
/// catalog.
pub fn shell_output(command: &str) -> Option<&'static str> {
    let mut tokens = command.split_whitespace();
    let first = tokens.next()?.to_lowercase();
    let second = tokens.next().map(|token| token.to_lowercase());

    match first.as_str() {
        "ls" => Some("Desktop  Documents  Downloads  Music  Pictures  Public  Templates  Videos"),
        "whoami" => Some("honeypot"),
        "pwd" => Some("/home/honeypot"),
        "id" => Some(
            "uid=1000(honeypot) gid=1000(honeypot) groups=1000(honeypot),4(adm),24(cdrom),27(sudo),30(dip),46(plugdev),120(lpadmin),132(lxd),133(sambashare)",
        ),
        "uname" if second.as_deref() == Some("-a") => Some(
            "Linux ubuntu 5.15.0-91-generic #101-Ubuntu SMP Tue Nov 14 13:30:08 UTC 2023 x86_64 x86_64 x86_64 GNU/Linux",
        ),
        _ => None,
    }
}

/// Server name embedded in the fake RDP connect response
pub const RDP_SERVER_NAME: &[u8] = b"WIN-COMPUTER";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_catalog_first_token_lookup() {
        assert_eq!(shell_output("whoami"), Some("honeypot"));
        assert_eq!(shell_output("ls -la /etc"), shell_output("ls"));
        assert_eq!(shell_output("PWD"), Some("/home/honeypot"));
        assert_eq!(shell_output("rm -rf /"), None);
        assert_eq!(shell_output(""), None);
    }

    #[test]
    fn test_uname_requires_dash_a() {
        assert!(shell_output("uname -a").is_some());
        assert!(shell_output("UNAME -A").is_some());
        assert_eq!(shell_output("uname"), None);
        assert_eq!(shell_output("uname -r"), None);
    }

    #[test]
    fn test_unknown_database_falls_back_to_test_tables() {
        assert_eq!(tables_for("wordpress")[0], "wp_users");
        assert_eq!(tables_for("nonexistent"), tables_for("test"));
    }
}
