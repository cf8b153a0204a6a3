// MySQL session state
// Per-connection bookkeeping used for the closing summary record

use std::net::SocketAddr;
use std::time::Instant;

/// One recorded query with the signature labels it triggered
#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub query: String,
    pub alerts: Vec<&'static str>,
}

/// State owned by a single MySQL connection worker.
///
/// Nothing here is shared; only the worker that accepted the connection
/// ever reads or writes it.
pub struct MysqlSession {
    pub client_addr: SocketAddr,
    pub connection_id: u32,
    pub username: Option<String>,
    pub database: Option<String>,
    pub queries: Vec<RecordedQuery>,
    started: Instant,
}

impl MysqlSession {
    pub fn new(client_addr: SocketAddr, connection_id: u32) -> Self {
        Self {
            client_addr,
            connection_id,
            username: None,
            database: None,
            queries: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Database used for SHOW TABLES when the client never picked one
    pub fn database_or_default(&self) -> &str {
        self.database.as_deref().unwrap_or("test")
    }

    pub fn record_query(&mut self, query: &str, alerts: Vec<&'static str>) {
        self.queries.push(RecordedQuery {
            query: query.to_string(),
            alerts,
        });
    }

    /// The closing summary line for this session
    pub fn summary(&self) -> String {
        format!(
            "[MySQL] Session ended: {} | Duration: {:.1}s | Queries: {}",
            self.client_addr.ip(),
            self.started.elapsed().as_secs_f64(),
            self.queries.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn session() -> MysqlSession {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), 50123);
        MysqlSession::new(addr, 3)
    }

    #[test]
    fn test_database_default() {
        let mut session = session();
        assert_eq!(session.database_or_default(), "test");

        session.database = Some("wordpress".to_string());
        assert_eq!(session.database_or_default(), "wordpress");
    }

    #[test]
    fn test_summary_counts_queries() {
        let mut session = session();
        session.record_query("select 1", Vec::new());
        session.record_query("drop table users", vec!["Table deletion attempt"]);

        let summary = session.summary();
        assert!(summary.starts_with("[MySQL] Session ended: 203.0.113.7 | Duration: "));
        assert!(summary.ends_with("| Queries: 2"));
    }
}
