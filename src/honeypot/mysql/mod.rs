// MySQL honeypot
// A partial but interoperable MySQL server: handshake, credential capture,
// query dispatch with synthetic result sets, injection analysis

pub mod protocol;
pub mod session;

use crate::capture::CaptureSink;
use crate::catalog::{self, FAKE_DATABASES, MYSQL_SERVER_VERSION};
use crate::listener;
use crate::signatures::Signatures;
use crate::types::{Observation, ServiceType, Severity};
use anyhow::Result;
use protocol::{ColumnDef, CHARSET_BINARY, CHARSET_UTF8, FIELD_TYPE_LONGLONG, FIELD_TYPE_VAR_STRING};
use session::MysqlSession;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::timeout;

const COM_QUIT: u8 = 0x01;
const COM_INIT_DB: u8 = 0x02;
const COM_QUERY: u8 = 0x03;

/// Per-read deadline in the command phase
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest client payload the impersonator will buffer
const MAX_PACKET: usize = 1 << 20;

/// Connection ids handed out in the handshake, monotonic per process
static CONNECTION_COUNTER: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlOptions {
    /// Refuse clients that did not negotiate CLIENT_PROTOCOL_41
    pub strict_protocol_41: bool,
}

/// Run the MySQL honeypot on the given port until shutdown.
pub async fn run(
    port: u16,
    sink: Arc<CaptureSink>,
    signatures: Arc<Signatures>,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    run_with_options(port, sink, signatures, shutdown, MysqlOptions::default()).await
}

pub async fn run_with_options(
    port: u16,
    sink: Arc<CaptureSink>,
    signatures: Arc<Signatures>,
    shutdown: broadcast::Receiver<()>,
    options: MysqlOptions,
) -> Result<()> {
    listener::run_tcp_service(ServiceType::Mysql, port, shutdown, move |stream, peer| {
        let sink = Arc::clone(&sink);
        let signatures = Arc::clone(&signatures);
        async move { handle_connection(stream, peer, sink, signatures, options).await }
    })
    .await
}

/// Outcome of one framed read from the client
enum PacketRead {
    Packet { sequence_id: u8, payload: Vec<u8> },
    Eof,
    TimedOut,
}

async fn read_packet<S>(stream: &mut S, limit: Duration) -> Result<PacketRead>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match timeout(limit, stream.read_exact(&mut header)).await {
        Err(_) => return Ok(PacketRead::TimedOut),
        Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(PacketRead::Eof),
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(_)) => {}
    }

    let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let sequence_id = header[3];
    if length > MAX_PACKET {
        anyhow::bail!("oversized packet ({length} bytes)");
    }

    let mut payload = vec![0u8; length];
    match timeout(limit, stream.read_exact(&mut payload)).await {
        Err(_) => Ok(PacketRead::TimedOut),
        Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => Ok(PacketRead::Eof),
        Ok(Err(e)) => Err(e.into()),
        Ok(Ok(_)) => Ok(PacketRead::Packet {
            sequence_id,
            payload,
        }),
    }
}

fn truncated(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub(crate) async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    sink: Arc<CaptureSink>,
    signatures: Arc<Signatures>,
    options: MysqlOptions,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let connection_id = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    let remote = peer.to_string();
    let mut session = MysqlSession::new(peer, connection_id);

    sink.emit(Observation::new(
        Severity::Info,
        ServiceType::Mysql,
        &remote,
        format!("[MySQL] Connection from {} (ID: {connection_id})", peer.ip()),
    ));

    // the summary record goes out on every exit path, including write errors
    let result = drive_session(&mut stream, &mut session, &sink, &signatures, options).await;
    sink.emit(session_end(&session, &remote));
    result
}

async fn drive_session<S>(
    stream: &mut S,
    session: &mut MysqlSession,
    sink: &CaptureSink,
    signatures: &Signatures,
    options: MysqlOptions,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ip = session.client_addr.ip().to_string();
    let remote = session.client_addr.to_string();
    let connection_id = session.connection_id;

    let scramble = protocol::scramble();
    let handshake = protocol::handshake_payload(connection_id, &scramble);
    stream.write_all(&protocol::packet(0, &handshake)).await?;

    // authentication exchange
    let (auth_seq, auth_payload) = match read_packet(stream, READ_TIMEOUT).await? {
        PacketRead::Packet {
            sequence_id,
            payload,
        } => (sequence_id, payload),
        PacketRead::TimedOut => {
            sink.emit(Observation::new(
                Severity::Info,
                ServiceType::Mysql,
                &remote,
                format!("[MySQL] Session timeout: {ip}"),
            ));
            return Ok(());
        }
        PacketRead::Eof => return Ok(()),
    };

    let credentials = protocol::parse_handshake_response(&auth_payload);
    session.username = Some(credentials.username.clone());
    if !credentials.database.is_empty() {
        session.database = Some(credentials.database.clone());
    }

    let mut message = format!(
        "[MySQL] Login attempt from {ip} | User: {}",
        credentials.username
    );
    if !credentials.auth_hash.is_empty() {
        message.push_str(&format!(" | Hash: {}...", truncated(&credentials.auth_hash, 32)));
    }
    if !credentials.database.is_empty() {
        message.push_str(&format!(" | DB: {}", credentials.database));
    }
    sink.emit(
        Observation::new(Severity::Warning, ServiceType::Mysql, &remote, message)
            .with_attr("username", credentials.username.clone())
            .with_attr("auth_hash", truncated(&credentials.auth_hash, 32))
            .with_attr("database", credentials.database.clone()),
    );

    if options.strict_protocol_41 && credentials.capabilities & protocol::CLIENT_PROTOCOL_41 == 0 {
        stream
            .write_all(&protocol::err_packet(
                auth_seq.wrapping_add(1),
                1043,
                "Bad handshake",
            ))
            .await?;
        return Ok(());
    }

    // every credential succeeds
    stream
        .write_all(&protocol::ok_packet(auth_seq.wrapping_add(1), "", 0))
        .await?;

    // command phase
    loop {
        match read_packet(stream, READ_TIMEOUT).await {
            Ok(PacketRead::Packet {
                sequence_id,
                payload,
            }) => {
                let Some(&command) = payload.first() else {
                    continue;
                };
                let reply_seq = sequence_id.wrapping_add(1);

                match command {
                    COM_QUIT => {
                        sink.emit(Observation::new(
                            Severity::Info,
                            ServiceType::Mysql,
                            &remote,
                            format!("[MySQL] Client quit: {ip}"),
                        ));
                        break;
                    }
                    COM_INIT_DB => {
                        let database = String::from_utf8_lossy(&payload[1..]).into_owned();
                        session.database = Some(database);
                        stream
                            .write_all(&protocol::ok_packet(reply_seq, "Database changed", 0))
                            .await?;
                    }
                    COM_QUERY => {
                        let query = String::from_utf8_lossy(&payload[1..]).trim().to_string();

                        sink.emit(
                            Observation::new(
                                Severity::Info,
                                ServiceType::Mysql,
                                &remote,
                                format!("[MySQL] Query from {ip}: {}", truncated(&query, 100)),
                            )
                            .with_attr("query", query.clone()),
                        );

                        let mut alerts = Vec::new();
                        for label in signatures.classify_injection(&query) {
                            sink.emit(
                                Observation::new(
                                    Severity::Warning,
                                    ServiceType::Mysql,
                                    &remote,
                                    format!(
                                        "[MySQL] SQL Injection from {ip}: {label} - Query: {}",
                                        truncated(&query, 100)
                                    ),
                                )
                                .with_attr("signature", label),
                            );
                            alerts.push(label);
                        }
                        for label in signatures.classify_sensitive(&query) {
                            sink.emit(
                                Observation::new(
                                    Severity::Warning,
                                    ServiceType::Mysql,
                                    &remote,
                                    format!(
                                        "[MySQL] Sensitive operation from {ip}: {label} - Query: {}",
                                        truncated(&query, 100)
                                    ),
                                )
                                .with_attr("signature", label),
                            );
                            alerts.push(label);
                        }

                        session.record_query(&query, alerts);

                        let reply = dispatch_query(&query, reply_seq, session);
                        stream.write_all(&reply).await?;
                    }
                    other => {
                        sink.emit(Observation::new(
                            Severity::Warning,
                            ServiceType::Mysql,
                            &remote,
                            format!("[MySQL] Unknown command {other:#04x} from {ip}"),
                        ));
                        stream
                            .write_all(&protocol::err_packet(reply_seq, 1064, "Unknown command"))
                            .await?;
                    }
                }
            }
            Ok(PacketRead::Eof) => break,
            Ok(PacketRead::TimedOut) => {
                sink.emit(Observation::new(
                    Severity::Info,
                    ServiceType::Mysql,
                    &remote,
                    format!("[MySQL] Session timeout: {ip}"),
                ));
                break;
            }
            Err(e) => {
                log::debug!("[MySQL] packet error from {ip}: {e:#}");
                break;
            }
        }
    }

    Ok(())
}

fn session_end(session: &MysqlSession, remote: &str) -> Observation {
    Observation::new(
        Severity::Info,
        ServiceType::Mysql,
        remote,
        session.summary(),
    )
}

/// Build the full reply byte train for one query, starting at `sequence_id`.
fn dispatch_query(query: &str, sequence_id: u8, session: &mut MysqlSession) -> Vec<u8> {
    let lower = query.to_lowercase();

    if lower.starts_with("show databases") {
        let column = ColumnDef {
            schema: "information_schema",
            table: "SCHEMATA",
            org_table: "SCHEMATA",
            name: "Database",
            org_name: "SCHEMA_NAME",
            charset: CHARSET_UTF8,
            length: 256,
            field_type: FIELD_TYPE_VAR_STRING,
            flags: 0x0001,
            decimals: 0,
        };
        let rows: Vec<Option<&str>> = FAKE_DATABASES.iter().map(|db| Some(*db)).collect();
        protocol::result_set(sequence_id, &column, &rows)
    } else if lower.starts_with("use ") {
        if let Some(name) = query[4..].split_whitespace().next() {
            let name = name.trim_matches(|c| matches!(c, ';' | '`' | '"' | '\''));
            session.database = Some(name.to_string());
        }
        protocol::ok_packet(sequence_id, "Database changed", 0)
    } else if lower.starts_with("show tables") {
        let database = session.database_or_default().to_string();
        let name = format!("Tables_in_{database}");
        let column = ColumnDef {
            schema: "information_schema",
            table: "TABLES",
            org_table: "TABLES",
            name: &name,
            org_name: "TABLE_NAME",
            charset: CHARSET_UTF8,
            length: 256,
            field_type: FIELD_TYPE_VAR_STRING,
            flags: 0x0001,
            decimals: 0,
        };
        let rows: Vec<Option<&str>> = catalog::tables_for(&database)
            .iter()
            .map(|table| Some(*table))
            .collect();
        protocol::result_set(sequence_id, &column, &rows)
    } else if lower.starts_with("select ") {
        if lower.contains("@@version") || lower.contains("version()") {
            let column = ColumnDef {
                schema: "",
                table: "",
                org_table: "",
                name: "@@version",
                org_name: "",
                charset: CHARSET_UTF8,
                length: 60,
                field_type: FIELD_TYPE_VAR_STRING,
                flags: 0x0001,
                decimals: 0x1f,
            };
            protocol::result_set(sequence_id, &column, &[Some(MYSQL_SERVER_VERSION)])
        } else if lower.contains("user()") || lower.contains("current_user") {
            let column = ColumnDef {
                schema: "",
                table: "",
                org_table: "",
                name: "user()",
                org_name: "",
                charset: CHARSET_UTF8,
                length: 77,
                field_type: FIELD_TYPE_VAR_STRING,
                flags: 0x0001,
                decimals: 0x1f,
            };
            protocol::result_set(sequence_id, &column, &[Some("root@localhost")])
        } else if lower.contains("database()") {
            let column = ColumnDef {
                schema: "",
                table: "",
                org_table: "",
                name: "database()",
                org_name: "",
                charset: CHARSET_UTF8,
                length: 256,
                field_type: FIELD_TYPE_VAR_STRING,
                flags: 0x0000,
                decimals: 0x1f,
            };
            protocol::result_set(sequence_id, &column, &[None])
        } else if lower.contains("select 1") || lower.contains("select '1'") {
            let column = ColumnDef {
                schema: "",
                table: "",
                org_table: "",
                name: "1",
                org_name: "",
                charset: CHARSET_BINARY,
                length: 1,
                field_type: FIELD_TYPE_LONGLONG,
                flags: 0x0081,
                decimals: 0,
            };
            protocol::result_set(sequence_id, &column, &[Some("1")])
        } else {
            protocol::ok_packet(sequence_id, "", 0)
        }
    } else {
        protocol::ok_packet(sequence_id, "", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureSink;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::duplex;

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 23)), 40000)
    }

    fn split_packets(mut bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let mut packets = Vec::new();
        while !bytes.is_empty() {
            let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) as usize;
            packets.push((bytes[3], bytes[4..4 + length].to_vec()));
            bytes = &bytes[4 + length..];
        }
        packets
    }

    #[test]
    fn test_dispatch_show_databases() {
        let mut session = MysqlSession::new(test_addr(), 1);
        let packets = split_packets(&dispatch_query("SHOW DATABASES;", 1, &mut session));

        // column count + definition + EOF + 8 rows + EOF
        assert_eq!(packets.len(), 3 + FAKE_DATABASES.len() + 1);
        assert_eq!(packets[0].1, vec![0x01]);
        assert_eq!(packets[3].1, protocol::encode_lenenc_str(Some(b"information_schema")));

        let seqs: Vec<u8> = packets.iter().map(|(s, _)| *s).collect();
        let expected: Vec<u8> = (1..=packets.len() as u8).collect();
        assert_eq!(seqs, expected);
    }

    #[test]
    fn test_dispatch_use_updates_database() {
        let mut session = MysqlSession::new(test_addr(), 1);
        let reply = dispatch_query("USE `wordpress`;", 1, &mut session);

        assert_eq!(session.database.as_deref(), Some("wordpress"));
        let packets = split_packets(&reply);
        assert_eq!(packets[0].1[0], 0x00);
        assert!(reply.ends_with(b"Database changed"));
    }

    #[test]
    fn test_dispatch_show_tables_uses_current_database() {
        let mut session = MysqlSession::new(test_addr(), 1);
        session.database = Some("wordpress".to_string());

        let packets = split_packets(&dispatch_query("show tables", 1, &mut session));
        assert_eq!(packets[3].1, protocol::encode_lenenc_str(Some(b"wp_users")));

        // the column name embeds the database
        let coldef = &packets[1].1;
        assert!(coldef
            .windows(b"Tables_in_wordpress".len())
            .any(|w| w == b"Tables_in_wordpress"));
    }

    #[test]
    fn test_dispatch_select_version_row() {
        let mut session = MysqlSession::new(test_addr(), 1);
        let packets = split_packets(&dispatch_query("SELECT VERSION();", 1, &mut session));

        assert_eq!(packets.len(), 5);
        assert_eq!(packets[3].1, protocol::encode_lenenc_str(Some(b"5.7.29-log")));
    }

    #[test]
    fn test_dispatch_select_database_is_null() {
        let mut session = MysqlSession::new(test_addr(), 1);
        let packets = split_packets(&dispatch_query("select database()", 1, &mut session));
        assert_eq!(packets[3].1, vec![0xfb]);
    }

    #[test]
    fn test_dispatch_unrecognized_select_gets_ok() {
        let mut session = MysqlSession::new(test_addr(), 1);
        let packets = split_packets(&dispatch_query(
            "SELECT * FROM users WHERE id = 1",
            1,
            &mut session,
        ));
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].1[0], 0x00);
    }

    /// Drive a whole session through an in-memory stream: handshake,
    /// login as root, SELECT VERSION(), quit.
    #[tokio::test]
    async fn test_full_session_login_and_select_version() {
        let (client, server) = duplex(64 * 1024);
        let (sink, mut observations) = CaptureSink::in_memory();
        let signatures = Arc::new(Signatures::new().unwrap());

        let worker = tokio::spawn(handle_connection(
            server,
            test_addr(),
            sink,
            signatures,
            MysqlOptions::default(),
        ));

        let (mut read_half, mut write_half) = tokio::io::split(client);

        // server greeting
        let mut header = [0u8; 4];
        read_half.read_exact(&mut header).await.unwrap();
        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        assert_eq!(header[3], 0);
        let mut greeting = vec![0u8; length];
        read_half.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting[0], 10);
        assert_eq!(&greeting[1..11], b"5.7.29-log");

        // handshake response: root, 4-byte auth blob, no database
        let mut response = Vec::new();
        response.extend_from_slice(&protocol::CLIENT_PROTOCOL_41.to_le_bytes());
        response.extend_from_slice(&0x0100_0000u32.to_le_bytes());
        response.push(0x21);
        response.extend_from_slice(&[0u8; 23]);
        response.extend_from_slice(b"root\0");
        response.push(4);
        response.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);
        write_half
            .write_all(&protocol::packet(1, &response))
            .await
            .unwrap();

        // OK for the login
        read_half.read_exact(&mut header).await.unwrap();
        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        assert_eq!(header[3], 2);
        let mut ok = vec![0u8; length];
        read_half.read_exact(&mut ok).await.unwrap();
        assert_eq!(ok[0], 0x00);

        // SELECT VERSION()
        let mut query = vec![COM_QUERY];
        query.extend_from_slice(b"SELECT VERSION();");
        write_half
            .write_all(&protocol::packet(0, &query))
            .await
            .unwrap();

        // result set: count, column, EOF, row, EOF
        let mut row_payload = None;
        for i in 0..5u8 {
            read_half.read_exact(&mut header).await.unwrap();
            let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
            assert_eq!(header[3], i + 1);
            let mut payload = vec![0u8; length];
            read_half.read_exact(&mut payload).await.unwrap();
            if i == 3 {
                row_payload = Some(payload);
            }
        }
        assert_eq!(
            row_payload.unwrap(),
            protocol::encode_lenenc_str(Some(b"5.7.29-log"))
        );

        // quit
        write_half
            .write_all(&protocol::packet(0, &[COM_QUIT]))
            .await
            .unwrap();

        worker.await.unwrap().unwrap();

        let mut messages = Vec::new();
        while let Ok(obs) = observations.try_recv() {
            messages.push((obs.severity, obs.message));
        }

        assert!(messages
            .iter()
            .any(|(s, m)| *s == Severity::Warning && m.contains("Login attempt") && m.contains("User: root")));
        assert!(messages
            .iter()
            .any(|(s, m)| *s == Severity::Info && m.contains("Query from") && m.contains("SELECT VERSION()")));
        assert!(messages
            .iter()
            .any(|(s, m)| *s == Severity::Info && m.contains("Client quit")));
        assert!(messages
            .iter()
            .any(|(s, m)| *s == Severity::Info && m.contains("Session ended")));
    }

    /// An injection query produces both pattern warnings and still gets
    /// a zero-row OK.
    #[tokio::test]
    async fn test_injection_query_is_flagged_and_answered() {
        let (client, server) = duplex(64 * 1024);
        let (sink, mut observations) = CaptureSink::in_memory();
        let signatures = Arc::new(Signatures::new().unwrap());

        let worker = tokio::spawn(handle_connection(
            server,
            test_addr(),
            sink,
            signatures,
            MysqlOptions::default(),
        ));

        let (mut read_half, mut write_half) = tokio::io::split(client);

        let mut header = [0u8; 4];
        read_half.read_exact(&mut header).await.unwrap();
        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let mut greeting = vec![0u8; length];
        read_half.read_exact(&mut greeting).await.unwrap();

        let mut response = Vec::new();
        response.extend_from_slice(&protocol::CLIENT_PROTOCOL_41.to_le_bytes());
        response.extend_from_slice(&0x0100_0000u32.to_le_bytes());
        response.push(0x21);
        response.extend_from_slice(&[0u8; 23]);
        response.extend_from_slice(b"admin\0");
        response.push(0);
        write_half
            .write_all(&protocol::packet(1, &response))
            .await
            .unwrap();

        read_half.read_exact(&mut header).await.unwrap();
        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let mut ok = vec![0u8; length];
        read_half.read_exact(&mut ok).await.unwrap();

        let mut query = vec![COM_QUERY];
        query.extend_from_slice(b"SELECT * FROM users WHERE name='a' OR '1'='1'--");
        write_half
            .write_all(&protocol::packet(0, &query))
            .await
            .unwrap();

        // plain OK, zero rows
        read_half.read_exact(&mut header).await.unwrap();
        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        assert_eq!(header[3], 1);
        let mut reply = vec![0u8; length];
        read_half.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 0x00);

        drop(write_half);
        drop(read_half);
        worker.await.unwrap().unwrap();

        let mut warnings = Vec::new();
        while let Ok(obs) = observations.try_recv() {
            if obs.severity == Severity::Warning {
                warnings.push(obs.message);
            }
        }

        assert!(warnings.iter().any(|m| m.contains("SQL comment injection")));
        assert!(warnings.iter().any(|m| m.contains("SQL Injection (OR bypass)")));
    }

    /// A header-only runt packet must close the session without a panic.
    #[tokio::test]
    async fn test_runt_packet_closes_cleanly() {
        let (client, server) = duplex(4096);
        let (sink, _observations) = CaptureSink::in_memory();
        let signatures = Arc::new(Signatures::new().unwrap());

        let worker = tokio::spawn(handle_connection(
            server,
            test_addr(),
            sink,
            signatures,
            MysqlOptions::default(),
        ));

        let (mut read_half, mut write_half) = tokio::io::split(client);

        let mut header = [0u8; 4];
        read_half.read_exact(&mut header).await.unwrap();
        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let mut greeting = vec![0u8; length];
        read_half.read_exact(&mut greeting).await.unwrap();

        // three header bytes, then hang up
        write_half.write_all(&[0x05, 0x00, 0x00]).await.unwrap();
        drop(write_half);
        drop(read_half);

        let result = tokio::time::timeout(Duration::from_secs(2), worker).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
