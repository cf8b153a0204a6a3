// RDP Honeypot Implementation
// Answers connection requests with hand-crafted TPKT/X.224 frames and
// scans the initial bytes for known attack tooling

use crate::capture::CaptureSink;
use crate::catalog::RDP_SERVER_NAME;
use crate::listener;
use crate::signatures::Signatures;
use crate::types::{Observation, ServiceType, Severity};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

/// Deadline for each client read
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// RDP negotiation response: standard RDP security, TLS not offered
const NEGOTIATION_PROTOCOL: u32 = 0x0008_0001;

/// Run the RDP honeypot on the given port until shutdown.
pub async fn run(
    port: u16,
    sink: Arc<CaptureSink>,
    signatures: Arc<Signatures>,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    listener::run_tcp_service(ServiceType::Rdp, port, shutdown, move |stream, peer| {
        let sink = Arc::clone(&sink);
        let signatures = Arc::clone(&signatures);
        async move { handle_connection(stream, peer, sink, signatures).await }
    })
    .await
}

/// TPKT + X.224 connection confirm carrying the RDP negotiation response.
/// Real clients validate the TPKT length field, so it is rewritten to the
/// final frame size after assembly.
fn connection_confirm_frame() -> Vec<u8> {
    let mut frame = Vec::with_capacity(25);

    // TPKT header, length patched below
    frame.push(0x03);
    frame.push(0x00);
    frame.extend_from_slice(&[0x00, 0x00]);

    // X.224 connection confirm
    frame.push(0x02);
    frame.push(0xf0);
    frame.push(0x80);

    frame.extend_from_slice(&[0x03, 0x00, 0x00, 0x13]);
    frame.extend_from_slice(&[0x0e, 0xd0, 0x00, 0x00]);
    frame.extend_from_slice(&[0x00, 0x00, 0x00]);
    frame.push(0x02);
    frame.extend_from_slice(&[0x00, 0x08]);
    frame.extend_from_slice(&NEGOTIATION_PROTOCOL.to_le_bytes());

    let length = frame.len() as u16;
    frame[2] = (length >> 8) as u8;
    frame[3] = (length & 0xff) as u8;

    frame
}

/// MCS connect-response-shaped frame carrying the fake server name.
fn security_response_frame() -> Vec<u8> {
    let mut frame = Vec::with_capacity(48);

    frame.extend_from_slice(&[0x03, 0x00, 0x00, 0x27]);
    frame.extend_from_slice(&[0x02, 0xf0, 0x80]);
    frame.extend_from_slice(&[0x64, 0x00, 0x05, 0x03, 0x00, 0x47, 0x00]);

    frame.extend_from_slice(&(RDP_SERVER_NAME.len() as u16).to_le_bytes());
    frame.extend_from_slice(RDP_SERVER_NAME);
    frame.extend_from_slice(&[0u8; 20]);

    frame
}

/// Evidence pulled out of the first client frame
#[derive(Debug, Default, PartialEq, Eq)]
struct ClientEvidence {
    computer: Option<String>,
    username_hint: Option<&'static str>,
}

fn find_subsequence(data: &[u8], needle: &[u8]) -> Option<usize> {
    data.windows(needle.len()).position(|window| window == needle)
}

/// Extract the mstshash computer name, or failing that a well-known
/// username token, from the connection request bytes.
fn parse_connection_request(data: &[u8]) -> ClientEvidence {
    if let Some(start) = find_subsequence(data, b"mstshash") {
        let value_start = start + "mstshash=".len();
        if value_start <= data.len() {
            if let Some(end) = data[value_start..].iter().position(|&b| b == 0) {
                return ClientEvidence {
                    computer: Some(
                        String::from_utf8_lossy(&data[value_start..value_start + end]).into_owned(),
                    ),
                    username_hint: None,
                };
            }
        }
    }

    for marker in ["Administrator", "admin", "user"] {
        if find_subsequence(data, marker.as_bytes()).is_some() {
            return ClientEvidence {
                computer: None,
                username_hint: Some(marker),
            };
        }
    }

    ClientEvidence::default()
}

pub(crate) async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    sink: Arc<CaptureSink>,
    signatures: Arc<Signatures>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ip = peer.ip().to_string();
    let remote = peer.to_string();

    sink.emit(Observation::new(
        Severity::Info,
        ServiceType::Rdp,
        &remote,
        format!("RDP connection from {ip}"),
    ));

    // the closing record goes out on every exit path
    let result = converse(&mut stream, &ip, &remote, &sink, &signatures).await;
    sink.emit(closed(&remote, &ip));
    result
}

async fn converse<S>(
    stream: &mut S,
    ip: &str,
    remote: &str,
    sink: &CaptureSink,
    signatures: &Signatures,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; 4096];
    let request = match timeout(READ_TIMEOUT, stream.read(&mut buffer)).await {
        Ok(Ok(n)) => &buffer[..n],
        _ => return Ok(()),
    };

    let evidence = parse_connection_request(request);
    let mut message = format!("RDP connection attempt - IP: {ip}");
    let mut observation = Observation::new(Severity::Info, ServiceType::Rdp, remote, "");
    if let Some(computer) = &evidence.computer {
        message.push_str(&format!(", Computer: {computer}"));
        observation = observation.with_attr("computer", computer.clone());
    }
    if let Some(hint) = evidence.username_hint {
        message.push_str(&format!(", Username hint: {hint}"));
        observation = observation.with_attr("username_hint", hint);
    }
    observation.message = message;
    sink.emit(observation);

    for pattern in signatures.classify_rdp(request) {
        sink.emit(
            Observation::new(
                Severity::Warning,
                ServiceType::Rdp,
                remote,
                format!("RDP attack pattern detected - IP: {ip}, Pattern: {pattern}"),
            )
            .with_attr("signature", pattern),
        );
    }

    stream.write_all(&connection_confirm_frame()).await?;

    sleep(Duration::from_millis(500)).await;

    if let Ok(Ok(n)) = timeout(READ_TIMEOUT, stream.read(&mut buffer)).await {
        if n > 0 {
            let follow_up = &buffer[..n];
            stream.write_all(&security_response_frame()).await?;

            sink.emit(Observation::new(
                Severity::Info,
                ServiceType::Rdp,
                remote,
                format!("RDP additional data from {ip}, length: {n}"),
            ));

            if find_subsequence(follow_up, b"NTLMSSP").is_some() {
                sink.emit(Observation::new(
                    Severity::Warning,
                    ServiceType::Rdp,
                    remote,
                    format!("RDP NTLM authentication attempt from {ip}"),
                ));
            }
        }
    }

    sleep(Duration::from_secs(2)).await;

    Ok(())
}

fn closed(remote: &str, ip: &str) -> Observation {
    Observation::new(
        Severity::Info,
        ServiceType::Rdp,
        remote,
        format!("RDP connection closed with {ip}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::duplex;

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 99)), 33890)
    }

    #[test]
    fn test_connection_confirm_length_field_matches_frame() {
        let frame = connection_confirm_frame();
        let declared = ((frame[2] as usize) << 8) | frame[3] as usize;
        assert_eq!(declared, frame.len());
        assert_eq!(frame.len(), 25);
        assert_eq!(frame[0], 0x03);
        assert_eq!(frame[4], 0x02);
        assert_eq!(&frame[21..25], &NEGOTIATION_PROTOCOL.to_le_bytes());
    }

    #[test]
    fn test_security_response_carries_server_name() {
        let frame = security_response_frame();
        assert_eq!(&frame[..4], &[0x03, 0x00, 0x00, 0x27]);
        assert!(find_subsequence(&frame, b"WIN-COMPUTER").is_some());
        assert_eq!(frame.len(), 48);
    }

    #[test]
    fn test_parse_mstshash_computer_name() {
        let mut data = b"Cookie: mstshash=DESKTOP-EVIL".to_vec();
        data.push(0);
        data.extend_from_slice(b"tail");

        let evidence = parse_connection_request(&data);
        assert_eq!(evidence.computer.as_deref(), Some("DESKTOP-EVIL"));
        assert_eq!(evidence.username_hint, None);
    }

    #[test]
    fn test_parse_username_hint_precedence() {
        let evidence = parse_connection_request(b"login as Administrator please");
        assert_eq!(evidence.username_hint, Some("Administrator"));

        let evidence = parse_connection_request(b"plain admin probe");
        assert_eq!(evidence.username_hint, Some("admin"));

        let evidence = parse_connection_request(b"nothing interesting");
        assert_eq!(evidence, ClientEvidence::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_flow_with_attack_marker_and_ntlm() {
        let (client, server) = duplex(16 * 1024);
        let (sink, mut observations) = CaptureSink::in_memory();
        let signatures = Arc::new(Signatures::new().unwrap());

        let worker = tokio::spawn(handle_connection(server, test_addr(), sink, signatures));

        let (mut read_half, mut write_half) = tokio::io::split(client);

        let mut request = b"x".repeat(16);
        request.extend_from_slice(b"BlueKeep");
        request.extend_from_slice(b"mstshash=probe");
        request.push(0);
        write_half.write_all(&request).await.unwrap();

        // connection confirm arrives despite the attack marker
        let mut confirm = vec![0u8; 25];
        read_half.read_exact(&mut confirm).await.unwrap();
        assert_eq!(confirm, connection_confirm_frame());

        write_half.write_all(b"...NTLMSSP...").await.unwrap();

        let mut security = vec![0u8; 48];
        read_half.read_exact(&mut security).await.unwrap();
        assert_eq!(security, security_response_frame());

        worker.await.unwrap().unwrap();

        let mut messages = Vec::new();
        while let Ok(obs) = observations.try_recv() {
            messages.push((obs.severity, obs.message));
        }

        assert!(messages
            .iter()
            .any(|(s, m)| *s == Severity::Warning && m.contains("Pattern: BlueKeep")));
        assert!(messages
            .iter()
            .any(|(s, m)| *s == Severity::Warning && m.contains("NTLM authentication attempt")));
        assert!(messages
            .iter()
            .any(|(s, m)| *s == Severity::Info && m.contains("Computer: probe")));
        assert_eq!(
            messages
                .iter()
                .filter(|(_, m)| m.contains("connection closed"))
                .count(),
            1
        );
    }
}
