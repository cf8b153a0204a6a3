// SSH Honeypot Implementation
// Rides the russh server transport: accepts every password, rejects every
// key, and drops the client into a line-edited fake shell

use crate::capture::CaptureSink;
use crate::catalog::{
    self, SHELL_LAST_LOGIN, SHELL_PROMPT, SHELL_WELCOME, SSH_HOST_KEY_PATH, SSH_SERVER_ID,
};
use crate::types::{Observation, ServiceType, Severity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use russh::server::{self, Auth, Msg, Server, Session};
use russh::{Channel, ChannelId, CryptoVec, MethodSet, Pty, SshId};
use russh_keys::key::{KeyPair, PublicKey};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Idle limit for a connected shell; the transport cuts the session
/// when nothing arrives for this long
const SHELL_TIMEOUT: Duration = Duration::from_secs(60);

/// Run the SSH honeypot on the given port until shutdown.
pub async fn run(
    port: u16,
    sink: Arc<CaptureSink>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let key = load_or_create_host_key(Path::new(SSH_HOST_KEY_PATH))?;

    let config = Arc::new(server::Config {
        server_id: SshId::Standard(SSH_SERVER_ID.to_string()),
        keys: vec![key],
        // password is the only advertised method; auth_publickey stays
        // implemented for clients that try a key anyway
        methods: MethodSet::PASSWORD,
        inactivity_timeout: Some(SHELL_TIMEOUT),
        auth_rejection_time: Duration::from_secs(3),
        auth_rejection_time_initial: Some(Duration::ZERO),
        ..Default::default()
    });

    let mut server = SshServer { sink };
    log::info!("SSH honeypot listening on 0.0.0.0:{port}");

    tokio::select! {
        result = server.run_on_address(config, ("0.0.0.0", port)) => {
            result.context("SSH honeypot terminated")
        }
        _ = shutdown.recv() => {
            log::info!("SSH honeypot stopped");
            Ok(())
        }
    }
}

/// Load the persisted host key, generating it on first run.
fn load_or_create_host_key(path: &Path) -> Result<KeyPair> {
    if path.exists() {
        return russh_keys::load_secret_key(path, None)
            .with_context(|| format!("failed to load SSH host key from {}", path.display()));
    }

    log::info!("Generated new SSH host key: {}", path.display());
    let key = KeyPair::generate_ed25519()
        .ok_or_else(|| anyhow::anyhow!("ed25519 key generation failed"))?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    russh_keys::encode_pkcs8_pem(&key, file).context("failed to write SSH host key")?;
    Ok(key)
}

struct SshServer {
    sink: Arc<CaptureSink>,
}

impl server::Server for SshServer {
    type Handler = SshSession;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> SshSession {
        let (ip, remote) = match peer_addr {
            Some(addr) => (addr.ip().to_string(), addr.to_string()),
            None => ("unknown".to_string(), "unknown".to_string()),
        };

        self.sink.emit(Observation::new(
            Severity::Info,
            ServiceType::Ssh,
            &remote,
            format!("SSH Connection from {remote}"),
        ));

        SshSession {
            sink: Arc::clone(&self.sink),
            ip,
            remote,
            username: None,
            editor: ShellEditor::new(),
            command_count: 0,
            started: Instant::now(),
            closed: false,
        }
    }
}

/// One SSH connection: credential capture plus the fake shell.
struct SshSession {
    sink: Arc<CaptureSink>,
    ip: String,
    remote: String,
    username: Option<String>,
    editor: ShellEditor,
    command_count: u32,
    started: Instant,
    closed: bool,
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.sink.emit(Observation::new(
            Severity::Info,
            ServiceType::Ssh,
            &self.remote,
            format!(
                "SSH Session ended - IP: {} | Duration: {:.1}s | Commands: {}",
                self.ip,
                self.started.elapsed().as_secs_f64(),
                self.command_count
            ),
        ));
    }
}

#[async_trait]
impl server::Handler for SshSession {
    type Error = anyhow::Error;

    /// Every password is correct here.
    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        self.username = Some(user.to_string());

        self.sink.emit(
            Observation::new(
                Severity::Warning,
                ServiceType::Ssh,
                &self.remote,
                format!(
                    "SSH Password attempt - IP: {}, Username: '{user}', Password: '{password}'",
                    self.ip
                ),
            )
            .with_attr("username", user)
            .with_attr("password", password),
        );

        Ok(Auth::Accept)
    }

    /// Keys never work, which pushes clients onto the password path.
    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let fingerprint = public_key.fingerprint();

        self.sink.emit(
            Observation::new(
                Severity::Info,
                ServiceType::Ssh,
                &self.remote,
                format!(
                    "SSH Public key attempt - IP: {}, Username: '{user}', Key: {fingerprint}",
                    self.ip
                ),
            )
            .with_attr("username", user)
            .with_attr("key_fingerprint", fingerprint),
        );

        Ok(Auth::Reject {
            proceed_with_methods: Some(MethodSet::PASSWORD),
        })
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.data(channel, CryptoVec::from(SHELL_WELCOME.to_string()));
        session.data(channel, CryptoVec::from(SHELL_LAST_LOGIN.to_string()));
        session.data(channel, CryptoVec::from(SHELL_PROMPT.to_string()));
        session.channel_success(channel);
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.closed {
            return Ok(());
        }

        for &byte in data {
            for event in self.editor.feed(byte) {
                match event {
                    ShellEvent::Output(bytes) => {
                        session.data(channel, CryptoVec::from(bytes));
                    }
                    ShellEvent::Command(line) => {
                        self.command_count += 1;
                        self.sink.emit(
                            Observation::new(
                                Severity::Info,
                                ServiceType::Ssh,
                                &self.remote,
                                format!(
                                    "SSH Command received - IP: {}, Command: '{line}'",
                                    self.ip
                                ),
                            )
                            .with_attr("username", self.username.clone().unwrap_or_default())
                            .with_attr("command", line),
                        );
                    }
                    ShellEvent::Close => {
                        self.closed = true;
                        session.close(channel);
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

/// What the line editor wants done after consuming one byte
#[derive(Debug, PartialEq, Eq)]
enum ShellEvent {
    /// Bytes to write back to the terminal
    Output(Vec<u8>),
    /// A completed, trimmed command line
    Command(String),
    /// Close the channel once pending output is flushed
    Close,
}

/// Byte-at-a-time line editor for the fake shell.
///
/// Printable bytes echo and accumulate; CR/LF runs the line against the
/// command catalog; backspace erases on screen, Ctrl-C abandons the line
/// and Ctrl-D on an empty line logs out.
struct ShellEditor {
    buffer: Vec<u8>,
}

impl ShellEditor {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn feed(&mut self, byte: u8) -> Vec<ShellEvent> {
        let mut events = Vec::new();

        match byte {
            b'\r' | b'\n' => {
                events.push(ShellEvent::Output(b"\r\n".to_vec()));

                let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
                self.buffer.clear();

                if !line.is_empty() {
                    events.push(ShellEvent::Command(line.clone()));

                    if matches!(line.to_lowercase().as_str(), "exit" | "logout" | "quit") {
                        events.push(ShellEvent::Output(b"logout\r\n".to_vec()));
                        events.push(ShellEvent::Close);
                        return events;
                    }

                    let response = match catalog::shell_output(&line) {
                        Some(output) => output.to_string(),
                        None => format!("bash: {line}: command not found"),
                    };
                    events.push(ShellEvent::Output(format!("{response}\r\n").into_bytes()));
                }

                events.push(ShellEvent::Output(SHELL_PROMPT.as_bytes().to_vec()));
            }
            0x7f | 0x08 => {
                if !self.buffer.is_empty() {
                    self.buffer.pop();
                    events.push(ShellEvent::Output(b"\x08 \x08".to_vec()));
                }
            }
            0x03 => {
                self.buffer.clear();
                events.push(ShellEvent::Output(b"^C\r\n".to_vec()));
                events.push(ShellEvent::Output(SHELL_PROMPT.as_bytes().to_vec()));
            }
            0x04 => {
                if self.buffer.is_empty() {
                    events.push(ShellEvent::Output(b"logout\r\n".to_vec()));
                    events.push(ShellEvent::Close);
                }
            }
            b'\t' => {
                self.buffer.push(byte);
                events.push(ShellEvent::Output(vec![byte]));
            }
            byte if byte >= 0x20 => {
                self.buffer.push(byte);
                events.push(ShellEvent::Output(vec![byte]));
            }
            _ => {}
        }

        events
    }
}
