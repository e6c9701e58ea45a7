//! A page context reached through the page agent's Unix socket.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::bridge::{PageChannel, PendingReply, Presenter};
use crate::config::PageConfig;
use crate::error::EnhanceError;
use crate::protocol::{BridgeResponse, PageRequest};

/// Environment read by the page agent on startup.
pub const PAGE_SOCKET_ENV: &str = "THINKSTRAIGHT_PAGE_SOCKET";
pub const DAEMON_SOCKET_ENV: &str = "THINKSTRAIGHT_DAEMON_SOCKET";

pub struct SocketPage {
    socket_path: PathBuf,
    daemon_socket: PathBuf,
    config: PageConfig,
}

impl SocketPage {
    pub fn new(socket_path: impl Into<PathBuf>, daemon_socket: &Path, config: PageConfig) -> Self {
        Self {
            socket_path: socket_path.into(),
            daemon_socket: daemon_socket.to_path_buf(),
            config,
        }
    }

    async fn send(&self, request: &PageRequest) -> Result<PendingReply, EnhanceError> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|error| {
            EnhanceError::transport(format!(
                "cannot reach page at {}: {error}",
                self.socket_path.display()
            ))
        })?;
        let (reader, mut writer) = stream.into_split();
        let mut payload = serde_json::to_string(request).map_err(EnhanceError::transport)?;
        payload.push('\n');
        writer
            .write_all(payload.as_bytes())
            .await
            .map_err(EnhanceError::transport)?;

        Ok(Box::pin(async move {
            let _writer = writer;
            let mut lines = BufReader::new(reader).lines();
            let line = lines
                .next_line()
                .await
                .map_err(EnhanceError::transport)?
                .ok_or_else(|| EnhanceError::transport("page closed the connection without replying"))?;
            serde_json::from_str::<BridgeResponse>(&line)
                .map_err(|error| EnhanceError::transport(format!("invalid page reply: {error}")))
        }))
    }

    async fn round_trip(&self, request: &PageRequest) -> Result<BridgeResponse, EnhanceError> {
        self.send(request).await?.await
    }

    async fn expect_ack(&self, request: &PageRequest) -> Result<(), EnhanceError> {
        let response = self.round_trip(request).await?;
        if response.success {
            Ok(())
        } else {
            Err(EnhanceError::transport(
                response
                    .error
                    .unwrap_or_else(|| "page refused the message".to_string()),
            ))
        }
    }
}

#[async_trait]
impl PageChannel for SocketPage {
    async fn ping(&self) -> Result<(), EnhanceError> {
        self.expect_ack(&PageRequest::Ping).await
    }

    async fn inject(&self) -> Result<(), EnhanceError> {
        let mut child = Command::new(&self.config.agent_path)
            .env(PAGE_SOCKET_ENV, &self.socket_path)
            .env(DAEMON_SOCKET_ENV, &self.daemon_socket)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|error| {
                EnhanceError::transport(format!(
                    "failed to start page agent {}: {error}",
                    self.config.agent_path
                ))
            })?;
        info!(
            pid = child.id(),
            page = %self.socket_path.display(),
            "started page agent"
        );

        let interval = Duration::from_millis(self.config.ready_interval_ms);
        for _ in 0..self.config.ready_attempts {
            sleep(interval).await;
            if self.ping().await.is_ok() {
                return Ok(());
            }
        }
        if let Err(error) = child.kill().await {
            warn!(pid = child.id(), "failed to stop unresponsive page agent: {error}");
        }
        Err(EnhanceError::transport(format!(
            "page agent did not answer at {}",
            self.socket_path.display()
        )))
    }

    async fn dispatch(&self, request: PageRequest) -> Result<PendingReply, EnhanceError> {
        self.send(&request).await
    }
}

#[async_trait]
impl Presenter for SocketPage {
    async fn show_result(&self, text: &str) -> Result<(), EnhanceError> {
        self.expect_ack(&PageRequest::ShowResult {
            text: text.to_string(),
        })
        .await
    }

    async fn show_error(&self, message: &str) -> Result<(), EnhanceError> {
        self.expect_ack(&PageRequest::ShowError {
            error: message.to_string(),
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::net::UnixListener;

    /// In-process stand-in for the page agent: answers every message and
    /// records what it was sent.
    pub(crate) fn spawn_fake_page(path: &Path, enhanced: &'static str) -> Arc<Mutex<Vec<PageRequest>>> {
        let listener = UnixListener::bind(path).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let record = Arc::clone(&record);
                tokio::spawn(async move {
                    let (reader, mut writer) = stream.into_split();
                    let mut lines = BufReader::new(reader).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let request: PageRequest = serde_json::from_str(&line).unwrap();
                        let response = match &request {
                            PageRequest::EnhanceText { .. } => BridgeResponse::enhanced(enhanced.to_string()),
                            _ => BridgeResponse::ack(),
                        };
                        record.lock().unwrap().push(request);
                        let mut payload = serde_json::to_string(&response).unwrap();
                        payload.push('\n');
                        writer.write_all(payload.as_bytes()).await.unwrap();
                    }
                });
            }
        });
        seen
    }

    fn config(agent_path: &str) -> PageConfig {
        PageConfig {
            agent_path: agent_path.to_string(),
            ready_attempts: 3,
            ready_interval_ms: 10,
        }
    }

    #[tokio::test]
    async fn talks_to_a_listening_page() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("page.sock");
        let seen = spawn_fake_page(&socket, "rewritten");
        let page = SocketPage::new(&socket, &dir.path().join("daemon.sock"), PageConfig::default());

        page.ping().await.unwrap();
        let reply = page
            .dispatch(PageRequest::EnhanceText {
                prompt_id: "debias_text".to_string(),
                selected_text: "x".to_string(),
            })
            .await
            .unwrap()
            .await
            .unwrap();
        assert_eq!(reply.into_enhanced(), Ok("rewritten".to_string()));
        page.show_result("rewritten").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[2],
            PageRequest::ShowResult {
                text: "rewritten".to_string()
            }
        );
    }

    #[tokio::test]
    async fn missing_listener_fails_probe() {
        let dir = tempfile::tempdir().unwrap();
        let page = SocketPage::new(
            dir.path().join("nobody.sock"),
            &dir.path().join("daemon.sock"),
            PageConfig::default(),
        );
        assert!(matches!(page.ping().await, Err(EnhanceError::Transport(_))));
    }

    #[tokio::test]
    async fn injection_fails_when_agent_cannot_start() {
        let dir = tempfile::tempdir().unwrap();
        let page = SocketPage::new(
            dir.path().join("page.sock"),
            &dir.path().join("daemon.sock"),
            config("/nonexistent/thinkstraight-page-agent"),
        );
        let error = page.inject().await.unwrap_err();
        assert!(error.to_string().contains("failed to start page agent"));
    }

    #[tokio::test]
    async fn injection_gives_up_when_agent_never_listens() {
        let dir = tempfile::tempdir().unwrap();
        let page = SocketPage::new(
            dir.path().join("page.sock"),
            &dir.path().join("daemon.sock"),
            config("true"),
        );
        let error = page.inject().await.unwrap_err();
        assert!(error.to_string().contains("did not answer"));
    }

    #[tokio::test]
    async fn unresponsive_agent_is_stopped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("agent.pid");
        let script = dir.path().join("silent-agent.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let page = SocketPage::new(
            dir.path().join("page.sock"),
            &dir.path().join("daemon.sock"),
            PageConfig {
                agent_path: script.display().to_string(),
                ready_attempts: 30,
                ready_interval_ms: 20,
            },
        );
        let error = page.inject().await.unwrap_err();
        assert!(error.to_string().contains("did not answer"));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let proc_entry = PathBuf::from(format!("/proc/{}", pid.trim()));
        assert!(!proc_entry.exists(), "page agent {} still running", pid.trim());
    }
}
