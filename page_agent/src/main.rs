mod overlay;
mod protocol;
mod util;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};
use protocol::{PageMessage, PageReply};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const PAGE_SOCKET_ENV: &str = "THINKSTRAIGHT_PAGE_SOCKET";
const DAEMON_SOCKET_ENV: &str = "THINKSTRAIGHT_DAEMON_SOCKET";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let listen_path = util::env_path(PAGE_SOCKET_ENV, "/tmp/thinkstraight-page.sock");
    let daemon_socket = util::env_path(DAEMON_SOCKET_ENV, "/tmp/thinkstraight.sock");

    if fs::try_exists(&listen_path).await.unwrap_or(false) {
        fs::remove_file(&listen_path)
            .await
            .with_context(|| format!("failed to cleanup stale socket {}", listen_path.display()))?;
    }
    let listener = UnixListener::bind(&listen_path)
        .with_context(|| format!("failed to bind unix socket at {}", listen_path.display()))?;
    info!(
        socket = %listen_path.display(),
        daemon = %daemon_socket.display(),
        "page agent listening"
    );

    let agent = Arc::new(PageAgent::new(daemon_socket, std::io::stdout()));
    loop {
        let (stream, _) = listener.accept().await?;
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            if let Err(error) = handle_client(stream, agent).await {
                warn!("client ended: {error:#}");
            }
        });
    }
}

/// The page-side listener: answers probes, forwards enhancement requests to
/// the daemon and draws whatever it is asked to show.
struct PageAgent<W> {
    daemon_socket: PathBuf,
    display: Mutex<W>,
}

impl<W: Write + Send> PageAgent<W> {
    fn new(daemon_socket: PathBuf, display: W) -> Self {
        Self {
            daemon_socket,
            display: Mutex::new(display),
        }
    }

    async fn handle(&self, message: PageMessage) -> PageReply {
        match message {
            PageMessage::Ping => PageReply::ack(),
            PageMessage::EnhanceText {
                prompt_id,
                selected_text,
            } => {
                debug!(prompt_id = %prompt_id, chars = selected_text.len(), "relaying enhance request");
                let request = PageMessage::EnhanceText {
                    prompt_id,
                    selected_text,
                };
                match relay(&self.daemon_socket, &request).await {
                    Ok(reply) => reply,
                    Err(error) => {
                        error!("error enhancing text: {error:#}");
                        PageReply::failure(format!("{error:#}"))
                    }
                }
            }
            PageMessage::ShowResult { text } => self.show(&overlay::render_result(&text)),
            PageMessage::ShowError { error } => self.show(&overlay::render_error(&error)),
        }
    }

    fn show(&self, rendered: &str) -> PageReply {
        let mut display = self.display.lock().unwrap_or_else(PoisonError::into_inner);
        match display
            .write_all(rendered.as_bytes())
            .and_then(|()| display.flush())
        {
            Ok(()) => PageReply::ack(),
            Err(error) => PageReply::failure(format!("failed to display: {error}")),
        }
    }
}

async fn relay(daemon_socket: &Path, request: &PageMessage) -> Result<PageReply> {
    let stream = UnixStream::connect(daemon_socket)
        .await
        .with_context(|| format!("failed to reach daemon at {}", daemon_socket.display()))?;
    let (reader, mut writer) = stream.into_split();
    let mut payload = serde_json::to_string(request)?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;

    let line = BufReader::new(reader)
        .lines()
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("daemon closed the connection without replying"))?;
    serde_json::from_str(&line).context("invalid daemon reply")
}

async fn handle_client<W: Write + Send>(stream: UnixStream, agent: Arc<PageAgent<W>>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<PageMessage>(&line) {
            Ok(message) => agent.handle(message).await,
            Err(error) => {
                warn!("bad json: {error}");
                PageReply::failure(format!("invalid JSON payload: {error}"))
            }
        };
        let mut payload = serde_json::to_string(&reply)?;
        payload.push('\n');
        writer.write_all(payload.as_bytes()).await?;
    }
    Ok(())
}
