use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};

use crate::bridge::{Bridge, EnhanceAction};
use crate::config::{PageConfig, ServerConfig};
use crate::page::SocketPage;
use crate::protocol::{BridgeResponse, DaemonRequest};
use crate::service::EnhancementService;

struct ServerContext {
    service: EnhancementService,
    socket_path: PathBuf,
    page: PageConfig,
}

pub struct EnhancementServer {
    context: Arc<ServerContext>,
}

impl EnhancementServer {
    pub fn new(config: ServerConfig, page: PageConfig, service: EnhancementService) -> Self {
        Self {
            context: Arc::new(ServerContext {
                service,
                socket_path: config.socket_path,
                page,
            }),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let socket_path = &self.context.socket_path;
        prepare_socket_path(socket_path).await?;
        if socket_path.exists() {
            fs::remove_file(socket_path).await.with_context(|| {
                format!("failed to cleanup stale socket {}", socket_path.display())
            })?;
        }

        let listener = UnixListener::bind(socket_path).with_context(|| {
            format!("failed to bind unix socket at {}", socket_path.display())
        })?;
        info!("thinkstraight daemon listening on {}", socket_path.display());

        loop {
            let (stream, _) = listener.accept().await?;
            let context = Arc::clone(&self.context);
            tokio::spawn(async move {
                if let Err(error) = handle_connection(stream, context).await {
                    warn!("connection closed with error: {error:#}");
                }
            });
        }
    }
}

async fn prepare_socket_path(socket_path: &Path) -> Result<()> {
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create socket directory {}", parent.display()))?;
    }
    Ok(())
}

async fn handle_connection(stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = process_line(&line, &context).await;
        let payload = serde_json::to_string(&response)?;
        writer.write_all(payload.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}

async fn process_line(line: &str, context: &ServerContext) -> BridgeResponse {
    match serde_json::from_str::<DaemonRequest>(line) {
        Ok(request) => handle_request(request, context).await,
        Err(error) => {
            error!("invalid request JSON: {error}");
            BridgeResponse::failure(format!("invalid JSON payload: {error}"))
        }
    }
}

async fn handle_request(request: DaemonRequest, context: &ServerContext) -> BridgeResponse {
    match request {
        DaemonRequest::Ping => BridgeResponse::ack(),
        DaemonRequest::EnhanceText {
            prompt_id,
            selected_text,
        } => context.service.enhance(&prompt_id, &selected_text).await.into(),
        DaemonRequest::Menu => match context.service.menu().await {
            Ok(entries) => BridgeResponse::menu(entries),
            Err(error) => {
                error!("failed to build menu: {error}");
                BridgeResponse::failure(error.to_string())
            }
        },
        DaemonRequest::MenuAction {
            target,
            prompt_id,
            selected_text,
        } => {
            match context.service.knows_prompt(&prompt_id).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(prompt_id = %prompt_id, "ignoring menu action for unknown prompt");
                    return BridgeResponse::failure(format!("unknown menu entry: {prompt_id}"));
                }
                Err(error) => {
                    error!("failed to load prompts for menu action: {error}");
                    return BridgeResponse::failure(error.to_string());
                }
            }

            let page = SocketPage::new(target, &context.socket_path, context.page.clone());
            let action = EnhanceAction {
                prompt_id,
                selected_text,
            };
            let run = Bridge::new(&page, &page).run(&action).await;
            info!(trace = ?run.trace, ok = run.outcome.is_ok(), "menu action finished");
            match run.outcome {
                Ok(text) => BridgeResponse::enhanced(text),
                Err(message) => BridgeResponse::failure(message),
            }
        }
    }
}
