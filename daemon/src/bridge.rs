//! Background half of the messaging bridge.
//!
//! One user action walks `Idle → Probing → [Injecting] → Dispatching →
//! Awaiting → Displaying | ErrorDisplay → Idle`. Injection is attempted at
//! most once per action, and only after a failed probe.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::EnhanceError;
use crate::protocol::{BridgeResponse, PageRequest};

/// Reply to a request that has already been written to the page context.
pub type PendingReply = Pin<Box<dyn Future<Output = Result<BridgeResponse, EnhanceError>> + Send>>;

/// Transport to one page context.
#[async_trait]
pub trait PageChannel: Send + Sync {
    async fn ping(&self) -> Result<(), EnhanceError>;

    /// Loads the page-side listener into the context.
    async fn inject(&self) -> Result<(), EnhanceError>;

    /// Sends `request`; the returned future resolves with the page's reply.
    async fn dispatch(&self, request: PageRequest) -> Result<PendingReply, EnhanceError>;
}

/// Where results end up in front of the user.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn show_result(&self, text: &str) -> Result<(), EnhanceError>;
    async fn show_error(&self, message: &str) -> Result<(), EnhanceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhanceAction {
    pub prompt_id: String,
    pub selected_text: String,
}

pub enum BridgeState {
    Idle,
    Probing,
    Injecting,
    Dispatching,
    Awaiting(PendingReply),
    Displaying(String),
    ErrorDisplay(String),
}

impl BridgeState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Probing => "probing",
            Self::Injecting => "injecting",
            Self::Dispatching => "dispatching",
            Self::Awaiting(_) => "awaiting",
            Self::Displaying(_) => "displaying",
            Self::ErrorDisplay(_) => "error_display",
        }
    }
}

/// Result of one action, with the states it passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRun {
    pub trace: Vec<&'static str>,
    pub outcome: Result<String, String>,
}

pub struct Bridge<'a> {
    channel: &'a dyn PageChannel,
    presenter: &'a dyn Presenter,
}

impl<'a> Bridge<'a> {
    pub fn new(channel: &'a dyn PageChannel, presenter: &'a dyn Presenter) -> Self {
        Self { channel, presenter }
    }

    pub async fn run(&self, action: &EnhanceAction) -> BridgeRun {
        let mut trace = vec![BridgeState::Idle.name()];
        let mut outcome = Err("bridge stopped before completing".to_string());
        let mut state = BridgeState::Probing;

        loop {
            trace.push(state.name());
            state = match state {
                BridgeState::Idle => break,
                BridgeState::Probing => self.probe().await,
                BridgeState::Injecting => self.inject().await,
                BridgeState::Dispatching => self.dispatch(action).await,
                BridgeState::Awaiting(reply) => Self::await_reply(reply).await,
                BridgeState::Displaying(text) => {
                    if let Err(error) = self.presenter.show_result(&text).await {
                        warn!("failed to display result: {error}");
                    }
                    outcome = Ok(text);
                    BridgeState::Idle
                }
                BridgeState::ErrorDisplay(message) => {
                    if let Err(error) = self.presenter.show_error(&message).await {
                        warn!("failed to display error: {error}");
                    }
                    outcome = Err(message);
                    BridgeState::Idle
                }
            };
        }

        BridgeRun { trace, outcome }
    }

    async fn probe(&self) -> BridgeState {
        match self.channel.ping().await {
            Ok(()) => BridgeState::Dispatching,
            Err(error) => {
                debug!("page listener not reachable, injecting: {error}");
                BridgeState::Injecting
            }
        }
    }

    async fn inject(&self) -> BridgeState {
        match self.channel.inject().await {
            Ok(()) => BridgeState::Dispatching,
            Err(error) => {
                error!("failed to inject page listener: {error}");
                BridgeState::ErrorDisplay(error.to_string())
            }
        }
    }

    async fn dispatch(&self, action: &EnhanceAction) -> BridgeState {
        let request = PageRequest::EnhanceText {
            prompt_id: action.prompt_id.clone(),
            selected_text: action.selected_text.clone(),
        };
        match self.channel.dispatch(request).await {
            Ok(reply) => BridgeState::Awaiting(reply),
            Err(error) => {
                error!("failed to send enhance request: {error}");
                BridgeState::ErrorDisplay(error.to_string())
            }
        }
    }

    async fn await_reply(reply: PendingReply) -> BridgeState {
        match reply.await {
            Ok(response) => match response.into_enhanced() {
                Ok(text) => BridgeState::Displaying(text),
                Err(message) => BridgeState::ErrorDisplay(message),
            },
            Err(error) => {
                error!("page reply failed: {error}");
                BridgeState::ErrorDisplay(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Reply {
        Page(BridgeResponse),
        Broken,
        /// The request cannot be written at all.
        Unsendable,
    }

    struct MockPage {
        listening: bool,
        inject_succeeds: bool,
        reply: Mutex<Option<Reply>>,
        pings: AtomicUsize,
        injections: AtomicUsize,
        sent: Mutex<Vec<PageRequest>>,
    }

    impl MockPage {
        fn new(listening: bool, inject_succeeds: bool, reply: Reply) -> Self {
            Self {
                listening,
                inject_succeeds,
                reply: Mutex::new(Some(reply)),
                pings: AtomicUsize::new(0),
                injections: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageChannel for MockPage {
        async fn ping(&self) -> Result<(), EnhanceError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.listening {
                Ok(())
            } else {
                Err(EnhanceError::transport("no listener"))
            }
        }

        async fn inject(&self) -> Result<(), EnhanceError> {
            self.injections.fetch_add(1, Ordering::SeqCst);
            if self.inject_succeeds {
                Ok(())
            } else {
                Err(EnhanceError::transport("cannot inject into this page"))
            }
        }

        async fn dispatch(&self, request: PageRequest) -> Result<PendingReply, EnhanceError> {
            let reply = self.reply.lock().unwrap().take();
            if matches!(reply, Some(Reply::Unsendable)) {
                return Err(EnhanceError::transport("page socket refused the request"));
            }
            self.sent.lock().unwrap().push(request);
            Ok(Box::pin(async move {
                match reply {
                    Some(Reply::Page(response)) => Ok(response),
                    _ => Err(EnhanceError::transport("connection reset")),
                }
            }))
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        shown: Mutex<Vec<Result<String, String>>>,
        broken: bool,
    }

    #[async_trait]
    impl Presenter for RecordingPresenter {
        async fn show_result(&self, text: &str) -> Result<(), EnhanceError> {
            self.shown.lock().unwrap().push(Ok(text.to_string()));
            if self.broken {
                return Err(EnhanceError::transport("overlay gone"));
            }
            Ok(())
        }

        async fn show_error(&self, message: &str) -> Result<(), EnhanceError> {
            self.shown.lock().unwrap().push(Err(message.to_string()));
            Ok(())
        }
    }

    fn action() -> EnhanceAction {
        EnhanceAction {
            prompt_id: "analyze_bias".to_string(),
            selected_text: "They always do this.".to_string(),
        }
    }

    #[tokio::test]
    async fn listening_page_skips_injection() {
        let page = MockPage::new(true, true, Reply::Page(BridgeResponse::enhanced("fine".to_string())));
        let presenter = RecordingPresenter::default();

        let run = Bridge::new(&page, &presenter).run(&action()).await;

        assert_eq!(run.outcome, Ok("fine".to_string()));
        assert_eq!(
            run.trace,
            ["idle", "probing", "dispatching", "awaiting", "displaying", "idle"]
        );
        assert_eq!(page.injections.load(Ordering::SeqCst), 0);
        assert_eq!(
            page.sent.lock().unwrap().as_slice(),
            [PageRequest::EnhanceText {
                prompt_id: "analyze_bias".to_string(),
                selected_text: "They always do this.".to_string(),
            }]
        );
        assert_eq!(*presenter.shown.lock().unwrap(), vec![Ok("fine".to_string())]);
    }

    #[tokio::test]
    async fn failed_probe_injects_once_then_sends() {
        let page = MockPage::new(false, true, Reply::Page(BridgeResponse::enhanced("ok".to_string())));
        let presenter = RecordingPresenter::default();

        let run = Bridge::new(&page, &presenter).run(&action()).await;

        assert_eq!(run.outcome, Ok("ok".to_string()));
        assert_eq!(
            run.trace,
            ["idle", "probing", "injecting", "dispatching", "awaiting", "displaying", "idle"]
        );
        assert_eq!(page.pings.load(Ordering::SeqCst), 1);
        assert_eq!(page.injections.load(Ordering::SeqCst), 1);
        assert_eq!(page.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_injection_shows_error_and_sends_nothing() {
        let page = MockPage::new(false, false, Reply::Page(BridgeResponse::enhanced("unused".to_string())));
        let presenter = RecordingPresenter::default();

        let run = Bridge::new(&page, &presenter).run(&action()).await;

        assert_eq!(
            run.trace,
            ["idle", "probing", "injecting", "error_display", "idle"]
        );
        assert_eq!(page.injections.load(Ordering::SeqCst), 1);
        assert!(page.sent.lock().unwrap().is_empty());
        let shown = presenter.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert!(matches!(&shown[0], Err(message) if message.contains("cannot inject")));
        assert!(run.outcome.is_err());
    }

    #[tokio::test]
    async fn unsuccessful_reply_is_displayed_as_error() {
        let page = MockPage::new(
            true,
            true,
            Reply::Page(BridgeResponse::failure("Invalid prompt ID: gone")),
        );
        let presenter = RecordingPresenter::default();

        let run = Bridge::new(&page, &presenter).run(&action()).await;

        assert_eq!(run.outcome, Err("Invalid prompt ID: gone".to_string()));
        assert_eq!(
            *presenter.shown.lock().unwrap(),
            vec![Err("Invalid prompt ID: gone".to_string())]
        );
    }

    #[tokio::test]
    async fn broken_reply_ends_in_error_display() {
        let page = MockPage::new(true, true, Reply::Broken);
        let presenter = RecordingPresenter::default();

        let run = Bridge::new(&page, &presenter).run(&action()).await;

        assert_eq!(
            run.trace,
            ["idle", "probing", "dispatching", "awaiting", "error_display", "idle"]
        );
        assert!(matches!(run.outcome, Err(message) if message.contains("connection reset")));
    }

    #[tokio::test]
    async fn failed_send_ends_in_error_display() {
        let page = MockPage::new(true, true, Reply::Unsendable);
        let presenter = RecordingPresenter::default();

        let run = Bridge::new(&page, &presenter).run(&action()).await;

        assert_eq!(
            run.trace,
            ["idle", "probing", "dispatching", "error_display", "idle"]
        );
        assert!(page.sent.lock().unwrap().is_empty());
        let shown = presenter.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert!(matches!(&shown[0], Err(message) if message.contains("refused the request")));
        assert!(matches!(run.outcome, Err(message) if message.contains("refused the request")));
    }

    #[tokio::test]
    async fn presenter_failure_keeps_the_outcome() {
        let page = MockPage::new(true, true, Reply::Page(BridgeResponse::enhanced("kept".to_string())));
        let presenter = RecordingPresenter {
            broken: true,
            ..RecordingPresenter::default()
        };

        let run = Bridge::new(&page, &presenter).run(&action()).await;
        assert_eq!(run.outcome, Ok("kept".to_string()));
    }
}
