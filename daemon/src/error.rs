use thiserror::Error;

/// Failure of a single enhancement attempt. Every variant is reported back to
/// the page context that asked; none of them is fatal to the daemon.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnhanceError {
    /// Missing provider or credential; fixable from the settings page.
    #[error("{0}")]
    Config(String),

    #[error("Invalid LLM provider selected: {0}")]
    Provider(String),

    #[error("Invalid prompt ID: {0}")]
    PromptNotFound(String),

    #[error("Failed to enhance text: {0}")]
    Remote(String),

    #[error("Page communication failed: {0}")]
    Transport(String),

    /// The queued task ended without producing a result.
    #[error("enhancement task was abandoned before completing")]
    Abandoned,
}

impl EnhanceError {
    pub fn transport(error: impl std::fmt::Display) -> Self {
        Self::Transport(error.to_string())
    }
}
