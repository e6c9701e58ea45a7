use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PageMessage {
    Ping,
    /// Relayed unchanged to the daemon.
    #[serde(rename_all = "camelCase")]
    EnhanceText {
        prompt_id: String,
        selected_text: String,
    },
    ShowResult {
        text: String,
    },
    ShowError {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageReply {
    pub fn ack() -> Self {
        Self {
            success: true,
            enhanced_text: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            enhanced_text: None,
            error: Some(error.into()),
        }
    }
}
