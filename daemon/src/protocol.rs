use serde::{Deserialize, Serialize};

use crate::error::EnhanceError;
use crate::prompts::MenuEntry;

/// Messages accepted on the daemon socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum DaemonRequest {
    Ping,
    /// From a page context: run the prompt over the selection.
    #[serde(rename_all = "camelCase")]
    EnhanceText {
        prompt_id: String,
        selected_text: String,
    },
    /// From the host platform: a menu entry was chosen in page context `target`.
    #[serde(rename_all = "camelCase")]
    MenuAction {
        target: String,
        prompt_id: String,
        selected_text: String,
    },
    Menu,
}

/// Messages the daemon sends to a page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PageRequest {
    Ping,
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

/// Reply shape shared by every message on both sockets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu: Option<Vec<MenuEntry>>,
}

impl BridgeResponse {
    pub fn ack() -> Self {
        Self {
            success: true,
            enhanced_text: None,
            error: None,
            menu: None,
        }
    }

    pub fn enhanced(text: String) -> Self {
        Self {
            enhanced_text: Some(text),
            ..Self::ack()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::ack()
        }
    }

    pub fn menu(entries: Vec<MenuEntry>) -> Self {
        Self {
            menu: Some(entries),
            ..Self::ack()
        }
    }

    /// Interprets a reply to `enhanceText`.
    pub fn into_enhanced(self) -> Result<String, String> {
        if self.success {
            Ok(self.enhanced_text.unwrap_or_default())
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "Unknown error occurred".to_string()))
        }
    }
}

impl From<Result<String, EnhanceError>> for BridgeResponse {
    fn from(result: Result<String, EnhanceError>) -> Self {
        match result {
            Ok(text) => Self::enhanced(text),
            Err(error) => Self::failure(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_enhance_request() {
        let raw = r#"{"action":"enhanceText","promptId":"debias_text","selectedText":"Everyone agrees."}"#;
        let request: DaemonRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(
            request,
            DaemonRequest::EnhanceText {
                prompt_id: "debias_text".to_string(),
                selected_text: "Everyone agrees.".to_string(),
            }
        );
    }

    #[test]
    fn parse_menu_action_and_ping() {
        let raw = r#"{"action":"menuAction","target":"/tmp/page-1.sock","promptId":"analyze_bias","selectedText":"x"}"#;
        assert!(matches!(
            serde_json::from_str::<DaemonRequest>(raw).unwrap(),
            DaemonRequest::MenuAction { target, .. } if target == "/tmp/page-1.sock"
        ));
        assert_eq!(
            serde_json::from_str::<DaemonRequest>(r#"{"action":"ping"}"#).unwrap(),
            DaemonRequest::Ping
        );
    }

    #[test]
    fn responses_omit_absent_fields() {
        assert_eq!(
            serde_json::to_string(&BridgeResponse::ack()).unwrap(),
            r#"{"success":true}"#
        );
        assert_eq!(
            serde_json::to_string(&BridgeResponse::enhanced("ok".to_string())).unwrap(),
            r#"{"success":true,"enhancedText":"ok"}"#
        );
        assert_eq!(
            serde_json::to_string(&BridgeResponse::failure("nope")).unwrap(),
            r#"{"success":false,"error":"nope"}"#
        );
    }

    #[test]
    fn page_messages_use_action_tags() {
        let show = PageRequest::ShowError {
            error: "bad".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&show).unwrap(),
            r#"{"action":"showError","error":"bad"}"#
        );
    }
}
