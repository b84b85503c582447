//! `Page`, `Console` and `Inspector` domains.

use serde::{Deserialize, Serialize};

use crate::wip::message::{Empty, WipCommand};

#[derive(Debug, Clone, Default, Serialize)]
pub struct PageEnable {}

impl WipCommand for PageEnable {
    const METHOD: &'static str = "Page.enable";
    type Response = Empty;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_cache: Option<bool>,
}

impl WipCommand for Reload {
    const METHOD: &'static str = "Page.reload";
    type Response = Empty;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameNavigatedEvent {
    pub frame: Frame,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsoleEnable {}

impl WipCommand for ConsoleEnable {
    const METHOD: &'static str = "Console.enable";
    type Response = Empty;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warning,
    Error,
    Debug,
    Info,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsoleMessage {
    pub source: String,
    pub level: ConsoleLevel,
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageAddedEvent {
    pub message: ConsoleMessage,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetachedEvent {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::decode_fields;
    use serde_json::json;

    #[test]
    fn console_message_added() {
        let evt: MessageAddedEvent = decode_fields(
            "MessageAddedEvent",
            &json!({"message": {"source": "console-api", "level": "warning", "text": "careful", "line": 3}}),
        )
        .unwrap();
        assert_eq!(evt.message.level, ConsoleLevel::Warning);
        assert_eq!(evt.message.line, Some(3));
    }

    #[test]
    fn frame_navigated() {
        let evt: FrameNavigatedEvent = decode_fields(
            "FrameNavigatedEvent",
            &json!({"frame": {"id": "F1", "url": "http://localhost/", "loaderId": "L"}}),
        )
        .unwrap();
        assert_eq!(evt.frame.url, "http://localhost/");
        assert!(evt.frame.parent_id.is_none());
    }

    #[test]
    fn reload_params() {
        assert_eq!(
            serde_json::to_value(Reload {
                ignore_cache: Some(true)
            })
            .unwrap(),
            json!({"ignoreCache": true})
        );
    }
}
