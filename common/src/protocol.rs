use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::{
    courier_err,
    utils::errors::{CourierError, CourierErrorKind},
};

/// Envelope marker stamped by the interceptor on everything it posts.
pub const PAGE_SOURCE: &str = "courier-page";
/// Envelope marker stamped by the extension's own scripts.
pub const EXTENSION_SOURCE: &str = "courier-extension";

/// Payload of a page's notification, already sanitized.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    pub url: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub url: String,
}

/// Tab that posted a message, as reported by the browser transport.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TabOrigin {
    #[serde(default)]
    pub tab_id: Option<i64>,
    #[serde(default)]
    pub window_id: Option<i64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformReply {
    pub seq: u64,
    pub ok: bool,
}

/// What the page world hands to the bridge.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PageEnvelope {
    pub source: String,
    #[serde(default)]
    pub sender: Option<TabOrigin>,
    pub data: PageMessage,
}
impl PageEnvelope {
    pub fn from_page(data: PageMessage) -> Self {
        Self {
            source: PAGE_SOURCE.into(),
            sender: None,
            data,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, AsRefStr)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PageMessage {
    CreateNotification(NotificationRequest),
    NotificationClicked(ClickEvent),
    PlatformReply(PlatformReply),
}

/// What the bridge forwards to the daemon.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, AsRefStr)]
#[serde(tag = "action", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BridgeMessage {
    CreateNotification {
        #[serde(flatten)]
        request: NotificationRequest,
        #[serde(default)]
        origin: Option<TabOrigin>,
    },
    NotificationClicked {
        url: String,
        #[serde(default)]
        origin: Option<TabOrigin>,
    },
    PlatformReply(PlatformReply),
}

/// Tab/window operation the daemon asks the browser to perform.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, AsRefStr)]
#[serde(tag = "command", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PlatformCommand {
    FocusWindow { window_id: i64 },
    ActivateTab { tab_id: i64 },
    OpenTab { url: String },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PlatformRequest {
    pub seq: u64,
    #[serde(flatten)]
    pub command: PlatformCommand,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    Critical,
}
impl Priority {
    /// freedesktop `urgency` hint value.
    pub fn urgency(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::Critical => 2,
        }
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CourierError> {
    serde_json::to_vec(value).map_err(|e| courier_err!(CourierErrorKind::Serialize, e.to_string()))
}

pub fn decode<'a, T: Deserialize<'a>>(buf: &'a [u8]) -> Result<T, CourierError> {
    serde_json::from_slice(buf)
        .map_err(|e| courier_err!(CourierErrorKind::Deserialize, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_message_is_flat_with_action() {
        let msg = BridgeMessage::CreateNotification {
            request: NotificationRequest {
                title: "Alert".into(),
                body: "Hello".into(),
                icon: None,
                tag: Some("chat".into()),
                url: "https://chat.example/".into(),
            },
            origin: Some(TabOrigin {
                tab_id: Some(7),
                window_id: Some(2),
            }),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["action"], "create-notification");
        assert_eq!(value["title"], "Alert");
        assert_eq!(value["tag"], "chat");
        assert_eq!(value["origin"]["tab_id"], 7);
    }

    #[test]
    fn test_create_message_accepts_null_icon_and_missing_origin() {
        let raw = json!({
            "action": "create-notification",
            "title": "t",
            "body": "b",
            "icon": null,
            "tag": null,
            "url": "https://a.example/"
        });
        let msg: BridgeMessage = serde_json::from_value(raw).unwrap();
        match msg {
            BridgeMessage::CreateNotification { request, origin } => {
                assert_eq!(request.icon, None);
                assert_eq!(origin, None);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_page_envelope_parses_browser_frame() {
        let raw = json!({
            "source": PAGE_SOURCE,
            "sender": {"tab_id": 4},
            "data": {"type": "notification-clicked", "url": "https://a.example/"}
        });
        let envelope: PageEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(envelope.sender.and_then(|s| s.tab_id), Some(4));
        assert_eq!(envelope.sender.and_then(|s| s.window_id), None);
        assert_eq!(envelope.data.as_ref(), "notification-clicked");
    }

    #[test]
    fn test_platform_request_wire_shape() {
        let req = PlatformRequest {
            seq: 3,
            command: PlatformCommand::OpenTab {
                url: "https://a.example/".into(),
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"seq": 3, "command": "open-tab", "url": "https://a.example/"}));
    }

    #[test]
    fn test_decode_reports_garbage() {
        let err = decode::<BridgeMessage>(b"{not json").unwrap_err();
        assert_eq!(err.kind, CourierErrorKind::Deserialize);
    }
}
