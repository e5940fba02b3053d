use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use common::{
    config::Config,
    courier_err,
    icon::{ResolvedIcon, decode_data_url},
    utils::{
        errors::{CourierError, CourierErrorKind},
        paths::get_cache_dir,
    },
};
use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use zbus::{Connection, MatchRule, Message, MessageStream, Proxy, message, zvariant::Value};

use crate::platform::{NativeNotification, NativeSignal, Notifier};

const NOTIFICATIONS_NAME: &str = "org.freedesktop.Notifications";
const NOTIFICATIONS_PATH: &str = "/org/freedesktop/Notifications";

/// Action key the server reports when the notification body is clicked.
const DEFAULT_ACTION: &str = "default";

/// `NotificationClosed` reason for a user dismissal.
const CLOSED_BY_USER: u32 = 2;

/// Talks to the desktop notification server over the session bus.
pub struct DbusNotifier {
    conn: Connection,
    app_name: String,
    default_icon: String,
    markup: bool,
    icon_dir: Option<PathBuf>,
    ids: IdMap,
}

impl DbusNotifier {
    pub async fn new(conn: Connection, config: &Config) -> Result<Self, CourierError> {
        let mut notifier = Self {
            conn,
            app_name: config.app_name.clone(),
            default_icon: config.default_icon.clone(),
            markup: false,
            icon_dir: None,
            ids: IdMap::default(),
        };

        let capabilities: Vec<String> = notifier
            .proxy()
            .await?
            .call("GetCapabilities", &())
            .await
            .map_err(|e| courier_err!(CourierErrorKind::DBusProxyCall, e.to_string()))?;
        notifier.markup = capabilities.iter().any(|c| c == "body-markup");

        notifier.icon_dir = match get_cache_dir().map(|d| d.join("icons")) {
            Ok(dir) => match std::fs::create_dir_all(&dir) {
                Ok(()) => Some(dir),
                Err(e) => {
                    tracing::warn!("Icon cache unavailable: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Icon cache unavailable: {}", e);
                None
            }
        };

        tracing::info!(
            "Notification server capabilities: {}",
            capabilities.join(", ")
        );
        Ok(notifier)
    }

    async fn proxy(&self) -> Result<Proxy<'static>, CourierError> {
        Proxy::new(
            &self.conn,
            NOTIFICATIONS_NAME,
            NOTIFICATIONS_PATH,
            NOTIFICATIONS_NAME,
        )
        .await
        .map_err(|e| courier_err!(CourierErrorKind::DBusConnect, e.to_string()))
    }

    /// Writes an inline icon into the cache directory and returns its
    /// `file://` URI. Files are named by content; rewriting an existing one
    /// refreshes its age for [`prune_icons`](Self::prune_icons).
    fn materialize_icon(&self, data_url: &str) -> Result<String, CourierError> {
        let dir = self
            .icon_dir
            .as_ref()
            .ok_or_else(|| courier_err!(CourierErrorKind::DirRead, "no icon cache directory"))?;
        let (mime, bytes) = decode_data_url(data_url)?;

        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        let path = dir.join(format!("{:016x}.{}", hasher.finish(), extension_for(&mime)));

        std::fs::write(&path, &bytes)
            .map_err(|e| courier_err!(CourierErrorKind::FileWrite, e.to_string()))?;
        Ok(format!("file://{}", path.display()))
    }

    /// Deletes cached icons not written for `max_age`.
    pub fn prune_icons(&self, max_age: Duration) -> usize {
        let Some(dir) = self.icon_dir.as_deref() else {
            return 0;
        };
        match prune_dir(dir, max_age, SystemTime::now()) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Icon cache not pruned: {}", e);
                0
            }
        }
    }

    fn app_icon(&self, icon: &ResolvedIcon) -> String {
        match icon {
            ResolvedIcon::Inline(data) => match self.materialize_icon(data) {
                Ok(uri) => uri,
                Err(e) => {
                    tracing::warn!("Inline icon not usable, using default: {}", e);
                    self.default_icon.clone()
                }
            },
            ResolvedIcon::Default => self.default_icon.clone(),
        }
    }

    /// Forwards clicks and closes of our notifications until the bus goes away.
    ///
    /// Both signals come through one stream so a click is always seen before
    /// the close the server sends right after it.
    pub async fn listen(&self, tx: mpsc::Sender<NativeSignal>) -> Result<(), CourierError> {
        let rule = MatchRule::builder()
            .msg_type(message::Type::Signal)
            .interface(NOTIFICATIONS_NAME)
            .and_then(|b| b.path(NOTIFICATIONS_PATH))
            .map_err(|e| courier_err!(CourierErrorKind::DBusSignal, e.to_string()))?
            .build();
        let stream = MessageStream::for_match_rule(rule, &self.conn, None)
            .await
            .map_err(|e| courier_err!(CourierErrorKind::DBusSignal, e.to_string()))?;

        let signals = stream.filter_map(|msg| async move {
            match msg {
                Ok(msg) => ServerSignal::from_message(&msg),
                Err(e) => {
                    tracing::debug!("Notification signal stream error: {}", e);
                    None
                }
            }
        });
        forward_signals(std::pin::pin!(signals), &self.ids, &tx).await;

        Err(courier_err!(
            CourierErrorKind::DBusSignal,
            "notification signal stream ended"
        ))
    }
}

#[async_trait]
impl Notifier for DbusNotifier {
    async fn show(&self, id: &str, notification: &NativeNotification) -> Result<(), CourierError> {
        let replaces_id = self.ids.server_id(id).unwrap_or(0);
        let app_icon = self.app_icon(&notification.icon);
        let body = match self.markup {
            true => escape_markup(&notification.message),
            false => notification.message.clone(),
        };

        let mut hints: HashMap<&str, Value<'_>> = HashMap::new();
        hints.insert("urgency", Value::from(notification.priority.urgency()));
        if app_icon.starts_with("file://") {
            hints.insert("image-path", Value::from(app_icon.as_str()));
        }

        let server_id: u32 = self
            .proxy()
            .await?
            .call(
                "Notify",
                &(
                    self.app_name.as_str(),
                    replaces_id,
                    app_icon.as_str(),
                    notification.title.as_str(),
                    body.as_str(),
                    vec![DEFAULT_ACTION, ""],
                    hints,
                    -1i32,
                ),
            )
            .await
            .map_err(|e| courier_err!(CourierErrorKind::DBusProxyCall, e.to_string()))?;

        self.ids.record(id, server_id, replaces_id);
        Ok(())
    }

    async fn clear(&self, id: &str) -> Result<(), CourierError> {
        let Some(server_id) = self.ids.take(id) else {
            return Err(courier_err!(
                CourierErrorKind::NotificationUnknown,
                "no live notification {}",
                id
            ));
        };

        self.proxy()
            .await?
            .call::<_, _, ()>("CloseNotification", &(server_id,))
            .await
            .map_err(|e| courier_err!(CourierErrorKind::DBusProxyCall, e.to_string()))
    }
}

/// The notification server signals we react to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ServerSignal {
    ActionInvoked { server_id: u32, action: String },
    Closed { server_id: u32, reason: u32 },
}
impl ServerSignal {
    fn from_message(msg: &Message) -> Option<Self> {
        let header = msg.header();
        let signal = match header.member()?.as_str() {
            "ActionInvoked" => msg
                .body()
                .deserialize::<(u32, String)>()
                .map(|(server_id, action)| Self::ActionInvoked { server_id, action }),
            "NotificationClosed" => msg
                .body()
                .deserialize::<(u32, u32)>()
                .map(|(server_id, reason)| Self::Closed { server_id, reason }),
            _ => return None,
        };
        match signal {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::debug!("Malformed notification signal: {}", e);
                None
            }
        }
    }
}

/// Our string ids and the server's `u32` ids, in both directions.
#[derive(Debug, Default)]
struct IdMap {
    ids: DashMap<String, u32>,
    names: DashMap<u32, String>,
}
impl IdMap {
    fn server_id(&self, id: &str) -> Option<u32> {
        self.ids.get(id).map(|v| *v)
    }

    fn record(&self, id: &str, server_id: u32, replaced: u32) {
        if replaced != 0 && replaced != server_id {
            self.names.remove(&replaced);
        }
        self.ids.insert(id.to_string(), server_id);
        self.names.insert(server_id, id.to_string());
    }

    fn take(&self, id: &str) -> Option<u32> {
        let (_, server_id) = self.ids.remove(id)?;
        self.names.remove(&server_id);
        Some(server_id)
    }

    fn forget(&self, server_id: u32) -> Option<String> {
        let (_, id) = self.names.remove(&server_id)?;
        self.ids.remove_if(&id, |_, v| *v == server_id);
        Some(id)
    }

    /// Maps a server signal onto one of our notifications. Signals for
    /// notifications we did not show are dropped.
    fn translate(&self, signal: ServerSignal) -> Option<NativeSignal> {
        match signal {
            ServerSignal::ActionInvoked { server_id, action } if action == DEFAULT_ACTION => {
                let id = self.names.get(&server_id)?.value().clone();
                Some(NativeSignal::Clicked { id })
            }
            ServerSignal::ActionInvoked { .. } => None,
            ServerSignal::Closed { server_id, reason } => {
                let id = self.forget(server_id)?;
                Some(NativeSignal::Closed {
                    id,
                    by_user: reason == CLOSED_BY_USER,
                })
            }
        }
    }
}

/// Hands translated signals to `tx` in the order they arrived.
async fn forward_signals<S>(mut signals: S, ids: &IdMap, tx: &mpsc::Sender<NativeSignal>)
where
    S: Stream<Item = ServerSignal> + Unpin,
{
    while let Some(signal) = signals.next().await {
        let Some(native) = ids.translate(signal) else {
            continue;
        };
        if tx.send(native).await.is_err() {
            return;
        }
    }
}

fn prune_dir(dir: &Path, max_age: Duration, now: SystemTime) -> Result<usize, CourierError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| courier_err!(CourierErrorKind::DirRead, e.to_string()))?;

    let mut removed = 0;
    for entry in entries.flatten() {
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age > max_age && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Servers advertising `body-markup` parse the body; decoded page text must
/// not be read as markup.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        _ => "img",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clicked(server_id: u32) -> ServerSignal {
        ServerSignal::ActionInvoked {
            server_id,
            action: DEFAULT_ACTION.into(),
        }
    }

    fn closed(server_id: u32, reason: u32) -> ServerSignal {
        ServerSignal::Closed { server_id, reason }
    }

    #[tokio::test]
    async fn test_click_followed_by_close_keeps_both() {
        let ids = IdMap::default();
        let mut queued = Vec::new();
        for server_id in 1..=200u32 {
            ids.record(&format!("n{server_id}"), server_id, 0);
            queued.push(clicked(server_id));
            queued.push(closed(server_id, CLOSED_BY_USER));
        }

        let (tx, mut rx) = mpsc::channel(400);
        forward_signals(futures_util::stream::iter(queued), &ids, &tx).await;
        drop(tx);

        let mut clicks = 0;
        for server_id in 1..=200u32 {
            let id = format!("n{server_id}");
            assert_eq!(
                rx.recv().await,
                Some(NativeSignal::Clicked { id: id.clone() }),
                "click on {id} must come through before its close"
            );
            assert_eq!(
                rx.recv().await,
                Some(NativeSignal::Closed { id, by_user: true })
            );
            clicks += 1;
        }
        assert_eq!(clicks, 200);
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_translate_ignores_foreign_and_secondary_actions() {
        let ids = IdMap::default();
        ids.record("chat", 7, 0);

        assert_eq!(ids.translate(clicked(99)), None, "not one of ours");
        let other_action = ServerSignal::ActionInvoked {
            server_id: 7,
            action: "reply".into(),
        };
        assert_eq!(ids.translate(other_action), None);
        assert_eq!(
            ids.translate(closed(7, 1)),
            Some(NativeSignal::Closed {
                id: "chat".into(),
                by_user: false
            })
        );
        assert_eq!(ids.translate(clicked(7)), None, "closed notifications are forgotten");
    }

    #[test]
    fn test_replaced_notification_maps_to_new_server_id() {
        let ids = IdMap::default();
        ids.record("chat", 3, 0);
        ids.record("chat", 4, 3);

        assert_eq!(ids.server_id("chat"), Some(4));
        assert_eq!(ids.translate(clicked(3)), None);
        assert_eq!(
            ids.translate(clicked(4)),
            Some(NativeSignal::Clicked { id: "chat".into() })
        );
        assert_eq!(ids.take("chat"), Some(4));
        assert_eq!(ids.translate(clicked(4)), None);
    }

    #[test]
    fn test_prune_removes_only_old_icons() {
        let dir = std::env::temp_dir().join(format!("courier-icons-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.png"), b"a").unwrap();
        std::fs::write(dir.join("b.png"), b"b").unwrap();

        let now = SystemTime::now();
        assert_eq!(prune_dir(&dir, Duration::from_secs(3600), now).unwrap(), 0);

        let later = now + Duration::from_secs(7200);
        assert_eq!(prune_dir(&dir, Duration::from_secs(3600), later).unwrap(), 2);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_escape_markup() {
        assert_eq!(escape_markup("<b>5 > 3 & 2 < 4</b>"), "&lt;b&gt;5 &gt; 3 &amp; 2 &lt; 4&lt;/b&gt;");
        assert_eq!(escape_markup("plain\ntext"), "plain\ntext");
    }

    #[test]
    fn test_extension_for_known_and_unknown_types() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/vnd.microsoft.icon"), "ico");
        assert_eq!(extension_for("image/avif"), "img");
    }
}
