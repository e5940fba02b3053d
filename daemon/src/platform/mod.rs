use async_trait::async_trait;
use common::{icon::ResolvedIcon, protocol::Priority, utils::errors::CourierError};

mod dbus;
mod tabs;

pub use dbus::DbusNotifier;
pub use tabs::BrowserTabs;

/// Only plain title/body/icon notifications are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationKind {
    #[default]
    Basic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub icon: ResolvedIcon,
    pub priority: Priority,
}

/// The host's notification facility.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Shows `notification` under `id`, replacing a live one with the same id.
    async fn show(&self, id: &str, notification: &NativeNotification) -> Result<(), CourierError>;
    async fn clear(&self, id: &str) -> Result<(), CourierError>;
}

/// Tab and window control in the browser.
#[async_trait]
pub trait TabPlatform: Send + Sync {
    async fn focus_window(&self, window_id: i64) -> Result<(), CourierError>;
    async fn activate_tab(&self, tab_id: i64) -> Result<(), CourierError>;
    async fn open_tab(&self, url: &str) -> Result<(), CourierError>;
}

/// Something the user (or the system) did to a native notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeSignal {
    Clicked { id: String },
    Closed { id: String, by_user: bool },
}
