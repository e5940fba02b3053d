use std::sync::Arc;

use chrono::TimeDelta;
use common::{
    config::Config,
    icon::{IconFetcher, finalize_icon},
    protocol::{ClickEvent, NotificationRequest, Priority, TabOrigin},
    utils::errors::CourierError,
};
use tokio::sync::mpsc;

use crate::{
    clock::Clock,
    correlation::{CorrelationTable, IdSource, TabCorrelationEntry, generate_id},
    platform::{NativeNotification, NativeSignal, NotificationKind, Notifier, TabPlatform},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub retention: TimeDelta,
    pub priority: Priority,
}
impl DispatchPolicy {
    pub fn from_config(config: &Config) -> Self {
        let retention = TimeDelta::from_std(config.retention()).unwrap_or(TimeDelta::MAX);
        Self {
            retention,
            priority: config.priority,
        }
    }
}
impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Turns page notifications into native ones and routes clicks on them back
/// to the tab they came from.
pub struct Dispatcher {
    policy: DispatchPolicy,
    table: CorrelationTable,
    notifier: Arc<dyn Notifier>,
    tabs: Arc<dyn TabPlatform>,
    clock: Arc<dyn Clock>,
    fetcher: Arc<dyn IconFetcher>,
}

impl Dispatcher {
    pub fn new(
        policy: DispatchPolicy,
        notifier: Arc<dyn Notifier>,
        tabs: Arc<dyn TabPlatform>,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn IconFetcher>,
    ) -> Self {
        Self {
            policy,
            table: CorrelationTable::new(),
            notifier,
            tabs,
            clock,
            fetcher,
        }
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    /// Shows a native notification for `request`. Returns the id it was shown
    /// under, or `None` when the host refused it.
    pub async fn handle_create(
        &self,
        request: NotificationRequest,
        origin: Option<TabOrigin>,
    ) -> Option<String> {
        let now = self.clock.now();
        let (id, id_source) = match request.tag.as_deref().filter(|t| !t.is_empty()) {
            Some(tag) => (tag.to_string(), IdSource::Tagged),
            None => (generate_id(now), IdSource::Generated),
        };

        let icon = finalize_icon(self.fetcher.as_ref(), request.icon.as_deref(), &request.url).await;
        let notification = NativeNotification {
            kind: NotificationKind::Basic,
            title: request.title,
            message: request.body,
            icon,
            priority: self.policy.priority,
        };

        if let Err(e) = self.notifier.show(&id, &notification).await {
            tracing::error!("Notification {} from {} dropped: {}", id, request.url, e);
            return None;
        }

        let origin = origin.unwrap_or_default();
        match origin.tab_id {
            Some(tab_id) => {
                let previous = self.table.insert(TabCorrelationEntry {
                    notification_id: id.clone(),
                    tab_id: Some(tab_id),
                    window_id: origin.window_id,
                    url: request.url,
                    created_at: now,
                    id_source,
                });
                if previous.is_some() {
                    tracing::debug!("Notification {} replaced an earlier one", id);
                }
            }
            None => {
                // The replaced notification's tab no longer applies.
                self.table.remove(&id);
            }
        }

        tracing::debug!("Showing notification {} ({})", id, id_source);
        Some(id)
    }

    /// User clicked native notification `id`.
    pub async fn handle_click(&self, id: &str) {
        if let Some(entry) = self.table.remove(id) {
            if let Some(tab_id) = entry.tab_id {
                if let Err(e) = self.focus(entry.window_id, tab_id).await {
                    tracing::warn!("Tab {} unavailable, opening {}: {}", tab_id, entry.url, e);
                    if let Err(e) = self.tabs.open_tab(&entry.url).await {
                        tracing::warn!("Could not open {}: {}", entry.url, e);
                    }
                }
            }
        } else {
            tracing::debug!("Click on uncorrelated notification {}", id);
        }

        if let Err(e) = self.notifier.clear(id).await {
            tracing::debug!("Clearing notification {}: {}", id, e);
        }
    }

    pub fn handle_close(&self, id: &str, by_user: bool) {
        if self.table.remove(id).is_some() {
            tracing::debug!("Notification {} closed (by user: {})", id, by_user);
        }
    }

    /// A notification shown by the browser itself was clicked in a page.
    pub async fn handle_page_click(&self, event: ClickEvent, origin: Option<TabOrigin>) {
        let origin = origin.unwrap_or_default();
        let focused = match origin.tab_id {
            Some(tab_id) => self.focus(origin.window_id, tab_id).await,
            None => Ok(()),
        };

        if origin.tab_id.is_none() || focused.is_err() {
            if let Err(e) = focused {
                tracing::warn!("Sender tab unavailable, opening {}: {}", event.url, e);
            }
            if let Err(e) = self.tabs.open_tab(&event.url).await {
                tracing::warn!("Could not open {}: {}", event.url, e);
            }
        }
    }

    pub async fn handle_signal(&self, signal: NativeSignal) {
        match signal {
            NativeSignal::Clicked { id } => self.handle_click(&id).await,
            NativeSignal::Closed { id, by_user } => self.handle_close(&id, by_user),
        }
    }

    /// Handles native signals one at a time, in arrival order, until the
    /// sender goes away. A click must finish before the close that follows it.
    pub async fn run_signals(&self, mut rx: mpsc::Receiver<NativeSignal>) {
        while let Some(signal) = rx.recv().await {
            self.handle_signal(signal).await;
        }
    }

    /// Drops stale correlation entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let removed = self.table.sweep(self.clock.now(), self.policy.retention);
        if removed > 0 {
            tracing::debug!("Swept {} stale notification entries", removed);
        }
        removed
    }

    async fn focus(&self, window_id: Option<i64>, tab_id: i64) -> Result<(), CourierError> {
        if let Some(window_id) = window_id {
            self.tabs.focus_window(window_id).await?;
        }
        self.tabs.activate_tab(tab_id).await
    }
}
