use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use common::{
    courier_err,
    protocol::{PlatformCommand, PlatformReply, PlatformRequest},
    utils::errors::{CourierError, CourierErrorKind},
};
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::platform::TabPlatform;

/// Tab control through the browser extension.
///
/// Requests go out over the most recently attached bridge connection and are
/// answered by a [`PlatformReply`] carrying the same sequence number.
#[derive(Default)]
pub struct BrowserTabs {
    link: RwLock<Option<mpsc::Sender<PlatformRequest>>>,
    pending: DashMap<u64, oneshot::Sender<bool>>,
    seq: AtomicU64,
}

impl BrowserTabs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `tx` the channel for all further requests.
    pub async fn attach(&self, tx: mpsc::Sender<PlatformRequest>) {
        let mut link = self.link.write().await;
        *link = Some(tx);
    }

    /// Forgets `tx` if it is still current. Requests waiting on it fail.
    pub async fn detach(&self, tx: &mpsc::Sender<PlatformRequest>) {
        let mut link = self.link.write().await;
        if link.as_ref().is_some_and(|current| current.same_channel(tx)) {
            *link = None;
            // Dropping the senders wakes every waiter with an error.
            self.pending.clear();
        }
    }

    pub fn resolve(&self, reply: PlatformReply) {
        match self.pending.remove(&reply.seq) {
            Some((_, waiter)) => {
                let _ = waiter.send(reply.ok);
            }
            None => tracing::debug!("Reply for unknown platform request {}", reply.seq),
        }
    }

    async fn request(&self, command: PlatformCommand) -> Result<(), CourierError> {
        let tx = self
            .link
            .read()
            .await
            .clone()
            .ok_or_else(|| courier_err!(CourierErrorKind::PlatformUnavailable, "no browser connected"))?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let name = command.as_ref().to_string();
        let (waiter, answer) = oneshot::channel();
        self.pending.insert(seq, waiter);

        if tx.send(PlatformRequest { seq, command }).await.is_err() {
            self.pending.remove(&seq);
            return Err(courier_err!(
                CourierErrorKind::PlatformUnavailable,
                "browser connection closed"
            ));
        }

        match answer.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(courier_err!(
                CourierErrorKind::PlatformRejected,
                "{} ({}) refused by the browser",
                name,
                seq
            )),
            Err(_) => Err(courier_err!(
                CourierErrorKind::PlatformUnavailable,
                "browser connection lost during {}",
                name
            )),
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl TabPlatform for BrowserTabs {
    async fn focus_window(&self, window_id: i64) -> Result<(), CourierError> {
        self.request(PlatformCommand::FocusWindow { window_id }).await
    }

    async fn activate_tab(&self, tab_id: i64) -> Result<(), CourierError> {
        self.request(PlatformCommand::ActivateTab { tab_id }).await
    }

    async fn open_tab(&self, url: &str) -> Result<(), CourierError> {
        self.request(PlatformCommand::OpenTab { url: url.to_string() })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_request_without_browser_fails() {
        let tabs = BrowserTabs::new();
        let err = tabs.activate_tab(1).await.unwrap_err();
        assert_eq!(err.kind, CourierErrorKind::PlatformUnavailable);
        assert_eq!(tabs.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_reply_resolves_matching_request() {
        let tabs = Arc::new(BrowserTabs::new());
        let (tx, mut rx) = mpsc::channel(4);
        tabs.attach(tx).await;

        let task = {
            let tabs = tabs.clone();
            tokio::spawn(async move { tabs.focus_window(5).await })
        };

        let request = rx.recv().await.expect("request sent");
        assert_eq!(request.command, PlatformCommand::FocusWindow { window_id: 5 });
        tabs.resolve(PlatformReply {
            seq: request.seq,
            ok: true,
        });

        assert!(task.await.unwrap().is_ok());
        assert_eq!(tabs.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_negative_reply_is_rejection() {
        let tabs = Arc::new(BrowserTabs::new());
        let (tx, mut rx) = mpsc::channel(4);
        tabs.attach(tx).await;

        let task = {
            let tabs = tabs.clone();
            tokio::spawn(async move { tabs.open_tab("https://a.example/").await })
        };
        let request = rx.recv().await.unwrap();
        tabs.resolve(PlatformReply {
            seq: request.seq,
            ok: false,
        });

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind, CourierErrorKind::PlatformRejected);
    }

    #[tokio::test]
    async fn test_detach_fails_pending_requests() {
        let tabs = Arc::new(BrowserTabs::new());
        let (tx, mut rx) = mpsc::channel(4);
        tabs.attach(tx.clone()).await;

        let task = {
            let tabs = tabs.clone();
            tokio::spawn(async move { tabs.activate_tab(9).await })
        };
        rx.recv().await.unwrap();
        tabs.detach(&tx).await;

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind, CourierErrorKind::PlatformUnavailable);
        assert!(tabs.activate_tab(9).await.is_err(), "detached link must not be reused");
    }

    #[tokio::test]
    async fn test_detach_of_replaced_link_keeps_current() {
        let tabs = BrowserTabs::new();
        let (old_tx, _old_rx) = mpsc::channel(4);
        let (new_tx, _new_rx) = mpsc::channel(4);
        tabs.attach(old_tx.clone()).await;
        tabs.attach(new_tx).await;

        tabs.detach(&old_tx).await;
        assert!(tabs.link.read().await.is_some(), "newer connection stays attached");
    }

    #[test]
    fn test_unknown_reply_is_ignored() {
        let tabs = BrowserTabs::new();
        tabs.resolve(PlatformReply { seq: 42, ok: true });
        assert_eq!(tabs.pending_len(), 0);
    }
}
