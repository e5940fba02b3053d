use std::sync::Arc;

use common::protocol::{ClickEvent, NotificationRequest, PageEnvelope, PageMessage};
use parking_lot::Mutex;

use crate::page::PagePort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum NotificationEvent {
    Show,
    Click,
    Close,
    Error,
}

pub type EventHandler = Arc<dyn Fn(NotificationEvent) + Send + Sync>;

/// The shape page scripts expect from a constructed notification.
pub trait NotificationHandle {
    fn title(&self) -> &str;
    fn body(&self) -> &str;
    fn tag(&self) -> Option<&str>;
    /// Icon as it was sent, once resolution has finished.
    fn icon(&self) -> Option<String>;

    fn set_onshow(&self, handler: Option<EventHandler>);
    fn set_onclick(&self, handler: Option<EventHandler>);
    fn set_onclose(&self, handler: Option<EventHandler>);
    fn set_onerror(&self, handler: Option<EventHandler>);

    fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Pending,
    Shown,
    Failed,
    Closed,
}

#[derive(Default)]
struct Slots {
    onshow: Option<EventHandler>,
    onclick: Option<EventHandler>,
    onclose: Option<EventHandler>,
    onerror: Option<EventHandler>,
}

struct Inner {
    request: NotificationRequest,
    icon: Mutex<Option<String>>,
    slots: Mutex<Slots>,
    state: Mutex<Lifecycle>,
    port: Arc<dyn PagePort>,
}

/// Returned to page code in place of a native notification.
#[derive(Clone)]
pub struct StandIn {
    inner: Arc<Inner>,
}
impl StandIn {
    pub(crate) fn new(request: NotificationRequest, port: Arc<dyn PagePort>) -> Self {
        Self {
            inner: Arc::new(Inner {
                request,
                icon: Mutex::new(None),
                slots: Mutex::new(Slots::default()),
                state: Mutex::new(Lifecycle::Pending),
                port,
            }),
        }
    }

    pub(crate) fn request(&self) -> &NotificationRequest {
        &self.inner.request
    }

    pub(crate) fn set_icon(&self, icon: Option<String>) {
        *self.inner.icon.lock() = icon;
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.inner.state.lock() == Lifecycle::Closed
    }

    #[cfg(test)]
    pub(crate) fn has_failed(&self) -> bool {
        *self.inner.state.lock() == Lifecycle::Failed
    }

    /// Moves `Pending` to `next`; every other state is final for the pipeline.
    fn settle(&self, next: Lifecycle) -> bool {
        let mut state = self.inner.state.lock();
        if *state != Lifecycle::Pending {
            return false;
        }
        *state = next;
        true
    }

    fn fire(&self, event: NotificationEvent) {
        // Clone out of the lock so handlers may touch the slots themselves.
        let handler = {
            let slots = self.inner.slots.lock();
            match event {
                NotificationEvent::Show => slots.onshow.clone(),
                NotificationEvent::Click => slots.onclick.clone(),
                NotificationEvent::Close => slots.onclose.clone(),
                NotificationEvent::Error => slots.onerror.clone(),
            }
        };
        if let Some(handler) = handler {
            handler(event);
        }
    }

    pub(crate) fn shown(&self) {
        if self.settle(Lifecycle::Shown) {
            self.fire(NotificationEvent::Show);
        }
    }

    pub(crate) fn failed(&self) {
        if self.settle(Lifecycle::Failed) {
            self.fire(NotificationEvent::Error);
        }
    }

    /// Reports a click on a browser-rendered notification to the extension and
    /// runs the page's `onclick`.
    pub fn click(&self) {
        let event = ClickEvent {
            url: self.inner.request.url.clone(),
        };
        let envelope = PageEnvelope::from_page(PageMessage::NotificationClicked(event));
        if let Err(e) = self.inner.port.post(envelope) {
            tracing::debug!("Click not forwarded: {}", e);
        }
        self.fire(NotificationEvent::Click);
    }
}

impl NotificationHandle for StandIn {
    fn title(&self) -> &str {
        &self.inner.request.title
    }
    fn body(&self) -> &str {
        &self.inner.request.body
    }
    fn tag(&self) -> Option<&str> {
        self.inner.request.tag.as_deref()
    }
    fn icon(&self) -> Option<String> {
        self.inner.icon.lock().clone()
    }

    fn set_onshow(&self, handler: Option<EventHandler>) {
        self.inner.slots.lock().onshow = handler;
    }
    fn set_onclick(&self, handler: Option<EventHandler>) {
        self.inner.slots.lock().onclick = handler;
    }
    fn set_onclose(&self, handler: Option<EventHandler>) {
        self.inner.slots.lock().onclose = handler;
    }
    fn set_onerror(&self, handler: Option<EventHandler>) {
        self.inner.slots.lock().onerror = handler;
    }

    fn close(&self) {
        let mut state = self.inner.state.lock();
        if *state == Lifecycle::Closed {
            return;
        }
        *state = Lifecycle::Closed;
        drop(state);
        self.fire(NotificationEvent::Close);
    }
}
