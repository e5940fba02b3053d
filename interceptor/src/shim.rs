use std::sync::Arc;

use common::{
    Url,
    icon::{IconFetcher, best_icon_url, inline_icon, is_inline},
    protocol::{NotificationRequest, PageEnvelope, PageMessage},
    sanitize::{sanitize_body, sanitize_title},
};
use serde::Deserialize;

use crate::{
    page::{Document, NativeNotificationApi, PagePort, Permission},
    stand_in::StandIn,
};

/// The options bag of `new Notification(title, options)`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationOptions {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}
impl NotificationOptions {
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

pub struct Interceptor {
    document: Arc<dyn Document>,
    port: Arc<dyn PagePort>,
    native: Arc<dyn NativeNotificationApi>,
    fetcher: Option<Arc<dyn IconFetcher>>,
}
impl Interceptor {
    pub fn new(
        document: Arc<dyn Document>,
        port: Arc<dyn PagePort>,
        native: Arc<dyn NativeNotificationApi>,
    ) -> Self {
        Self {
            document,
            port,
            native,
            fetcher: None,
        }
    }

    /// Lets the page context try to inline icons itself. Without a fetcher the
    /// icon URL is handed to the daemon as is.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn IconFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn permission(&self) -> Permission {
        self.native.permission()
    }

    pub async fn request_permission(&self) -> Permission {
        self.native.request_permission().await
    }

    /// Replacement for the notification constructor.
    ///
    /// Returns immediately. Delivery runs as one task: resolve the icon, post
    /// the create request, then fire `onshow`. A denied permission, a failed
    /// post or a missing runtime fires `onerror` instead. Nothing is posted
    /// once the page has closed the notification.
    pub fn notify(&self, title: &str, options: NotificationOptions) -> StandIn {
        let request = NotificationRequest {
            title: sanitize_title(title),
            body: sanitize_body(options.body.as_deref().unwrap_or_default()),
            icon: options.icon.filter(|i| !i.trim().is_empty()),
            tag: options.tag.filter(|t| !t.is_empty()),
            url: self.document.url(),
        };
        let stand_in = StandIn::new(request, Arc::clone(&self.port));
        let permission = self.native.permission();

        let task = Delivery {
            stand_in: stand_in.clone(),
            document: Arc::clone(&self.document),
            port: Arc::clone(&self.port),
            fetcher: self.fetcher.clone(),
            permission,
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(task.run());
            }
            Err(e) => {
                tracing::debug!("Notification not delivered: {}", e);
                stand_in.failed();
            }
        }

        stand_in
    }
}

struct Delivery {
    stand_in: StandIn,
    document: Arc<dyn Document>,
    port: Arc<dyn PagePort>,
    fetcher: Option<Arc<dyn IconFetcher>>,
    permission: Permission,
}
impl Delivery {
    async fn run(self) {
        // Page code installs its handlers right after construction.
        tokio::task::yield_now().await;

        if self.permission != Permission::Granted {
            tracing::debug!("Notification blocked, permission is {}", self.permission);
            self.stand_in.failed();
            return;
        }

        let icon = resolve_page_icon(
            self.stand_in.request().icon.clone(),
            self.document.as_ref(),
            self.fetcher.as_deref(),
        )
        .await;
        self.stand_in.set_icon(icon.clone());

        if self.stand_in.is_closed() {
            tracing::debug!("Notification closed by the page before delivery");
            return;
        }

        let mut request = self.stand_in.request().clone();
        request.icon = icon;

        match self
            .port
            .post(PageEnvelope::from_page(PageMessage::CreateNotification(request)))
        {
            Ok(()) => self.stand_in.shown(),
            Err(e) => {
                tracing::debug!("Create request not posted: {}", e);
                self.stand_in.failed();
            }
        }
    }
}

/// Best-effort icon resolution from inside the page.
///
/// A fetch that fails here is not final: the URL is kept so the daemon, which
/// is not bound by the page's cross-origin rules, can try again.
async fn resolve_page_icon(
    explicit: Option<String>,
    document: &dyn Document,
    fetcher: Option<&dyn IconFetcher>,
) -> Option<String> {
    if let Some(icon) = explicit.as_deref().filter(|i| is_inline(i)) {
        return Some(icon.to_string());
    }

    let page = Url::parse(&document.url()).ok();
    let candidate = match (&explicit, &page) {
        (Some(icon), Some(page)) => page.join(icon.trim()).ok(),
        (Some(icon), None) => Url::parse(icon.trim()).ok(),
        (None, Some(page)) => best_icon_url(&document.icon_links(), page),
        (None, None) => None,
    };
    let Some(candidate) = candidate else {
        return explicit;
    };

    let Some(fetcher) = fetcher else {
        return Some(candidate.to_string());
    };
    match inline_icon(fetcher, &candidate).await {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::debug!("Leaving {} for the daemon: {}", candidate, e);
            Some(candidate.to_string())
        }
    }
}
