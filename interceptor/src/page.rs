use async_trait::async_trait;
use common::{icon::IconLink, protocol::PageEnvelope, utils::errors::CourierError};
use serde::{Deserialize, Serialize};

/// Mirrors `Notification.permission`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Permission {
    #[default]
    Default,
    Granted,
    Denied,
}

/// The document the interceptor was injected into.
pub trait Document: Send + Sync {
    /// Absolute URL of the page.
    fn url(&self) -> String;
    /// Every `<link>` in the head that carries a `rel` attribute.
    fn icon_links(&self) -> Vec<IconLink>;
}

/// Outgoing channel toward the bridge (a same-window message post).
pub trait PagePort: Send + Sync {
    fn post(&self, envelope: PageEnvelope) -> Result<(), CourierError>;
}

/// The environment's original notification constructor. Its static surface
/// stays authoritative for permission state.
#[async_trait]
pub trait NativeNotificationApi: Send + Sync {
    fn permission(&self) -> Permission;
    async fn request_permission(&self) -> Permission;
}
