//! Page-side replacement for the web notification constructor.
//!
//! The page world is reached through the capability traits in [`page`]; the
//! object handed back to page code is a [`StandIn`].

pub mod page;
pub mod shim;
pub mod stand_in;

pub use page::{Document, NativeNotificationApi, PagePort, Permission};
pub use shim::{Interceptor, NotificationOptions};
pub use stand_in::{EventHandler, NotificationEvent, NotificationHandle, StandIn};
