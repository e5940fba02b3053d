use common::protocol::{
    BridgeMessage, ClickEvent, EXTENSION_SOURCE, PAGE_SOURCE, PageEnvelope, PageMessage,
};

/// Re-tags a browser envelope for the daemon.
///
/// Notification messages are only accepted from the interceptor in the same
/// page, platform replies only from the extension itself. Everything else is
/// dropped.
pub fn relay(envelope: PageEnvelope) -> Option<BridgeMessage> {
    let PageEnvelope {
        source,
        sender,
        data,
    } = envelope;

    match (source.as_str(), data) {
        (PAGE_SOURCE, PageMessage::CreateNotification(request)) => {
            Some(BridgeMessage::CreateNotification {
                request,
                origin: sender,
            })
        }
        (PAGE_SOURCE, PageMessage::NotificationClicked(ClickEvent { url })) => {
            Some(BridgeMessage::NotificationClicked {
                url,
                origin: sender,
            })
        }
        (EXTENSION_SOURCE, PageMessage::PlatformReply(reply)) => {
            Some(BridgeMessage::PlatformReply(reply))
        }
        (source, data) => {
            tracing::debug!("Ignoring {} from source {:?}", data.as_ref(), source);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::protocol::{NotificationRequest, PlatformReply, TabOrigin};

    fn create() -> PageMessage {
        PageMessage::CreateNotification(NotificationRequest {
            title: "t".into(),
            body: "b".into(),
            icon: None,
            tag: None,
            url: "https://a.example/".into(),
        })
    }

    #[test]
    fn test_create_is_forwarded_with_sender() {
        let origin = TabOrigin {
            tab_id: Some(5),
            window_id: Some(1),
        };
        let envelope = PageEnvelope {
            source: PAGE_SOURCE.into(),
            sender: Some(origin),
            data: create(),
        };
        match relay(envelope) {
            Some(BridgeMessage::CreateNotification { request, origin: o }) => {
                assert_eq!(request.title, "t");
                assert_eq!(o, Some(origin));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_click_is_forwarded() {
        let envelope = PageEnvelope::from_page(PageMessage::NotificationClicked(ClickEvent {
            url: "https://a.example/".into(),
        }));
        assert_eq!(
            relay(envelope),
            Some(BridgeMessage::NotificationClicked {
                url: "https://a.example/".into(),
                origin: None
            })
        );
    }

    #[test]
    fn test_foreign_source_is_ignored() {
        let envelope = PageEnvelope {
            source: "some-other-frame".into(),
            sender: None,
            data: create(),
        };
        assert_eq!(relay(envelope), None);
    }

    #[test]
    fn test_page_cannot_forge_platform_replies() {
        let envelope =
            PageEnvelope::from_page(PageMessage::PlatformReply(PlatformReply { seq: 1, ok: true }));
        assert_eq!(relay(envelope), None);
    }

    #[test]
    fn test_extension_reply_is_forwarded() {
        let envelope = PageEnvelope {
            source: EXTENSION_SOURCE.into(),
            sender: None,
            data: PageMessage::PlatformReply(PlatformReply { seq: 4, ok: false }),
        };
        assert_eq!(
            relay(envelope),
            Some(BridgeMessage::PlatformReply(PlatformReply { seq: 4, ok: false }))
        );
    }

    #[test]
    fn test_extension_cannot_inject_notifications() {
        let envelope = PageEnvelope {
            source: EXTENSION_SOURCE.into(),
            sender: None,
            data: create(),
        };
        assert_eq!(relay(envelope), None);
    }
}
