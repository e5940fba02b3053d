use std::sync::Arc;

use common::{
    courier_err,
    protocol::{self, BridgeMessage, ClickEvent, PlatformRequest},
    tokio::{AsyncSizedMessage, SizedMessageObj},
    utils::errors::{CourierError, CourierErrorKind},
};
use tokio::{
    net::{UnixListener, UnixStream, unix::OwnedWriteHalf},
    sync::mpsc,
};

use crate::{dispatcher::Dispatcher, platform::BrowserTabs};

/// Accepts bridge connections until the listener fails.
pub async fn serve(
    listener: UnixListener,
    dispatcher: Arc<Dispatcher>,
    tabs: Arc<BrowserTabs>,
) -> Result<(), CourierError> {
    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| courier_err!(CourierErrorKind::StreamAccept, e.to_string()))?;
        tracing::debug!("Bridge connected");
        tokio::spawn(handle_connection(stream, dispatcher.clone(), tabs.clone()));
    }
}

async fn handle_connection(stream: UnixStream, dispatcher: Arc<Dispatcher>, tabs: Arc<BrowserTabs>) {
    let (mut read, write) = stream.into_split();
    let (tx, rx) = mpsc::channel::<PlatformRequest>(32);
    tabs.attach(tx.clone()).await;
    let writer = tokio::spawn(write_requests(write, rx));

    loop {
        let buf = match read.read_sized().await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("Bridge disconnected: {}", e);
                break;
            }
        };

        let message: BridgeMessage = match protocol::decode(&buf) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("Unreadable bridge message: {}", e);
                continue;
            }
        };

        // Handlers may wait on platform replies that arrive on this same
        // connection, so they must not run inline.
        match message {
            BridgeMessage::CreateNotification { request, origin } => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.handle_create(request, origin).await;
                });
            }
            BridgeMessage::NotificationClicked { url, origin } => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.handle_page_click(ClickEvent { url }, origin).await;
                });
            }
            BridgeMessage::PlatformReply(reply) => tabs.resolve(reply),
        }
    }

    tabs.detach(&tx).await;
    writer.abort();
}

async fn write_requests(mut write: OwnedWriteHalf, mut rx: mpsc::Receiver<PlatformRequest>) {
    while let Some(request) = rx.recv().await {
        let written = match SizedMessageObj::from_struct(&request) {
            Ok(obj) => write.write_sized(obj).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!("Platform request {} not delivered: {}", request.seq, e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{path::PathBuf, time::Duration};

    use async_trait::async_trait;
    use common::{
        Url,
        icon::{FetchedIcon, IconFetcher},
        protocol::{NotificationRequest, PlatformCommand, PlatformReply, TabOrigin},
    };

    use crate::{
        clock::SystemClock,
        dispatcher::DispatchPolicy,
        platform::{NativeNotification, Notifier},
    };

    struct AcceptingNotifier;
    #[async_trait]
    impl Notifier for AcceptingNotifier {
        async fn show(&self, _: &str, _: &NativeNotification) -> Result<(), CourierError> {
            Ok(())
        }
        async fn clear(&self, _: &str) -> Result<(), CourierError> {
            Ok(())
        }
    }

    struct OfflineFetcher;
    #[async_trait]
    impl IconFetcher for OfflineFetcher {
        async fn fetch(&self, _: &Url) -> Result<FetchedIcon, CourierError> {
            Err(courier_err!(CourierErrorKind::HttpGetRequest, "offline"))
        }
    }

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("courier-daemon-{}-{}.sock", name, std::process::id()))
    }

    async fn start(name: &str) -> (PathBuf, Arc<Dispatcher>) {
        let path = socket_path(name);
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let tabs = Arc::new(BrowserTabs::new());
        let dispatcher = Arc::new(Dispatcher::new(
            DispatchPolicy::default(),
            Arc::new(AcceptingNotifier),
            tabs.clone(),
            Arc::new(SystemClock),
            Arc::new(OfflineFetcher),
        ));
        tokio::spawn(serve(listener, dispatcher.clone(), tabs));
        (path, dispatcher)
    }

    async fn send(stream: &mut UnixStream, message: &BridgeMessage) {
        stream
            .write_sized(SizedMessageObj::from_struct(message).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_over_socket_is_correlated() {
        let (path, dispatcher) = start("create").await;
        let mut bridge = UnixStream::connect(&path).await.unwrap();

        let message = BridgeMessage::CreateNotification {
            request: NotificationRequest {
                title: "t".into(),
                body: "b".into(),
                icon: None,
                tag: Some("room".into()),
                url: "https://chat.example/".into(),
            },
            origin: Some(TabOrigin {
                tab_id: Some(3),
                window_id: None,
            }),
        };
        send(&mut bridge, &message).await;

        let mut recorded = false;
        for _ in 0..100 {
            if dispatcher.table().contains("room") {
                recorded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(recorded, "create sent over the socket must be correlated");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_page_click_round_trips_platform_request() {
        let (path, _dispatcher) = start("click").await;
        let mut bridge = UnixStream::connect(&path).await.unwrap();

        let click = BridgeMessage::NotificationClicked {
            url: "https://chat.example/".into(),
            origin: Some(TabOrigin {
                tab_id: Some(8),
                window_id: None,
            }),
        };
        send(&mut bridge, &click).await;

        let buf = bridge.read_sized().await.unwrap();
        let request: PlatformRequest = protocol::decode(&buf).unwrap();
        assert_eq!(request.command, PlatformCommand::ActivateTab { tab_id: 8 });

        // Refusing the activation makes the daemon fall back to a new tab.
        send(
            &mut bridge,
            &BridgeMessage::PlatformReply(PlatformReply {
                seq: request.seq,
                ok: false,
            }),
        )
        .await;

        let buf = bridge.read_sized().await.unwrap();
        let request: PlatformRequest = protocol::decode(&buf).unwrap();
        assert_eq!(
            request.command,
            PlatformCommand::OpenTab {
                url: "https://chat.example/".into()
            }
        );
        let _ = std::fs::remove_file(&path);
    }
}
