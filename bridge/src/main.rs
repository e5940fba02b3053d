use common::{
    config::Config,
    logging,
    protocol::{self, PageEnvelope, PlatformRequest},
    tokio::SizedMessageObj,
    utils::errors::{CourierError, CourierErrorKind},
};
use tokio::sync::mpsc;

use crate::{
    link::DaemonLink,
    native::{NativeRead, NativeWrite},
};

mod link;
mod native;
mod relay;

/// Native-messaging host started by the browser. Relays page messages from
/// stdin to the daemon and platform requests from the daemon to stdout.
#[tokio::main]
async fn main() -> Result<(), CourierError> {
    logging::init();

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Config unreadable, using defaults: {}", e);
        Config::default()
    });

    let (tx, rx) = mpsc::channel::<PlatformRequest>(32);
    let writer = tokio::spawn(write_requests(rx));

    let mut link = DaemonLink::new(config.socket_path.clone(), tx);
    if let Err(e) = link.connect().await {
        tracing::debug!("Daemon not reachable yet: {}", e);
    }

    let mut stdin = tokio::io::stdin();
    loop {
        let frame = match stdin.read_native().await {
            Ok(f) => f,
            Err(e) if e.kind == CourierErrorKind::StreamClosed => {
                tracing::info!("Browser closed the channel");
                break;
            }
            Err(e) => {
                tracing::error!("Reading from browser failed: {}", e);
                break;
            }
        };

        let envelope: PageEnvelope = match protocol::decode(&frame) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("Unreadable browser message: {}", e);
                continue;
            }
        };

        if let Some(message) = relay::relay(envelope) {
            link.forward(message).await;
        }
    }

    drop(link);
    writer.abort();
    Ok(())
}

async fn write_requests(mut rx: mpsc::Receiver<PlatformRequest>) {
    let mut stdout = tokio::io::stdout();
    while let Some(request) = rx.recv().await {
        let written = match SizedMessageObj::from_struct(&request) {
            Ok(obj) => stdout.write_native(obj).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!("Platform request {} not delivered: {}", request.seq, e);
        }
    }
}
