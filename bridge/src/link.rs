use std::path::PathBuf;

use common::{
    courier_err,
    protocol::{self, BridgeMessage, PlatformRequest},
    tokio::{AsyncSizedMessage, SizedMessageObj},
    utils::errors::{CourierError, CourierErrorKind},
};
use tokio::{
    net::{
        UnixStream,
        unix::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    task::JoinHandle,
};

/// Connection to the daemon. Connects lazily and drops the connection on the
/// first write error; the next message reconnects.
pub struct DaemonLink {
    socket_path: PathBuf,
    writer: Option<OwnedWriteHalf>,
    reader: Option<JoinHandle<()>>,
    requests: mpsc::Sender<PlatformRequest>,
}
impl DaemonLink {
    pub fn new(socket_path: PathBuf, requests: mpsc::Sender<PlatformRequest>) -> Self {
        Self {
            socket_path,
            writer: None,
            reader: None,
            requests,
        }
    }

    /// Delivers one message. Failures are logged and swallowed; the message is
    /// not retried.
    pub async fn forward(&mut self, message: BridgeMessage) {
        if let Err(e) = self.try_forward(&message).await {
            tracing::debug!("Dropped {} message: {}", message.as_ref(), e);
            self.writer = None;
        }
    }

    async fn try_forward(&mut self, message: &BridgeMessage) -> Result<(), CourierError> {
        let obj = SizedMessageObj::from_struct(message)?;
        if self.writer.is_none() {
            self.connect().await?;
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| courier_err!(CourierErrorKind::StreamConnect, "no daemon link"))?;
        writer.write_sized(obj).await
    }

    pub async fn connect(&mut self) -> Result<(), CourierError> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            courier_err!(
                CourierErrorKind::StreamConnect,
                "{}: {}",
                self.socket_path.display(),
                e.to_string()
            )
        })?;
        let (read, write) = stream.into_split();

        if let Some(previous) = self.reader.take() {
            previous.abort();
        }
        self.reader = Some(tokio::spawn(pump_requests(read, self.requests.clone())));
        self.writer = Some(write);
        tracing::debug!("Connected to daemon at {}", self.socket_path.display());
        Ok(())
    }
}
impl Drop for DaemonLink {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Moves platform requests from the daemon toward the browser.
async fn pump_requests(mut read: OwnedReadHalf, tx: mpsc::Sender<PlatformRequest>) {
    loop {
        let buf = match read.read_sized().await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("Daemon link closed: {}", e);
                break;
            }
        };
        match protocol::decode::<PlatformRequest>(&buf) {
            Ok(req) => {
                if tx.send(req).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::debug!("Unreadable platform request: {}", e),
        }
    }
}
