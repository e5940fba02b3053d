use serde::Serialize;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::courier_err;
use crate::protocol;
use crate::utils::errors::{CourierError, CourierErrorKind};

/// Upper bound for a single frame. Inline icons are the largest payloads.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

pub struct SizedMessageObj {
    buffer: Vec<u8>,
}

impl SizedMessageObj {
    /// The ONLY way to create a message for the wire.
    /// This guarantees JSON is used every time.
    pub fn from_struct<T: Serialize>(data: &T) -> Result<Self, CourierError> {
        Ok(Self {
            buffer: protocol::encode(data)?,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// Length-prefixed framing used between the bridge and the daemon.
///
/// The message length is encoded as a 4-byte big-endian `u32` before the
/// message itself.
pub trait AsyncSizedMessage {
    fn write_sized<'a>(
        &'a mut self,
        what: SizedMessageObj,
    ) -> impl Future<Output = Result<(), CourierError>> + Send + 'a;
    fn read_sized<'a>(
        &'a mut self,
    ) -> impl Future<Output = Result<Vec<u8>, CourierError>> + Send + 'a;
}

fn frame_len(len: usize) -> Result<u32, CourierError> {
    if len > MAX_FRAME_LEN {
        return Err(courier_err!(
            CourierErrorKind::InvalidData,
            "frame of {} bytes exceeds limit",
            len
        ));
    }
    // Safely convert buf_len from usize to u32
    len.try_into()
        .map_err(|_| courier_err!(CourierErrorKind::InvalidData, "message too long"))
}

async fn write_frame<W>(writer: &mut W, what: SizedMessageObj) -> Result<(), CourierError>
where
    W: AsyncWrite + Unpin + Send,
{
    let buf_len = frame_len(what.bytes().len())?;

    // Write message size to stream
    writer
        .write_all(&buf_len.to_be_bytes())
        .await
        .map_err(|e| courier_err!(CourierErrorKind::StreamWrite, e.to_string()))?;

    // Write message to stream
    writer
        .write_all(what.bytes())
        .await
        .map_err(|e| courier_err!(CourierErrorKind::StreamWrite, e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| courier_err!(CourierErrorKind::StreamWrite, e.to_string()))
}

async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, CourierError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf_len = [0u8; 4];

    // Read message length
    reader.read_exact(&mut buf_len).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            courier_err!(CourierErrorKind::StreamClosed, "peer closed the stream")
        }
        _ => courier_err!(CourierErrorKind::StreamRead, e.to_string()),
    })?;
    let msg_len = u32::from_be_bytes(buf_len) as usize;
    frame_len(msg_len)?;

    let mut buf = vec![0u8; msg_len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| courier_err!(CourierErrorKind::StreamRead, e.to_string()))?;

    Ok(buf)
}

impl AsyncSizedMessage for UnixStream {
    fn write_sized<'a>(
        &'a mut self,
        what: SizedMessageObj,
    ) -> impl Future<Output = Result<(), CourierError>> + Send + 'a {
        write_frame(self, what)
    }
    fn read_sized<'a>(
        &'a mut self,
    ) -> impl Future<Output = Result<Vec<u8>, CourierError>> + Send + 'a {
        read_frame(self)
    }
}

impl AsyncSizedMessage for OwnedReadHalf {
    fn write_sized<'a>(
        &'a mut self,
        _what: SizedMessageObj,
    ) -> impl Future<Output = Result<(), CourierError>> + Send + 'a {
        async move {
            Err(courier_err!(
                CourierErrorKind::StreamWrite,
                "Cannot write from ReadHalf"
            ))
        }
    }
    fn read_sized<'a>(
        &'a mut self,
    ) -> impl Future<Output = Result<Vec<u8>, CourierError>> + Send + 'a {
        read_frame(self)
    }
}

impl AsyncSizedMessage for OwnedWriteHalf {
    fn write_sized<'a>(
        &'a mut self,
        what: SizedMessageObj,
    ) -> impl Future<Output = Result<(), CourierError>> + Send + 'a {
        write_frame(self, what)
    }
    fn read_sized<'a>(
        &'a mut self,
    ) -> impl Future<Output = Result<Vec<u8>, CourierError>> + Send + 'a {
        async move {
            Err(courier_err!(
                CourierErrorKind::StreamRead,
                "Cannot read to WriteHalf"
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BridgeMessage, PlatformReply};

    #[tokio::test]
    async fn test_frame_crosses_a_socket_pair() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let msg = BridgeMessage::PlatformReply(PlatformReply { seq: 9, ok: true });

        a.write_sized(SizedMessageObj::from_struct(&msg).unwrap())
            .await
            .unwrap();
        let buf = b.read_sized().await.unwrap();

        let back: BridgeMessage = protocol::decode(&buf).unwrap();
        assert_eq!(back, msg);
    }

    #[tokio::test]
    async fn test_closed_peer_is_reported_as_closed() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);
        let (mut b, _write) = b.into_split();
        let err = b.read_sized().await.unwrap_err();
        assert_eq!(err.kind, CourierErrorKind::StreamClosed);
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_is_rejected() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        a.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        let err = b.read_sized().await.unwrap_err();
        assert_eq!(err.kind, CourierErrorKind::InvalidData);
    }
}
