use std::future::Future;

use common::{
    courier_err,
    tokio::{MAX_FRAME_LEN, SizedMessageObj},
    utils::errors::{CourierError, CourierErrorKind},
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Browser native-messaging framing: a 4-byte length in native byte order
/// followed by UTF-8 JSON.
pub trait NativeRead {
    fn read_native(&mut self) -> impl Future<Output = Result<Vec<u8>, CourierError>> + Send;
}

pub trait NativeWrite {
    fn write_native(
        &mut self,
        what: SizedMessageObj,
    ) -> impl Future<Output = Result<(), CourierError>> + Send;
}

impl<R> NativeRead for R
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_native(&mut self) -> Result<Vec<u8>, CourierError> {
        let mut buf_len = [0u8; 4];
        self.read_exact(&mut buf_len).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                courier_err!(CourierErrorKind::StreamClosed, "browser closed stdin")
            }
            _ => courier_err!(CourierErrorKind::StreamRead, e.to_string()),
        })?;

        let msg_len = u32::from_ne_bytes(buf_len) as usize;
        if msg_len > MAX_FRAME_LEN {
            return Err(courier_err!(
                CourierErrorKind::InvalidData,
                "frame of {} bytes exceeds limit",
                msg_len
            ));
        }

        let mut buf = vec![0u8; msg_len];
        self.read_exact(&mut buf)
            .await
            .map_err(|e| courier_err!(CourierErrorKind::StreamRead, e.to_string()))?;
        Ok(buf)
    }
}

impl<W> NativeWrite for W
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_native(&mut self, what: SizedMessageObj) -> Result<(), CourierError> {
        let buf_len: u32 = what
            .bytes()
            .len()
            .try_into()
            .map_err(|_| courier_err!(CourierErrorKind::InvalidData, "message too long"))?;

        self.write_all(&buf_len.to_ne_bytes())
            .await
            .map_err(|e| courier_err!(CourierErrorKind::StreamWrite, e.to_string()))?;
        self.write_all(what.bytes())
            .await
            .map_err(|e| courier_err!(CourierErrorKind::StreamWrite, e.to_string()))?;
        self.flush()
            .await
            .map_err(|e| courier_err!(CourierErrorKind::StreamWrite, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::protocol::{self, PlatformCommand, PlatformRequest};

    #[tokio::test]
    async fn test_length_prefix_uses_native_byte_order() {
        let req = PlatformRequest {
            seq: 1,
            command: PlatformCommand::ActivateTab { tab_id: 12 },
        };
        let mut out = Vec::new();
        out.write_native(SizedMessageObj::from_struct(&req).unwrap())
            .await
            .unwrap();

        let body = protocol::encode(&req).unwrap();
        assert_eq!(&out[..4], &(body.len() as u32).to_ne_bytes());
        assert_eq!(&out[4..], body.as_slice());

        let mut reader = out.as_slice();
        let frame = reader.read_native().await.unwrap();
        assert_eq!(protocol::decode::<PlatformRequest>(&frame).unwrap(), req);
    }

    #[tokio::test]
    async fn test_eof_reads_as_closed() {
        let mut reader: &[u8] = &[];
        let err = reader.read_native().await.unwrap_err();
        assert_eq!(err.kind, CourierErrorKind::StreamClosed);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_a_read_error() {
        let mut data = 10u32.to_ne_bytes().to_vec();
        data.extend_from_slice(b"abc");
        let mut reader = data.as_slice();
        let err = reader.read_native().await.unwrap_err();
        assert_eq!(err.kind, CourierErrorKind::StreamRead);
    }
}
