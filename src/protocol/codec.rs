//! Native messaging frame codec.
//!
//! Every message on the channel is a 32-bit little-endian length followed by
//! that many bytes of UTF-8 JSON.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ len: u32 LE  │ JSON document (len bytes)     │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! The handler may send at most [`MAX_INBOUND_MESSAGE_SIZE`] bytes per frame.
//! Outbound frames are bounded only by the length prefix.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Size of the length prefix in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest frame the native handler may send (1 MiB).
pub const MAX_INBOUND_MESSAGE_SIZE: usize = 1024 * 1024;

/// Largest frame the bridge may send.
pub const MAX_OUTBOUND_MESSAGE_SIZE: usize = u32::MAX as usize;

// ============================================================================
// Encoding
// ============================================================================

/// Serializes `message` to JSON and prefixes it with its length.
///
/// # Errors
///
/// - [`Error::Json`] if serialization fails
/// - [`Error::MessageTooLarge`] if the payload does not fit the prefix
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    frame(&body, MAX_OUTBOUND_MESSAGE_SIZE)
}

/// Prefixes an already serialized payload with its length.
///
/// # Errors
///
/// Returns [`Error::MessageTooLarge`] if `body` exceeds `max`.
pub fn frame(body: &[u8], max: usize) -> Result<Vec<u8>> {
    if body.len() > max {
        return Err(Error::message_too_large(body.len(), max));
    }

    let len = u32::try_from(body.len())
        .map_err(|_| Error::message_too_large(body.len(), MAX_OUTBOUND_MESSAGE_SIZE))?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// Writes a complete frame and flushes the writer.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

// ============================================================================
// Decoding
// ============================================================================

/// Reads one frame body.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary.
///
/// # Errors
///
/// - [`Error::MessageTooLarge`] if the announced length exceeds `max`
/// - [`Error::Protocol`] if the stream ends inside a frame
/// - [`Error::Io`] on any other read failure
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;

    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::protocol(format!(
                "truncated frame header ({filled} of {HEADER_LEN} bytes)"
            )));
        }
        filled += n;
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > max {
        return Err(Error::message_too_large(len, max));
    }

    let mut body = vec![0u8; len];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(Some(body)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::protocol(
            format!("truncated frame body (expected {len} bytes)"),
        )),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_test::io::Builder;

    #[test]
    fn test_encode_prefixes_little_endian_length() {
        let frame = encode(&json!({ "a": 1 })).expect("encode");
        let body = br#"{"a":1}"#;
        assert_eq!(&frame[..HEADER_LEN], &(body.len() as u32).to_le_bytes());
        assert_eq!(&frame[HEADER_LEN..], body);
    }

    #[test]
    fn test_frame_rejects_oversized_body() {
        let err = frame(&[0u8; 16], 8).unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { size: 16, max: 8 }));
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof() {
        let mut reader: &[u8] = &[];
        let frame = read_frame(&mut reader, MAX_INBOUND_MESSAGE_SIZE)
            .await
            .expect("clean eof");
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_read_frame_sequence() {
        let mut bytes = encode(&json!("first")).expect("encode");
        bytes.extend(encode(&json!("second")).expect("encode"));
        let mut reader: &[u8] = &bytes;

        let first = read_frame(&mut reader, MAX_INBOUND_MESSAGE_SIZE).await.unwrap();
        let second = read_frame(&mut reader, MAX_INBOUND_MESSAGE_SIZE).await.unwrap();
        let end = read_frame(&mut reader, MAX_INBOUND_MESSAGE_SIZE).await.unwrap();

        assert_eq!(first.as_deref(), Some(&b"\"first\""[..]));
        assert_eq!(second.as_deref(), Some(&b"\"second\""[..]));
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_read_frame_across_chunks() {
        let bytes = encode(&json!({ "response": "ok" })).expect("encode");
        let mut reader = Builder::new()
            .read(&bytes[..2])
            .read(&bytes[2..7])
            .read(&bytes[7..])
            .build();

        let body = read_frame(&mut reader, MAX_INBOUND_MESSAGE_SIZE)
            .await
            .expect("read")
            .expect("frame");
        assert_eq!(body, br#"{"response":"ok"}"#);
    }

    #[tokio::test]
    async fn test_read_frame_truncated_header() {
        let mut reader: &[u8] = &[5, 0];
        let err = read_frame(&mut reader, MAX_INBOUND_MESSAGE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body() {
        let mut reader: &[u8] = &[10, 0, 0, 0, b'{'];
        let err = read_frame(&mut reader, MAX_INBOUND_MESSAGE_SIZE)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("truncated frame body"));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_length() {
        let len = (MAX_INBOUND_MESSAGE_SIZE as u32 + 1).to_le_bytes();
        let mut reader: &[u8] = &len;
        let err = read_frame(&mut reader, MAX_INBOUND_MESSAGE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_write_frame_writes_all_bytes() {
        let frame = encode(&json!({ "url": "https://x/test.zip" })).expect("encode");
        let mut sink = Vec::new();
        write_frame(&mut sink, &frame).await.expect("write");
        assert_eq!(sink, frame);
    }
}
