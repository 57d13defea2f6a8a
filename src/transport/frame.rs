//! Length-prefixed frame codec shared by both sides of the proxy.
//!
//! EPP transport (RFC 5734 §4) frames every XML document with a 4-byte
//! big-endian length field that counts itself:
//!
//! ```text
//! +----------------+----------------------+
//! | Total Length   | XML payload          |
//! | 4 bytes (BE32) | (length - 4) bytes   |
//! +----------------+----------------------+
//! ```
//!
//! The codec knows nothing about the payload beyond byte counting; the same
//! functions serve the downstream client sockets and the upstream connection.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::FrameError;
use crate::core::constants::{FRAME_HEADER_SIZE, MIN_FRAME_LEN};

/// Prefix a payload with its length header.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let total = (payload.len() + FRAME_HEADER_SIZE) as u32;
    let mut framed = Vec::with_capacity(payload.len() + FRAME_HEADER_SIZE);
    framed.extend_from_slice(&total.to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Read one complete frame and return its payload.
///
/// Reads exactly four header bytes, then exactly `length - 4` payload bytes,
/// never past the declared length. A declared length below 4 is a
/// [`FrameError::BadLength`]; a stream that ends mid-frame surfaces as
/// [`FrameError::Io`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let declared = u32::from_be_bytes(header);
    if declared < MIN_FRAME_LEN {
        return Err(FrameError::BadLength { declared });
    }

    let mut payload = vec![0u8; declared as usize - FRAME_HEADER_SIZE];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write one payload as a complete frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode(payload)).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let payload = b"<epp><hello/></epp>";
        let framed = encode(payload);
        assert_eq!(framed.len(), payload.len() + 4);
        assert_eq!(&framed[..4], &((payload.len() + 4) as u32).to_be_bytes());

        let mut reader = framed.as_slice();
        let decoded = read_frame(&mut reader).await.unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_round_trip_empty_payload() {
        let framed = encode(b"");
        assert_eq!(framed, vec![0, 0, 0, 4]);

        let mut reader = framed.as_slice();
        let decoded = read_frame(&mut reader).await.unwrap();
        assert!(decoded.is_empty());
    }

    #[tokio::test]
    async fn test_bad_length_rejected() {
        for declared in 0u32..4 {
            let mut framed = declared.to_be_bytes().to_vec();
            framed.extend_from_slice(b"garbage that must not be read");

            let mut reader = framed.as_slice();
            match read_frame(&mut reader).await {
                Err(FrameError::BadLength { declared: got }) => assert_eq!(got, declared),
                other => panic!("expected BadLength, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        // Declares 20 bytes total but carries only 6 of payload.
        let mut framed = 20u32.to_be_bytes().to_vec();
        framed.extend_from_slice(b"<epp/>");

        let mut reader = framed.as_slice();
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(FrameError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_never_reads_past_declared_length() {
        let first = encode(b"<first/>");
        let second = encode(b"<second/>");
        let mut wire = first.clone();
        wire.extend_from_slice(&second);

        let mut reader = wire.as_slice();
        assert_eq!(read_frame(&mut reader).await.unwrap(), b"<first/>");
        assert_eq!(read_frame(&mut reader).await.unwrap(), b"<second/>");
    }

    #[tokio::test]
    async fn test_write_frame_matches_encode() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"<epp/>").await.unwrap();
        assert_eq!(wire, encode(b"<epp/>"));
    }
}
