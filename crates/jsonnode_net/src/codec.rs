//! Length-prefixed JSON framing.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! UTF-8 JSON text: `[u32 length][payload]`. Exactly one frame travels over
//! each TCP connection, so the codec carries no state between frames.

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CodecError;

/// Size of the length prefix in bytes.
pub const LEN_PREFIX: usize = 4;

/// Encode a JSON value into a complete frame.
///
/// Payloads longer than `u32::MAX` bytes cannot be represented and must not
/// be constructed by callers.
pub fn encode(value: &serde_json::Value) -> Vec<u8> {
    frame(value.to_string().into_bytes())
}

/// Encode any serializable value into a complete frame.
pub fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(frame(serde_json::to_vec(value)?))
}

fn frame(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(LEN_PREFIX + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends before a complete frame has
/// arrived, whether before the length prefix or partway through the payload.
/// A payload that is not valid JSON yields [`CodecError::Json`].
pub async fn read_frame<R>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<serde_json::Value>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LEN_PREFIX];
    if !read_exact_or_eof(reader, &mut len_buf).await? {
        return Ok(None);
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(CodecError::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    if !read_exact_or_eof(reader, &mut payload).await? {
        return Ok(None);
    }

    Ok(Some(serde_json::from_slice(&payload)?))
}

/// Write one frame to `writer` and flush it.
pub async fn write_frame<W>(writer: &mut W, value: &serde_json::Value) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode(value)).await?;
    writer.flush().await?;
    Ok(())
}

/// Decode a frame held entirely in memory.
pub fn decode(bytes: &[u8]) -> Result<Option<serde_json::Value>, CodecError> {
    let Some((len_buf, rest)) = bytes.split_first_chunk::<LEN_PREFIX>() else {
        return Ok(None);
    };
    let len = u32::from_be_bytes(*len_buf) as usize;
    match rest.get(..len) {
        Some(payload) => Ok(Some(serde_json::from_slice(payload)?)),
        None => Ok(None),
    }
}

/// Fill `buf` completely. Returns `false` if the stream closed first.
async fn read_exact_or_eof<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool, CodecError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(CodecError::Io(e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAX: usize = 1 << 20;

    #[test]
    fn test_encode_layout() {
        let bytes = encode(&json!({"k": 1}));
        let text = br#"{"k":1}"#;
        assert_eq!(&bytes[..4], &(text.len() as u32).to_be_bytes());
        assert_eq!(&bytes[4..], text);
    }

    #[test]
    fn test_encode_non_ascii_counts_bytes() {
        let bytes = encode(&json!("héllo ✓"));
        let payload_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(payload_len, bytes.len() - LEN_PREFIX);
        assert!(payload_len > "héllo ✓".chars().count() + 2);
    }

    #[test]
    fn test_decode_roundtrip_values() {
        let values = [
            json!(null),
            json!(true),
            json!(-17),
            json!(3.5),
            json!("text with \"quotes\" and \n newline"),
            json!([1, "two", [3.0, null]]),
            json!({"nested": {"list": [{"a": 1}, {"b": [true, false]}]}, "empty": {}}),
        ];
        for value in values {
            assert_eq!(decode(&encode(&value)).unwrap(), Some(value));
        }
    }

    #[test]
    fn test_float_roundtrip_is_exact() {
        let floats = [
            1.0715660391465826e-75,
            -1.81996730402717e-179,
            -1.603964615428183e143,
            f64::MIN_POSITIVE,
            f64::MAX,
            0.1 + 0.2,
        ];
        for f in floats {
            let decoded = decode(&encode(&json!(f))).unwrap().unwrap();
            assert_eq!(decoded.as_f64().map(f64::to_bits), Some(f.to_bits()), "{f:e}");
        }
    }

    #[test]
    fn test_encode_payload_matches_value_encoding() {
        #[derive(Serialize)]
        struct Hello<'a> {
            #[serde(rename = "Hello")]
            hello: &'a str,
        }
        let typed = encode_payload(&Hello { hello: "There!" }).unwrap();
        assert_eq!(typed, encode(&json!({"Hello": "There!"})));
    }

    #[test]
    fn test_decode_short_input_is_end_of_stream() {
        assert_eq!(decode(&[]).unwrap(), None);
        assert_eq!(decode(&[0, 0]).unwrap(), None);
        assert_eq!(decode(&[0, 0, 0, 100, b'{']).unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_frame_from_stream() {
        let bytes = encode(&json!({"k": [1, 2]}));
        let mut reader = bytes.as_slice();
        let value = read_frame(&mut reader, MAX).await.unwrap();
        assert_eq!(value, Some(json!({"k": [1, 2]})));
    }

    #[tokio::test]
    async fn test_read_frame_empty_stream() {
        let mut reader: &[u8] = &[];
        assert!(read_frame(&mut reader, MAX).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_payload() {
        let mut bytes = 100u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"{\"partial\"");
        let mut reader = bytes.as_slice();
        assert!(read_frame(&mut reader, MAX).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_malformed_json() {
        let payload = b"{not json";
        let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(payload);
        let mut reader = bytes.as_slice();
        let result = read_frame(&mut reader, MAX).await;
        assert!(matches!(result, Err(CodecError::Json(_))));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_prefix() {
        let bytes = u32::MAX.to_be_bytes();
        let mut reader = bytes.as_slice();
        let result = read_frame(&mut reader, MAX).await;
        assert!(matches!(
            result,
            Err(CodecError::FrameTooLarge { len, max }) if len == u32::MAX as usize && max == MAX
        ));
    }

    #[tokio::test]
    async fn test_write_then_read_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let value = json!({"big": "x".repeat(500)});
        let expected = value.clone();

        let writer = tokio::spawn(async move {
            write_frame(&mut client, &value).await.unwrap();
        });

        let received = read_frame(&mut server, MAX).await.unwrap();
        writer.await.unwrap();
        assert_eq!(received, Some(expected));
    }
}
