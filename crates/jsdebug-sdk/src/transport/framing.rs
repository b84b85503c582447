//! `Content-Length` framing of the native debugger socket.
//!
//! On connect the VM sends a header-only frame (`Type: connect`,
//! `V8-Version`, `Protocol-Version`, `Embedding-Host`,
//! `Content-Length: 0`). Every later message is a JSON body behind a
//! `Content-Length` header.

use crate::error::SdkError;

const SEPARATOR: &[u8] = b"\r\n\r\n";

/// Largest body accepted from the peer (64 MiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// Value of the named header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Encode a message body with its `Content-Length` header.
pub fn encode_frame(body: &str) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf
}

/// Decode one frame from the start of `data`.
///
/// Returns the frame and the number of bytes consumed, or `None` when the
/// buffer does not yet hold a complete frame.
pub fn decode_frame(data: &[u8]) -> Result<Option<(Frame, usize)>, SdkError> {
    let Some(sep_pos) = data.windows(SEPARATOR.len()).position(|w| w == SEPARATOR) else {
        return Ok(None);
    };

    let header_part = std::str::from_utf8(&data[..sep_pos])
        .map_err(|e| SdkError::Transport(format!("invalid UTF-8 in header: {e}")))?;
    let headers = parse_headers(header_part);
    let content_length = content_length(&headers)?;

    if content_length > MAX_FRAME_SIZE {
        return Err(SdkError::Transport(format!(
            "frame of {content_length} bytes exceeds the {MAX_FRAME_SIZE} byte limit"
        )));
    }
    let body_start = sep_pos + SEPARATOR.len();
    let total_consumed = body_start
        .checked_add(content_length)
        .ok_or_else(|| SdkError::Transport("Content-Length overflows".into()))?;
    if data.len() < total_consumed {
        return Ok(None);
    }

    let body = std::str::from_utf8(&data[body_start..total_consumed])
        .map_err(|e| SdkError::Transport(format!("invalid UTF-8 in body: {e}")))?
        .to_string();

    Ok(Some((Frame { headers, body }, total_consumed)))
}

fn parse_headers(header: &str) -> Vec<(String, String)> {
    header
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

fn content_length(headers: &[(String, String)]) -> Result<usize, SdkError> {
    let (_, value) = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("Content-Length"))
        .ok_or_else(|| SdkError::Transport("missing Content-Length header".into()))?;
    value.parse::<usize>().map_err(|e| {
        SdkError::Transport(format!("invalid Content-Length value '{value}': {e}"))
    })
}

/// Incremental decoder over a byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next complete frame, if any.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, SdkError> {
        match decode_frame(&self.buf)? {
            Some((frame, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Bytes buffered but not yet decoded.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDSHAKE: &[u8] = b"Type: connect\r\nV8-Version: 3.14.5\r\nProtocol-Version: 1\r\nEmbedding-Host: node v0.10.48\r\nContent-Length: 0\r\n\r\n";

    #[test]
    fn encode_then_decode_request() {
        let body = r#"{"seq":1,"type":"request","command":"version"}"#;
        let encoded = encode_frame(body);
        let s = String::from_utf8(encoded.clone()).unwrap();
        assert!(s.starts_with("Content-Length: 46\r\n\r\n"));

        let (frame, consumed) = decode_frame(&encoded).unwrap().unwrap();
        assert_eq!(frame.body, body);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let body = r#"{"value":"héllo"}"#;
        let encoded = encode_frame(body);
        let (frame, _) = decode_frame(&encoded).unwrap().unwrap();
        assert_eq!(frame.body, body);
    }

    #[test]
    fn handshake_is_a_header_only_frame() {
        let (frame, consumed) = decode_frame(HANDSHAKE).unwrap().unwrap();
        assert!(frame.body.is_empty());
        assert_eq!(frame.header("v8-version"), Some("3.14.5"));
        assert_eq!(frame.header("Embedding-Host"), Some("node v0.10.48"));
        assert_eq!(consumed, HANDSHAKE.len());
    }

    #[test]
    fn missing_content_length() {
        let err = decode_frame(b"Bad-Header: 42\r\n\r\n{}").unwrap_err();
        assert!(
            err.to_string().contains("missing Content-Length"),
            "got: {err}"
        );
    }

    #[test]
    fn invalid_content_length() {
        let err = decode_frame(b"Content-Length: many\r\n\r\n{}").unwrap_err();
        assert!(err.to_string().contains("invalid Content-Length"), "got: {err}");
    }

    #[test]
    fn huge_content_length_is_rejected() {
        let err = decode_frame(b"Content-Length: 18446744073709551615\r\n\r\n{}").unwrap_err();
        assert!(matches!(err, SdkError::Transport(_)));
        assert!(err.to_string().contains("exceeds"), "got: {err}");

        let just_over = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_SIZE + 1);
        assert!(decode_frame(just_over.as_bytes()).is_err());

        let at_limit = format!("Content-Length: {MAX_FRAME_SIZE}\r\n\r\n{{}}");
        assert!(decode_frame(at_limit.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn incomplete_input_is_not_an_error() {
        assert!(decode_frame(b"Content-Length: 100\r\n\r\n{\"short\":true}")
            .unwrap()
            .is_none());
        assert!(decode_frame(b"Content-Length: 2\r\n{}").unwrap().is_none());
    }

    #[test]
    fn decoder_handles_split_and_coalesced_reads() {
        let mut stream = HANDSHAKE.to_vec();
        stream.extend(encode_frame(r#"{"seq":1}"#));
        stream.extend(encode_frame(r#"{"seq":2}"#));

        let mut decoder = FrameDecoder::new();
        let mut bodies = Vec::new();
        for chunk in stream.chunks(7) {
            decoder.push(chunk);
            while let Some(frame) = decoder.next_frame().unwrap() {
                bodies.push(frame.body);
            }
        }
        assert_eq!(bodies, vec!["", r#"{"seq":1}"#, r#"{"seq":2}"#]);
        assert_eq!(decoder.pending_bytes(), 0);
    }
}
