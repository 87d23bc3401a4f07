//! Frames the TCP byte stream for a chat connection.
//!
//! Inbound traffic is newline-delimited UTF-8 text: the decoder yields one
//! `String` per line (without the terminator). Outbound traffic is one JSON
//! [`Frame`] per line. Both directions share this codec through
//! `tokio_util::codec::Framed`.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::frame::Frame;

/// Maximum inbound line length (including the newline). Anything longer is a
/// protocol violation and terminates the connection.
const MAX_LINE_LENGTH: usize = 4096;

/// Codec error: protocol violation or I/O failure.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("line exceeds maximum length ({MAX_LINE_LENGTH} bytes)")]
    LineTooLong,
    #[error("invalid UTF-8 in line")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("frame serialization failed")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Splits inbound bytes on `\n` (tolerating `\r\n`) and encodes outbound
/// frames as JSON lines.
#[derive(Debug, Default)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let newline = src.iter().position(|&b| b == b'\n');

        match newline {
            Some(pos) => {
                // The cap applies whether or not the terminator has arrived.
                if pos >= MAX_LINE_LENGTH {
                    return Err(CodecError::LineTooLong);
                }
                let line_bytes = src.split_to(pos);
                src.advance(1); // skip \n

                let line = std::str::from_utf8(&line_bytes)?;
                Ok(Some(line.trim_end_matches('\r').to_owned()))
            }
            None => {
                // No complete line yet. Check if buffer is getting too large.
                if src.len() > MAX_LINE_LENGTH {
                    return Err(CodecError::LineTooLong);
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let wire = serde_json::to_string(&item)?;
        dst.reserve(wire.len() + 1);
        dst.put_slice(wire.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::frame::FrameKind;
    use bytes::BytesMut;

    // ── Decoder ──────────────────────────────────────────────────

    #[test]
    fn decode_complete_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("hello everyone\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "hello everyone");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_strips_carriage_return() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("alice\r\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "alice");
    }

    #[test]
    fn decode_partial_line_then_complete() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("/w bob he");

        // Not enough data yet.
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"llo\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "/w bob hello");
    }

    #[test]
    fn decode_two_lines_in_one_read() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("first\nsecond\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "first");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "second");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_rejects_oversized_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(vec![b'A'; MAX_LINE_LENGTH + 1].as_slice());
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::LineTooLong));
    }

    #[test]
    fn decode_rejects_oversized_line_even_with_terminator() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(vec![b'A'; MAX_LINE_LENGTH + 100].as_slice());
        buf.extend_from_slice(b"\n");
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::LineTooLong));
    }

    #[test]
    fn decode_empty_buffer() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(&[0xff, 0xfe, b'\n'][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Utf8(_)));
    }

    // ── Encoder ──────────────────────────────────────────────────

    #[test]
    fn encode_terminates_with_newline() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        codec.encode(Frame::public("alice", "hi"), &mut buf).unwrap();
        assert_eq!(buf.last(), Some(&b'\n'));
        // Exactly one line per frame.
        assert_eq!(buf.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn encoded_frame_parses_back() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        let original = Frame::whisper(Some("alice".into()), "bob", "psst");
        codec.encode(original.clone(), &mut buf).unwrap();

        let line = codec.decode(&mut buf).unwrap().unwrap();
        let decoded: Frame = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.kind, FrameKind::Whisper);
    }
}
