//! NDJSON frame decoder for the event stream body
//!
//! The body arrives in arbitrary chunks; complete lines are decoded into
//! [`FeedFrame`]s and partial lines stay buffered.

use bytes::{Buf, BytesMut};
use contracts::FeedFrame;

use crate::error::{Result, StreamError};

/// Upper bound for a single buffered line
pub const DEFAULT_MAX_LINE: usize = 16 * 1024 * 1024;

/// Incremental NDJSON decoder
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Prefix of `buf` already known to hold no line terminator
    scanned: usize,
    max_line: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Decoder with the default line limit
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }

    /// Decoder rejecting lines longer than `max_line` bytes
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_line,
        }
    }

    /// Append a body chunk
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes waiting for a line terminator
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete line, skipping blank ones
    ///
    /// Returns `Ok(None)` when more input is needed.
    pub fn next_frame(&mut self) -> Result<Option<FeedFrame>> {
        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = self.buf.len();
                if self.buf.len() > self.max_line {
                    return Err(StreamError::Protocol {
                        message: format!("frame exceeds {} bytes", self.max_line),
                    });
                }
                return Ok(None);
            };

            let line = self.buf.split_to(self.scanned + offset);
            self.buf.advance(1);
            self.scanned = 0;

            if let Some(frame) = decode_line(&line)? {
                return Ok(Some(frame));
            }
        }
    }

    /// Decode whatever remains once the body has ended
    pub fn finish(&mut self) -> Result<Option<FeedFrame>> {
        if let Some(frame) = self.next_frame()? {
            return Ok(Some(frame));
        }
        let rest = self.buf.split();
        self.scanned = 0;
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Result<Option<FeedFrame>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(line)
        .map(Some)
        .map_err(|e| StreamError::Protocol {
            message: format!("invalid frame: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = r#"{"Index":7,"Events":[{"Topic":"Node","Type":"NodeRegistration","Key":"n1","Index":7}]}"#;

    #[test]
    fn test_partial_line_scanned_once() {
        let mut decoder = FrameDecoder::new();
        for chunk in FRAME.as_bytes().chunks(8) {
            decoder.extend(chunk);
            assert!(decoder.next_frame().unwrap().is_none());
            assert_eq!(decoder.scanned, decoder.buffered());
        }

        decoder.extend(b"\n{}\n");
        assert_eq!(decoder.next_frame().unwrap().unwrap().index, 7);
        assert_eq!(decoder.scanned, 0);
        assert!(decoder.next_frame().unwrap().unwrap().is_heartbeat());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_split_line() {
        let mut decoder = FrameDecoder::new();
        let (head, tail) = FRAME.split_at(20);

        decoder.extend(head.as_bytes());
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.extend(tail.as_bytes());
        decoder.extend(b"\n");
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.index, 7);
        assert_eq!(frame.events[0].key, "n1");
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_heartbeats_and_blank_lines() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{}\n\r\n\n");
        decoder.extend(FRAME.as_bytes());
        decoder.extend(b"\r\n");

        assert!(decoder.next_frame().unwrap().unwrap().is_heartbeat());
        assert_eq!(decoder.next_frame().unwrap().unwrap().index, 7);
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_error_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{\"Err\":\"subscription closed by server\"}\n");
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.err.as_deref(), Some("subscription closed by server"));
    }

    #[test]
    fn test_malformed_line() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{\"Index\": \n");
        assert!(matches!(
            decoder.next_frame(),
            Err(StreamError::Protocol { .. })
        ));
    }

    #[test]
    fn test_finish_without_trailing_newline() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(FRAME.as_bytes());
        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.finish().unwrap().unwrap().index, 7);
        assert!(decoder.finish().unwrap().is_none());
    }

    #[test]
    fn test_line_limit() {
        let mut decoder = FrameDecoder::with_max_line(8);
        decoder.extend(b"0123456789");
        assert!(decoder.next_frame().is_err());
    }
}
