//! Newline framing over the raw ranging byte stream
//!
//! The ranging firmware emits one text line per measurement round. The
//! serial line is noisy, so a frame may be cut across polls, corrupted, or
//! preceded by garbage. The parser buffers bytes until a terminator, then
//! hands back the line as text. The buffer is cleared on every terminator,
//! whether the line decoded or not, so recovery never splits a line.

use crate::core::constants::FRAME_TERMINATOR;
use thiserror::Error;

/// Framing failures; the offending bytes have already been dropped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("frame of {length} bytes is not valid UTF-8")]
    InvalidText { length: usize },
    #[error("no terminator within {limit} bytes, buffer discarded")]
    Overflow { limit: usize },
}

/// Streaming line reassembler
#[derive(Debug, Clone)]
pub struct FrameParser {
    buffer: Vec<u8>,
    max_frame_len: usize,
    enabled: bool,
    /// Set after an overflow until the next terminator resynchronizes us
    discarding: bool,
    frames_discarded: u64,
}

impl FrameParser {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_frame_len.min(1024)),
            max_frame_len,
            enabled: true,
            discarding: false,
            frames_discarded: 0,
        }
    }

    /// Consume a chunk of bytes and return every frame it completed.
    ///
    /// Bytes after the last terminator stay buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<String, FrameError>> {
        let mut frames = Vec::new();

        for &byte in bytes {
            if byte == FRAME_TERMINATOR {
                if self.discarding {
                    self.discarding = false;
                    self.buffer.clear();
                    continue;
                }
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
                continue;
            }

            if self.discarding {
                continue;
            }

            if self.buffer.len() >= self.max_frame_len {
                self.buffer.clear();
                self.discarding = true;
                self.frames_discarded += 1;
                frames.push(Err(FrameError::Overflow {
                    limit: self.max_frame_len,
                }));
                continue;
            }

            self.buffer.push(byte);
        }

        frames
    }

    fn take_frame(&mut self) -> Option<Result<String, FrameError>> {
        let raw = std::mem::take(&mut self.buffer);

        if !self.enabled {
            return None;
        }

        match String::from_utf8(raw) {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Ok(trimmed.to_string()))
                }
            }
            Err(e) => {
                self.frames_discarded += 1;
                Some(Err(FrameError::InvalidText {
                    length: e.as_bytes().len(),
                }))
            }
        }
    }

    /// Gate decoding; while disabled, completed lines are dropped
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Bytes waiting for a terminator
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn frames_discarded(&self) -> u64 {
        self.frames_discarded
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_split_across_feeds() {
        let mut parser = FrameParser::new(64);

        assert!(parser.feed(b"[200, 200, ").is_empty());
        assert_eq!(parser.buffered_len(), 11);

        let frames = parser.feed(b"200]\n[1");
        assert_eq!(frames, vec![Ok("[200, 200, 200]".to_string())]);
        assert_eq!(parser.buffered_len(), 2);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut parser = FrameParser::new(64);
        let frames = parser.feed(b"[1]\r\n[2]\n\n  \n[3]\n");
        assert_eq!(
            frames,
            vec![
                Ok("[1]".to_string()),
                Ok("[2]".to_string()),
                Ok("[3]".to_string())
            ]
        );
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_invalid_text_clears_buffer() {
        let mut parser = FrameParser::new(64);
        let frames = parser.feed(&[0xFF, 0xFE, b'1', b'\n', b'[', b'2', b']', b'\n']);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Err(FrameError::InvalidText { length: 3 }));
        assert_eq!(frames[1], Ok("[2]".to_string()));
        assert_eq!(parser.frames_discarded(), 1);
    }

    #[test]
    fn test_overflow_resynchronizes_on_terminator() {
        let mut parser = FrameParser::new(8);
        let frames = parser.feed(b"0123456789abcdef\n[5]\n");

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Err(FrameError::Overflow { limit: 8 }));
        assert_eq!(frames[1], Ok("[5]".to_string()));
    }

    #[test]
    fn test_frame_at_limit_is_accepted() {
        let mut parser = FrameParser::new(4);
        assert_eq!(parser.feed(b"abcd\n"), vec![Ok("abcd".to_string())]);

        let frames = parser.feed(b"abcde\n");
        assert_eq!(frames, vec![Err(FrameError::Overflow { limit: 4 })]);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_overflow_tail_is_not_a_frame() {
        let mut parser = FrameParser::new(4);
        let frames = parser.feed(b"abcdefgh");
        assert_eq!(frames, vec![Err(FrameError::Overflow { limit: 4 })]);

        // The rest of the oversized line is skipped, not decoded
        let frames = parser.feed(b"ijk\n[1]\n");
        assert_eq!(frames, vec![Ok("[1]".to_string())]);
    }

    #[test]
    fn test_disabled_parser_drops_lines() {
        let mut parser = FrameParser::new(64);
        parser.set_enabled(false);
        assert!(parser.feed(b"[1, 2]\n").is_empty());
        assert_eq!(parser.buffered_len(), 0);

        parser.set_enabled(true);
        assert_eq!(parser.feed(b"[3]\n"), vec![Ok("[3]".to_string())]);
    }

    #[test]
    fn test_empty_feed_is_noop() {
        let mut parser = FrameParser::new(64);
        assert!(parser.feed(&[]).is_empty());
        parser.feed(b"[1");
        parser.reset();
        assert_eq!(parser.buffered_len(), 0);
    }
}
