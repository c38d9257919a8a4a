//! Text event stream framing
//!
//! Frames are separated by a blank line. `event:` names the kind, `data:`
//! lines are joined with `\n`, lines starting with `:` are comments. Other
//! fields are ignored. The decoder works on raw bytes so a chunk boundary may
//! fall anywhere, including inside a CRLF pair or a multi-byte character.

use std::fmt::Write as _;
use thiserror::Error;

/// Kind used when a frame carries no `event:` field
pub const DEFAULT_EVENT: &str = "message";

/// Longest line the decoder buffers (1 MiB)
pub const DEFAULT_MAX_LINE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SseError {
    #[error("event stream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Incremental frame decoder
#[derive(Debug)]
pub struct SseDecoder {
    line: Vec<u8>,
    max_line: usize,
    // Previous chunk ended in CR; a leading LF belongs to the same terminator.
    skip_lf: bool,
    event: Option<String>,
    data: Vec<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            line: Vec::new(),
            max_line,
            skip_lf: false,
            event: None,
            data: Vec::new(),
        }
    }

    /// Consume a chunk, returning every frame it completes.
    ///
    /// A line longer than the limit is an error; the partial frame is
    /// discarded and the decoder should not be fed again.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, SseError> {
        let mut frames = Vec::new();
        for &byte in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut frames),
                b'\r' => {
                    self.end_line(&mut frames);
                    self.skip_lf = true;
                }
                _ => {
                    if self.line.len() >= self.max_line {
                        self.line = Vec::new();
                        self.event = None;
                        self.data.clear();
                        return Err(SseError::LineTooLong {
                            limit: self.max_line,
                        });
                    }
                    self.line.push(byte);
                }
            }
        }
        Ok(frames)
    }

    /// Flush a trailing frame that was never terminated by a blank line
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.apply_field(&line);
        }
        self.skip_lf = false;
        self.dispatch()
    }

    fn end_line(&mut self, frames: &mut Vec<SseFrame>) {
        let line = std::mem::take(&mut self.line);
        if line.is_empty() {
            frames.extend(self.dispatch());
        } else {
            self.apply_field(&line);
        }
    }

    fn apply_field(&mut self, line: &[u8]) {
        if line.first() == Some(&b':') {
            return;
        }
        let line = String::from_utf8_lossy(line);
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if event.is_none() && data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data: data.join("\n"),
        })
    }
}

/// Render one frame; multi-line data becomes several `data:` lines
pub fn encode_frame(event: &str, data: &str) -> String {
    let mut out = String::with_capacity(event.len() + data.len() + 16);
    let _ = writeln!(out, "event: {}", event);
    for line in data.split('\n') {
        let _ = writeln!(out, "data: {}", line.strip_suffix('\r').unwrap_or(line));
    }
    out.push('\n');
    out
}

pub fn encode_comment(text: &str) -> String {
    format!(": {}\n\n", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<SseFrame> {
        let mut decoder = SseDecoder::new();
        let mut frames: Vec<SseFrame> = chunks
            .iter()
            .flat_map(|c| decoder.feed(c).unwrap())
            .collect();
        frames.extend(decoder.finish());
        frames
    }

    #[test]
    fn test_single_frame() {
        let frames = decode_all(&[b"event: request\ndata: {\"id\":\"r1\"}\n\n"]);
        assert_eq!(frames, vec![SseFrame::new("request", r#"{"id":"r1"}"#)]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let frames = decode_all(&[b"data: first\ndata: second\n\n"]);
        assert_eq!(frames, vec![SseFrame::new("message", "first\nsecond")]);
    }

    #[test]
    fn test_unterminated_frame_flushed() {
        let frames = decode_all(&[b"event: connected\ndata: {}"]);
        assert_eq!(frames, vec![SseFrame::new("connected", "{}")]);
    }

    #[test]
    fn test_comments_and_unknown_fields_ignored() {
        let frames = decode_all(&[b": keepalive\n\nid: 7\nretry: 10\nevent: request\ndata: x\n\n"]);
        assert_eq!(frames, vec![SseFrame::new("request", "x")]);
    }

    #[test]
    fn test_split_anywhere() {
        let input = "event: request\r\ndata: caf\u{e9} \u{1f600}\r\n\r\nevent: comment\ndata: y\n\n";
        let bytes = input.as_bytes();
        let expected = decode_all(&[bytes]);
        assert_eq!(expected.len(), 2);
        assert_eq!(expected[0].data, "caf\u{e9} \u{1f600}");

        for split in 1..bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_all(&[a, b]), expected, "split at {}", split);
        }

        let one_by_one: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&one_by_one), expected);
    }

    #[test]
    fn test_bare_cr_line_endings() {
        let frames = decode_all(&[b"event: a\rdata: 1\r\r"]);
        assert_eq!(frames, vec![SseFrame::new("a", "1")]);
    }

    #[test]
    fn test_only_one_space_stripped() {
        let frames = decode_all(&[b"data:  indented\ndata:tight\n\n"]);
        assert_eq!(frames[0].data, " indented\ntight");
    }

    #[test]
    fn test_empty_frames_not_emitted() {
        assert!(decode_all(&[b"\n\n\n: only a comment\n\n"]).is_empty());
    }

    #[test]
    fn test_encoder_output_decodes() {
        let encoded = encode_frame("request", "line one\nline two");
        assert_eq!(encoded, "event: request\ndata: line one\ndata: line two\n\n");
        assert_eq!(
            decode_all(&[encoded.as_bytes()]),
            vec![SseFrame::new("request", "line one\nline two")]
        );
        assert!(decode_all(&[encode_comment("ping").as_bytes()]).is_empty());
    }

    #[test]
    fn test_line_limit() {
        let mut decoder = SseDecoder::with_max_line(16);
        assert_eq!(
            decoder.feed(b"data: 0123456789\n\n").unwrap(),
            vec![SseFrame::new("message", "0123456789")]
        );

        assert_eq!(decoder.feed(b"data: 0123456789").unwrap(), vec![]);
        assert_eq!(
            decoder.feed(b"abc"),
            Err(SseError::LineTooLong { limit: 16 })
        );
    }

    #[test]
    fn test_default_line_limit_without_newline() {
        let mut decoder = SseDecoder::new();
        let chunk = vec![b'x'; 64 * 1024];
        let mut result = Ok(Vec::new());
        for _ in 0..=(DEFAULT_MAX_LINE / chunk.len()) {
            result = decoder.feed(&chunk);
            if result.is_err() {
                break;
            }
        }
        assert_eq!(
            result,
            Err(SseError::LineTooLong {
                limit: DEFAULT_MAX_LINE
            })
        );
    }
}
