//! DATA transparency (RFC 5321 §4.5.2).
//!
//! [`DataEncoder`] turns an arbitrary byte stream into the form expected
//! between `DATA` and the terminating `.` line: bare `\n` becomes `\r\n` and
//! a `.` at the start of a line is doubled. The encoder keeps just enough
//! state to work across chunk boundaries, so a body can be relayed in pieces
//! without ever being held in memory as a whole.

use bytes::{BufMut, BytesMut};

/// Streaming line-ending normalizer and dot-stuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataEncoder {
    at_line_start: bool,
    last_cr: bool,
}

impl Default for DataEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DataEncoder {
    /// Creates an encoder positioned at the start of the message.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            at_line_start: true,
            last_cr: false,
        }
    }

    /// Encodes one chunk of the message into `out`.
    pub fn encode(&mut self, chunk: &[u8], out: &mut BytesMut) {
        out.reserve(chunk.len() + chunk.len() / 16 + 2);

        let mut start = 0;
        for (idx, &byte) in chunk.iter().enumerate() {
            match byte {
                b'\n' => {
                    if !self.last_cr {
                        out.extend_from_slice(&chunk[start..idx]);
                        out.put_u8(b'\r');
                        start = idx;
                    }
                    self.last_cr = false;
                    self.at_line_start = true;
                }
                b'.' if self.at_line_start => {
                    out.extend_from_slice(&chunk[start..idx]);
                    out.put_u8(b'.');
                    start = idx;
                    self.last_cr = false;
                    self.at_line_start = false;
                }
                b'\r' => {
                    self.last_cr = true;
                    self.at_line_start = false;
                }
                _ => {
                    self.last_cr = false;
                    self.at_line_start = false;
                }
            }
        }
        out.extend_from_slice(&chunk[start..]);
    }

    /// Writes the end-of-data marker and resets the encoder.
    ///
    /// The marker always starts on a fresh line: content that did not end
    /// with a line break gets one first.
    pub fn finish(&mut self, out: &mut BytesMut) {
        let terminator: &[u8] = if self.at_line_start {
            b".\r\n"
        } else if self.last_cr {
            b"\n.\r\n"
        } else {
            b"\r\n.\r\n"
        };
        out.extend_from_slice(terminator);
        *self = Self::new();
    }
}
