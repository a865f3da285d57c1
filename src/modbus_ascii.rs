// modbus_ascii.rs

use thiserror::Error;
use tracing::{debug, trace};

use crate::buffer::ReceiveBuffer;
use crate::checksum::lrc;
use crate::config::{DEFAULT_ASCII_MAX_BUFFER_LEN, DEFAULT_ASCII_TIMEOUT_MS};
use crate::frame::{Adu, Checksum, ChecksumKind, Direction, Frame, Timestamp, Transport};
use crate::parser::{AsciiParser, FrameParser, Framer};

const START: u8 = b':';
const END: &[u8; 2] = b"\r\n";
const MIN_FRAME_LEN: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Missing ':' start delimiter")]
    MissingStart,

    #[error("Missing CRLF end delimiter")]
    MissingEnd,

    #[error("Invalid hex content: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Frame too short: {0} bytes, expected at least {MIN_FRAME_LEN}")]
    TooShort(usize),
}

/// Build `:<slave><pdu><lrc>\r\n` with uppercase hex digits.
pub fn encode_ascii(slave: u8, pdu: &[u8]) -> String {
    let mut content = Vec::with_capacity(2 + pdu.len());
    content.push(slave);
    content.extend_from_slice(pdu);
    content.push(lrc(&content));

    format!(":{}\r\n", hex::encode_upper(&content))
}

/// Decode one delimited ASCII line into binary address + PDU + LRC.
pub fn decode_ascii_frame(line: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let body = line.strip_prefix(&[START]).ok_or(DecodeError::MissingStart)?;
    let body = body.strip_suffix(END).ok_or(DecodeError::MissingEnd)?;
    decode_body(body)
}

fn decode_body(body: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let decoded = if body.len() % 2 == 1 {
        let mut padded = Vec::with_capacity(body.len() + 1);
        padded.push(b'0');
        padded.extend_from_slice(body);
        hex::decode(padded)?
    } else {
        hex::decode(body)?
    };

    if decoded.len() < MIN_FRAME_LEN {
        return Err(DecodeError::TooShort(decoded.len()));
    }
    Ok(decoded)
}

fn strip_delimiters(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(&[START]).unwrap_or(bytes);
    bytes.strip_suffix(END).unwrap_or(bytes)
}

/// Split decoded bytes (at least [`MIN_FRAME_LEN`]) into address, function, payload and LRC.
fn split_frame(raw: Vec<u8>, trusted: bool) -> Adu {
    let n = raw.len();
    let received = raw[n - 1] as u16;
    let computed = lrc(&raw[..n - 1]) as u16;
    let checksum = if trusted {
        Checksum::trusted(ChecksumKind::Lrc, received, computed)
    } else {
        Checksum::verified(ChecksumKind::Lrc, received, computed)
    };

    Adu {
        slave_address: Some(raw[0]),
        function_code: Some(raw[1]),
        payload: raw[2..n - 1].to_vec(),
        checksum,
        mbap: None,
        raw,
    }
}

/// Delimiter-driven framer for the Modbus ASCII encoding.
#[derive(Debug, Clone)]
pub struct AsciiFramer {
    buffer: ReceiveBuffer,
}

impl AsciiFramer {
    pub fn new(inter_frame_timeout_ms: u64, max_buffer_len: usize) -> Self {
        AsciiFramer {
            buffer: ReceiveBuffer::new(inter_frame_timeout_ms, max_buffer_len),
        }
    }
}

impl Default for AsciiFramer {
    fn default() -> Self {
        AsciiFramer::new(DEFAULT_ASCII_TIMEOUT_MS, DEFAULT_ASCII_MAX_BUFFER_LEN)
    }
}

impl Framer for AsciiFramer {
    fn transport(&self) -> Transport {
        Transport::Ascii
    }

    fn buffer(&self) -> &ReceiveBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut ReceiveBuffer {
        &mut self.buffer
    }

    fn extract(&mut self) -> Vec<Adu> {
        let mut adus = Vec::new();

        loop {
            let Some(start) = self.buffer.as_slice().iter().position(|&b| b == START) else {
                // No frame can begin inside what is buffered.
                let noise = self.buffer.len();
                self.buffer.skip(noise);
                break;
            };
            self.buffer.skip(start);

            let Some(end) = self.buffer.as_slice()[1..]
                .windows(END.len())
                .position(|window| window == END)
                .map(|pos| pos + 1)
            else {
                trace!(buffered = self.buffer.len(), "waiting for ASCII frame terminator");
                break;
            };

            let line_len = end + END.len();
            let decoded = decode_body(&self.buffer.as_slice()[1..end]);
            match decoded {
                Ok(decoded) => {
                    self.buffer.take(line_len);
                    adus.push(split_frame(decoded, false));
                }
                Err(err) => {
                    let text = String::from_utf8_lossy(&self.buffer.as_slice()[..end]);
                    debug!(%err, line = %text, "dropping malformed ASCII frame");
                    self.buffer.reject(line_len);
                }
            }
        }

        adus
    }

    fn send_adu(&self, bytes: &[u8]) -> Option<Adu> {
        if bytes.is_empty() {
            return None;
        }
        match decode_ascii_frame(bytes) {
            Ok(decoded) => Some(split_frame(decoded, true)),
            Err(err) => {
                debug!(%err, "unparseable ASCII send frame");
                Some(Adu::undecodable(
                    strip_delimiters(bytes).to_vec(),
                    ChecksumKind::Lrc,
                ))
            }
        }
    }
}

impl AsciiParser {
    /// Feed already-decoded text, e.g. from a WebSocket bridge that delivers strings.
    pub fn ingest_text(&mut self, text: &str, direction: Direction, now: Timestamp) -> Vec<Frame> {
        self.ingest(text.as_bytes(), direction, now)
    }
}
