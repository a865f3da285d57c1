// modbus_rtu.rs

use tracing::trace;

use crate::buffer::ReceiveBuffer;
use crate::checksum::crc16;
use crate::config::{DEFAULT_RTU_MAX_BUFFER_LEN, DEFAULT_RTU_TIMEOUT_MS};
use crate::frame::{Adu, Checksum, ChecksumKind, Transport};
use crate::parser::Framer;

const CRC_LEN: usize = 2;
const MIN_FRAME_LEN: usize = 4;

/// Append the CRC (low byte first) to `slave` + `pdu`.
pub fn encode_rtu(slave: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + pdu.len() + CRC_LEN);
    frame.push(slave);
    frame.extend_from_slice(pdu);

    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Guess the total length of the RTU frame starting at `buf[0]`.
///
/// RTU has no length field, so the guess is driven by the function code. Returns
/// `None` while too few bytes are buffered to tell.
pub fn expected_frame_len(buf: &[u8]) -> Option<usize> {
    let function_code = *buf.get(1)?;
    match function_code {
        0x80..=0xFF => Some(5),
        0x01..=0x04 => buf.get(2).map(|&byte_count| 5 + byte_count as usize),
        0x05 | 0x06 | 0x08 => Some(8),
        0x0F | 0x10 => {
            if buf.len() < 8 {
                return None;
            }
            // A write-multiple response is a fixed 8 bytes; a request carries its
            // byte count at offset 6.
            if crc_matches(&buf[..8]) {
                Some(8)
            } else {
                Some(9 + buf[6] as usize)
            }
        }
        _ => Some(8),
    }
}

fn received_crc(frame: &[u8]) -> u16 {
    let n = frame.len();
    u16::from_le_bytes([frame[n - 2], frame[n - 1]])
}

fn crc_matches(frame: &[u8]) -> bool {
    frame.len() >= MIN_FRAME_LEN && received_crc(frame) == crc16(&frame[..frame.len() - CRC_LEN])
}

/// Split a complete RTU frame (at least [`MIN_FRAME_LEN`] bytes) into its parts.
fn split_frame(raw: Vec<u8>, trusted: bool) -> Adu {
    let n = raw.len();
    let received = received_crc(&raw);
    let computed = crc16(&raw[..n - CRC_LEN]);
    let checksum = if trusted {
        Checksum::trusted(ChecksumKind::Crc16, received, computed)
    } else {
        Checksum::verified(ChecksumKind::Crc16, received, computed)
    };

    Adu {
        slave_address: Some(raw[0]),
        function_code: Some(raw[1]),
        payload: raw[2..n - CRC_LEN].to_vec(),
        checksum,
        mbap: None,
        raw,
    }
}

/// Binary RTU framer.
///
/// Frame boundaries come from a per-function-code length estimate; the inter-frame
/// timeout only clears fragments that never completed.
#[derive(Debug, Clone)]
pub struct RtuFramer {
    buffer: ReceiveBuffer,
}

impl RtuFramer {
    pub fn new(inter_frame_timeout_ms: u64, max_buffer_len: usize) -> Self {
        RtuFramer {
            buffer: ReceiveBuffer::new(inter_frame_timeout_ms, max_buffer_len),
        }
    }
}

impl Default for RtuFramer {
    fn default() -> Self {
        RtuFramer::new(DEFAULT_RTU_TIMEOUT_MS, DEFAULT_RTU_MAX_BUFFER_LEN)
    }
}

impl Framer for RtuFramer {
    fn transport(&self) -> Transport {
        Transport::Rtu
    }

    fn buffer(&self) -> &ReceiveBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut ReceiveBuffer {
        &mut self.buffer
    }

    fn extract(&mut self) -> Vec<Adu> {
        let mut adus = Vec::new();

        while self.buffer.len() >= MIN_FRAME_LEN {
            let Some(frame_len) = expected_frame_len(self.buffer.as_slice()) else {
                break;
            };
            if frame_len > self.buffer.max_len() {
                self.buffer.overflow();
                break;
            }
            if frame_len > self.buffer.len() {
                trace!(
                    expected = frame_len,
                    buffered = self.buffer.len(),
                    "waiting for rest of RTU frame"
                );
                break;
            }

            let raw = self.buffer.take(frame_len);
            adus.push(split_frame(raw, false));
        }

        adus
    }

    fn send_adu(&self, bytes: &[u8]) -> Option<Adu> {
        match bytes.len() {
            0 => None,
            n if n < MIN_FRAME_LEN => Some(Adu::truncated(bytes.to_vec(), ChecksumKind::Crc16)),
            _ => Some(split_frame(bytes.to_vec(), true)),
        }
    }
}
