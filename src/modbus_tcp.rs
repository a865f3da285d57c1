// modbus_tcp.rs

use tracing::trace;

use crate::buffer::ReceiveBuffer;
use crate::config::{DEFAULT_TCP_MAX_BUFFER_LEN, DEFAULT_TCP_TIMEOUT_MS};
use crate::frame::{Adu, Checksum, ChecksumKind, MbapHeader, Transport};
use crate::parser::Framer;

pub const MBAP_HEADER_LEN: usize = 7;
const MIN_FRAME_LEN: usize = MBAP_HEADER_LEN + 1;
/// Unit id + function code at least, unit id + 253-byte PDU at most.
const MIN_LENGTH_FIELD: u16 = 2;
const MAX_LENGTH_FIELD: u16 = 254;

/// Prefix `unit` + `pdu` with an MBAP header.
pub fn encode_tcp(transaction_id: u16, unit: u8, pdu: &[u8]) -> Vec<u8> {
    let length = (pdu.len() + 1) as u16;
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());

    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]);
    frame.extend_from_slice(&length.to_be_bytes());
    frame.push(unit);
    frame.extend_from_slice(pdu);

    frame
}

/// Read the MBAP header at the start of `buf`.
pub fn parse_mbap_header(buf: &[u8]) -> Option<MbapHeader> {
    let header = buf.get(..MBAP_HEADER_LEN)?;
    Some(MbapHeader {
        transaction_id: u16::from_be_bytes([header[0], header[1]]),
        protocol_id: u16::from_be_bytes([header[2], header[3]]),
        length: u16::from_be_bytes([header[4], header[5]]),
        unit_id: header[6],
    })
}

fn is_plausible(header: &MbapHeader) -> bool {
    header.protocol_id == 0 && (MIN_LENGTH_FIELD..=MAX_LENGTH_FIELD).contains(&header.length)
}

/// Split a frame of at least [`MIN_FRAME_LEN`] bytes.
fn split_frame(raw: Vec<u8>, header: MbapHeader) -> Adu {
    Adu {
        slave_address: Some(header.unit_id),
        function_code: Some(raw[MBAP_HEADER_LEN]),
        payload: raw[MBAP_HEADER_LEN + 1..].to_vec(),
        checksum: Checksum::absent(),
        mbap: Some(header),
        raw,
    }
}

/// MBAP framer for Modbus TCP streams. The header's length field drives extraction.
#[derive(Debug, Clone)]
pub struct TcpFramer {
    buffer: ReceiveBuffer,
}

impl TcpFramer {
    pub fn new(inter_frame_timeout_ms: u64, max_buffer_len: usize) -> Self {
        TcpFramer {
            buffer: ReceiveBuffer::new(inter_frame_timeout_ms, max_buffer_len),
        }
    }
}

impl Default for TcpFramer {
    fn default() -> Self {
        TcpFramer::new(DEFAULT_TCP_TIMEOUT_MS, DEFAULT_TCP_MAX_BUFFER_LEN)
    }
}

impl Framer for TcpFramer {
    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn buffer(&self) -> &ReceiveBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut ReceiveBuffer {
        &mut self.buffer
    }

    fn extract(&mut self) -> Vec<Adu> {
        let mut adus = Vec::new();

        while let Some(header) = parse_mbap_header(self.buffer.as_slice()) {
            if !is_plausible(&header) {
                // Not a header; slide forward one byte and look again.
                self.buffer.skip(1);
                continue;
            }

            let frame_len = MBAP_HEADER_LEN - 1 + header.length as usize;
            if frame_len > self.buffer.len() {
                trace!(
                    expected = frame_len,
                    buffered = self.buffer.len(),
                    "waiting for rest of MBAP frame"
                );
                break;
            }

            let raw = self.buffer.take(frame_len);
            adus.push(split_frame(raw, header));
        }

        adus
    }

    fn send_adu(&self, bytes: &[u8]) -> Option<Adu> {
        if bytes.is_empty() {
            return None;
        }
        match parse_mbap_header(bytes) {
            Some(header) if bytes.len() >= MIN_FRAME_LEN => {
                Some(split_frame(bytes.to_vec(), header))
            }
            _ => Some(Adu::undecodable(bytes.to_vec(), ChecksumKind::None)),
        }
    }
}
