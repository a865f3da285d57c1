// frame.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::interpreter::{self, InterpretedPayload};

/// Caller-supplied receipt time in milliseconds.
pub type Timestamp = u64;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Send,
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => f.write_str("TX"),
            Direction::Receive => f.write_str("RX"),
        }
    }
}

/// Wire encoding of the byte stream a parser is attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Rtu,
    Ascii,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Rtu => f.write_str("RTU"),
            Transport::Ascii => f.write_str("ASCII"),
            Transport::Tcp => f.write_str("TCP"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumKind {
    Crc16,
    Lrc,
    /// TCP frames carry no checksum; the MBAP length is the only integrity check.
    None,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Checksum {
    pub kind: ChecksumKind,
    pub received: u16,
    pub computed: u16,
    pub is_valid: bool,
}

impl Checksum {
    pub(crate) fn verified(kind: ChecksumKind, received: u16, computed: u16) -> Self {
        Checksum {
            kind,
            received,
            computed,
            is_valid: received == computed,
        }
    }

    /// Send-direction frames were built by our own encoder.
    pub(crate) fn trusted(kind: ChecksumKind, received: u16, computed: u16) -> Self {
        Checksum {
            kind,
            received,
            computed,
            is_valid: true,
        }
    }

    pub(crate) fn absent() -> Self {
        Checksum {
            kind: ChecksumKind::None,
            received: 0,
            computed: 0,
            is_valid: true,
        }
    }

    /// No checksum could be located in the frame at all.
    pub(crate) fn unusable(kind: ChecksumKind) -> Self {
        Checksum {
            kind,
            received: 0,
            computed: 0,
            is_valid: false,
        }
    }

    /// False when the frame was too short or too garbled to locate a checksum, so there
    /// was nothing to compare.
    pub fn is_present(&self) -> bool {
        self.is_valid || self.received != self.computed
    }
}

/// Modbus TCP application protocol header.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub length: u16,
    pub unit_id: u8,
}

/// Application data unit cut out of the stream by a framer, before direction and time
/// are attached and before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct Adu {
    pub raw: Vec<u8>,
    pub slave_address: Option<u8>,
    pub function_code: Option<u8>,
    pub payload: Vec<u8>,
    pub checksum: Checksum,
    pub mbap: Option<MbapHeader>,
}

impl Adu {
    /// Too short to hold a checksum; header bytes are kept as far as they go.
    pub(crate) fn truncated(raw: Vec<u8>, kind: ChecksumKind) -> Self {
        Adu {
            slave_address: raw.first().copied(),
            function_code: raw.get(1).copied(),
            raw,
            payload: Vec::new(),
            checksum: Checksum::unusable(kind),
            mbap: None,
        }
    }

    /// Bytes whose encoding could not be decoded at all.
    pub(crate) fn undecodable(raw: Vec<u8>, kind: ChecksumKind) -> Self {
        Adu {
            raw,
            slave_address: None,
            function_code: None,
            payload: Vec::new(),
            checksum: Checksum::unusable(kind),
            mbap: None,
        }
    }
}

/// One decoded Modbus frame as observed on the wire.
///
/// Frames are immutable once the parser has emitted them; all fields are read
/// through accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    transport: Transport,
    raw: Vec<u8>,
    direction: Direction,
    slave_address: Option<u8>,
    function_code: Option<u8>,
    payload: Vec<u8>,
    checksum: Checksum,
    is_exception: bool,
    exception_code: Option<u8>,
    exception_message: Option<&'static str>,
    interpreted: Option<InterpretedPayload>,
    mbap: Option<MbapHeader>,
    timestamp: Timestamp,
}

impl Frame {
    pub(crate) fn new(
        adu: Adu,
        transport: Transport,
        direction: Direction,
        timestamp: Timestamp,
    ) -> Self {
        let is_exception = adu.function_code.is_some_and(|fc| fc >= 0x80);

        let (exception_code, exception_message) = match adu.payload.first() {
            Some(&code) if is_exception => (Some(code), Some(interpreter::exception_message(code))),
            _ => (None, None),
        };

        let interpreted = match adu.function_code {
            Some(fc) if !is_exception && adu.checksum.is_valid => {
                interpreter::interpret(fc, &adu.payload)
            }
            _ => None,
        };

        Frame {
            transport,
            raw: adu.raw,
            direction,
            slave_address: adu.slave_address,
            function_code: adu.function_code,
            payload: adu.payload,
            checksum: adu.checksum,
            is_exception,
            exception_code,
            exception_message,
            interpreted,
            mbap: adu.mbap,
            timestamp,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Exact frame bytes; for ASCII these are the hex-decoded bytes between the delimiters.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn slave_address(&self) -> Option<u8> {
        self.slave_address
    }

    pub fn function_code(&self) -> Option<u8> {
        self.function_code
    }

    /// Function code with the exception bit cleared.
    pub fn original_function_code(&self) -> Option<u8> {
        self.function_code.map(|fc| fc & 0x7F)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    pub fn is_valid(&self) -> bool {
        self.checksum.is_valid
    }

    pub fn is_exception(&self) -> bool {
        self.is_exception
    }

    pub fn exception_code(&self) -> Option<u8> {
        self.exception_code
    }

    pub fn exception_message(&self) -> Option<&'static str> {
        self.exception_message
    }

    pub fn interpreted(&self) -> Option<&InterpretedPayload> {
        self.interpreted.as_ref()
    }

    pub fn mbap(&self) -> Option<&MbapHeader> {
        self.mbap.as_ref()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Raw bytes as space-separated uppercase hex, e.g. `01 03 00 00 00 0A C5 CD`.
    pub fn raw_hex(&self) -> String {
        self.raw
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.timestamp, self.direction, self.transport)?;
        if let Some(slave) = self.slave_address {
            write!(f, " slave={slave}")?;
        }
        if let Some(fc) = self.function_code {
            write!(f, " fc={fc:#04x} ({})", interpreter::function_name(fc))?;
        }
        if let Some(message) = self.exception_message {
            write!(f, " exception: {message}")?;
        }
        if !self.checksum.is_valid {
            f.write_str(" INVALID")?;
        }
        write!(f, " | {}", self.raw_hex())
    }
}
