// config.rs

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::Transport;
use crate::modbus_ascii::AsciiFramer;
use crate::modbus_rtu::RtuFramer;
use crate::modbus_tcp::TcpFramer;
use crate::parser::{FrameParser, Parser};

pub const DEFAULT_RTU_TIMEOUT_MS: u64 = 50;
pub const DEFAULT_ASCII_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_TCP_TIMEOUT_MS: u64 = 500;

/// Largest legal RTU ADU.
pub const DEFAULT_RTU_MAX_BUFFER_LEN: usize = 256;
/// ':' + 255 bytes as hex + CRLF.
pub const DEFAULT_ASCII_MAX_BUFFER_LEN: usize = 513;
/// MBAP header + 253-byte PDU.
pub const DEFAULT_TCP_MAX_BUFFER_LEN: usize = 260;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Transport is not set")]
    TransportMissing,

    #[error("Inter-frame timeout must be greater than 0 ms")]
    InvalidTimeout,

    #[error("Buffer length {actual} cannot hold the shortest {transport} frame ({min} bytes)")]
    BufferTooSmall {
        transport: Transport,
        min: usize,
        actual: usize,
    },
}

fn default_timeout_ms(transport: Transport) -> u64 {
    match transport {
        Transport::Rtu => DEFAULT_RTU_TIMEOUT_MS,
        Transport::Ascii => DEFAULT_ASCII_TIMEOUT_MS,
        Transport::Tcp => DEFAULT_TCP_TIMEOUT_MS,
    }
}

/// Smallest cap that still holds the shortest complete frame on the wire.
///
/// RTU: exception response (5 bytes). ASCII: ':' + three hex-encoded bytes + CRLF.
/// TCP: MBAP header + function code.
pub fn min_buffer_len(transport: Transport) -> usize {
    match transport {
        Transport::Rtu => 5,
        Transport::Ascii => 9,
        Transport::Tcp => 8,
    }
}

fn default_max_buffer_len(transport: Transport) -> usize {
    match transport {
        Transport::Rtu => DEFAULT_RTU_MAX_BUFFER_LEN,
        Transport::Ascii => DEFAULT_ASCII_MAX_BUFFER_LEN,
        Transport::Tcp => DEFAULT_TCP_MAX_BUFFER_LEN,
    }
}

/// Per-connection parser settings.
///
/// Deserializes from the host's settings with only `transport` required, e.g.
/// `{"transport": "rtu", "inter_frame_timeout_ms": 20}`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ParserConfigFile")]
pub struct ParserConfig {
    transport: Transport,
    inter_frame_timeout_ms: u64,
    max_buffer_len: usize,
}

#[derive(Deserialize)]
struct ParserConfigFile {
    transport: Transport,
    inter_frame_timeout_ms: Option<u64>,
    max_buffer_len: Option<usize>,
}

impl TryFrom<ParserConfigFile> for ParserConfig {
    type Error = ConfigError;

    fn try_from(file: ParserConfigFile) -> Result<Self, Self::Error> {
        let mut builder = ParserConfig::builder().transport(file.transport);
        if let Some(timeout) = file.inter_frame_timeout_ms {
            builder = builder.inter_frame_timeout_ms(timeout);
        }
        if let Some(max_len) = file.max_buffer_len {
            builder = builder.max_buffer_len(max_len);
        }
        builder.build()
    }
}

#[derive(Debug, Default)]
pub struct ParserConfigBuilder {
    transport: Option<Transport>,
    inter_frame_timeout_ms: Option<u64>,
    max_buffer_len: Option<usize>,
}

impl ParserConfigBuilder {
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn inter_frame_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.inter_frame_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn max_buffer_len(mut self, max_len: usize) -> Self {
        self.max_buffer_len = Some(max_len);
        self
    }

    pub fn build(self) -> Result<ParserConfig, ConfigError> {
        let transport = self.transport.ok_or(ConfigError::TransportMissing)?;

        let inter_frame_timeout_ms = match self.inter_frame_timeout_ms {
            Some(0) => return Err(ConfigError::InvalidTimeout),
            Some(timeout) => timeout,
            None => default_timeout_ms(transport),
        };

        let max_buffer_len = self
            .max_buffer_len
            .unwrap_or_else(|| default_max_buffer_len(transport));
        let min = min_buffer_len(transport);
        if max_buffer_len < min {
            return Err(ConfigError::BufferTooSmall {
                transport,
                min,
                actual: max_buffer_len,
            });
        }

        Ok(ParserConfig {
            transport,
            inter_frame_timeout_ms,
            max_buffer_len,
        })
    }
}

impl ParserConfig {
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder::default()
    }

    /// Defaults for `transport`.
    pub fn for_transport(transport: Transport) -> Self {
        ParserConfig {
            transport,
            inter_frame_timeout_ms: default_timeout_ms(transport),
            max_buffer_len: default_max_buffer_len(transport),
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn inter_frame_timeout_ms(&self) -> u64 {
        self.inter_frame_timeout_ms
    }

    pub fn max_buffer_len(&self) -> usize {
        self.max_buffer_len
    }

    /// A fresh parser for one connection.
    pub fn build_parser(&self) -> Box<dyn FrameParser + Send> {
        let timeout = self.inter_frame_timeout_ms;
        let max_len = self.max_buffer_len;
        match self.transport {
            Transport::Rtu => Box::new(Parser::new(RtuFramer::new(timeout, max_len))),
            Transport::Ascii => Box::new(Parser::new(AsciiFramer::new(timeout, max_len))),
            Transport::Tcp => Box::new(Parser::new(TcpFramer::new(timeout, max_len))),
        }
    }
}
