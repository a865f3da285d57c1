// lib.rs
//
// Modbus frame reconstruction and decoding for a protocol analyzer. Raw bytes come in
// tagged with a direction and a timestamp; decoded frames come out.

mod buffer;
mod checksum;
mod config;
mod frame;
mod interpreter;
mod modbus_ascii;
mod modbus_rtu;
mod modbus_tcp;
mod parser;
mod request;

pub use buffer::ReceiveBuffer;
pub use checksum::{crc16, lrc};
pub use config::{ConfigError, ParserConfig, ParserConfigBuilder, min_buffer_len};
pub use frame::{Adu, Checksum, ChecksumKind, Direction, Frame, MbapHeader, Timestamp, Transport};
pub use interpreter::{
    InterpretedPayload, WriteValues, exception_message, function_name, interpret,
};
pub use modbus_ascii::{AsciiFramer, DecodeError, decode_ascii_frame, encode_ascii};
pub use modbus_rtu::{RtuFramer, encode_rtu, expected_frame_len};
pub use modbus_tcp::{MBAP_HEADER_LEN, TcpFramer, encode_tcp, parse_mbap_header};
pub use parser::{AsciiParser, FrameParser, Framer, Parser, ParserStats, RtuParser, TcpParser};
pub use request::{RegisterType, Request, RequestBuilder, RequestError, diagnostics_pdu};

/// Function code constants.
pub mod function {
    pub use crate::interpreter::{
        DIAGNOSTICS, READ_COILS, READ_DISCRETE_INPUTS, READ_HOLDING_REGISTERS,
        READ_INPUT_REGISTERS, WRITE_MULTIPLE_COILS, WRITE_MULTIPLE_REGISTERS, WRITE_SINGLE_COIL,
        WRITE_SINGLE_REGISTER,
    };
}

#[derive(Debug, thiserror::Error)]
pub enum ModbusAnalyzerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),
}

/// Parser for a transport with default settings.
pub fn parser_for(transport: Transport) -> Box<dyn FrameParser + Send> {
    ParserConfig::for_transport(transport).build_parser()
}

/// Validated read request for `slave`, encoded for `transport`.
pub fn read_request_frame(
    transport: Transport,
    slave: u8,
    register_type: RegisterType,
    address: i32,
    quantity: i32,
) -> Result<Vec<u8>, ModbusAnalyzerError> {
    let request = Request::builder()
        .address(address)
        .quantity(quantity)
        .register_type(register_type)
        .build()?;
    Ok(encode_frame(transport, slave, &request.read_pdu(), 1))
}

/// Build the complete ADU for `pdu` on `transport`, ready for the quick-send list.
///
/// TCP frames use `transaction_id`; serial transports ignore it.
pub fn encode_frame(transport: Transport, slave: u8, pdu: &[u8], transaction_id: u16) -> Vec<u8> {
    match transport {
        Transport::Rtu => encode_rtu(slave, pdu),
        Transport::Ascii => encode_ascii(slave, pdu).into_bytes(),
        Transport::Tcp => encode_tcp(transaction_id, slave, pdu),
    }
}
