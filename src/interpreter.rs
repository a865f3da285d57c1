// interpreter.rs
//
// Function-code-specific decoding of a validated PDU payload (the bytes after the
// function code, checksum excluded).

use serde::Serialize;

/// Values carried by a write-multiple request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteValues {
    Coils(Vec<bool>),
    Registers(Vec<u16>),
}

/// Semantic content of a recognized, checksum-valid, non-exception frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterpretedPayload {
    /// Request for FC 0x01..=0x04.
    ReadRequest { start_address: u16, quantity: u16 },
    /// Response to FC 0x01/0x02. The quantity asked for is not in the response, so every
    /// bit of every data byte is listed, LSB first.
    BitRead { byte_count: u8, bits: Vec<bool> },
    /// Response to FC 0x03/0x04.
    RegisterRead { byte_count: u8, registers: Vec<u16> },
    /// FC 0x05 (value is 1 for ON, 0 otherwise) and FC 0x06.
    SingleWrite { address: u16, value: u16 },
    /// FC 0x0F/0x10. `values` is only present on requests.
    MultiWrite {
        start_address: u16,
        quantity: u16,
        byte_count: Option<u8>,
        values: Option<WriteValues>,
    },
    /// FC 0x08.
    Diagnostics { sub_function: u16, data: u16 },
}

pub const READ_COILS: u8 = 0x01;
pub const READ_DISCRETE_INPUTS: u8 = 0x02;
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const READ_INPUT_REGISTERS: u8 = 0x04;
pub const WRITE_SINGLE_COIL: u8 = 0x05;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const DIAGNOSTICS: u8 = 0x08;
pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Decode `payload` for `function_code`.
///
/// Returns `None` for exception and unrecognized function codes, and for payloads too
/// short for the shape their function code implies.
pub fn interpret(function_code: u8, payload: &[u8]) -> Option<InterpretedPayload> {
    match function_code {
        READ_COILS | READ_DISCRETE_INPUTS => interpret_read(payload, false),
        READ_HOLDING_REGISTERS | READ_INPUT_REGISTERS => interpret_read(payload, true),
        WRITE_SINGLE_COIL => {
            let (address, raw) = two_words(payload)?;
            Some(InterpretedPayload::SingleWrite {
                address,
                value: u16::from(raw == 0xFF00),
            })
        }
        WRITE_SINGLE_REGISTER => {
            let (address, value) = two_words(payload)?;
            Some(InterpretedPayload::SingleWrite { address, value })
        }
        WRITE_MULTIPLE_COILS | WRITE_MULTIPLE_REGISTERS => {
            interpret_write_multiple(function_code, payload)
        }
        DIAGNOSTICS => {
            let (sub_function, data) = two_words(payload)?;
            Some(InterpretedPayload::Diagnostics { sub_function, data })
        }
        _ => None,
    }
}

/// Human readable exception description.
pub fn exception_message(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Error",
    }
}

/// Display name of a function code; the exception bit is ignored.
pub fn function_name(function_code: u8) -> &'static str {
    match function_code & 0x7F {
        READ_COILS => "Read Coils",
        READ_DISCRETE_INPUTS => "Read Discrete Inputs",
        READ_HOLDING_REGISTERS => "Read Holding Registers",
        READ_INPUT_REGISTERS => "Read Input Registers",
        WRITE_SINGLE_COIL => "Write Single Coil",
        WRITE_SINGLE_REGISTER => "Write Single Register",
        DIAGNOSTICS => "Diagnostics",
        WRITE_MULTIPLE_COILS => "Write Multiple Coils",
        WRITE_MULTIPLE_REGISTERS => "Write Multiple Registers",
        _ => "Unknown Function",
    }
}

fn word(bytes: &[u8], offset: usize) -> Option<u16> {
    let hi = *bytes.get(offset)?;
    let lo = *bytes.get(offset + 1)?;
    Some(u16::from_be_bytes([hi, lo]))
}

fn two_words(payload: &[u8]) -> Option<(u16, u16)> {
    Some((word(payload, 0)?, word(payload, 2)?))
}

fn unpack_bits(data: &[u8]) -> Vec<bool> {
    data.iter()
        .flat_map(|&byte| (0..8).map(move |bit| (byte >> bit) & 0x01 == 1))
        .collect()
}

fn unpack_registers(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

// Requests and responses share a function code; the payload length tells them apart.
// A response is `byte_count` followed by exactly that many bytes, a request is a
// fixed start address + quantity.
fn interpret_read(payload: &[u8], registers: bool) -> Option<InterpretedPayload> {
    let byte_count = *payload.first()?;
    let data = &payload[1..];
    let is_response = data.len() == byte_count as usize && (!registers || byte_count % 2 == 0);

    if is_response {
        return Some(if registers {
            InterpretedPayload::RegisterRead {
                byte_count,
                registers: unpack_registers(data),
            }
        } else {
            InterpretedPayload::BitRead {
                byte_count,
                bits: unpack_bits(data),
            }
        });
    }

    if payload.len() == 4 {
        let (start_address, quantity) = two_words(payload)?;
        return Some(InterpretedPayload::ReadRequest {
            start_address,
            quantity,
        });
    }

    None
}

fn interpret_write_multiple(function_code: u8, payload: &[u8]) -> Option<InterpretedPayload> {
    let (start_address, quantity) = two_words(payload)?;

    let (byte_count, values) = match payload.get(4) {
        Some(&byte_count) => {
            let end = (5 + byte_count as usize).min(payload.len());
            let data = &payload[5..end];
            let values = if function_code == WRITE_MULTIPLE_COILS {
                let mut bits = unpack_bits(data);
                bits.truncate(quantity as usize);
                WriteValues::Coils(bits)
            } else {
                let mut registers = unpack_registers(data);
                registers.truncate(quantity as usize);
                WriteValues::Registers(registers)
            };
            (Some(byte_count), Some(values))
        }
        None => (None, None),
    };

    Some(InterpretedPayload::MultiWrite {
        start_address,
        quantity,
        byte_count,
        values,
    })
}
