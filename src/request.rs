// request.rs
//
// Request PDUs for the quick-send list. Frames built here go out in the send
// direction, which is why the parsers trust their checksums.

use thiserror::Error;

use crate::interpreter::{
    DIAGNOSTICS, READ_COILS, READ_DISCRETE_INPUTS, READ_HOLDING_REGISTERS, READ_INPUT_REGISTERS,
    WRITE_MULTIPLE_COILS, WRITE_MULTIPLE_REGISTERS, WRITE_SINGLE_COIL, WRITE_SINGLE_REGISTER,
};

/// Most coils a single read may ask for.
pub const MAX_READ_BITS: i32 = 2000;
/// Most registers a single read may ask for.
pub const MAX_READ_REGISTERS: i32 = 125;
pub const MAX_WRITE_COILS: usize = 1968;
pub const MAX_WRITE_REGISTERS: usize = 123;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Invalid address: {0} < 0 or {0} > 65535")]
    InvalidAddress(i32),

    #[error("Start address is empty")]
    AddressIsEmpty,

    #[error("Invalid quantity {0} for {1:?}: must be 1..={2}")]
    InvalidQuantity(i32, RegisterType, i32),

    #[error("Invalid range: {0} + {1} = {2} > 65536")]
    RangeOverflow(i32, i32, i32),

    #[error("Register type is empty")]
    RegisterTypeMissing,

    #[error("Type {0:?} has no write command")]
    NotWritable(RegisterType),

    #[error("No values to write")]
    EmptyWrite,

    #[error("Too many values: {actual} > {max}")]
    TooManyValues { max: usize, actual: usize },

    #[error("Value {0} at index {1} overflows u16")]
    ValueOverflow(i32, usize),

    #[error("Invalid coil value {0} at index {1}, expected 0 or 1")]
    InvalidCoilValue(i32, usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegisterType {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl RegisterType {
    pub fn read_function_code(self) -> u8 {
        match self {
            RegisterType::Coil => READ_COILS,
            RegisterType::DiscreteInput => READ_DISCRETE_INPUTS,
            RegisterType::HoldingRegister => READ_HOLDING_REGISTERS,
            RegisterType::InputRegister => READ_INPUT_REGISTERS,
        }
    }

    fn max_read_quantity(self) -> i32 {
        match self {
            RegisterType::Coil | RegisterType::DiscreteInput => MAX_READ_BITS,
            RegisterType::HoldingRegister | RegisterType::InputRegister => MAX_READ_REGISTERS,
        }
    }
}

/// A validated register range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Request {
    start_addr: u16,
    quantity: u16,
    register_type: RegisterType,
}

#[derive(Debug, Default)]
pub struct RequestBuilder {
    start_addr: Option<i32>,
    quantity: Option<i32>,
    register_type: Option<RegisterType>,
}

impl RequestBuilder {
    pub fn address(mut self, addr: i32) -> Self {
        self.start_addr = Some(addr);
        self
    }

    pub fn quantity(mut self, quantity: i32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn register_type(mut self, register_type: RegisterType) -> Self {
        self.register_type = Some(register_type);
        self
    }

    pub fn build(self) -> Result<Request, RequestError> {
        let start_addr = match self.start_addr {
            Some(addr) if !(0..=65535).contains(&addr) => {
                return Err(RequestError::InvalidAddress(addr));
            }
            Some(addr) => addr,
            None => return Err(RequestError::AddressIsEmpty),
        };
        let register_type = self.register_type.ok_or(RequestError::RegisterTypeMissing)?;

        let quantity = self.quantity.unwrap_or(1);
        let max = register_type.max_read_quantity();
        if !(1..=max).contains(&quantity) {
            return Err(RequestError::InvalidQuantity(quantity, register_type, max));
        }

        let end_addr = start_addr + quantity;
        if end_addr > 65536 {
            return Err(RequestError::RangeOverflow(start_addr, quantity, end_addr));
        }

        Ok(Request {
            start_addr: start_addr as u16,
            quantity: quantity as u16,
            register_type,
        })
    }
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn start_address(&self) -> u16 {
        self.start_addr
    }

    pub fn quantity(&self) -> u16 {
        self.quantity
    }

    pub fn register_type(&self) -> RegisterType {
        self.register_type
    }

    /// Read PDU: function code, start address, quantity.
    pub fn read_pdu(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(5);
        pdu.push(self.register_type.read_function_code());
        pdu.extend_from_slice(&self.start_addr.to_be_bytes());
        pdu.extend_from_slice(&self.quantity.to_be_bytes());
        pdu
    }

    /// Write PDU starting at this request's address.
    ///
    /// One value uses the single-write function code, several use write-multiple.
    pub fn write_pdu(&self, data: &[i32]) -> Result<Vec<u8>, RequestError> {
        match self.register_type {
            RegisterType::Coil => self.coil_write_pdu(data),
            RegisterType::HoldingRegister => self.register_write_pdu(data),
            other => Err(RequestError::NotWritable(other)),
        }
    }

    fn register_write_pdu(&self, data: &[i32]) -> Result<Vec<u8>, RequestError> {
        check_len(data, MAX_WRITE_REGISTERS)?;

        let values = data
            .iter()
            .enumerate()
            .map(|(i, &item)| u16::try_from(item).map_err(|_| RequestError::ValueOverflow(item, i)))
            .collect::<Result<Vec<u16>, _>>()?;

        let mut pdu = Vec::with_capacity(6 + values.len() * 2);
        if let [value] = values.as_slice() {
            pdu.push(WRITE_SINGLE_REGISTER);
            pdu.extend_from_slice(&self.start_addr.to_be_bytes());
            pdu.extend_from_slice(&value.to_be_bytes());
            return Ok(pdu);
        }

        pdu.push(WRITE_MULTIPLE_REGISTERS);
        pdu.extend_from_slice(&self.start_addr.to_be_bytes());
        pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
        pdu.push((values.len() * 2) as u8);
        for value in values {
            pdu.extend_from_slice(&value.to_be_bytes());
        }
        Ok(pdu)
    }

    fn coil_write_pdu(&self, data: &[i32]) -> Result<Vec<u8>, RequestError> {
        check_len(data, MAX_WRITE_COILS)?;
        for (i, &val) in data.iter().enumerate() {
            if val != 0 && val != 1 {
                return Err(RequestError::InvalidCoilValue(val, i));
            }
        }

        let mut pdu = Vec::with_capacity(6 + data.len().div_ceil(8));
        if let [value] = data {
            // Single coil: 0xFF00 for ON, 0x0000 for OFF
            pdu.push(WRITE_SINGLE_COIL);
            pdu.extend_from_slice(&self.start_addr.to_be_bytes());
            pdu.push(if *value != 0 { 0xFF } else { 0x00 });
            pdu.push(0x00);
            return Ok(pdu);
        }

        let byte_count = data.len().div_ceil(8);
        let mut bytes = vec![0u8; byte_count];
        for (i, &bit) in data.iter().enumerate() {
            if bit != 0 {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }

        pdu.push(WRITE_MULTIPLE_COILS);
        pdu.extend_from_slice(&self.start_addr.to_be_bytes());
        pdu.extend_from_slice(&(data.len() as u16).to_be_bytes());
        pdu.push(byte_count as u8);
        pdu.extend(bytes);
        Ok(pdu)
    }
}

fn check_len(data: &[i32], max: usize) -> Result<(), RequestError> {
    if data.is_empty() {
        return Err(RequestError::EmptyWrite);
    }
    if data.len() > max {
        return Err(RequestError::TooManyValues {
            max,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Diagnostics (FC 0x08) PDU.
pub fn diagnostics_pdu(sub_function: u16, data: u16) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5);
    pdu.push(DIAGNOSTICS);
    pdu.extend_from_slice(&sub_function.to_be_bytes());
    pdu.extend_from_slice(&data.to_be_bytes());
    pdu
}
