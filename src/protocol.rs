//! Modbus protocol definitions
//!
//! Function codes, exception codes, the client-side request/response pair and the
//! server-side decoded request.

use std::fmt;

use crate::constants::{
    COIL_OFF, COIL_ON, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{pack_bits, unpack_bits, ModbusPdu, PduBuilder};

/// Modbus unit identifier (sub-address behind one TCP endpoint)
pub type UnitId = u8;

/// Modbus function codes served and issued by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModbusFunction {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
}

impl ModbusFunction {
    pub fn from_u8(value: u8) -> ModbusResult<Self> {
        match value {
            0x01 => Ok(Self::ReadCoils),
            0x02 => Ok(Self::ReadDiscreteInputs),
            0x03 => Ok(Self::ReadHoldingRegisters),
            0x04 => Ok(Self::ReadInputRegisters),
            0x05 => Ok(Self::WriteSingleCoil),
            0x06 => Ok(Self::WriteSingleRegister),
            0x0F => Ok(Self::WriteMultipleCoils),
            0x10 => Ok(Self::WriteMultipleRegisters),
            _ => Err(ModbusError::invalid_function(value)),
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn is_read_function(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
        )
    }

    /// Largest quantity the function may carry in one PDU.
    pub fn max_quantity(self) -> usize {
        match self {
            Self::ReadCoils | Self::ReadDiscreteInputs => MAX_READ_COILS,
            Self::ReadHoldingRegisters | Self::ReadInputRegisters => MAX_READ_REGISTERS,
            Self::WriteSingleCoil | Self::WriteSingleRegister => 1,
            Self::WriteMultipleCoils => MAX_WRITE_COILS,
            Self::WriteMultipleRegisters => MAX_WRITE_REGISTERS,
        }
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (0x{:02X})",
            ModbusPdu::function_code_description(self.to_u8()),
            self.to_u8()
        )
    }
}

/// Standard Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModbusException {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    NegativeAcknowledge = 0x07,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetFailedToRespond = 0x0B,
}

impl ModbusException {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::ServerDeviceFailure),
            0x05 => Some(Self::Acknowledge),
            0x06 => Some(Self::ServerDeviceBusy),
            0x07 => Some(Self::NegativeAcknowledge),
            0x08 => Some(Self::MemoryParityError),
            0x0A => Some(Self::GatewayPathUnavailable),
            0x0B => Some(Self::GatewayTargetFailedToRespond),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server device busy",
            Self::NegativeAcknowledge => "Negative acknowledge",
            Self::MemoryParityError => "Memory parity error",
            Self::GatewayPathUnavailable => "Gateway path unavailable",
            Self::GatewayTargetFailedToRespond => "Gateway target device failed to respond",
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), self.to_u8())
    }
}

// ============================================================================
// Client side
// ============================================================================

/// Request issued by the client, addresses already in protocol (0-based) form
#[derive(Debug, Clone, PartialEq)]
pub struct ModbusRequest {
    pub unit_id: UnitId,
    pub function: ModbusFunction,
    pub address: u16,
    pub quantity: u16,
    /// Write payload: the register value, coil word, packed coils or register bytes
    pub data: Vec<u8>,
}

impl ModbusRequest {
    pub fn new_read(
        unit_id: UnitId,
        function: ModbusFunction,
        address: u16,
        quantity: u16,
    ) -> Self {
        Self {
            unit_id,
            function,
            address,
            quantity,
            data: Vec::new(),
        }
    }

    pub fn new_write_single_register(unit_id: UnitId, address: u16, value: u16) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::WriteSingleRegister,
            address,
            quantity: 1,
            data: value.to_be_bytes().to_vec(),
        }
    }

    pub fn new_write_single_coil(unit_id: UnitId, address: u16, value: bool) -> Self {
        let word = if value { COIL_ON } else { COIL_OFF };
        Self {
            unit_id,
            function: ModbusFunction::WriteSingleCoil,
            address,
            quantity: 1,
            data: word.to_be_bytes().to_vec(),
        }
    }

    pub fn new_write_multiple_registers(unit_id: UnitId, address: u16, values: &[u16]) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::WriteMultipleRegisters,
            address,
            quantity: values.len() as u16,
            data: values.iter().flat_map(|v| v.to_be_bytes()).collect(),
        }
    }

    pub fn new_write_multiple_coils(unit_id: UnitId, address: u16, values: &[bool]) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::WriteMultipleCoils,
            address,
            quantity: values.len() as u16,
            data: pack_bits(values),
        }
    }

    /// Reject requests the wire cannot carry before anything is sent.
    pub fn validate(&self) -> ModbusResult<()> {
        let max = self.function.max_quantity();
        if self.quantity == 0 || self.quantity as usize > max {
            return Err(ModbusError::invalid_data(format!(
                "{} quantity {} outside 1..={}",
                self.function, self.quantity, max
            )));
        }
        if self.address as u32 + self.quantity as u32 > 0x1_0000 {
            return Err(ModbusError::invalid_data(format!(
                "address {} + quantity {} exceeds the 16-bit address space",
                self.address, self.quantity
            )));
        }
        match self.function {
            ModbusFunction::WriteSingleCoil | ModbusFunction::WriteSingleRegister
                if self.data.len() != 2 =>
            {
                Err(ModbusError::invalid_data("single write needs a 2-byte value"))
            }
            ModbusFunction::WriteMultipleRegisters
                if self.data.len() != self.quantity as usize * 2 =>
            {
                Err(ModbusError::invalid_data("register payload does not match quantity"))
            }
            ModbusFunction::WriteMultipleCoils
                if self.data.len() != (self.quantity as usize).div_ceil(8) =>
            {
                Err(ModbusError::invalid_data("coil payload does not match quantity"))
            }
            _ => Ok(()),
        }
    }

    pub fn to_pdu(&self) -> ModbusResult<ModbusPdu> {
        let fc = self.function.to_u8();
        match self.function {
            ModbusFunction::ReadCoils
            | ModbusFunction::ReadDiscreteInputs
            | ModbusFunction::ReadHoldingRegisters
            | ModbusFunction::ReadInputRegisters => {
                PduBuilder::build_read_request(fc, self.address, self.quantity)
            }
            ModbusFunction::WriteSingleCoil | ModbusFunction::WriteSingleRegister => {
                Ok(PduBuilder::new()
                    .function_code(fc)?
                    .word(self.address)?
                    .data(&self.data)?
                    .build())
            }
            ModbusFunction::WriteMultipleCoils | ModbusFunction::WriteMultipleRegisters => {
                Ok(PduBuilder::new()
                    .function_code(fc)?
                    .word(self.address)?
                    .word(self.quantity)?
                    .byte(self.data.len() as u8)?
                    .data(&self.data)?
                    .build())
            }
        }
    }
}

/// Successful response received by the client
#[derive(Debug, Clone, PartialEq)]
pub struct ModbusResponse {
    pub unit_id: UnitId,
    pub function: ModbusFunction,
    /// PDU bytes after the function code
    pub data: Vec<u8>,
}

impl ModbusResponse {
    pub fn new_success(unit_id: UnitId, function: ModbusFunction, data: Vec<u8>) -> Self {
        Self {
            unit_id,
            function,
            data,
        }
    }

    /// Interpret a received PDU; exception responses become [`ModbusError::Exception`].
    pub fn from_pdu(unit_id: UnitId, pdu: &ModbusPdu) -> ModbusResult<Self> {
        let fc = pdu
            .function_code()
            .ok_or_else(|| ModbusError::frame("empty response PDU"))?;
        if pdu.is_exception() {
            let code = pdu
                .exception_code()
                .ok_or_else(|| ModbusError::frame("exception response without a code"))?;
            return Err(ModbusError::exception(fc & 0x7F, code));
        }
        Ok(Self::new_success(
            unit_id,
            ModbusFunction::from_u8(fc)?,
            pdu.payload().to_vec(),
        ))
    }

    /// Register values of an FC03/FC04 response, checked against the requested count.
    pub fn parse_registers(&self, expected: u16) -> ModbusResult<Vec<u16>> {
        let (&byte_count, body) = self
            .data
            .split_first()
            .ok_or_else(|| ModbusError::protocol("register response without byte count"))?;
        if byte_count as usize != expected as usize * 2 || body.len() != byte_count as usize {
            return Err(ModbusError::protocol(format!(
                "register response carries {} bytes ({} declared), expected {}",
                body.len(),
                byte_count,
                expected as usize * 2
            )));
        }
        Ok(body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Bit states of an FC01/FC02 response, truncated to the requested count.
    pub fn parse_bits(&self, expected: u16) -> ModbusResult<Vec<bool>> {
        let (&byte_count, body) = self
            .data
            .split_first()
            .ok_or_else(|| ModbusError::protocol("bit response without byte count"))?;
        let needed = (expected as usize).div_ceil(8);
        if byte_count as usize != needed || body.len() != needed {
            return Err(ModbusError::protocol(format!(
                "bit response carries {} bytes ({} declared), expected {}",
                body.len(),
                byte_count,
                needed
            )));
        }
        Ok(unpack_bits(body, expected as usize))
    }

    /// Check that a write response echoes the request.
    pub fn check_write_echo(&self, request: &ModbusRequest) -> ModbusResult<()> {
        if self.function != request.function {
            return Err(ModbusError::protocol(format!(
                "response function {} does not match request {}",
                self.function, request.function
            )));
        }
        let mut expected = request.address.to_be_bytes().to_vec();
        match request.function {
            ModbusFunction::WriteSingleCoil | ModbusFunction::WriteSingleRegister => {
                expected.extend_from_slice(&request.data)
            }
            _ => expected.extend_from_slice(&request.quantity.to_be_bytes()),
        }
        if self.data != expected {
            return Err(ModbusError::protocol("write response does not echo the request"));
        }
        Ok(())
    }
}

// ============================================================================
// Server side
// ============================================================================

/// Request decoded by the server, addresses still in protocol (0-based) form
#[derive(Debug, Clone, PartialEq)]
pub enum ServerRequest {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, values: Vec<bool> },
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
}

impl ServerRequest {
    /// Decode a request PDU, mapping every rejection to the exception the server answers with.
    pub fn from_pdu(pdu: &ModbusPdu) -> Result<Self, ModbusException> {
        let fc = pdu
            .function_code()
            .ok_or(ModbusException::IllegalFunction)?;
        let function =
            ModbusFunction::from_u8(fc).map_err(|_| ModbusException::IllegalFunction)?;

        let address = pdu
            .payload_u16(0)
            .ok_or(ModbusException::IllegalDataValue)?;
        let word = pdu
            .payload_u16(2)
            .ok_or(ModbusException::IllegalDataValue)?;

        let check_quantity = |quantity: u16| {
            if quantity == 0 || quantity as usize > function.max_quantity() {
                Err(ModbusException::IllegalDataValue)
            } else {
                Ok(quantity)
            }
        };

        let request = match function {
            ModbusFunction::ReadCoils => Self::ReadCoils {
                address,
                quantity: check_quantity(word)?,
            },
            ModbusFunction::ReadDiscreteInputs => Self::ReadDiscreteInputs {
                address,
                quantity: check_quantity(word)?,
            },
            ModbusFunction::ReadHoldingRegisters => Self::ReadHoldingRegisters {
                address,
                quantity: check_quantity(word)?,
            },
            ModbusFunction::ReadInputRegisters => Self::ReadInputRegisters {
                address,
                quantity: check_quantity(word)?,
            },
            ModbusFunction::WriteSingleCoil => Self::WriteSingleCoil {
                address,
                value: match word {
                    COIL_ON => true,
                    COIL_OFF => false,
                    _ => return Err(ModbusException::IllegalDataValue),
                },
            },
            ModbusFunction::WriteSingleRegister => Self::WriteSingleRegister {
                address,
                value: word,
            },
            ModbusFunction::WriteMultipleCoils => {
                let quantity = check_quantity(word)?;
                let body = Self::counted_body(pdu, (quantity as usize).div_ceil(8))?;
                Self::WriteMultipleCoils {
                    address,
                    values: unpack_bits(body, quantity as usize),
                }
            }
            ModbusFunction::WriteMultipleRegisters => {
                let quantity = check_quantity(word)?;
                let body = Self::counted_body(pdu, quantity as usize * 2)?;
                Self::WriteMultipleRegisters {
                    address,
                    values: body
                        .chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                        .collect(),
                }
            }
        };
        Ok(request)
    }

    // byte count at payload[4], data after it; both must match what the quantity implies
    fn counted_body(pdu: &ModbusPdu, expected: usize) -> Result<&[u8], ModbusException> {
        let payload = pdu.payload();
        let byte_count = *payload.get(4).ok_or(ModbusException::IllegalDataValue)? as usize;
        let body = &payload[5..];
        if byte_count != expected || body.len() != expected {
            return Err(ModbusException::IllegalDataValue);
        }
        Ok(body)
    }

    pub fn function(&self) -> ModbusFunction {
        match self {
            Self::ReadCoils { .. } => ModbusFunction::ReadCoils,
            Self::ReadDiscreteInputs { .. } => ModbusFunction::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => ModbusFunction::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => ModbusFunction::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => ModbusFunction::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => ModbusFunction::WriteSingleRegister,
            Self::WriteMultipleCoils { .. } => ModbusFunction::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => ModbusFunction::WriteMultipleRegisters,
        }
    }
}
