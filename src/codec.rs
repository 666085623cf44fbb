//! # Address and value codec
//!
//! Pure conversions shared by the client, the server and the presentation layer:
//!
//! - 1-based UI addresses to 0-based protocol addresses
//! - IEEE-754 float32 across a register pair
//! - ASCII text packed two characters per register
//! - typed decoding of a register pair under any [`SwapMode`]
//!
//! Nothing here fails. Out-of-domain input degrades to the nearest representable result.
//!
//! ## Example
//!
//! ```rust
//! use modbus_station::{AddressCodec, DataType, DecodedValue, SwapMode};
//!
//! assert_eq!(AddressCodec::to_protocol_address(100), 99);
//!
//! let (hi, lo) = AddressCodec::encode_f32(25.5);
//! assert_eq!(AddressCodec::decode_f32(hi, lo), 25.5);
//!
//! let swapped = AddressCodec::decode_value([lo, hi], DataType::Float32, SwapMode::SwapWords);
//! assert_eq!(swapped, DecodedValue::F32(25.5));
//! ```

use crate::bytes::{bytes_to_regs, regs_to_bytes, SwapMode};
use crate::value::{DataType, DecodedValue};

/// Address in the 1-based coordinate system shown to users.
pub type UiAddress = i32;

/// One cell of the type × swap decode table
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntry {
    pub data_type: DataType,
    pub swap: SwapMode,
    pub value: DecodedValue,
}

/// Stateless codec; all functions are associated.
pub struct AddressCodec;

impl AddressCodec {
    /// `max(0, ui - 1)`, saturating at the top of the 16-bit address space.
    #[inline]
    pub fn to_protocol_address(ui_address: UiAddress) -> u16 {
        if ui_address > 0 {
            (ui_address - 1).min(u16::MAX as i32) as u16
        } else {
            0
        }
    }

    #[inline]
    pub fn to_ui_address(protocol_address: u16) -> UiAddress {
        protocol_address as UiAddress + 1
    }

    /// High register first, each register big-endian.
    #[inline]
    pub fn decode_f32(reg_high: u16, reg_low: u16) -> f32 {
        f32::from_be_bytes(regs_to_bytes([reg_high, reg_low]))
    }

    /// Bit-exact inverse of [`decode_f32`](Self::decode_f32).
    #[inline]
    pub fn encode_f32(value: f32) -> (u16, u16) {
        let [high, low] = bytes_to_regs(value.to_be_bytes());
        (high, low)
    }

    /// Non-ASCII characters become `?`; odd lengths get a trailing NUL.
    pub fn encode_ascii_to_registers(text: &str) -> Vec<u16> {
        let mut bytes: Vec<u8> = text
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect();
        if bytes.len() % 2 != 0 {
            bytes.push(0);
        }
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect()
    }

    pub fn decode_register_to_ascii(register: u16) -> String {
        ascii_from_bytes(&register.to_be_bytes())
    }

    pub fn decode_registers_to_ascii(registers: &[u16]) -> String {
        let bytes: Vec<u8> = registers.iter().flat_map(|r| r.to_be_bytes()).collect();
        ascii_from_bytes(&bytes)
    }

    /// Interpret a register pair under a type and swap configuration.
    ///
    /// The swap is applied to the 4-byte buffer first. 16-bit types then read the leading
    /// word of the permuted buffer, float32 reads all four bytes, ASCII renders all four.
    pub fn decode_value(registers: [u16; 2], data_type: DataType, swap: SwapMode) -> DecodedValue {
        let bytes = swap.apply(regs_to_bytes(registers));
        let leading = u16::from_be_bytes([bytes[0], bytes[1]]);
        match data_type {
            DataType::UInt16 => DecodedValue::U16(leading),
            DataType::Int16 => DecodedValue::I16(leading as i16),
            DataType::Float32 => DecodedValue::F32(f32::from_be_bytes(bytes)),
            DataType::Ascii => DecodedValue::Ascii(ascii_from_bytes(&bytes)),
        }
    }

    /// Every (type, swap) interpretation of one register pair, type-major.
    pub fn decode_matrix(registers: [u16; 2]) -> Vec<DecodedEntry> {
        DataType::ALL
            .iter()
            .flat_map(|&data_type| {
                SwapMode::ALL.iter().map(move |&swap| DecodedEntry {
                    data_type,
                    swap,
                    value: Self::decode_value(registers, data_type, swap),
                })
            })
            .collect()
    }

    /// Registers to write for a value under a swap configuration.
    ///
    /// 16-bit values and ASCII only honour the byte swap; word order has no meaning for a
    /// single register.
    pub fn encode_value(value: &DecodedValue, swap: SwapMode) -> Vec<u16> {
        let fix = |reg: u16| if swap.swaps_bytes() { reg.swap_bytes() } else { reg };
        match value {
            DecodedValue::U16(v) => vec![fix(*v)],
            DecodedValue::I16(v) => vec![fix(*v as u16)],
            DecodedValue::F32(v) => bytes_to_regs(swap.apply(v.to_be_bytes())).to_vec(),
            DecodedValue::Ascii(s) => Self::encode_ascii_to_registers(s)
                .into_iter()
                .map(fix)
                .collect(),
        }
    }
}

fn ascii_from_bytes(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    text.trim_matches('\0').to_string()
}
