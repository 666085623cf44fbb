//! # Decoded register values
//!
//! Type tags and the values they produce when a register or register pair is
//! interpreted. Values are computed on demand and never stored.

use std::fmt;

/// How a register (pair) is interpreted.
///
/// | Type | Registers | Description |
/// |------|-----------|-------------|
/// | UInt16 | 1 | Unsigned 16-bit |
/// | Int16 | 1 | Two's-complement 16-bit |
/// | Float32 | 2 | IEEE-754 single precision |
/// | Ascii | 1+ | Two ASCII characters per register |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UInt16,
    Int16,
    Float32,
    Ascii,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::UInt16,
        DataType::Int16,
        DataType::Float32,
        DataType::Ascii,
    ];

    /// Parse common type names ("uint16", "u16", "word", "float", ...).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uint16" | "u16" | "word" | "ushort" => Some(Self::UInt16),
            "int16" | "i16" | "short" => Some(Self::Int16),
            "float32" | "f32" | "float" | "real" => Some(Self::Float32),
            "ascii" | "string" | "str" => Some(Self::Ascii),
            _ => None,
        }
    }

    /// Registers one value of this type occupies in a decode matrix cell.
    #[inline]
    pub fn register_count(self) -> usize {
        match self {
            Self::UInt16 | Self::Int16 => 1,
            Self::Float32 | Self::Ascii => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UInt16 => "uint16",
            Self::Int16 => "int16",
            Self::Float32 => "float32",
            Self::Ascii => "ascii",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A register (pair) interpreted under a [`DataType`].
///
/// # Example
///
/// ```rust
/// use modbus_station::DecodedValue;
///
/// let v = DecodedValue::F32(25.5);
/// assert_eq!(v.as_f64(), Some(25.5));
/// assert_eq!(DecodedValue::Ascii("AB".into()).as_f64(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    U16(u16),
    I16(i16),
    F32(f32),
    Ascii(String),
}

impl DecodedValue {
    /// Numeric view for trending and comparisons; text has none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::U16(v) => Some(f64::from(*v)),
            Self::I16(v) => Some(f64::from(*v)),
            Self::F32(v) => Some(f64::from(*v)),
            Self::Ascii(_) => None,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::U16(_) => DataType::UInt16,
            Self::I16(_) => DataType::Int16,
            Self::F32(_) => DataType::Float32,
            Self::Ascii(_) => DataType::Ascii,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U16(v) => write!(f, "{}", v),
            Self::I16(v) => write!(f, "{}", v),
            Self::F32(v) => write!(f, "{}", v),
            Self::Ascii(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<u16> for DecodedValue {
    fn from(v: u16) -> Self {
        Self::U16(v)
    }
}

impl From<i16> for DecodedValue {
    fn from(v: i16) -> Self {
        Self::I16(v)
    }
}

impl From<f32> for DecodedValue {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<&str> for DecodedValue {
    fn from(v: &str) -> Self {
        Self::Ascii(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_parsing() {
        assert_eq!(DataType::from_str("UINT16"), Some(DataType::UInt16));
        assert_eq!(DataType::from_str("short"), Some(DataType::Int16));
        assert_eq!(DataType::from_str("float"), Some(DataType::Float32));
        assert_eq!(DataType::from_str("string"), Some(DataType::Ascii));
        assert_eq!(DataType::from_str("f64"), None);
    }

    #[test]
    fn test_value_views() {
        assert_eq!(DecodedValue::from(-5i16).as_f64(), Some(-5.0));
        assert_eq!(DecodedValue::from(7u16).data_type(), DataType::UInt16);
        assert_eq!(DecodedValue::from("OK").to_string(), "\"OK\"");
        assert_eq!(DecodedValue::F32(1.5).to_string(), "1.5");
    }
}
