//! Error types for the Modbus service layer
//!
//! Every fallible operation in the crate returns [`ModbusResult`]. The variants are grouped
//! the way callers need to react to them:
//!
//! | Group | Variants | Reaction |
//! |-------|----------|----------|
//! | Transport fault | `Io`, `Connection`, `Timeout`, `Frame`, `Protocol` | tear the link down |
//! | Device exception | `Exception` | link stays up, request rejected |
//! | Lifecycle | `NotConnected`, `NotRunning`, `AddressInUse` | fail fast, caller decides |
//! | Caller input | `InvalidData`, `InvalidFunction`, `OutOfRange`, `Configuration` | fix it |

use std::io;

use thiserror::Error;

use crate::protocol::ModbusException;

/// Result alias used throughout the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Errors raised by the codec, store, client, server and diagnostics layers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModbusError {
    /// Low-level socket failure not covered by a more specific variant
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Connect refused, reset, aborted or closed by peer
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// An operation did not finish within its deadline
    #[error("Timeout during {operation} after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Well-formed bytes that violate the protocol (wrong transaction id, bad byte count...)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// MBAP framing is broken
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Function code not supported
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// Caller supplied data that cannot be sent
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// The device answered with a Modbus exception response
    #[error("Modbus exception (function 0x{function:02X}, code 0x{code:02X}): {message}")]
    Exception {
        function: u8,
        code: u8,
        message: String,
    },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Client operation attempted without a live connection
    #[error("Not connected")]
    NotConnected,

    /// Server operation attempted while the server is stopped
    #[error("Server is not running")]
    NotRunning,

    /// Address range falls outside the register store
    #[error("Address out of range: {area} start {start} count {count} exceeds capacity {capacity}")]
    OutOfRange {
        area: &'static str,
        start: i64,
        count: usize,
        capacity: usize,
    },

    /// Listener bind failed because the address is taken
    #[error("Address already in use: {address}")]
    AddressInUse { address: String },

    /// Internal invariant broken (poisoned lock, task panic)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ModbusError {
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn address_in_use<S: Into<String>>(address: S) -> Self {
        Self::AddressInUse {
            address: address.into(),
        }
    }

    /// Build an exception error from the function code and raw exception code of a response.
    pub fn exception(function: u8, code: u8) -> Self {
        let message = ModbusException::from_u8(code)
            .map(|e| e.description().to_string())
            .unwrap_or_else(|| format!("Unknown exception code {}", code));
        Self::Exception {
            function,
            code,
            message,
        }
    }

    /// Faults after which the state of the byte stream is unknown.
    ///
    /// Any of these during an active operation routes through the connection-loss teardown.
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Connection { .. }
                | Self::Timeout { .. }
                | Self::Frame { .. }
                | Self::Protocol { .. }
        )
    }

    pub fn is_device_exception(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Raw Modbus exception code when the device rejected the request.
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Exception { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<io::Error> for ModbusError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::AddrInUse => Self::address_in_use(err.to_string()),
            io::ErrorKind::TimedOut => Self::timeout(err.to_string(), 0),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Self::connection(err.to_string()),
            _ => Self::io(err.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for ModbusError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("operation", 0)
    }
}
