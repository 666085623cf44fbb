//! # Modbus Station - Modbus TCP client and server service layer
//!
//! The protocol core of a Modbus TCP workbench: one crate that can act as a client
//! against a field device or host a server over its own register store, behind a single
//! service contract.
//!
//! ## Features
//!
//! - **Single-gate client**: one request in flight per connection, FIFO ordering,
//!   half-open detection with a non-blocking socket probe
//! - **Idempotent server lifecycle**: bounded shutdown, distinct address-in-use error,
//!   bounds-checked 10,000-slot store with a simulation feed handle
//! - **Link diagnostics**: TCP and Modbus phases probed separately, device exceptions
//!   counted as "responding"
//! - **Value codec**: 1-based/0-based address conversion, float32, ASCII and all four
//!   byte/word swap orders
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Client | Server |
//! |------|----------|--------|--------|
//! | 0x01 | Read Coils | ✅ | ✅ |
//! | 0x02 | Read Discrete Inputs | ✅ | ✅ |
//! | 0x03 | Read Holding Registers | ✅ | ✅ |
//! | 0x04 | Read Input Registers | ✅ | ✅ |
//! | 0x05 | Write Single Coil | ✅ | ✅ |
//! | 0x06 | Write Single Register | ✅ | ✅ |
//! | 0x0F | Write Multiple Coils | ✅ | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ | ✅ |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_station::{ModbusClient, ModbusServer, ModbusResult};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let server = ModbusServer::new();
//!     let addr = server.start("127.0.0.1", 15020).await?;
//!
//!     let client = ModbusClient::new();
//!     if client.connect("127.0.0.1", addr.port()).await {
//!         // UI addresses are 1-based
//!         let values = client.read_holding_registers(1, 1, 4).await;
//!         println!("{:?}", values); // Some([10, 20, 30, 40])
//!     }
//!
//!     client.disconnect().await;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants and service defaults
pub mod constants;

/// Stack-allocated PDU and request/response builders
pub mod pdu;

/// Function codes, exceptions, client requests and server-side request decoding
pub mod protocol;

/// MBAP header and async frame reader
pub mod mbap;

/// Request/response transport over TCP
pub mod transport;

// ============================================================================
// Value handling
// ============================================================================

/// Decoded value types
pub mod value;

/// Byte and word swap orders for register pairs
pub mod bytes;

/// Address conversion and register value codec
pub mod codec;

// ============================================================================
// Services
// ============================================================================

/// Service configuration
pub mod config;

/// In-memory register store
pub mod store;

/// Modbus TCP client
pub mod client;

/// Modbus TCP server
pub mod server;

/// Two-phase reachability diagnostics
pub mod diagnostics;

/// Contract shared by client and server
pub mod service;

/// Client/server selection
pub mod orchestrator;

/// Periodic sampling
pub mod monitor;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use modbus_station::tokio) ===
pub use tokio;

// === Services ===
pub use client::{ClientState, Connector, ModbusClient, TcpConnector};
pub use orchestrator::{ActiveService, ConnectionOrchestrator};
pub use server::{ModbusServer, ServerState, ServerStats};
pub use service::ModbusService;
pub use store::{BufferAccess, RegisterStore};

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Configuration ===
pub use config::{ClientConfig, ConnectionSettings, DiagnosticsConfig, ServerConfig, ServiceMode};

// === Core types ===
pub use bytes::SwapMode;
pub use codec::{AddressCodec, DecodedEntry, UiAddress};
pub use protocol::{ModbusException, ModbusFunction, ModbusRequest, ModbusResponse, UnitId};
pub use value::{DataType, DecodedValue};

// === Diagnostics and monitoring ===
pub use diagnostics::{
    run_diagnostics, run_diagnostics_with, DiagnosticResult, ModbusProbe, ProbeOutcome, TcpProbe,
};
pub use monitor::{Monitor, MonitorArea, MonitorHandle, MonitorPlan, Sample, SampleValues};
pub use transport::{LinkState, ModbusTransport, TcpTransport, TransportStats};

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};

// === PDU (advanced usage) ===
pub use pdu::{ModbusPdu, PduBuilder};

/// Default timeout for operations (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Modbus Station v{} - Modbus TCP client/server service layer", VERSION)
}
