//! Service configuration
//!
//! Plain value structs with defaults and `with_*` builders. Values arrive from the
//! surrounding application (profile storage, command line); nothing here reads files.

use std::fmt;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DIAGNOSTIC_RESPONSE_TIMEOUT, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_MAX_CONNECTIONS, DEFAULT_PROBE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SEED_REGISTERS, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_STORE_CAPACITY, MAX_SEED_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::UnitId;
use crate::DEFAULT_TCP_PORT;

fn require_nonzero(name: &str, value: Duration) -> ModbusResult<()> {
    if value.is_zero() {
        return Err(ModbusError::configuration(format!("{} must be non-zero", name)));
    }
    Ok(())
}

// ============================================================================
// Client
// ============================================================================

/// Timeouts for the outbound client connection.
///
/// # Example
///
/// ```rust
/// use modbus_station::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_request_timeout(Duration::from_millis(500))
///     .with_packet_logging(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Upper bound on the liveness probe behind `is_connected`
    pub probe_timeout: Duration,
    pub packet_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            packet_logging: false,
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    pub fn validate(&self) -> ModbusResult<()> {
        require_nonzero("connect_timeout", self.connect_timeout)?;
        require_nonzero("request_timeout", self.request_timeout)?;
        require_nonzero("probe_timeout", self.probe_timeout)
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Elements per data area
    pub store_capacity: usize,
    /// Holding registers 1..=N seeded with `10 * i`
    pub seed_register_count: usize,
    /// A client silent for this long is disconnected
    pub idle_timeout: Duration,
    /// Bounded wait for the serve loop during stop
    pub shutdown_timeout: Duration,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            store_capacity: DEFAULT_STORE_CAPACITY,
            seed_register_count: DEFAULT_SEED_REGISTERS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl ServerConfig {
    pub fn with_store_capacity(mut self, capacity: usize) -> Self {
        self.store_capacity = capacity;
        self
    }

    pub fn with_seed_register_count(mut self, count: usize) -> Self {
        self.seed_register_count = count;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn validate(&self) -> ModbusResult<()> {
        if self.store_capacity == 0 {
            return Err(ModbusError::configuration("store_capacity must be non-zero"));
        }
        if self.seed_register_count > self.store_capacity {
            return Err(ModbusError::configuration(format!(
                "seed_register_count {} exceeds store_capacity {}",
                self.seed_register_count, self.store_capacity
            )));
        }
        if self.seed_register_count > MAX_SEED_REGISTERS {
            return Err(ModbusError::configuration(format!(
                "seed_register_count {} exceeds {}",
                self.seed_register_count, MAX_SEED_REGISTERS
            )));
        }
        if self.max_connections == 0 {
            return Err(ModbusError::configuration("max_connections must be non-zero"));
        }
        require_nonzero("idle_timeout", self.idle_timeout)?;
        require_nonzero("shutdown_timeout", self.shutdown_timeout)
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_DIAGNOSTIC_RESPONSE_TIMEOUT,
        }
    }
}

impl DiagnosticsConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

// ============================================================================
// Connection settings
// ============================================================================

/// Which side of the protocol the application plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceMode {
    #[default]
    Client,
    Server,
}

impl ServiceMode {
    /// Accepts "client"/"master" and "server"/"slave", any case.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" | "master" => Some(Self::Client),
            "server" | "slave" => Some(Self::Server),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

/// Endpoint, unit and mode chosen by the user
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub mode: ServiceMode,
    /// Remote host in client mode, bind address in server mode
    pub host: String,
    pub port: u16,
    pub unit_id: UnitId,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            mode: ServiceMode::Client,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_TCP_PORT,
            unit_id: 1,
        }
    }
}

impl ConnectionSettings {
    pub fn client<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            mode: ServiceMode::Client,
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn server<S: Into<String>>(bind: S, port: u16) -> Self {
        Self {
            mode: ServiceMode::Server,
            host: bind.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_unit_id(mut self, unit_id: UnitId) -> Self {
        self.unit_id = unit_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let client = ClientConfig::default();
        assert_eq!(client.connect_timeout, Duration::from_secs(5));
        assert_eq!(client.probe_timeout, Duration::from_millis(1));
        assert!(client.validate().is_ok());

        let server = ServerConfig::default();
        assert_eq!(server.store_capacity, 10_000);
        assert_eq!(server.seed_register_count, 16);
        assert!(server.validate().is_ok());

        let settings = ConnectionSettings::default();
        assert_eq!(settings.port, 502);
        assert_eq!(settings.unit_id, 1);
        assert_eq!(settings.mode, ServiceMode::Client);
    }

    #[test]
    fn test_validation_failures() {
        let zero = ClientConfig::default().with_request_timeout(Duration::ZERO);
        assert!(matches!(
            zero.validate(),
            Err(ModbusError::Configuration { .. })
        ));

        let seed_too_big = ServerConfig::default()
            .with_store_capacity(8)
            .with_seed_register_count(16);
        assert!(seed_too_big.validate().is_err());

        assert!(ServerConfig::default().with_max_connections(0).validate().is_err());

        let wraps = ServerConfig::default().with_seed_register_count(7_000);
        assert!(matches!(
            wraps.validate(),
            Err(ModbusError::Configuration { .. })
        ));
        let largest = ServerConfig::default().with_seed_register_count(6_553);
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(ServiceMode::from_str("Server"), Some(ServiceMode::Server));
        assert_eq!(ServiceMode::from_str(" master "), Some(ServiceMode::Client));
        assert_eq!(ServiceMode::from_str("gateway"), None);
        assert_eq!(ServiceMode::Server.to_string(), "server");
    }

    #[test]
    fn test_settings_builders() {
        let s = ConnectionSettings::server("0.0.0.0", 15020).with_unit_id(3);
        assert_eq!(s.mode, ServiceMode::Server);
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.unit_id, 3);
    }
}
