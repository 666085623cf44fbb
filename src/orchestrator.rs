//! Picks the client or the server as the active service
//!
//! The orchestrator owns one of each and routes calls to whichever the current
//! [`ServiceMode`] selects. Switching modes shuts down the side being left.

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::info;

use crate::client::ModbusClient;
use crate::codec::UiAddress;
use crate::config::{ClientConfig, ConnectionSettings, ServerConfig, ServiceMode};
use crate::error::ModbusResult;
use crate::protocol::UnitId;
use crate::server::ModbusServer;
use crate::service::ModbusService;

/// Borrowed view of the selected service.
#[derive(Debug, Clone, Copy)]
pub enum ActiveService<'a> {
    Client(&'a ModbusClient),
    Server(&'a ModbusServer),
}

impl ActiveService<'_> {
    pub fn mode(&self) -> ServiceMode {
        match self {
            Self::Client(_) => ServiceMode::Client,
            Self::Server(_) => ServiceMode::Server,
        }
    }
}

impl ModbusService for ActiveService<'_> {
    async fn is_connected(&self) -> bool {
        match self {
            Self::Client(c) => ModbusService::is_connected(*c).await,
            Self::Server(s) => ModbusService::is_connected(*s).await,
        }
    }

    async fn connect(&self, address: &str, port: u16) -> bool {
        match self {
            Self::Client(c) => ModbusService::connect(*c, address, port).await,
            Self::Server(s) => ModbusService::connect(*s, address, port).await,
        }
    }

    async fn disconnect(&self) {
        match self {
            Self::Client(c) => ModbusService::disconnect(*c).await,
            Self::Server(s) => ModbusService::disconnect(*s).await,
        }
    }

    async fn read_holding_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<u16>>> {
        match self {
            Self::Client(c) => {
                ModbusService::read_holding_registers(*c, unit_id, start, count).await
            }
            Self::Server(s) => {
                ModbusService::read_holding_registers(*s, unit_id, start, count).await
            }
        }
    }

    async fn read_input_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<u16>>> {
        match self {
            Self::Client(c) => ModbusService::read_input_registers(*c, unit_id, start, count).await,
            Self::Server(s) => ModbusService::read_input_registers(*s, unit_id, start, count).await,
        }
    }

    async fn read_coils(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<bool>>> {
        match self {
            Self::Client(c) => ModbusService::read_coils(*c, unit_id, start, count).await,
            Self::Server(s) => ModbusService::read_coils(*s, unit_id, start, count).await,
        }
    }

    async fn read_discrete_inputs(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<bool>>> {
        match self {
            Self::Client(c) => ModbusService::read_discrete_inputs(*c, unit_id, start, count).await,
            Self::Server(s) => ModbusService::read_discrete_inputs(*s, unit_id, start, count).await,
        }
    }

    async fn write_single_register(
        &self,
        unit_id: UnitId,
        address: UiAddress,
        value: u16,
    ) -> ModbusResult<()> {
        match self {
            Self::Client(c) => {
                ModbusService::write_single_register(*c, unit_id, address, value).await
            }
            Self::Server(s) => {
                ModbusService::write_single_register(*s, unit_id, address, value).await
            }
        }
    }

    async fn write_single_coil(
        &self,
        unit_id: UnitId,
        address: UiAddress,
        value: bool,
    ) -> ModbusResult<()> {
        match self {
            Self::Client(c) => ModbusService::write_single_coil(*c, unit_id, address, value).await,
            Self::Server(s) => ModbusService::write_single_coil(*s, unit_id, address, value).await,
        }
    }
}

/// Owns a client and a server and routes to one of them.
///
/// # Example
///
/// ```rust,no_run
/// use modbus_station::{ConnectionOrchestrator, ConnectionSettings, ModbusService};
///
/// # async fn example() -> modbus_station::ModbusResult<()> {
/// let station = ConnectionOrchestrator::new();
/// let settings = ConnectionSettings::server("0.0.0.0", 1502);
/// if station.connect_with(&settings).await {
///     let values = station.active().read_holding_registers(1, 1, 4).await?;
///     println!("{:?}", values);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConnectionOrchestrator {
    client: ModbusClient,
    server: ModbusServer,
    mode: AtomicU8,
}

const MODE_CLIENT: u8 = 0;
const MODE_SERVER: u8 = 1;

impl ConnectionOrchestrator {
    pub fn new() -> Self {
        Self::with_configs(ClientConfig::default(), ServerConfig::default())
    }

    pub fn with_configs(client: ClientConfig, server: ServerConfig) -> Self {
        Self {
            client: ModbusClient::with_config(client),
            server: ModbusServer::with_config(server),
            mode: AtomicU8::new(MODE_CLIENT),
        }
    }

    pub fn mode(&self) -> ServiceMode {
        match self.mode.load(Ordering::Acquire) {
            MODE_SERVER => ServiceMode::Server,
            _ => ServiceMode::Client,
        }
    }

    /// Switch sides, disconnecting the side being left.
    pub async fn set_mode(&self, mode: ServiceMode) {
        let previous = self.mode();
        if previous == mode {
            return;
        }
        self.active().disconnect().await;
        let raw = match mode {
            ServiceMode::Client => MODE_CLIENT,
            ServiceMode::Server => MODE_SERVER,
        };
        self.mode.store(raw, Ordering::Release);
        info!("Service mode changed from {} to {}", previous, mode);
    }

    pub fn active(&self) -> ActiveService<'_> {
        match self.mode() {
            ServiceMode::Client => ActiveService::Client(&self.client),
            ServiceMode::Server => ActiveService::Server(&self.server),
        }
    }

    /// Apply the mode from `settings`, then connect or start on its endpoint.
    pub async fn connect_with(&self, settings: &ConnectionSettings) -> bool {
        self.set_mode(settings.mode).await;
        self.active().connect(&settings.host, settings.port).await
    }

    /// Disconnect whichever side is up.
    pub async fn shutdown(&self) {
        self.client.disconnect().await;
        self.server.stop().await;
    }

    pub fn client(&self) -> &ModbusClient {
        &self.client
    }

    pub fn server(&self) -> &ModbusServer {
        &self.server
    }
}

impl Default for ConnectionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModbusError;

    #[tokio::test]
    async fn test_defaults_to_client() {
        let station = ConnectionOrchestrator::new();
        assert_eq!(station.mode(), ServiceMode::Client);
        assert_eq!(station.active().mode(), ServiceMode::Client);
        assert_eq!(station.active().read_coils(1, 1, 1).await, Ok(None));
    }

    #[tokio::test]
    async fn test_server_mode_routes_to_server() {
        let station = ConnectionOrchestrator::new();
        let settings = ConnectionSettings::server("127.0.0.1", 0);
        assert!(station.connect_with(&settings).await);
        assert_eq!(station.mode(), ServiceMode::Server);
        assert!(station.active().is_connected().await);
        assert_eq!(
            station.active().read_holding_registers(1, 2, 2).await,
            Ok(Some(vec![20, 30]))
        );

        station.set_mode(ServiceMode::Client).await;
        assert!(!station.server().is_running());
        assert_eq!(
            station.server().read_holding_registers(1, 1, 1),
            Err(ModbusError::NotRunning)
        );
    }

    #[tokio::test]
    async fn test_set_same_mode_keeps_service() {
        let station = ConnectionOrchestrator::new();
        assert!(station.connect_with(&ConnectionSettings::server("127.0.0.1", 0)).await);
        station.set_mode(ServiceMode::Server).await;
        assert!(station.server().is_running());
        station.shutdown().await;
        assert!(!station.server().is_running());
    }
}
