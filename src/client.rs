//! Modbus TCP client with a single I/O gate
//!
//! [`ModbusClient`] owns at most one connection. Every operation, including connect,
//! disconnect and the liveness probe behind [`is_connected`](ModbusClient::is_connected),
//! acquires the same FIFO gate, so exactly one request is on the wire at a time and
//! callers complete in the order they queued.
//!
//! # Failure policy
//!
//! | Outcome | Result | Connection |
//! |---------|--------|------------|
//! | Not connected | `None` / no-op | stays down |
//! | Transport fault (reset, timeout, bad frame) | `None` / no-op | torn down |
//! | Device exception | `None` / no-op | kept, state `Faulted` |
//! | Invalid request (count 0, over limit) | `None` / no-op | kept |
//!
//! Nothing is retried internally; reconnecting is the caller's decision.
//!
//! # Addressing
//!
//! Addresses passed in are 1-based and converted with
//! [`AddressCodec::to_protocol_address`] before transmission.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use modbus_station::ModbusClient;
//!
//! # async fn example() {
//! let client = ModbusClient::new();
//! if client.connect("127.0.0.1", 502).await {
//!     // registers 1..=4 of unit 1
//!     if let Some(values) = client.read_holding_registers(1, 1, 4).await {
//!         println!("{:?}", values);
//!     }
//!     client.write_single_register(1, 5, 999).await;
//!     client.disconnect().await;
//! }
//! # }
//! ```
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::codec::{AddressCodec, UiAddress};
use crate::config::{ClientConfig, DiagnosticsConfig};
use crate::diagnostics::{run_diagnostics_with, DiagnosticResult};
use crate::error::ModbusResult;
use crate::protocol::{ModbusFunction, ModbusRequest, ModbusResponse, UnitId};
use crate::transport::{ModbusTransport, TcpTransport, TransportStats};

// ============================================================================
// Connector
// ============================================================================

/// Opens transports for a [`ModbusClient`].
pub trait Connector: Send + Sync {
    type Transport: ModbusTransport + 'static;

    fn connect(
        &self,
        host: &str,
        port: u16,
        config: &ClientConfig,
    ) -> impl Future<Output = ModbusResult<Self::Transport>> + Send;
}

/// Plain TCP connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        config: &ClientConfig,
    ) -> ModbusResult<TcpTransport> {
        let mut transport = TcpTransport::connect(
            host,
            port,
            config.connect_timeout,
            config.request_timeout,
        )
        .await?;
        transport.set_packet_logging(config.packet_logging);
        Ok(transport)
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    /// Connected, but the device answered the last request with an exception
    Faulted = 3,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Faulted,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

struct Link<T> {
    transport: T,
    endpoint: String,
}

// ============================================================================
// Client
// ============================================================================

/// Modbus TCP client owning one connection behind a FIFO gate.
///
/// Share it across tasks with `Arc`; all methods take `&self`.
pub struct ModbusClient<C: Connector = TcpConnector> {
    connector: C,
    config: ClientConfig,
    /// `Some` exactly while connected
    gate: Mutex<Option<Link<C::Transport>>>,
    state: AtomicU8,
}

impl ModbusClient<TcpConnector> {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self::with_connector(TcpConnector, config)
    }
}

impl Default for ModbusClient<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> ModbusClient<C> {
    pub fn with_connector(connector: C, config: ClientConfig) -> Self {
        Self {
            connector,
            config,
            gate: Mutex::new(None),
            state: AtomicU8::new(ClientState::Disconnected as u8),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Snapshot of the lifecycle state; does not wait for the gate.
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ClientState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Open a connection, replacing any existing one. Never fails loudly.
    pub async fn connect(&self, host: &str, port: u16) -> bool {
        if let Err(e) = self.config.validate() {
            warn!("Refusing to connect to {}:{}: {}", host, port, e);
            return false;
        }

        let mut slot = self.gate.lock().await;
        if let Some(mut previous) = slot.take() {
            debug!("Closing previous connection to {}", previous.endpoint);
            let _ = previous.transport.close().await;
        }

        self.set_state(ClientState::Connecting);
        match self.connector.connect(host, port, &self.config).await {
            Ok(transport) => {
                let endpoint = format!("{}:{}", host, port);
                info!("Connected to Modbus device at {}", endpoint);
                *slot = Some(Link { transport, endpoint });
                self.set_state(ClientState::Connected);
                true
            }
            Err(e) => {
                warn!("Connection to {}:{} failed: {}", host, port, e);
                self.set_state(ClientState::Disconnected);
                false
            }
        }
    }

    /// Close the connection. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let mut slot = self.gate.lock().await;
        if let Some(mut link) = slot.take() {
            if let Err(e) = link.transport.close().await {
                debug!("Error closing connection to {}: {}", link.endpoint, e);
            }
            info!("Disconnected from {}", link.endpoint);
        }
        self.set_state(ClientState::Disconnected);
    }

    /// Probe the socket under the gate; a peer-closed socket is torn down here.
    pub async fn is_connected(&self) -> bool {
        let mut slot = self.gate.lock().await;
        let link_state = match slot.as_ref() {
            Some(link) => link.transport.probe(self.config.probe_timeout).await,
            None => return false,
        };
        if link_state.is_alive() {
            return true;
        }
        self.handle_connection_loss(&mut slot, "liveness probe").await;
        false
    }

    /// `host:port` of the live connection.
    pub async fn endpoint(&self) -> Option<String> {
        self.gate.lock().await.as_ref().map(|link| link.endpoint.clone())
    }

    pub async fn stats(&self) -> Option<TransportStats> {
        self.gate.lock().await.as_ref().map(|link| link.transport.get_stats())
    }

    /// Two-phase reachability probe on a separate, throwaway connection.
    ///
    /// Does not touch the gate, so it runs alongside in-flight operations.
    pub async fn run_diagnostics(
        &self,
        host: &str,
        port: u16,
        unit_id: UnitId,
    ) -> DiagnosticResult {
        let config = DiagnosticsConfig::default().with_connect_timeout(self.config.connect_timeout);
        run_diagnostics_with(host, port, unit_id, &config).await
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn read_holding_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> Option<Vec<u16>> {
        let request = ModbusRequest::new_read(
            unit_id,
            ModbusFunction::ReadHoldingRegisters,
            AddressCodec::to_protocol_address(start),
            count,
        );
        self.execute(request, "read_holding_registers", |r| r.parse_registers(count))
            .await
    }

    pub async fn read_input_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> Option<Vec<u16>> {
        let request = ModbusRequest::new_read(
            unit_id,
            ModbusFunction::ReadInputRegisters,
            AddressCodec::to_protocol_address(start),
            count,
        );
        self.execute(request, "read_input_registers", |r| r.parse_registers(count))
            .await
    }

    pub async fn read_coils(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> Option<Vec<bool>> {
        let request = ModbusRequest::new_read(
            unit_id,
            ModbusFunction::ReadCoils,
            AddressCodec::to_protocol_address(start),
            count,
        );
        self.execute(request, "read_coils", |r| r.parse_bits(count)).await
    }

    pub async fn read_discrete_inputs(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> Option<Vec<bool>> {
        let request = ModbusRequest::new_read(
            unit_id,
            ModbusFunction::ReadDiscreteInputs,
            AddressCodec::to_protocol_address(start),
            count,
        );
        self.execute(request, "read_discrete_inputs", |r| r.parse_bits(count))
            .await
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    pub async fn write_single_register(&self, unit_id: UnitId, address: UiAddress, value: u16) {
        let request = ModbusRequest::new_write_single_register(
            unit_id,
            AddressCodec::to_protocol_address(address),
            value,
        );
        self.execute(request, "write_single_register", |_| Ok(())).await;
    }

    pub async fn write_single_coil(&self, unit_id: UnitId, address: UiAddress, value: bool) {
        let request = ModbusRequest::new_write_single_coil(
            unit_id,
            AddressCodec::to_protocol_address(address),
            value,
        );
        self.execute(request, "write_single_coil", |_| Ok(())).await;
    }

    /// FC 0x10; `true` when the device acknowledged the write.
    pub async fn write_multiple_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        values: &[u16],
    ) -> bool {
        let request = ModbusRequest::new_write_multiple_registers(
            unit_id,
            AddressCodec::to_protocol_address(start),
            values,
        );
        self.execute(request, "write_multiple_registers", |_| Ok(()))
            .await
            .is_some()
    }

    /// FC 0x0F; `true` when the device acknowledged the write.
    pub async fn write_multiple_coils(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        values: &[bool],
    ) -> bool {
        let request = ModbusRequest::new_write_multiple_coils(
            unit_id,
            AddressCodec::to_protocol_address(start),
            values,
        );
        self.execute(request, "write_multiple_coils", |_| Ok(()))
            .await
            .is_some()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Run one request under the gate and classify any failure.
    async fn execute<R, F>(
        &self,
        request: ModbusRequest,
        operation: &'static str,
        parse: F,
    ) -> Option<R>
    where
        F: FnOnce(&ModbusResponse) -> ModbusResult<R> + Send,
    {
        if let Err(e) = request.validate() {
            warn!(
                "{} rejected (unit {}, address {}): {}",
                operation, request.unit_id, request.address, e
            );
            return None;
        }

        let mut slot = self.gate.lock().await;
        let Some(link) = slot.as_mut() else {
            debug!(
                "{} skipped (unit {}, address {}): not connected",
                operation, request.unit_id, request.address
            );
            return None;
        };

        let result = link
            .transport
            .request(&request)
            .await
            .and_then(|response| parse(&response));

        match result {
            Ok(value) => {
                self.set_state(ClientState::Connected);
                Some(value)
            }
            Err(e) if e.is_transport_fault() => {
                warn!(
                    "{} failed (unit {}, address {}): {}",
                    operation, request.unit_id, request.address, e
                );
                self.handle_connection_loss(&mut slot, operation).await;
                None
            }
            Err(e) if e.is_device_exception() => {
                warn!(
                    "{} rejected by device (unit {}, address {}): {}",
                    operation, request.unit_id, request.address, e
                );
                self.set_state(ClientState::Faulted);
                None
            }
            Err(e) => {
                warn!(
                    "{} failed (unit {}, address {}): {}",
                    operation, request.unit_id, request.address, e
                );
                None
            }
        }
    }

    /// The one teardown path. Idempotent; never fails.
    async fn handle_connection_loss(&self, slot: &mut Option<Link<C::Transport>>, operation: &str) {
        if let Some(mut link) = slot.take() {
            warn!("Connection to {} lost during {}", link.endpoint, operation);
            if let Err(e) = link.transport.close().await {
                debug!("Error closing connection to {}: {}", link.endpoint, e);
            }
        }
        self.set_state(ClientState::Disconnected);
    }
}

impl<C: Connector> fmt::Debug for ModbusClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModbusClient")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModbusError;
    use crate::transport::LinkState;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;
    use std::time::Duration;

    // =========================================================================
    // Mock transport and connector
    // =========================================================================

    #[derive(Default)]
    struct MockState {
        requests: std::sync::Mutex<Vec<ModbusRequest>>,
        responses: std::sync::Mutex<VecDeque<ModbusResult<ModbusResponse>>>,
        alive: AtomicBool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        closes: AtomicUsize,
    }

    impl MockState {
        fn new() -> Arc<Self> {
            let state = Self::default();
            state.alive.store(true, Ordering::SeqCst);
            Arc::new(state)
        }

        fn add_response(&self, response: ModbusResult<ModbusResponse>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn get_requests(&self) -> Vec<ModbusRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    struct MockTransport {
        state: Arc<MockState>,
    }

    impl ModbusTransport for MockTransport {
        fn request(
            &mut self,
            request: &ModbusRequest,
        ) -> impl Future<Output = ModbusResult<ModbusResponse>> + Send {
            let state = self.state.clone();
            let request = request.clone();
            async move {
                let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                state.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;

                state.requests.lock().unwrap().push(request);
                let response = state
                    .responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| {
                        Err(ModbusError::connection("No response prepared in mock"))
                    });
                state.in_flight.fetch_sub(1, Ordering::SeqCst);
                response
            }
        }

        fn probe(&self, _deadline: Duration) -> impl Future<Output = LinkState> + Send {
            let alive = self.state.alive.load(Ordering::SeqCst);
            async move {
                if alive {
                    LinkState::Idle
                } else {
                    LinkState::Closed
                }
            }
        }

        fn is_connected(&self) -> bool {
            self.state.alive.load(Ordering::SeqCst)
        }

        fn close(&mut self) -> impl Future<Output = ModbusResult<()>> + Send {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }

        fn get_stats(&self) -> TransportStats {
            TransportStats::default()
        }
    }

    struct MockConnector {
        state: Arc<MockState>,
        refuse: bool,
    }

    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(
            &self,
            host: &str,
            port: u16,
            _config: &ClientConfig,
        ) -> ModbusResult<MockTransport> {
            if self.refuse {
                return Err(ModbusError::connection(format!("{}:{} refused", host, port)));
            }
            Ok(MockTransport {
                state: self.state.clone(),
            })
        }
    }

    fn mock_client(state: &Arc<MockState>) -> ModbusClient<MockConnector> {
        ModbusClient::with_connector(
            MockConnector {
                state: state.clone(),
                refuse: false,
            },
            ClientConfig::default(),
        )
    }

    fn create_register_response(unit_id: UnitId, values: &[u16]) -> ModbusResponse {
        let mut data = vec![(values.len() * 2) as u8];
        for &val in values {
            data.extend_from_slice(&val.to_be_bytes());
        }
        ModbusResponse::new_success(unit_id, ModbusFunction::ReadHoldingRegisters, data)
    }

    fn create_coil_response(unit_id: UnitId, coils: &[bool]) -> ModbusResponse {
        let packed = crate::pdu::pack_bits(coils);
        let mut data = vec![packed.len() as u8];
        data.extend_from_slice(&packed);
        ModbusResponse::new_success(unit_id, ModbusFunction::ReadCoils, data)
    }

    // =========================================================================
    // Tests
    // =========================================================================

    #[tokio::test]
    async fn test_not_connected_returns_none() {
        let state = MockState::new();
        let client = mock_client(&state);

        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(client.read_holding_registers(1, 1, 4).await.is_none());
        assert!(client.read_input_registers(1, 1, 4).await.is_none());
        assert!(client.read_coils(1, 1, 4).await.is_none());
        assert!(client.read_discrete_inputs(1, 1, 4).await.is_none());
        client.write_single_register(1, 1, 7).await;
        client.write_single_coil(1, 1, true).await;
        assert!(!client.write_multiple_registers(1, 1, &[1, 2]).await);

        assert!(!client.is_connected().await);
        assert!(state.get_requests().is_empty());
    }

    #[tokio::test]
    async fn test_read_converts_address() {
        let state = MockState::new();
        state.add_response(Ok(create_register_response(1, &[10, 20, 30, 40])));
        let client = mock_client(&state);

        assert!(client.connect("plc", 502).await);
        assert_eq!(client.state(), ClientState::Connected);
        assert_eq!(client.endpoint().await.as_deref(), Some("plc:502"));

        let values = client.read_holding_registers(1, 1, 4).await;
        assert_eq!(values, Some(vec![10, 20, 30, 40]));

        let requests = state.get_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].address, 0);
        assert_eq!(requests[0].quantity, 4);
        assert_eq!(requests[0].function, ModbusFunction::ReadHoldingRegisters);
    }

    #[tokio::test]
    async fn test_read_coils_truncates_to_count() {
        let state = MockState::new();
        state.add_response(Ok(create_coil_response(1, &[true, false, true])));
        let client = mock_client(&state);
        assert!(client.connect("plc", 502).await);

        assert_eq!(client.read_coils(1, 10, 3).await, Some(vec![true, false, true]));
        assert_eq!(state.get_requests()[0].address, 9);
    }

    #[tokio::test]
    async fn test_gate_serializes_concurrent_calls() {
        let state = MockState::new();
        for i in 0..16u16 {
            state.add_response(Ok(create_register_response(1, &[i])));
        }
        let client = Arc::new(mock_client(&state));
        assert!(client.connect("plc", 502).await);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let client = client.clone();
            tasks.spawn(async move { client.read_holding_registers(1, i + 1, 1).await });
        }
        let mut completed = 0;
        while let Some(result) = tasks.join_next().await {
            assert!(result.unwrap().is_some());
            completed += 1;
        }

        assert_eq!(completed, 16);
        assert_eq!(state.get_requests().len(), 16);
        assert_eq!(state.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_device_exception_keeps_connection() {
        let state = MockState::new();
        state.add_response(Err(ModbusError::exception(0x03, 0x02)));
        state.add_response(Ok(create_register_response(1, &[5])));
        let client = mock_client(&state);
        assert!(client.connect("plc", 502).await);

        assert!(client.read_holding_registers(1, 9_999, 1).await.is_none());
        assert_eq!(client.state(), ClientState::Faulted);
        assert!(client.is_connected().await);

        assert_eq!(client.read_holding_registers(1, 1, 1).await, Some(vec![5]));
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[tokio::test]
    async fn test_transport_fault_tears_down() {
        let state = MockState::new();
        state.add_response(Err(ModbusError::connection("connection reset")));
        let client = mock_client(&state);
        assert!(client.connect("plc", 502).await);

        assert!(client.read_input_registers(1, 1, 2).await.is_none());
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(!client.is_connected().await);
        assert_eq!(state.closes.load(Ordering::SeqCst), 1);

        // fails fast without touching the transport
        assert!(client.read_input_registers(1, 1, 2).await.is_none());
        assert_eq!(state.get_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_detects_peer_close() {
        let state = MockState::new();
        let client = mock_client(&state);
        assert!(client.connect("plc", 502).await);
        assert!(client.is_connected().await);

        state.alive.store(false, Ordering::SeqCst);
        assert!(!client.is_connected().await);
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(client.endpoint().await.is_none());
        assert!(client.read_holding_registers(1, 1, 1).await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_request_keeps_connection() {
        let state = MockState::new();
        let client = mock_client(&state);
        assert!(client.connect("plc", 502).await);

        assert!(client.read_holding_registers(1, 1, 0).await.is_none());
        assert!(client.read_holding_registers(1, 1, 126).await.is_none());
        assert!(state.get_requests().is_empty());
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[tokio::test]
    async fn test_connect_failure_returns_false() {
        let state = MockState::new();
        let client = ModbusClient::with_connector(
            MockConnector {
                state: state.clone(),
                refuse: true,
            },
            ClientConfig::default(),
        );
        assert!(!client.connect("plc", 502).await);
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let state = MockState::new();
        let client = mock_client(&state);
        client.disconnect().await;
        assert!(client.connect("plc", 502).await);
        client.disconnect().await;
        client.disconnect().await;

        assert_eq!(state.closes.load(Ordering::SeqCst), 1);
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_reconnect_closes_previous() {
        let state = MockState::new();
        let client = mock_client(&state);
        assert!(client.connect("plc", 502).await);
        assert!(client.connect("plc", 503).await);
        assert_eq!(state.closes.load(Ordering::SeqCst), 1);
        assert_eq!(client.endpoint().await.as_deref(), Some("plc:503"));
    }

    #[tokio::test]
    async fn test_invalid_config_refuses_connect() {
        let state = MockState::new();
        let client = ModbusClient::with_connector(
            MockConnector {
                state: state.clone(),
                refuse: false,
            },
            ClientConfig::default().with_probe_timeout(Duration::ZERO),
        );
        assert!(!client.connect("plc", 502).await);
    }

    #[tokio::test]
    async fn test_tcp_client_refused() {
        let client = ModbusClient::with_config(
            ClientConfig::default().with_connect_timeout(Duration::from_millis(500)),
        );
        // nothing listens on port 1 of loopback
        assert!(!client.connect("127.0.0.1", 1).await);
        assert_eq!(client.state(), ClientState::Disconnected);
    }
}
