//! Modbus TCP server backed by a [`RegisterStore`]
//!
//! # Lifecycle
//!
//! `Stopped → Starting → Running → Stopping → Stopped`. Start and stop run under one
//! lifecycle lock, so they never interleave; both are idempotent.
//!
//! Starting allocates and seeds a fresh store, binds the listener, raises the running
//! flag and only then spawns the serve loop. Stopping lowers the flag first (handlers
//! stop taking work), broadcasts shutdown, and waits a bounded time for the serve loop
//! before aborting it.
//!
//! # Addressing
//!
//! The store is 1-based. A request for wire address `p` touches store slot `p + 1`, so a
//! client asking for UI address `u` (sent as `u - 1`) lands on the slot the local API
//! calls `u`.
//!
//! # Supported Function Codes
//!
//! | Code | Function |
//! |------|----------|
//! | 0x01 | Read Coils |
//! | 0x02 | Read Discrete Inputs |
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x05 | Write Single Coil |
//! | 0x06 | Write Single Register |
//! | 0x0F | Write Multiple Coils |
//! | 0x10 | Write Multiple Registers |
//!
//! Anything else is answered with exception 0x01.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::codec::UiAddress;
use crate::config::ServerConfig;
use crate::constants::{
    COIL_OFF, COIL_ON, EXCEPTION_FLAG, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_COILS,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER,
};
use crate::error::{ModbusError, ModbusResult};
use crate::mbap::{read_frame, Frame};
use crate::pdu::{ModbusPdu, PduBuilder};
use crate::protocol::{ModbusException, ServerRequest, UnitId};
use crate::store::{BufferAccess, RegisterStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Snapshot of the current run's counters
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStats {
    pub connections_accepted: u64,
    pub active_connections: usize,
    pub requests_served: u64,
    pub exceptions_sent: u64,
    /// `None` while stopped
    pub started_at: Option<DateTime<Local>>,
}

#[derive(Debug, Default)]
struct Counters {
    connections_accepted: AtomicU64,
    active_connections: AtomicUsize,
    requests_served: AtomicU64,
    exceptions_sent: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.connections_accepted.store(0, Ordering::Relaxed);
        self.requests_served.store(0, Ordering::Relaxed);
        self.exceptions_sent.store(0, Ordering::Relaxed);
    }
}

/// Decrements the active connection count when a handler ends, aborted or not.
struct ActiveConnection(Arc<Counters>);

impl ActiveConnection {
    fn new(counters: Arc<Counters>) -> Self {
        counters.active_connections.fetch_add(1, Ordering::AcqRel);
        Self(counters)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.active_connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// What the local API and stats need from the current run
struct Session {
    store: Arc<RegisterStore>,
    local_addr: SocketAddr,
    started_at: DateTime<Local>,
}

struct ServeHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
struct ServeContext {
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    shutdown_tx: broadcast::Sender<()>,
    idle_timeout: Duration,
    max_connections: usize,
}

/// Modbus TCP server.
///
/// # Example
///
/// ```rust,no_run
/// use modbus_station::ModbusServer;
///
/// # async fn example() -> modbus_station::ModbusResult<()> {
/// let server = ModbusServer::new();
/// let addr = server.start("0.0.0.0", 502).await?;
/// println!("listening on {}", addr);
///
/// // holding registers 1..=16 are seeded with 10, 20, ... 160
/// assert_eq!(server.read_holding_registers(1, 1, 2)?, vec![10, 20]);
///
/// server.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct ModbusServer {
    config: ServerConfig,
    /// Held across the whole of start and stop
    lifecycle: Mutex<Option<ServeHandle>>,
    /// Store pointer swap; readers never see a half-started or half-stopped run
    session: RwLock<Option<Session>>,
    running: Arc<AtomicBool>,
    state: AtomicU8,
    counters: Arc<Counters>,
}

impl ModbusServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            lifecycle: Mutex::new(None),
            session: RwLock::new(None),
            running: Arc::new(AtomicBool::new(false)),
            state: AtomicU8::new(ServerState::Stopped as u8),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Bound address of the current run.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session
            .read()
            .ok()
            .and_then(|session| session.as_ref().map(|s| s.local_addr))
    }

    pub fn stats(&self) -> ServerStats {
        let started_at = self
            .session
            .read()
            .ok()
            .and_then(|session| session.as_ref().map(|s| s.started_at));
        ServerStats {
            connections_accepted: self.counters.connections_accepted.load(Ordering::Relaxed),
            active_connections: self.counters.active_connections.load(Ordering::Acquire),
            requests_served: self.counters.requests_served.load(Ordering::Relaxed),
            exceptions_sent: self.counters.exceptions_sent.load(Ordering::Relaxed),
            started_at,
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start serving on `bind:port` (port 0 picks a free port).
    ///
    /// Returns the bound address. Already running: returns the current address without
    /// binding again. A taken port fails with [`ModbusError::AddressInUse`].
    pub async fn start(&self, bind: &str, port: u16) -> ModbusResult<SocketAddr> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            let addr = self
                .local_addr()
                .ok_or_else(|| ModbusError::internal("running server has no session"))?;
            debug!("Modbus server already running on {}", addr);
            return Ok(addr);
        }

        self.set_state(ServerState::Starting);
        let (store, listener, local_addr) = match self.prepare(bind, port).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Modbus server failed to start on {}:{}: {}", bind, port, e);
                self.set_state(ServerState::Stopped);
                return Err(e);
            }
        };

        match self.session.write() {
            Ok(mut session) => {
                *session = Some(Session {
                    store: store.clone(),
                    local_addr,
                    started_at: Local::now(),
                })
            }
            Err(_) => {
                self.set_state(ServerState::Stopped);
                return Err(ModbusError::internal("server session lock poisoned"));
            }
        }

        self.counters.reset();
        // raised before the serve loop exists, so a racing stop always sees it
        self.running.store(true, Ordering::Release);

        // stop may signal before the serve loop is first polled
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let context = ServeContext {
            running: self.running.clone(),
            counters: self.counters.clone(),
            shutdown_tx: shutdown_tx.clone(),
            idle_timeout: self.config.idle_timeout,
            max_connections: self.config.max_connections,
        };
        let task = tokio::spawn(serve(listener, store, context, shutdown_rx));

        *lifecycle = Some(ServeHandle { shutdown_tx, task });
        self.set_state(ServerState::Running);
        info!("Modbus server listening on {}", local_addr);
        Ok(local_addr)
    }

    async fn prepare(
        &self,
        bind: &str,
        port: u16,
    ) -> ModbusResult<(Arc<RegisterStore>, TcpListener, SocketAddr)> {
        self.config.validate()?;

        let store = Arc::new(RegisterStore::new(self.config.store_capacity));
        store.seed_holding_registers(self.config.seed_register_count)?;

        let listener = TcpListener::bind((bind, port)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                ModbusError::address_in_use(format!("{}:{}", bind, port))
            } else {
                ModbusError::from(e)
            }
        })?;
        let local_addr = listener.local_addr()?;
        Ok((store, listener, local_addr))
    }

    /// [`start`](Self::start) reduced to success or failure.
    pub async fn connect(&self, bind: &str, port: u16) -> bool {
        self.start(bind, port).await.is_ok()
    }

    /// Stop serving. A no-op when already stopped.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(handle) = lifecycle.take() else {
            return;
        };

        self.set_state(ServerState::Stopping);
        self.running.store(false, Ordering::Release);
        if handle.shutdown_tx.send(()).is_err() {
            debug!("Serve loop already gone before shutdown was signalled");
        }

        let mut task = handle.task;
        match timeout(self.config.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => debug!("Serve loop finished"),
            Ok(Err(e)) => error!("Serve loop ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Serve loop did not finish within {:?}, aborting",
                    self.config.shutdown_timeout
                );
                task.abort();
            }
        }

        let local_addr = match self.session.write() {
            Ok(mut session) => session.take().map(|s| s.local_addr),
            Err(poisoned) => poisoned.into_inner().take().map(|s| s.local_addr),
        };
        self.set_state(ServerState::Stopped);
        if let Some(addr) = local_addr {
            info!("Modbus server on {} stopped", addr);
        }
    }

    pub async fn disconnect(&self) {
        self.stop().await
    }

    // ------------------------------------------------------------------------
    // Local API
    // ------------------------------------------------------------------------

    /// Run `op` against the live store while holding the session lock.
    fn with_store<R>(
        &self,
        operation: &str,
        unit_id: UnitId,
        address: UiAddress,
        op: impl FnOnce(&RegisterStore) -> ModbusResult<R>,
    ) -> ModbusResult<R> {
        if !self.is_running() {
            return Err(ModbusError::NotRunning);
        }
        let session = self
            .session
            .read()
            .map_err(|_| ModbusError::internal("server session lock poisoned"))?;
        let store = &session.as_ref().ok_or(ModbusError::NotRunning)?.store;
        op(store).map_err(|e| {
            warn!(
                "{} failed (unit {}, address {}): {}",
                operation, unit_id, address, e
            );
            e
        })
    }

    pub fn read_holding_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        self.with_store("read_holding_registers", unit_id, start, |store| {
            store.read_holding_registers(start, count as usize)
        })
    }

    pub fn read_input_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        self.with_store("read_input_registers", unit_id, start, |store| {
            store.read_input_registers(start, count as usize)
        })
    }

    pub fn read_coils(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Vec<bool>> {
        self.with_store("read_coils", unit_id, start, |store| {
            store.read_coils(start, count as usize)
        })
    }

    pub fn read_discrete_inputs(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Vec<bool>> {
        self.with_store("read_discrete_inputs", unit_id, start, |store| {
            store.read_discrete_inputs(start, count as usize)
        })
    }

    pub fn write_single_register(
        &self,
        unit_id: UnitId,
        address: UiAddress,
        value: u16,
    ) -> ModbusResult<()> {
        self.with_store("write_single_register", unit_id, address, |store| {
            store.write_holding_register(address, value)
        })
    }

    pub fn write_single_coil(
        &self,
        unit_id: UnitId,
        address: UiAddress,
        value: bool,
    ) -> ModbusResult<()> {
        self.with_store("write_single_coil", unit_id, address, |store| {
            store.write_coil(address, value)
        })
    }

    /// Capability handle for a simulation feed; valid for the current run only.
    pub fn buffer_access(&self) -> ModbusResult<BufferAccess> {
        if !self.is_running() {
            return Err(ModbusError::NotRunning);
        }
        let session = self
            .session
            .read()
            .map_err(|_| ModbusError::internal("server session lock poisoned"))?;
        session
            .as_ref()
            .map(|s| BufferAccess::new(s.store.clone()))
            .ok_or(ModbusError::NotRunning)
    }
}

impl Default for ModbusServer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModbusServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModbusServer")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

// ============================================================================
// Serve loop
// ============================================================================

/// Accept until shutdown. Logs and swallows its own faults.
async fn serve(
    listener: TcpListener,
    store: Arc<RegisterStore>,
    context: ServeContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    if !context.running.load(Ordering::Acquire) {
                        break;
                    }
                    context.counters.connections_accepted.fetch_add(1, Ordering::Relaxed);
                    let active = context.counters.active_connections.load(Ordering::Acquire);
                    if active >= context.max_connections {
                        warn!(
                            "Rejecting client {}: {} connections already open",
                            peer, active
                        );
                        drop(socket);
                        continue;
                    }
                    let guard = ActiveConnection::new(context.counters.clone());
                    let shutdown = context.shutdown_tx.subscribe();
                    handlers.spawn(handle_connection(
                        socket,
                        peer,
                        store.clone(),
                        context.clone(),
                        shutdown,
                        guard,
                    ));
                }
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
            Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = finished {
                    error!("Connection handler failed: {}", e);
                }
            }
        }
    }

    drop(listener);
    // handlers received the same shutdown signal
    while let Some(finished) = handlers.join_next().await {
        if let Err(e) = finished {
            error!("Connection handler failed: {}", e);
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    store: Arc<RegisterStore>,
    context: ServeContext,
    mut shutdown_rx: broadcast::Receiver<()>,
    _active: ActiveConnection,
) {
    info!("Client {} connected", peer);
    let _ = socket.set_nodelay(true);

    loop {
        let frame = tokio::select! {
            _ = shutdown_rx.recv() => break,
            read = timeout(context.idle_timeout, read_frame(&mut socket)) => match read {
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    warn!("Dropping client {}: {}", peer, e);
                    break;
                }
                Err(_) => {
                    info!("Client {} idle for {:?}, closing", peer, context.idle_timeout);
                    break;
                }
            }
        };

        // stop has begun; take no more work
        if !context.running.load(Ordering::Acquire) {
            break;
        }

        let reply = respond(&store, &frame, &context.counters);
        if let Err(e) = socket.write_all(&reply.encode()).await {
            warn!("Write to client {} failed: {}", peer, e);
            break;
        }
    }

    let _ = socket.shutdown().await;
    info!("Client {} disconnected", peer);
}

// ============================================================================
// Dispatch
// ============================================================================

/// Answer one request frame; every unit id is served from the same store.
fn respond(store: &RegisterStore, frame: &Frame, counters: &Counters) -> Frame {
    let fc = frame.pdu.function_code().unwrap_or(0);
    let result = ServerRequest::from_pdu(&frame.pdu).and_then(|request| dispatch(store, request));
    let pdu = match result {
        Ok(pdu) => pdu,
        Err(exception) => {
            debug!(
                "Unit {} function 0x{:02X}: answering {}",
                frame.header.unit_id, fc, exception
            );
            counters.exceptions_sent.fetch_add(1, Ordering::Relaxed);
            exception_pdu(fc, exception)
        }
    };
    counters.requests_served.fetch_add(1, Ordering::Relaxed);
    Frame::new(frame.header.transaction_id, frame.header.unit_id, pdu)
}

fn exception_pdu(fc: u8, exception: ModbusException) -> ModbusPdu {
    let mut pdu = ModbusPdu::new();
    // two bytes always fit
    let _ = pdu.push(fc | EXCEPTION_FLAG);
    let _ = pdu.push(exception.to_u8());
    pdu
}

/// Wire address to store slot
#[inline]
fn slot(address: u16) -> UiAddress {
    address as UiAddress + 1
}

fn store_exception(error: ModbusError) -> ModbusException {
    match error {
        ModbusError::OutOfRange { .. } => ModbusException::IllegalDataAddress,
        _ => ModbusException::ServerDeviceFailure,
    }
}

fn build<T>(result: ModbusResult<T>) -> Result<T, ModbusException> {
    result.map_err(|_| ModbusException::ServerDeviceFailure)
}

fn dispatch(store: &RegisterStore, request: ServerRequest) -> Result<ModbusPdu, ModbusException> {
    match request {
        ServerRequest::ReadCoils { address, quantity } => {
            let values = store
                .read_coils(slot(address), quantity as usize)
                .map_err(store_exception)?;
            build(PduBuilder::build_bit_response(FC_READ_COILS, &values))
        }
        ServerRequest::ReadDiscreteInputs { address, quantity } => {
            let values = store
                .read_discrete_inputs(slot(address), quantity as usize)
                .map_err(store_exception)?;
            build(PduBuilder::build_bit_response(FC_READ_DISCRETE_INPUTS, &values))
        }
        ServerRequest::ReadHoldingRegisters { address, quantity } => {
            let values = store
                .read_holding_registers(slot(address), quantity as usize)
                .map_err(store_exception)?;
            build(PduBuilder::build_register_response(FC_READ_HOLDING_REGISTERS, &values))
        }
        ServerRequest::ReadInputRegisters { address, quantity } => {
            let values = store
                .read_input_registers(slot(address), quantity as usize)
                .map_err(store_exception)?;
            build(PduBuilder::build_register_response(FC_READ_INPUT_REGISTERS, &values))
        }
        ServerRequest::WriteSingleCoil { address, value } => {
            store.write_coil(slot(address), value).map_err(store_exception)?;
            let echo = if value { COIL_ON } else { COIL_OFF };
            build(PduBuilder::build_write_echo(FC_WRITE_SINGLE_COIL, address, echo))
        }
        ServerRequest::WriteSingleRegister { address, value } => {
            store
                .write_holding_register(slot(address), value)
                .map_err(store_exception)?;
            build(PduBuilder::build_write_echo(FC_WRITE_SINGLE_REGISTER, address, value))
        }
        ServerRequest::WriteMultipleCoils { address, values } => {
            store.write_coils(slot(address), &values).map_err(store_exception)?;
            build(PduBuilder::build_write_echo(
                FC_WRITE_MULTIPLE_COILS,
                address,
                values.len() as u16,
            ))
        }
        ServerRequest::WriteMultipleRegisters { address, values } => {
            store
                .write_holding_registers(slot(address), &values)
                .map_err(store_exception)?;
            build(PduBuilder::build_write_echo(
                FC_WRITE_MULTIPLE_REGISTERS,
                address,
                values.len() as u16,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio_test::{assert_err, assert_ok};

    fn seeded_store() -> RegisterStore {
        let store = RegisterStore::new(10_000);
        store.seed_holding_registers(16).unwrap();
        store
    }

    fn request_frame(pdu: ModbusPdu) -> Frame {
        Frame::new(7, 1, pdu)
    }

    #[test]
    fn test_dispatch_read_holding() {
        let store = seeded_store();
        let pdu = PduBuilder::build_read_request(0x03, 0, 4).unwrap();
        let request = ServerRequest::from_pdu(&pdu).unwrap();
        let response = dispatch(&store, request).unwrap();
        assert_eq!(
            response.as_slice(),
            &[0x03, 0x08, 0x00, 10, 0x00, 20, 0x00, 30, 0x00, 40]
        );
    }

    #[test]
    fn test_dispatch_out_of_range() {
        let store = seeded_store();
        // wire 9999 is slot 10000; two registers run past the end
        let pdu = PduBuilder::build_read_request(0x03, 9_999, 2).unwrap();
        let request = ServerRequest::from_pdu(&pdu).unwrap();
        assert_eq!(
            dispatch(&store, request).unwrap_err(),
            ModbusException::IllegalDataAddress
        );

        let pdu = PduBuilder::build_read_request(0x01, 9_999, 1).unwrap();
        let request = ServerRequest::from_pdu(&pdu).unwrap();
        assert!(dispatch(&store, request).is_ok());
    }

    #[test]
    fn test_dispatch_writes_echo() {
        let store = seeded_store();

        let pdu = PduBuilder::build_write_single_register(4, 999).unwrap();
        let response = dispatch(&store, ServerRequest::from_pdu(&pdu).unwrap()).unwrap();
        assert_eq!(response.as_slice(), pdu.as_slice());
        assert_eq!(store.read_holding_registers(5, 1).unwrap(), vec![999]);

        let pdu = PduBuilder::build_write_single_coil(0, true).unwrap();
        let response = dispatch(&store, ServerRequest::from_pdu(&pdu).unwrap()).unwrap();
        assert_eq!(response.as_slice(), &[0x05, 0x00, 0x00, 0xFF, 0x00]);
        assert_eq!(store.read_coils(1, 1).unwrap(), vec![true]);

        let pdu = PduBuilder::build_write_multiple_coils(2, &[true, false, true]).unwrap();
        let response = dispatch(&store, ServerRequest::from_pdu(&pdu).unwrap()).unwrap();
        assert_eq!(response.as_slice(), &[0x0F, 0x00, 0x02, 0x00, 0x03]);
        assert_eq!(store.read_coils(3, 3).unwrap(), vec![true, false, true]);

        let pdu = PduBuilder::build_write_multiple_registers(19, &[1, 2]).unwrap();
        let response = dispatch(&store, ServerRequest::from_pdu(&pdu).unwrap()).unwrap();
        assert_eq!(response.as_slice(), &[0x10, 0x00, 0x13, 0x00, 0x02]);
        assert_eq!(store.read_holding_registers(20, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_respond_exceptions() {
        let store = seeded_store();
        let counters = Counters::default();

        let unknown = request_frame(ModbusPdu::from_slice(&[0x2B, 0x0E, 0x01, 0x00]).unwrap());
        let reply = respond(&store, &unknown, &counters);
        assert_eq!(reply.header.transaction_id, 7);
        assert_eq!(reply.pdu.as_slice(), &[0xAB, 0x01]);

        let zero = request_frame(ModbusPdu::from_slice(&[0x03, 0x00, 0x00, 0x00, 0x00]).unwrap());
        let reply = respond(&store, &zero, &counters);
        assert_eq!(reply.pdu.as_slice(), &[0x83, 0x03]);

        let beyond = request_frame(PduBuilder::build_read_request(0x04, 10_000, 1).unwrap());
        let reply = respond(&store, &beyond, &counters);
        assert_eq!(reply.pdu.as_slice(), &[0x84, 0x02]);

        assert_eq!(counters.requests_served.load(Ordering::Relaxed), 3);
        assert_eq!(counters.exceptions_sent.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let server = ModbusServer::new();
        let first = assert_ok!(server.start("127.0.0.1", 0).await);
        let second = assert_ok!(server.start("127.0.0.1", 0).await);
        assert_eq!(first, second);
        assert_eq!(server.state(), ServerState::Running);
        assert!(server.stats().started_at.is_some());

        server.stop().await;
        server.stop().await;
        assert!(!server.is_running());
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_local_api_requires_running() {
        let server = ModbusServer::new();
        assert_eq!(
            server.read_holding_registers(1, 1, 1).unwrap_err(),
            ModbusError::NotRunning
        );
        assert_err!(server.write_single_coil(1, 1, true));
        assert_err!(server.buffer_access());

        assert_ok!(server.start("127.0.0.1", 0).await);
        assert_eq!(server.read_holding_registers(1, 1, 4).unwrap(), vec![10, 20, 30, 40]);
        assert_ok!(server.write_single_register(1, 5, 999));
        assert_eq!(server.read_holding_registers(1, 5, 1).unwrap(), vec![999]);
        assert!(matches!(
            server.read_holding_registers(1, 10_000, 5),
            Err(ModbusError::OutOfRange { .. })
        ));

        server.stop().await;
        assert_eq!(
            server.read_coils(1, 1, 1).unwrap_err(),
            ModbusError::NotRunning
        );
    }

    #[tokio::test]
    async fn test_restart_gets_fresh_store() {
        let server = ModbusServer::new();
        assert_ok!(server.start("127.0.0.1", 0).await);
        assert_ok!(server.write_single_register(1, 1, 0));
        server.stop().await;

        assert_ok!(server.start("127.0.0.1", 0).await);
        assert_eq!(server.read_holding_registers(1, 1, 1).unwrap(), vec![10]);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_address_in_use() {
        let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = holder.local_addr().unwrap().port();

        let server = ModbusServer::new();
        let err = server.start("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, ModbusError::AddressInUse { .. }));
        assert!(!server.is_running());
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(!server.connect("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_start() {
        let server = ModbusServer::with_config(ServerConfig::default().with_store_capacity(0));
        assert!(matches!(
            server.start("127.0.0.1", 0).await,
            Err(ModbusError::Configuration { .. })
        ));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_buffer_access_feeds_store() {
        let server = ModbusServer::new();
        assert_ok!(server.start("127.0.0.1", 0).await);
        let feed = assert_ok!(server.buffer_access());
        assert_ok!(feed.set_input_registers(1, &[230, 231]));
        assert_ok!(feed.set_discrete_input(2, true));

        assert_eq!(server.read_input_registers(1, 1, 2).unwrap(), vec![230, 231]);
        assert_eq!(server.read_discrete_inputs(1, 1, 2).unwrap(), vec![false, true]);
        assert_err!(feed.set_coil(10_001, true));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_max_connections() {
        let server = ModbusServer::with_config(ServerConfig::default().with_max_connections(1));
        let addr = assert_ok!(server.start("127.0.0.1", 0).await);

        let mut first = TcpStream::connect(addr).await.unwrap();
        let request = Frame::new(1, 1, PduBuilder::build_read_request(0x03, 0, 1).unwrap());
        first.write_all(&request.encode()).await.unwrap();
        let reply = read_frame(&mut first).await.unwrap().unwrap();
        assert_eq!(reply.pdu.as_slice(), &[0x03, 0x02, 0x00, 10]);

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let n = timeout(Duration::from_secs(2), second.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        let stats = server.stats();
        assert_eq!(stats.connections_accepted, 2);
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.requests_served, 1);
        server.stop().await;
        assert_eq!(server.stats().active_connections, 0);
    }

    #[tokio::test]
    async fn test_idle_client_is_closed() {
        let server = ModbusServer::with_config(
            ServerConfig::default().with_idle_timeout(Duration::from_millis(100)),
        );
        let addr = assert_ok!(server.start("127.0.0.1", 0).await);

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let n = timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_right_after_start_is_prompt() {
        let server = ModbusServer::new();
        for _ in 0..5 {
            assert_ok!(server.start("127.0.0.1", 0).await);
            let started = std::time::Instant::now();
            server.stop().await;
            assert!(
                started.elapsed() < Duration::from_secs(1),
                "stop took {:?}",
                started.elapsed()
            );
            assert_eq!(server.state(), ServerState::Stopped);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_right_after_start_multi_thread() {
        let server = ModbusServer::new();
        for _ in 0..10 {
            assert_ok!(server.start("127.0.0.1", 0).await);
            let started = std::time::Instant::now();
            server.stop().await;
            assert!(started.elapsed() < Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn test_stop_closes_open_clients() {
        let server = ModbusServer::new();
        let addr = assert_ok!(server.start("127.0.0.1", 0).await);
        let mut client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        server.stop().await;
        let mut buf = [0u8; 1];
        let n = timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}
