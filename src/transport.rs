//! # Modbus TCP transport
//!
//! One request/response exchange at a time over a single `TcpStream`, framed with MBAP.
//!
//! The transport itself does no locking: [`ModbusClient`](crate::client::ModbusClient)
//! owns it behind its I/O gate, which is what guarantees a single request in flight.
//!
//! ## Liveness
//!
//! [`ModbusTransport::probe`] distinguishes a healthy idle socket from one the peer has
//! closed without issuing a request. It peeks one byte under a short deadline:
//!
//! | Peek result | State |
//! |-------------|-------|
//! | deadline elapsed | [`LinkState::Idle`] |
//! | `Ok(n > 0)` | [`LinkState::PendingData`] |
//! | `Ok(0)` or error | [`LinkState::Closed`] |

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::constants::MBAP_HEADER_LEN;
use crate::error::{ModbusError, ModbusResult};
use crate::mbap::{read_frame, Frame};
use crate::protocol::{ModbusRequest, ModbusResponse};

/// Format raw bytes as hex string for packet logging
fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn log_packet(direction: &str, data: &[u8], unit_id: u8) {
    info!("[MODBUS-TCP] {} unit:{} {}", direction, unit_id, format_hex_packet(data));
}

/// Result of a non-blocking liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Socket open, nothing buffered
    Idle,
    /// Socket open, unread bytes waiting
    PendingData,
    /// Peer closed the connection, or the socket errored
    Closed,
}

impl LinkState {
    #[inline]
    pub fn is_alive(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// Counters kept per connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub exceptions_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// A request/response channel to one Modbus device.
///
/// Implementations must be `Send + Sync` so the owning client can be shared across tasks.
pub trait ModbusTransport: Send + Sync {
    /// Send one request and wait for its response.
    ///
    /// Exception responses come back as [`ModbusError::Exception`]; any error for which
    /// [`ModbusError::is_transport_fault`] holds leaves the transport unusable.
    fn request(
        &mut self,
        request: &ModbusRequest,
    ) -> impl Future<Output = ModbusResult<ModbusResponse>> + Send;

    /// Check the socket without blocking longer than `deadline`.
    fn probe(&self, deadline: Duration) -> impl Future<Output = LinkState> + Send;

    /// Whether a socket is still held (no I/O performed).
    fn is_connected(&self) -> bool;

    fn close(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    fn get_stats(&self) -> TransportStats;
}

/// Modbus TCP transport
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer_address: SocketAddr,
    local_address: SocketAddr,
    timeout: Duration,
    transaction_id: u16,
    stats: TransportStats,
    packet_logging: bool,
}

impl TcpTransport {
    /// Open a connection, giving up after `connect_timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> ModbusResult<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                ModbusError::timeout(
                    format!("connect to {}:{}", host, port),
                    connect_timeout.as_millis() as u64,
                )
            })?
            .map_err(|e| {
                ModbusError::connection(format!("Failed to connect to {}:{}: {}", host, port, e))
            })?;

        Self::from_stream(stream, request_timeout)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream, request_timeout: Duration) -> ModbusResult<Self> {
        let peer_address = stream.peer_addr()?;
        let local_address = stream.local_addr()?;
        // Modbus frames are tiny; don't let Nagle hold them back
        stream.set_nodelay(true)?;

        debug!("TCP transport {} -> {} established", local_address, peer_address);
        Ok(Self {
            stream: Some(stream),
            peer_address,
            local_address,
            timeout: request_timeout,
            transaction_id: 0,
            stats: TransportStats::default(),
            packet_logging: false,
        })
    }

    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    pub fn peer_address(&self) -> SocketAddr {
        self.peer_address
    }

    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Wrapping, never 0.
    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        if self.transaction_id == 0 {
            self.transaction_id = 1;
        }
        self.transaction_id
    }

    async fn exchange(
        stream: &mut TcpStream,
        frame: &[u8],
        deadline: Duration,
    ) -> ModbusResult<Frame> {
        let deadline_ms = deadline.as_millis() as u64;

        timeout(deadline, stream.write_all(frame))
            .await
            .map_err(|_| ModbusError::timeout("send request", deadline_ms))??;

        timeout(deadline, read_frame(stream))
            .await
            .map_err(|_| ModbusError::timeout("read response", deadline_ms))??
            .ok_or_else(|| ModbusError::connection("connection closed by peer"))
    }
}

impl ModbusTransport for TcpTransport {
    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        request.validate()?;
        let pdu = request.to_pdu()?;
        let transaction_id = self.next_transaction_id();
        let frame = Frame::new(transaction_id, request.unit_id, pdu).encode();

        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        if self.packet_logging {
            log_packet("send", &frame, request.unit_id);
        }

        let result = match self.stream.as_mut() {
            Some(stream) => Self::exchange(stream, &frame, self.timeout).await,
            None => Err(ModbusError::connection("transport already closed")),
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.stats.errors += 1;
                if e.is_timeout() {
                    self.stats.timeouts += 1;
                }
                // the stream position is unknown now
                self.stream = None;
                return Err(e);
            }
        };

        self.stats.bytes_received += (MBAP_HEADER_LEN + reply.pdu.len()) as u64;
        if self.packet_logging {
            log_packet("receive", &reply.encode(), reply.header.unit_id);
        }

        if reply.header.transaction_id != transaction_id {
            self.stats.errors += 1;
            self.stream = None;
            return Err(ModbusError::protocol(format!(
                "transaction id mismatch: sent {}, received {}",
                transaction_id, reply.header.transaction_id
            )));
        }

        let response = match ModbusResponse::from_pdu(reply.header.unit_id, &reply.pdu) {
            Ok(response) => response,
            Err(e) => {
                if e.is_device_exception() {
                    self.stats.exceptions_received += 1;
                } else {
                    self.stats.errors += 1;
                }
                return Err(e);
            }
        };
        self.stats.responses_received += 1;

        if response.function != request.function {
            return Err(ModbusError::protocol(format!(
                "response function {} does not match request {}",
                response.function, request.function
            )));
        }
        if !request.function.is_read_function() {
            response.check_write_echo(request)?;
        }
        Ok(response)
    }

    async fn probe(&self, deadline: Duration) -> LinkState {
        let Some(stream) = self.stream.as_ref() else {
            return LinkState::Closed;
        };
        let mut buf = [0u8; 1];
        match timeout(deadline, stream.peek(&mut buf)).await {
            Err(_) => LinkState::Idle,
            Ok(Ok(0)) => LinkState::Closed,
            Ok(Ok(_)) => LinkState::PendingData,
            Ok(Err(e)) => {
                debug!("Probe on {} failed: {}", self.peer_address, e);
                LinkState::Closed
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("TCP transport to {} closed", self.peer_address);
        }
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
