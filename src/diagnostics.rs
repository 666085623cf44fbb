//! # Two-phase reachability diagnostics
//!
//! Answers "is the device there, and does it speak Modbus?" on a throwaway connection
//! that never contends with a client's I/O gate.
//!
//! 1. **TCP phase**: connect with a bounded timeout, recording latency and endpoints.
//! 2. **Modbus phase**: one `Read Holding Registers` (address 0, count 1).
//!
//! A device that answers with an exception has still proven it is reachable at the
//! Modbus level; only I/O errors and timeouts count as "not responding".
//!
//! ```rust,no_run
//! # async fn example() {
//! let result = modbus_station::run_diagnostics("192.168.1.50", 502, 1).await;
//! println!("{}", result);
//! if result.is_modbus_responding() {
//!     println!("device speaks Modbus");
//! }
//! # }
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::DiagnosticsConfig;
use crate::error::ModbusError;
use crate::protocol::{ModbusFunction, ModbusRequest, UnitId};
use crate::transport::{ModbusTransport, TcpTransport};

/// TCP phase outcome
#[derive(Debug, Clone, PartialEq)]
pub struct TcpProbe {
    pub connected: bool,
    pub latency: Option<Duration>,
    pub local_endpoint: Option<SocketAddr>,
    pub remote_endpoint: Option<SocketAddr>,
    pub error: Option<String>,
    pub timed_out: bool,
}

impl TcpProbe {
    fn failed(error: String, timed_out: bool) -> Self {
        Self {
            connected: false,
            latency: None,
            local_endpoint: None,
            remote_endpoint: None,
            error: Some(error),
            timed_out,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    /// The device answered, but with an exception response
    DeviceException { code: u8, description: String },
    IoError,
    Timeout,
    /// TCP phase failed, so no request was sent
    Skipped,
}

impl ProbeOutcome {
    /// True when the device produced any Modbus response.
    pub fn responded(&self) -> bool {
        matches!(self, Self::Success | Self::DeviceException { .. })
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::DeviceException { code, description } => {
                write!(f, "device exception 0x{:02X} ({})", code, description)
            }
            Self::IoError => f.write_str("I/O error"),
            Self::Timeout => f.write_str("timeout"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// Modbus phase outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ModbusProbe {
    pub outcome: ProbeOutcome,
    pub latency: Option<Duration>,
    pub error: Option<String>,
}

impl ModbusProbe {
    fn skipped() -> Self {
        Self {
            outcome: ProbeOutcome::Skipped,
            latency: None,
            error: None,
        }
    }
}

/// Immutable record of one diagnostics run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticResult {
    pub target: String,
    pub unit_id: UnitId,
    pub started_at: DateTime<Local>,
    pub tcp: TcpProbe,
    pub modbus: ModbusProbe,
}

impl DiagnosticResult {
    pub fn is_tcp_reachable(&self) -> bool {
        self.tcp.connected
    }

    pub fn is_modbus_responding(&self) -> bool {
        self.modbus.outcome.responded()
    }

    /// One-line verdict
    pub fn summary(&self) -> String {
        if !self.tcp.connected {
            let reason = if self.tcp.timed_out { "timed out" } else { "unreachable" };
            return format!("{} unit {}: TCP {}", self.target, self.unit_id, reason);
        }
        let verdict = match &self.modbus.outcome {
            ProbeOutcome::Success => "Modbus responding".to_string(),
            ProbeOutcome::DeviceException { code, .. } => {
                format!("Modbus responding (exception 0x{:02X})", code)
            }
            other => format!("Modbus not responding ({})", other),
        };
        format!("{} unit {}: TCP ok, {}", self.target, self.unit_id, verdict)
    }
}

fn millis(latency: Option<Duration>) -> String {
    latency
        .map(|d| format!("{:.1} ms", d.as_secs_f64() * 1000.0))
        .unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for DiagnosticResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Diagnostics for {} (unit {}) at {}",
            self.target,
            self.unit_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        write!(f, "  TCP:    ")?;
        if self.tcp.connected {
            write!(f, "connected in {}", millis(self.tcp.latency))?;
            if let (Some(local), Some(remote)) =
                (self.tcp.local_endpoint, self.tcp.remote_endpoint)
            {
                write!(f, " ({} -> {})", local, remote)?;
            }
        } else {
            write!(f, "failed: {}", self.tcp.error.as_deref().unwrap_or("unknown error"))?;
        }
        writeln!(f)?;
        write!(f, "  Modbus: {}", self.modbus.outcome)?;
        if self.modbus.latency.is_some() {
            write!(f, " in {}", millis(self.modbus.latency))?;
        }
        if let Some(error) = &self.modbus.error {
            write!(f, ": {}", error)?;
        }
        Ok(())
    }
}

/// Run diagnostics with default timeouts (5s connect, 5s response).
pub async fn run_diagnostics(host: &str, port: u16, unit_id: UnitId) -> DiagnosticResult {
    run_diagnostics_with(host, port, unit_id, &DiagnosticsConfig::default()).await
}

pub async fn run_diagnostics_with(
    host: &str,
    port: u16,
    unit_id: UnitId,
    config: &DiagnosticsConfig,
) -> DiagnosticResult {
    let started_at = Local::now();
    let target = format!("{}:{}", host, port);
    info!("Running diagnostics against {} (unit {})", target, unit_id);

    let started = Instant::now();
    let connect = TcpStream::connect((host, port));
    let (tcp, stream) = match timeout(config.connect_timeout, connect).await {
        Ok(Ok(stream)) => {
            let probe = TcpProbe {
                connected: true,
                latency: Some(started.elapsed()),
                local_endpoint: stream.local_addr().ok(),
                remote_endpoint: stream.peer_addr().ok(),
                error: None,
                timed_out: false,
            };
            (probe, Some(stream))
        }
        Ok(Err(e)) => (TcpProbe::failed(e.to_string(), false), None),
        Err(_) => {
            let message = format!(
                "connect timed out after {} ms",
                config.connect_timeout.as_millis()
            );
            (TcpProbe::failed(message, true), None)
        }
    };

    let modbus = match stream {
        Some(stream) => probe_modbus(stream, unit_id, config.response_timeout).await,
        None => ModbusProbe::skipped(),
    };

    let result = DiagnosticResult {
        target,
        unit_id,
        started_at,
        tcp,
        modbus,
    };
    info!("{}", result.summary());
    result
}

async fn probe_modbus(
    stream: TcpStream,
    unit_id: UnitId,
    response_timeout: Duration,
) -> ModbusProbe {
    let mut transport = match TcpTransport::from_stream(stream, response_timeout) {
        Ok(transport) => transport,
        Err(e) => {
            return ModbusProbe {
                outcome: ProbeOutcome::IoError,
                latency: None,
                error: Some(e.to_string()),
            }
        }
    };

    let request = ModbusRequest::new_read(unit_id, ModbusFunction::ReadHoldingRegisters, 0, 1);
    let started = Instant::now();
    let result = transport.request(&request).await;
    let latency = started.elapsed();
    let _ = transport.close().await;

    match result {
        Ok(_) => ModbusProbe {
            outcome: ProbeOutcome::Success,
            latency: Some(latency),
            error: None,
        },
        Err(ModbusError::Exception { code, message, .. }) => ModbusProbe {
            outcome: ProbeOutcome::DeviceException {
                code,
                description: message,
            },
            latency: Some(latency),
            error: None,
        },
        Err(e) if e.is_timeout() => {
            debug!("Diagnostic request to unit {} timed out: {}", unit_id, e);
            ModbusProbe {
                outcome: ProbeOutcome::Timeout,
                latency: None,
                error: Some(e.to_string()),
            }
        }
        Err(e) => {
            debug!("Diagnostic request to unit {} failed: {}", unit_id, e);
            ModbusProbe {
                outcome: ProbeOutcome::IoError,
                latency: None,
                error: Some(e.to_string()),
            }
        }
    }
}
