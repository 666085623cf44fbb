//! Periodic sampling through the service contract
//!
//! A [`Monitor`] repeats one planned read on a fixed cadence and streams the results
//! over a channel. It only talks to a [`ModbusService`], so the same plan works against
//! a remote device (client) or the local store (server).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use modbus_station::{ModbusServer, Monitor, MonitorArea, MonitorPlan};
//!
//! # async fn example() -> modbus_station::ModbusResult<()> {
//! let server = Arc::new(ModbusServer::new());
//! server.start("127.0.0.1", 1502).await?;
//!
//! let plan = MonitorPlan::new(MonitorArea::HoldingRegisters, 1, 4)
//!     .with_interval(Duration::from_millis(500));
//! let (handle, mut samples) = Monitor::spawn(server.clone(), plan)?;
//! if let Some(sample) = samples.recv().await {
//!     println!("{} {:?}", sample.taken_at, sample.values);
//! }
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::codec::UiAddress;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::UnitId;
use crate::service::ModbusService;

const SAMPLE_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorArea {
    HoldingRegisters,
    InputRegisters,
    Coils,
    DiscreteInputs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorPlan {
    pub unit_id: UnitId,
    pub area: MonitorArea,
    pub start: UiAddress,
    pub count: u16,
    pub interval: Duration,
}

impl MonitorPlan {
    /// Unit 1, once per second.
    pub fn new(area: MonitorArea, start: UiAddress, count: u16) -> Self {
        Self {
            unit_id: 1,
            area,
            start,
            count,
            interval: Duration::from_secs(1),
        }
    }

    pub fn with_unit_id(mut self, unit_id: UnitId) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn validate(&self) -> ModbusResult<()> {
        if self.interval.is_zero() {
            return Err(ModbusError::configuration("monitor interval must be non-zero"));
        }
        if self.count == 0 {
            return Err(ModbusError::configuration("monitor count must be non-zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValues {
    Registers(Vec<u16>),
    Coils(Vec<bool>),
    /// The service had nothing to return (client not connected, read failed)
    Unavailable,
    /// The service refused the read
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Sample {
    /// Starts at 1
    pub sequence: u64,
    pub taken_at: DateTime<Local>,
    pub values: SampleValues,
}

pub struct Monitor;

impl Monitor {
    /// Start sampling. The first read happens immediately.
    ///
    /// Samples the receiver is too slow to take are dropped. The task ends on
    /// [`MonitorHandle::stop`] or when the receiver is dropped. An invalid plan fails
    /// with [`ModbusError::Configuration`] and spawns nothing.
    pub fn spawn<S>(
        service: Arc<S>,
        plan: MonitorPlan,
    ) -> ModbusResult<(MonitorHandle, mpsc::Receiver<Sample>)>
    where
        S: ModbusService + 'static,
    {
        plan.validate()?;
        let (sample_tx, sample_rx) = mpsc::channel(SAMPLE_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(plan.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sequence = 0u64;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let values = take_sample(service.as_ref(), &plan).await;
                        sequence += 1;
                        let sample = Sample {
                            sequence,
                            taken_at: Local::now(),
                            values,
                        };
                        match sample_tx.try_send(sample) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                warn!("Monitor receiver is lagging, dropped sample {}", sequence);
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }
            debug!("Monitor for {:?} stopped after {} samples", plan.area, sequence);
        });

        Ok((MonitorHandle { shutdown_tx, task }, sample_rx))
    }
}

async fn take_sample<S: ModbusService>(service: &S, plan: &MonitorPlan) -> SampleValues {
    let MonitorPlan {
        unit_id,
        start,
        count,
        ..
    } = *plan;
    let result = match plan.area {
        MonitorArea::HoldingRegisters => service
            .read_holding_registers(unit_id, start, count)
            .await
            .map(|v| v.map(SampleValues::Registers)),
        MonitorArea::InputRegisters => service
            .read_input_registers(unit_id, start, count)
            .await
            .map(|v| v.map(SampleValues::Registers)),
        MonitorArea::Coils => service
            .read_coils(unit_id, start, count)
            .await
            .map(|v| v.map(SampleValues::Coils)),
        MonitorArea::DiscreteInputs => service
            .read_discrete_inputs(unit_id, start, count)
            .await
            .map(|v| v.map(SampleValues::Coils)),
    };

    match result {
        Ok(Some(values)) => values,
        Ok(None) => SampleValues::Unavailable,
        Err(e) => {
            debug!("Monitor read of {:?} at {} failed: {}", plan.area, start, e);
            SampleValues::Failed(e.to_string())
        }
    }
}

/// Cancels a running monitor.
pub struct MonitorHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!("Monitor task failed: {}", e);
        }
    }
}
