//! The contract both sides of the station expose to callers
//!
//! Client and server answer the same calls with the same types, so orchestration and
//! scheduling code is written once against [`ModbusService`].
//!
//! | Situation | Client | Server |
//! |-----------|--------|--------|
//! | wrong lifecycle state | `Ok(None)` / `Ok(())` | `Err(NotRunning)` |
//! | address past the store | device decides | `Err(OutOfRange)` |
//! | transport or device fault | `Ok(None)` / `Ok(())` | n/a |
//!
//! All addresses are 1-based.

use std::future::Future;

use crate::client::{Connector, ModbusClient};
use crate::codec::UiAddress;
use crate::error::ModbusResult;
use crate::protocol::UnitId;
use crate::server::ModbusServer;

pub trait ModbusService: Send + Sync {
    /// Client: live connection. Server: accepting connections.
    fn is_connected(&self) -> impl Future<Output = bool> + Send;

    /// Client: connect to `address:port`. Server: start listening on it.
    fn connect(&self, address: &str, port: u16) -> impl Future<Output = bool> + Send;

    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    fn read_holding_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> impl Future<Output = ModbusResult<Option<Vec<u16>>>> + Send;

    fn read_input_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> impl Future<Output = ModbusResult<Option<Vec<u16>>>> + Send;

    fn read_coils(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> impl Future<Output = ModbusResult<Option<Vec<bool>>>> + Send;

    fn read_discrete_inputs(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> impl Future<Output = ModbusResult<Option<Vec<bool>>>> + Send;

    fn write_single_register(
        &self,
        unit_id: UnitId,
        address: UiAddress,
        value: u16,
    ) -> impl Future<Output = ModbusResult<()>> + Send;

    fn write_single_coil(
        &self,
        unit_id: UnitId,
        address: UiAddress,
        value: bool,
    ) -> impl Future<Output = ModbusResult<()>> + Send;
}

impl<C: Connector> ModbusService for ModbusClient<C> {
    async fn is_connected(&self) -> bool {
        ModbusClient::is_connected(self).await
    }

    async fn connect(&self, address: &str, port: u16) -> bool {
        ModbusClient::connect(self, address, port).await
    }

    async fn disconnect(&self) {
        ModbusClient::disconnect(self).await
    }

    async fn read_holding_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<u16>>> {
        Ok(ModbusClient::read_holding_registers(self, unit_id, start, count).await)
    }

    async fn read_input_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<u16>>> {
        Ok(ModbusClient::read_input_registers(self, unit_id, start, count).await)
    }

    async fn read_coils(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<bool>>> {
        Ok(ModbusClient::read_coils(self, unit_id, start, count).await)
    }

    async fn read_discrete_inputs(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<bool>>> {
        Ok(ModbusClient::read_discrete_inputs(self, unit_id, start, count).await)
    }

    async fn write_single_register(
        &self,
        unit_id: UnitId,
        address: UiAddress,
        value: u16,
    ) -> ModbusResult<()> {
        ModbusClient::write_single_register(self, unit_id, address, value).await;
        Ok(())
    }

    async fn write_single_coil(
        &self,
        unit_id: UnitId,
        address: UiAddress,
        value: bool,
    ) -> ModbusResult<()> {
        ModbusClient::write_single_coil(self, unit_id, address, value).await;
        Ok(())
    }
}

impl ModbusService for ModbusServer {
    async fn is_connected(&self) -> bool {
        self.is_running()
    }

    async fn connect(&self, address: &str, port: u16) -> bool {
        ModbusServer::connect(self, address, port).await
    }

    async fn disconnect(&self) {
        ModbusServer::disconnect(self).await
    }

    async fn read_holding_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<u16>>> {
        ModbusServer::read_holding_registers(self, unit_id, start, count).map(Some)
    }

    async fn read_input_registers(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<u16>>> {
        ModbusServer::read_input_registers(self, unit_id, start, count).map(Some)
    }

    async fn read_coils(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<bool>>> {
        ModbusServer::read_coils(self, unit_id, start, count).map(Some)
    }

    async fn read_discrete_inputs(
        &self,
        unit_id: UnitId,
        start: UiAddress,
        count: u16,
    ) -> ModbusResult<Option<Vec<bool>>> {
        ModbusServer::read_discrete_inputs(self, unit_id, start, count).map(Some)
    }

    async fn write_single_register(
        &self,
        unit_id: UnitId,
        address: UiAddress,
        value: u16,
    ) -> ModbusResult<()> {
        ModbusServer::write_single_register(self, unit_id, address, value)
    }

    async fn write_single_coil(
        &self,
        unit_id: UnitId,
        address: UiAddress,
        value: bool,
    ) -> ModbusResult<()> {
        ModbusServer::write_single_coil(self, unit_id, address, value)
    }
}
