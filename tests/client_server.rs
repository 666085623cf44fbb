//! End-to-end scenarios over loopback TCP: a real client against a real server,
//! plus hand-rolled peers for the failure paths.

use std::sync::Arc;
use std::time::Duration;

use modbus_station::{
    run_diagnostics, ClientState, ConnectionOrchestrator, ConnectionSettings, ModbusClient,
    ModbusError, ModbusServer, ModbusService, Monitor, MonitorArea, MonitorPlan, ProbeOutcome,
    SampleValues, ServiceMode,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

async fn running_server() -> (ModbusServer, u16) {
    let server = ModbusServer::new();
    let addr = assert_ok!(server.start("127.0.0.1", 0).await);
    (server, addr.port())
}

#[tokio::test]
async fn test_read_seeded_registers_on_fixed_port() {
    let server = ModbusServer::new();
    let addr = assert_ok!(server.start("127.0.0.1", 15020).await);
    assert_eq!(addr.port(), 15020);

    let client = ModbusClient::new();
    assert!(client.connect("127.0.0.1", 15020).await);
    assert_eq!(client.state(), ClientState::Connected);
    assert_eq!(
        client.read_holding_registers(1, 1, 4).await,
        Some(vec![10, 20, 30, 40])
    );

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn test_write_then_read_back() {
    let (server, port) = running_server().await;
    let client = ModbusClient::new();
    assert!(client.connect("127.0.0.1", port).await);

    client.write_single_register(1, 5, 999).await;
    assert_eq!(client.read_holding_registers(1, 5, 1).await, Some(vec![999]));
    assert_eq!(assert_ok!(server.read_holding_registers(1, 5, 1)), vec![999]);

    assert!(client.write_multiple_registers(1, 100, &[1, 2, 3]).await);
    assert_eq!(client.read_holding_registers(1, 100, 3).await, Some(vec![1, 2, 3]));

    client.write_single_coil(1, 7, true).await;
    assert!(client.write_multiple_coils(1, 8, &[false, true, true]).await);
    assert_eq!(
        client.read_coils(1, 7, 4).await,
        Some(vec![true, false, true, true])
    );

    let stats = client.stats().await.unwrap();
    assert_eq!(stats.requests_sent, stats.responses_received);
    assert_eq!(stats.errors, 0);

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn test_feed_input_registers_through_buffer_access() {
    let (server, port) = running_server().await;
    let feed = assert_ok!(server.buffer_access());
    assert_ok!(feed.set_input_registers(1, &[0x4366, 0x8000]));
    assert_ok!(feed.set_discrete_input(2, true));

    let client = ModbusClient::new();
    assert!(client.connect("127.0.0.1", port).await);
    let regs = client.read_input_registers(1, 1, 2).await.unwrap();
    assert_eq!(modbus_station::AddressCodec::decode_f32(regs[0], regs[1]), 230.5);
    assert_eq!(
        client.read_discrete_inputs(1, 1, 3).await,
        Some(vec![false, true, false])
    );

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn test_out_of_range_read_is_exception_not_disconnect() {
    let (server, port) = running_server().await;
    let client = ModbusClient::new();
    assert!(client.connect("127.0.0.1", port).await);

    assert_eq!(client.read_holding_registers(1, 10_000, 5).await, None);
    assert_eq!(client.state(), ClientState::Faulted);
    assert!(client.is_connected().await);

    assert_eq!(client.read_holding_registers(1, 1, 1).await, Some(vec![10]));
    assert_eq!(client.state(), ClientState::Connected);

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn test_local_bounds_checks() {
    let (server, _) = running_server().await;
    assert!(matches!(
        server.read_holding_registers(1, 10_000, 5),
        Err(ModbusError::OutOfRange { .. })
    ));
    assert!(matches!(
        server.write_single_coil(1, 0, true),
        Err(ModbusError::OutOfRange { .. })
    ));
    assert_ok!(server.read_holding_registers(1, 9_996, 5));
    server.stop().await;
}

#[tokio::test]
async fn test_peer_close_detected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let peer = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let client = ModbusClient::new();
    assert!(client.connect("127.0.0.1", port).await);
    peer.await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!client.is_connected().await);
    assert_eq!(client.state(), ClientState::Disconnected);
    assert_eq!(client.read_holding_registers(1, 1, 1).await, None);
}

#[tokio::test]
async fn test_server_stop_drops_clients() {
    let (server, port) = running_server().await;
    let client = ModbusClient::new();
    assert!(client.connect("127.0.0.1", port).await);
    assert!(client.read_coils(1, 1, 1).await.is_some());

    server.stop().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.read_coils(1, 1, 1).await, None);
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn test_lifecycle_is_idempotent() {
    let server = ModbusServer::new();
    server.stop().await;

    let first = assert_ok!(server.start("127.0.0.1", 0).await);
    let second = assert_ok!(server.start("127.0.0.1", 0).await);
    assert_eq!(first, second);

    server.stop().await;
    server.stop().await;
    assert!(!server.is_running());
    assert_err!(server.read_coils(1, 1, 1));

    let restarted = assert_ok!(server.start("127.0.0.1", 0).await);
    assert!(server.is_running());
    assert_eq!(server.local_addr(), Some(restarted));
    server.stop().await;
}

#[tokio::test]
async fn test_port_conflict_reports_address_in_use() {
    let (first, port) = running_server().await;
    let second = ModbusServer::new();
    let err = second.start("127.0.0.1", port).await.unwrap_err();
    assert!(matches!(err, ModbusError::AddressInUse { .. }));
    assert!(!second.is_running());
    first.stop().await;
}

#[tokio::test]
async fn test_diagnostics_against_server() {
    let (server, port) = running_server().await;
    let result = run_diagnostics("127.0.0.1", port, 1).await;
    assert!(result.is_tcp_reachable());
    assert!(result.is_modbus_responding());
    assert_eq!(result.modbus.outcome, ProbeOutcome::Success);
    server.stop().await;
}

#[tokio::test]
async fn test_diagnostics_counts_exception_as_responding() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 12];
        stream.read_exact(&mut request).await.unwrap();
        let reply = [request[0], request[1], 0, 0, 0, 3, request[6], 0x83, 0x02];
        stream.write_all(&reply).await.unwrap();
        let _ = stream.read(&mut request).await;
    });

    let result = run_diagnostics("127.0.0.1", port, 9).await;
    assert!(result.is_modbus_responding());
    assert!(matches!(
        result.modbus.outcome,
        ProbeOutcome::DeviceException { code: 2, .. }
    ));
}

#[tokio::test]
async fn test_orchestrated_client_against_server() {
    let (server, port) = running_server().await;
    let station = ConnectionOrchestrator::new();
    assert!(station.connect_with(&ConnectionSettings::client("127.0.0.1", port)).await);
    assert_eq!(station.mode(), ServiceMode::Client);

    let active = station.active();
    assert_ok!(active.write_single_register(1, 3, 77).await);
    assert_eq!(
        active.read_holding_registers(1, 1, 3).await,
        Ok(Some(vec![10, 20, 77]))
    );
    assert_ok!(active.write_single_coil(1, 2, true).await);
    assert_eq!(active.read_coils(1, 1, 2).await, Ok(Some(vec![false, true])));

    station.shutdown().await;
    assert!(!station.active().is_connected().await);
    server.stop().await;
}

#[tokio::test]
async fn test_monitor_through_client() {
    let (server, port) = running_server().await;
    let client = Arc::new(ModbusClient::new());
    assert!(client.connect("127.0.0.1", port).await);

    let plan = MonitorPlan::new(MonitorArea::HoldingRegisters, 2, 2)
        .with_interval(Duration::from_millis(20));
    let (handle, mut samples) = assert_ok!(Monitor::spawn(client.clone(), plan));

    let first = samples.recv().await.unwrap();
    assert_eq!(first.values, SampleValues::Registers(vec![20, 30]));

    server.stop().await;
    let mut sample = samples.recv().await.unwrap();
    while sample.values != SampleValues::Unavailable {
        sample = samples.recv().await.unwrap();
    }

    handle.stop().await;
    client.disconnect().await;
}
