//! Benchmarks for the codec and request hot paths
//!
//! Covers what runs on every poll: value decoding, server-side request decoding,
//! MBAP encoding and store copies, plus one loopback round trip.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modbus_station::mbap::Frame;
use modbus_station::protocol::ServerRequest;
use modbus_station::{
    AddressCodec, DataType, ModbusClient, ModbusServer, PduBuilder, RegisterStore, SwapMode,
};

fn bench_decode_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_value");
    for swap in SwapMode::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(swap.pattern()), &swap, |b, &swap| {
            b.iter(|| {
                AddressCodec::decode_value(black_box([0x41CC, 0x0000]), DataType::Float32, swap)
            })
        });
    }
    group.finish();

    c.bench_function("decode_matrix", |b| {
        b.iter(|| AddressCodec::decode_matrix(black_box([0x4142, 0x4344])))
    });
}

fn bench_ascii(c: &mut Criterion) {
    let text = "PUMP-STATION-07 FLOW METER";
    c.bench_function("encode_ascii_to_registers", |b| {
        b.iter(|| AddressCodec::encode_ascii_to_registers(black_box(text)))
    });

    let registers = AddressCodec::encode_ascii_to_registers(text);
    c.bench_function("decode_registers_to_ascii", |b| {
        b.iter(|| AddressCodec::decode_registers_to_ascii(black_box(&registers)))
    });
}

fn bench_request_path(c: &mut Criterion) {
    let read = PduBuilder::build_read_request(0x03, 0, 125).unwrap();
    c.bench_function("server_request_decode_read", |b| {
        b.iter(|| ServerRequest::from_pdu(black_box(&read)))
    });

    let values: Vec<u16> = (0..123).collect();
    let write = PduBuilder::build_write_multiple_registers(0, &values).unwrap();
    c.bench_function("server_request_decode_write_123", |b| {
        b.iter(|| ServerRequest::from_pdu(black_box(&write)))
    });

    c.bench_function("mbap_frame_encode", |b| {
        b.iter(|| Frame::new(black_box(7), 1, write.clone()).encode())
    });

    let store = RegisterStore::new(10_000);
    c.bench_function("store_read_125", |b| {
        b.iter(|| store.read_holding_registers(black_box(1), 125))
    });
}

fn bench_loopback_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (server, client) = rt.block_on(async {
        let server = ModbusServer::new();
        let addr = server.start("127.0.0.1", 0).await.unwrap();
        let client = ModbusClient::new();
        assert!(client.connect("127.0.0.1", addr.port()).await);
        (server, client)
    });

    c.bench_function("loopback_read_holding_16", |b| {
        b.iter(|| rt.block_on(async { black_box(client.read_holding_registers(1, 1, 16).await) }))
    });

    rt.block_on(async {
        client.disconnect().await;
        server.stop().await;
    });
}

criterion_group!(
    benches,
    bench_decode_value,
    bench_ascii,
    bench_request_path,
    bench_loopback_round_trip
);
criterion_main!(benches);
