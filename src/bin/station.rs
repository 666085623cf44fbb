//! Modbus Station command line
//!
//! Usage:
//!   station                              loopback demo (server + client)
//!   station server [bind] [port]         host the register store until Ctrl-C
//!   station read <host> <port> [unit] [start] [count]
//!   station diagnose <host> <port> [unit]
//!
//! Log level follows `RUST_LOG` (default `info`).

use std::env;
use std::process::ExitCode;

use modbus_station::{
    info, AddressCodec, ConnectionOrchestrator, ConnectionSettings, DataType, ModbusClient,
    ModbusService, SwapMode, DEFAULT_TCP_PORT,
};
use tracing_subscriber::EnvFilter;

fn arg<T: std::str::FromStr>(args: &[String], index: usize, default: T) -> T {
    args.get(index)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("demo") => demo().await,
        Some("server") => {
            let bind = args.get(1).cloned().unwrap_or_else(|| "0.0.0.0".to_string());
            serve(&bind, arg(&args, 2, DEFAULT_TCP_PORT)).await
        }
        Some("read") if args.len() >= 3 => {
            read(
                &args[1],
                arg(&args, 2, DEFAULT_TCP_PORT),
                arg(&args, 3, 1),
                arg(&args, 4, 1),
                arg(&args, 5, 10),
            )
            .await
        }
        Some("diagnose") if args.len() >= 3 => {
            let result = modbus_station::run_diagnostics(
                &args[1],
                arg(&args, 2, DEFAULT_TCP_PORT),
                arg(&args, 3, 1),
            )
            .await;
            println!("{}", result);
            if result.is_modbus_responding() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        _ => {
            eprintln!(
                "usage: station [demo | server [bind] [port] | \
                 read <host> <port> [unit] [start] [count] | diagnose <host> <port> [unit]]"
            );
            ExitCode::from(2)
        }
    }
}

async fn demo() -> ExitCode {
    println!("{}", info());

    let station = ConnectionOrchestrator::new();
    if !station
        .connect_with(&ConnectionSettings::server("127.0.0.1", 0))
        .await
    {
        eprintln!("could not start the loopback server");
        return ExitCode::FAILURE;
    }
    let Some(addr) = station.server().local_addr() else {
        return ExitCode::FAILURE;
    };
    println!("Server listening on {}", addr);

    let client = ModbusClient::new();
    if !client.connect("127.0.0.1", addr.port()).await {
        eprintln!("client could not connect to {}", addr);
        station.shutdown().await;
        return ExitCode::FAILURE;
    }

    println!("Holding 1..=4: {:?}", client.read_holding_registers(1, 1, 4).await);

    client.write_single_register(1, 5, 999).await;
    println!("Holding 5 after write: {:?}", client.read_holding_registers(1, 5, 1).await);

    let (high, low) = AddressCodec::encode_f32(230.5);
    client.write_multiple_registers(1, 20, &[high, low]).await;
    if let Some(regs) = client.read_holding_registers(1, 20, 2).await {
        println!("Register pair 20-21 decoded:");
        for entry in AddressCodec::decode_matrix([regs[0], regs[1]]) {
            if entry.swap == SwapMode::None || entry.data_type == DataType::Float32 {
                println!(
                    "  {:>7} {:<4} {}",
                    entry.data_type.as_str(),
                    entry.swap.pattern(),
                    entry.value
                );
            }
        }
    }

    println!("{}", client.run_diagnostics("127.0.0.1", addr.port(), 1).await.summary());
    if let Some(stats) = client.stats().await {
        println!("Client stats: {:?}", stats);
    }

    client.disconnect().await;
    station.active().disconnect().await;
    ExitCode::SUCCESS
}

async fn serve(bind: &str, port: u16) -> ExitCode {
    let station = ConnectionOrchestrator::new();
    if !station
        .connect_with(&ConnectionSettings::server(bind, port))
        .await
    {
        eprintln!("could not listen on {}:{}", bind, port);
        return ExitCode::FAILURE;
    }
    println!("Serving on {:?}; Ctrl-C to stop", station.server().local_addr());

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("signal handler failed: {}", e);
    }
    station.shutdown().await;
    println!("Final stats: {:?}", station.server().stats());
    ExitCode::SUCCESS
}

async fn read(host: &str, port: u16, unit: u8, start: i32, count: u16) -> ExitCode {
    let client = ModbusClient::new();
    if !client.connect(host, port).await {
        eprintln!("could not connect to {}:{}", host, port);
        return ExitCode::FAILURE;
    }
    let result = client.read_holding_registers(unit, start, count).await;
    client.disconnect().await;

    match result {
        Some(values) => {
            for (offset, value) in values.iter().enumerate() {
                println!("{:>6}: {:>5} (0x{:04X})", start + offset as i32, value, value);
            }
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("read failed (see log)");
            ExitCode::FAILURE
        }
    }
}
