//! Simulated Device Example
//!
//! Hosts a Modbus TCP server and feeds its input registers and discrete inputs with a
//! slowly changing signal, the way a simulation collaborator would.
//!
//! # Running this example
//!
//! ```bash
//! RUST_LOG=debug cargo run --example simulated_server -- 1502
//! ```
//!
//! Then point any Modbus client at 127.0.0.1:1502, unit 1.

use std::time::Duration;

use modbus_station::{AddressCodec, ModbusResult, ModbusServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ModbusResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(1502);

    let server = ModbusServer::with_config(ServerConfig::default().with_max_connections(4));
    let addr = server.start("0.0.0.0", port).await?;
    println!("Simulated device on {}; Ctrl-C to stop", addr);

    let feed = server.buffer_access()?;
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut step = 0u32;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                step = step.wrapping_add(1);
                // voltage around 230 V as float32 in input registers 1-2
                let volts = 230.0 + ((step as f32) / 10.0).sin() * 4.0;
                let (high, low) = AddressCodec::encode_f32(volts);
                feed.set_input_registers(1, &[high, low])?;
                // raw counter in input register 3
                feed.set_input_register(3, (step % 65_536) as u16)?;
                feed.set_discrete_input(1, step % 4 < 2)?;
            }
        }
    }

    server.stop().await;
    println!("Stats: {:?}", server.stats());
    Ok(())
}
