//! Link Diagnostics Example
//!
//! Probes a device at the TCP level and then with a single Modbus read, and prints
//! both phases.
//!
//! # Running this example
//!
//! ```bash
//! cargo run --example diagnose -- 192.168.1.50 502 1
//! ```

use std::time::Duration;

use modbus_station::{run_diagnostics_with, DiagnosticsConfig, ProbeOutcome};

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let host = args.first().map(String::as_str).unwrap_or("127.0.0.1");
    let port = args.get(1).and_then(|p| p.parse().ok()).unwrap_or(502);
    let unit = args.get(2).and_then(|u| u.parse().ok()).unwrap_or(1);

    let config = DiagnosticsConfig::default()
        .with_connect_timeout(Duration::from_secs(3))
        .with_response_timeout(Duration::from_secs(2));
    let result = run_diagnostics_with(host, port, unit, &config).await;

    println!("{}", result);
    println!();
    println!("{}", result.summary());

    match &result.modbus.outcome {
        ProbeOutcome::DeviceException { code, .. } => {
            println!(
                "The device is alive but rejected address 0 (code {}); try another register.",
                code
            )
        }
        ProbeOutcome::Timeout => println!("TCP works but nothing answered: check the unit id."),
        ProbeOutcome::Skipped => println!("Nothing is listening: check host, port and firewall."),
        _ => {}
    }
}
