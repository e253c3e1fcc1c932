//! Console telemetry hub
//!
//! Reads broker messages from stdin, one per line as `<topic> <json body>`,
//! and prints every snapshot published for the watched device.
//!
//! Run with: cargo run --example console <CONFIG> <DEVICE>
//!
//! Example:
//!   echo 'sensors/porch/state {"temperature":21.5}' | \
//!     cargo run --example console demos/telemetry-hub.yaml porch

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use telemetry_hub::{DeviceSnapshot, InboundMessage, TelemetryHub};

fn print_usage() {
    eprintln!("Usage: console <CONFIG> <DEVICE>");
    eprintln!();
    eprintln!("Input lines: <topic> <json body>");
}

/// Split a line into topic and body at the first whitespace
fn parse_line(line: &str) -> Option<InboundMessage> {
    let (topic, body) = line.trim().split_once(char::is_whitespace)?;
    Some(InboundMessage::new(topic, body.trim().as_bytes().to_vec()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() != 3 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(1);
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("telemetry_hub=info".parse()?)
                .add_directive("console=info".parse()?),
        )
        .init();

    let hub = TelemetryHub::from_file(&args[1])?;
    let device = args[2].clone();

    println!("Broker subscriptions:");
    for filter in hub.router().subscription_filters() {
        println!("  {}", filter);
    }
    println!("Watching device '{}'", device);

    let mut subscription = hub.subscribe(&device).await?;
    let printer = tokio::spawn(async move {
        while let Some(payload) = subscription.recv().await {
            match DeviceSnapshot::from_slice(&payload) {
                Ok(snapshot) => {
                    for (name, metric) in &snapshot.metrics {
                        println!(
                            "{:>12}  last={:<8} 10s={:<8} 30s={:<8}",
                            name, metric.last, metric.avg_10s, metric.avg_30s
                        );
                    }
                    for (key, value) in &snapshot.metadata {
                        println!("{:>12}  {}", key, value);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Undecodable snapshot"),
            }
        }
        println!("Subscription closed");
    });

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(message) = parse_line(&line) else {
                        if !line.trim().is_empty() {
                            tracing::warn!(line = %line, "Expected '<topic> <json body>'");
                        }
                        continue;
                    };
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nShutting down...");
        }
    };

    if let Err(e) = hub.run_until(rx, shutdown).await {
        eprintln!("Hub error: {}", e);
    }

    let _ = printer.await;

    // The stdin reader can still be parked in a blocking read
    std::process::exit(0);
}
