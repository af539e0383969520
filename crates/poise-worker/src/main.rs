//! Poise Worker Process
//!
//! Runs feature extraction, calibration and classification off the
//! request-handling thread of the coaching app.
//!
//! Communication is via JSON lines over stdin/stdout.

mod config;
mod handler;

use anyhow::Result;
use handler::Worker;
use poise_types::{WorkerCommand, WorkerResponse};
use std::io::{self, BufRead, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // Initialize tracing to stderr (stdout is for IPC)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("Poise worker starting");

    if let Err(e) = run_worker() {
        tracing::error!("Worker error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_worker() -> Result<()> {
    let config = config::load_config()?;
    let worker = Worker::from_config(config)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    tracing::info!("Worker ready, listening for commands");

    for line in stdin.lock().lines() {
        let line = line?;

        if line.trim().is_empty() {
            continue;
        }

        let command: WorkerCommand = match serde_json::from_str(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                let response = WorkerResponse::Error {
                    message: format!("Invalid command: {}", e),
                };
                send(&mut stdout, &response)?;
                continue;
            }
        };

        if let WorkerCommand::Shutdown = command {
            tracing::info!("Shutdown command received");
            send(&mut stdout, &WorkerResponse::Ok)?;
            break;
        }

        let response = worker.handle(command);
        send(&mut stdout, &response)?;
    }

    tracing::info!("Worker shutting down");
    Ok(())
}

fn send(stdout: &mut impl Write, response: &WorkerResponse) -> Result<()> {
    writeln!(stdout, "{}", serde_json::to_string(response)?)?;
    stdout.flush()?;
    Ok(())
}
