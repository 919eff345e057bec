//! OS signal handling.

use std::io;

use tokio::signal::unix::{signal, SignalKind};

/// Wait for SIGINT or SIGTERM and return which one arrived.
pub async fn wait_for_termination() -> io::Result<&'static str> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    };
    tracing::info!(signal = name, "termination signal received");
    Ok(name)
}
