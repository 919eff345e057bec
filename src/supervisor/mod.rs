//! Managed process supervision.
//!
//! # Data Flow
//! ```text
//! start():  render config → (core) write config file → spawn `<binary> run [-c path]`
//!               → logs.rs forwards stdout + stderr into the process span
//! reload(): render config → push.rs (admin POST | file rewrite)
//!               → resilience::retry_with_backoff on failure
//! stop():   SIGTERM → wait for exit → drain both log forwarders
//! ```
//!
//! # Design Decisions
//! - Push strategy is picked once at construction and never swapped
//! - `reload` takes `&mut self`, so a process never has two pushes in flight
//! - No SIGKILL escalation; a hung binary blocks `stop`
//! - Each process owns its span; nothing here touches the global subscriber

pub mod detect;
pub mod logs;
pub mod process;
pub mod push;

use thiserror::Error;

use crate::model::{CoreConfig, EdgeConfig};

pub use process::{ManagedProcess, ProcessState};
pub use push::{PushError, PushStrategy};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("{service} cannot {action} while {state:?}")]
    InvalidState {
        service: &'static str,
        action: &'static str,
        state: ProcessState,
    },

    #[error("failed to spawn {service}: {source}")]
    Spawn {
        service: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render config: {0}")]
    Render(#[from] serde_json::Error),

    #[error("failed to signal process: {0}")]
    Signal(#[from] nix::errno::Errno),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A configuration document a managed binary understands.
pub trait ServiceConfig: Send + Sync {
    fn render(&self) -> serde_json::Result<Vec<u8>>;
}

impl ServiceConfig for EdgeConfig {
    fn render(&self) -> serde_json::Result<Vec<u8>> {
        self.to_json()
    }
}

impl ServiceConfig for CoreConfig {
    fn render(&self) -> serde_json::Result<Vec<u8>> {
        let mut raw = self.to_json_pretty()?;
        raw.push(b'\n');
        Ok(raw)
    }
}
