//! Ordered start/stop of the two managed services.

use std::future::Future;

use crate::model::{CoreConfig, EdgeConfig};
use crate::supervisor::{ManagedProcess, SupervisorError};

/// The core proxy and, when something needs fronting, the edge proxy.
pub struct Deployment {
    core: ManagedProcess<CoreConfig>,
    edge: Option<ManagedProcess<EdgeConfig>>,
}

impl Deployment {
    pub fn new(core: ManagedProcess<CoreConfig>, edge: Option<ManagedProcess<EdgeConfig>>) -> Self {
        Self { core, edge }
    }

    pub fn core(&self) -> &ManagedProcess<CoreConfig> {
        &self.core
    }

    pub fn edge(&self) -> Option<&ManagedProcess<EdgeConfig>> {
        self.edge.as_ref()
    }

    /// Core first, then edge plus its initial config push.
    ///
    /// If the edge fails to spawn the core is stopped again before returning.
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        self.core.start().await?;

        if let Some(edge) = self.edge.as_mut() {
            if let Err(e) = edge.start().await {
                tracing::error!(error = %e, "edge failed to start, stopping core");
                if let Err(stop) = self.core.stop().await {
                    tracing::error!(error = %stop, "failed to stop core");
                }
                return Err(e);
            }
            edge.reload().await;
        }

        tracing::info!(edge = self.edge.is_some(), "deployment started");
        Ok(())
    }

    /// Edge first, then core. Both are attempted; the first error wins.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        let edge = match self.edge.as_mut() {
            Some(edge) => edge.stop().await,
            None => Ok(()),
        };
        let core = self.core.stop().await;
        tracing::info!("deployment stopped");
        edge.and(core)
    }

    /// Start, wait for `shutdown`, stop.
    pub async fn run_until<S>(&mut self, shutdown: S) -> Result<(), SupervisorError>
    where
        S: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        tracing::info!("shutdown requested");
        self.stop().await
    }
}
