//! A single supervised external process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span};

use super::logs::forward_lines;
use super::push::{PushError, PushStrategy};
use super::{ServiceConfig, SupervisorError};
use crate::model::{CoreConfig, EdgeConfig};
use crate::observability::metrics;
use crate::resilience::{retry_with_backoff, RetryPolicy, RetryReport};

/// Lifecycle of a managed process. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

/// An external binary together with the configuration it is reconciled against.
pub struct ManagedProcess<C> {
    service: &'static str,
    binary: PathBuf,
    config: C,
    push: PushStrategy,
    policy: RetryPolicy,
    state: ProcessState,
    child: Option<Child>,
    log_tasks: Vec<JoinHandle<usize>>,
    forwarded_lines: usize,
    span: Span,
}

impl ManagedProcess<EdgeConfig> {
    /// Edge proxy driven through its admin endpoint.
    pub fn edge(binary: impl Into<PathBuf>, config: EdgeConfig, admin_url: &str, policy: RetryPolicy) -> Self {
        Self::new(
            "edge",
            binary,
            config,
            PushStrategy::admin_api(admin_url),
            policy,
            tracing::info_span!("managed_process", service = "edge"),
        )
    }
}

impl ManagedProcess<CoreConfig> {
    /// Core proxy driven through its config file.
    pub fn core(binary: impl Into<PathBuf>, config: CoreConfig, config_path: &Path, policy: RetryPolicy) -> Self {
        Self::new(
            "core",
            binary,
            config,
            PushStrategy::config_file(config_path),
            policy,
            tracing::info_span!("managed_process", service = "core"),
        )
    }
}

impl<C: ServiceConfig> ManagedProcess<C> {
    pub fn new(
        service: &'static str,
        binary: impl Into<PathBuf>,
        config: C,
        push: PushStrategy,
        policy: RetryPolicy,
        span: Span,
    ) -> Self {
        Self {
            service,
            binary: binary.into(),
            config,
            push,
            policy,
            state: ProcessState::NotStarted,
            child: None,
            log_tasks: Vec::new(),
            forwarded_lines: 0,
            span,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// Desired state; changes take effect on the next [`reload`](Self::reload).
    pub fn config_mut(&mut self) -> &mut C {
        &mut self.config
    }

    /// Output lines forwarded over the process lifetime, known once stopped.
    pub fn forwarded_lines(&self) -> usize {
        self.forwarded_lines
    }

    pub fn push_strategy(&self) -> &PushStrategy {
        &self.push
    }

    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        let span = self.span.clone();
        self.start_inner().instrument(span).await
    }

    async fn start_inner(&mut self) -> Result<(), SupervisorError> {
        if self.state != ProcessState::NotStarted {
            return Err(SupervisorError::InvalidState {
                service: self.service,
                action: "start",
                state: self.state,
            });
        }

        if let PushStrategy::ConfigFile { path } = &self.push {
            tokio::fs::write(path, self.config.render()?).await?;
        }

        let mut child = Command::new(&self.binary)
            .args(self.push.run_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                service: self.service,
                source,
            })?;

        if let Some(stdout) = child.stdout.take() {
            self.log_tasks
                .push(tokio::spawn(forward_lines(stdout, "stdout").instrument(self.span.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            self.log_tasks
                .push(tokio::spawn(forward_lines(stderr, "stderr").instrument(self.span.clone())));
        }

        tracing::info!(pid = ?child.id(), binary = %self.binary.display(), "process started");
        self.child = Some(child);
        self.state = ProcessState::Running;
        metrics::set_process_up(self.service, true);
        Ok(())
    }

    /// SIGTERM, wait for exit, then drain the log forwarders.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        let span = self.span.clone();
        self.stop_inner().instrument(span).await
    }

    async fn stop_inner(&mut self) -> Result<(), SupervisorError> {
        match self.state {
            ProcessState::Running => {}
            ProcessState::NotStarted => {
                self.state = ProcessState::Stopped;
                return Ok(());
            }
            ProcessState::Stopping | ProcessState::Stopped => return Ok(()),
        }
        self.state = ProcessState::Stopping;

        if let Some(mut child) = self.child.take() {
            if let Some(pid) = child.id() {
                match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    // Already exited; wait() reaps it.
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => {
                        self.child = Some(child);
                        self.state = ProcessState::Running;
                        return Err(e.into());
                    }
                }
            }
            let status = child.wait().await?;
            tracing::info!(%status, "process exited");
        }

        let mut forwarded = 0;
        for task in self.log_tasks.drain(..) {
            match task.await {
                Ok(lines) => forwarded += lines,
                Err(e) => tracing::warn!(error = %e, "log forwarder failed"),
            }
        }
        tracing::debug!(lines = forwarded, "log streams drained");
        self.forwarded_lines = forwarded;

        self.state = ProcessState::Stopped;
        metrics::set_process_up(self.service, false);
        Ok(())
    }

    /// Push the current configuration, retrying with backoff.
    ///
    /// Exhausting the budget is logged and reported, never raised; the
    /// process keeps running on its previous configuration.
    pub async fn reload(&mut self) -> RetryReport {
        let span = self.span.clone();
        let this = &*self;
        let report = retry_with_backoff(&this.policy, |_| {
            metrics::record_reload_attempt(this.service);
            async move {
                match this.config.render() {
                    Ok(body) => this.push.push(body).await,
                    Err(e) => Err(PushError::Render(e)),
                }
            }
        })
        .instrument(span)
        .await;

        if report.succeeded {
            tracing::info!(parent: &self.span, attempts = report.attempts, "config reloaded");
        } else {
            metrics::record_reload_failure(self.service);
            tracing::error!(parent: &self.span, attempts = report.attempts, "config reload gave up, keeping previous config");
        }
        report
    }
}

impl<C> Drop for ManagedProcess<C> {
    fn drop(&mut self) {
        if self.child.is_some() {
            tracing::warn!(parent: &self.span, service = self.service, "managed process dropped while running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-core");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_core_start_writes_config_then_stops() {
        let dir = TempDir::new().unwrap();
        let binary = script(dir.path(), "echo started\nexec sleep 30");
        let config_path = dir.path().join("core.json");

        let mut config = CoreConfig::new("warning", "AsIs");
        config.ensure_inbound_vless("in", "0.0.0.0", 443);
        let mut process = ManagedProcess::core(&binary, config, &config_path, quick_policy());

        process.start().await.unwrap();
        assert_eq!(process.state(), ProcessState::Running);
        assert!(process.pid().is_some());
        let written = CoreConfig::load(&config_path).unwrap();
        assert!(written.inbounds.contains_key("in"));

        assert!(matches!(
            process.start().await,
            Err(SupervisorError::InvalidState { action: "start", .. })
        ));

        process.stop().await.unwrap();
        assert_eq!(process.state(), ProcessState::Stopped);
        assert!(process.pid().is_none());
        process.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_drains_output_written_on_term() {
        let dir = TempDir::new().unwrap();
        let binary = script(
            dir.path(),
            "trap 'echo bye; exit 0' TERM\necho ready\nwhile true; do sleep 0.05; done",
        );
        let config_path = dir.path().join("core.json");
        let mut process = ManagedProcess::core(&binary, CoreConfig::new("warning", "AsIs"), &config_path, quick_policy());

        process.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        process.stop().await.unwrap();

        assert_eq!(process.state(), ProcessState::Stopped);
        assert_eq!(process.forwarded_lines(), 2);
    }

    #[tokio::test]
    async fn test_core_reload_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("core.json");
        let mut process = ManagedProcess::core(
            dir.path().join("unused"),
            CoreConfig::new("warning", "AsIs"),
            &config_path,
            quick_policy(),
        );

        process.config_mut().ensure_outbound_freedom("direct");
        let report = process.reload().await;
        assert!(report.succeeded);
        assert_eq!(report.attempts, 1);

        let written = CoreConfig::load(&config_path).unwrap();
        assert!(written.outbounds.contains_key("direct"));
    }

    #[tokio::test]
    async fn test_reload_gives_up_after_budget() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("missing-dir").join("core.json");
        let mut process = ManagedProcess::core(
            dir.path().join("unused"),
            CoreConfig::default(),
            &config_path,
            quick_policy(),
        );

        let report = process.reload().await;
        assert!(!report.succeeded);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.delays, vec![Duration::from_millis(1), Duration::from_millis(2)]);
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_not_started() {
        let dir = TempDir::new().unwrap();
        let mut process = ManagedProcess::edge(
            dir.path().join("absent"),
            EdgeConfig::new(80),
            "http://127.0.0.1:9/load",
            quick_policy(),
        );
        assert!(matches!(process.start().await, Err(SupervisorError::Spawn { .. })));
        assert_eq!(process.state(), ProcessState::NotStarted);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_terminal() {
        let mut process = ManagedProcess::edge("/bin/true", EdgeConfig::default(), "http://127.0.0.1:9/load", quick_policy());
        process.stop().await.unwrap();
        assert_eq!(process.state(), ProcessState::Stopped);
        assert!(process.start().await.is_err());
    }
}
