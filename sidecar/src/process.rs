//! Sidecar process handle. Owns the engine child process and discovers its port.
//!
//! One [`SidecarProcess`] is one launch. Starting is a one-shot operation:
//! every caller of [`SidecarProcess::start`] observes the same outcome. A
//! crashed process is replaced by creating a new handle through a
//! [`SidecarFactory`], never by restarting the old one.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{OnceCell, oneshot};

use lintbridge_config::SidecarConfig;

use crate::artifacts::ArtifactProvisioner;
use crate::error::BridgeError;

static PORT_ANNOUNCEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"port\s+(\d+)").expect("valid port announcement regex"));

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extract the announced port from a line of sidecar output.
///
/// Port 0 is not a real announcement (it echoes the requested port).
fn parse_port(line: &str) -> Option<u16> {
    let captures = PORT_ANNOUNCEMENT.captures(line)?;
    let port: u16 = captures.get(1)?.as_str().parse().ok()?;
    (port != 0).then_some(port)
}

/// Lifecycle of one sidecar launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarState {
    NotStarted,
    Starting,
    Running,
    Stopped,
    Crashed,
}

/// Point-in-time view of a sidecar. `port` is only set while Running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidecarHandle {
    pub pid: Option<u32>,
    pub port: Option<u16>,
    pub state: SidecarState,
}

impl SidecarHandle {
    #[must_use]
    pub const fn not_started() -> Self {
        Self {
            pid: None,
            port: None,
            state: SidecarState::NotStarted,
        }
    }
}

/// Everything needed to spawn the engine: `<program> <script> <port>`.
#[derive(Debug, Clone)]
pub struct SidecarLaunch {
    program: PathBuf,
    script: PathBuf,
    port: u16,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
}

impl SidecarLaunch {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            port: 0,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

struct Lifecycle {
    state: SidecarState,
    pid: Option<u32>,
    port: Option<u16>,
    child: Option<Child>,
}

/// State shared with the output reader tasks.
struct Shared {
    lifecycle: Mutex<Lifecycle>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called when the sidecar closes stdout. Only a Running process crashes;
    /// a process still Starting fails through the dropped port channel and a
    /// Stopped one was stopped on purpose.
    fn mark_exited(&self) {
        let mut lifecycle = self.lock();
        if lifecycle.state == SidecarState::Running {
            tracing::warn!(pid = ?lifecycle.pid, "Sidecar process exited unexpectedly");
            lifecycle.state = SidecarState::Crashed;
            lifecycle.port = None;
        }
    }
}

pub struct SidecarProcess {
    launch: SidecarLaunch,
    started: OnceCell<Result<u16, String>>,
    shared: Arc<Shared>,
}

impl SidecarProcess {
    #[must_use]
    pub fn new(launch: SidecarLaunch) -> Self {
        Self {
            launch,
            started: OnceCell::new(),
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle {
                    state: SidecarState::NotStarted,
                    pid: None,
                    port: None,
                    child: None,
                }),
            }),
        }
    }

    /// Launch the sidecar and wait for its port announcement.
    ///
    /// Idempotent: a second call returns the first call's outcome, including
    /// a failure. Concurrent callers share the in-flight launch.
    pub async fn start(&self) -> Result<u16, BridgeError> {
        let outcome = self.started.get_or_init(|| self.launch_once()).await;
        outcome.clone().map_err(BridgeError::ProcessStart)
    }

    async fn launch_once(&self) -> Result<u16, String> {
        self.shared.lock().state = SidecarState::Starting;

        match self.spawn_and_wait_for_port().await {
            Ok(port) => {
                let mut lifecycle = self.shared.lock();
                lifecycle.state = SidecarState::Running;
                lifecycle.port = Some(port);
                tracing::info!(pid = ?lifecycle.pid, port, "Sidecar is listening");
                Ok(port)
            }
            Err(e) => {
                tracing::error!("Failed to start sidecar: {e:#}");
                let child = {
                    let mut lifecycle = self.shared.lock();
                    lifecycle.state = SidecarState::Crashed;
                    lifecycle.port = None;
                    lifecycle.child.take()
                };
                if let Some(mut child) = child
                    && let Err(e) = child.start_kill()
                {
                    tracing::debug!("Failed to kill sidecar after a failed start: {e}");
                }
                Err(format!("{e:#}"))
            }
        }
    }

    async fn spawn_and_wait_for_port(&self) -> Result<u16> {
        let launch = &self.launch;
        let mut cmd = Command::new(&launch.program);
        cmd.arg(&launch.script)
            .arg(launch.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", launch.program.display()))?;

        let stdout = child.stdout.take().context("no stdout from sidecar")?;
        let stderr = child.stderr.take().context("no stderr from sidecar")?;
        let pid = child.id();
        tracing::info!(
            pid = ?pid,
            script = %launch.script.display(),
            "Sidecar process spawned"
        );

        {
            let mut lifecycle = self.shared.lock();
            lifecycle.pid = pid;
            lifecycle.child = Some(child);
        }

        let (port_tx, port_rx) = oneshot::channel();
        tokio::spawn(read_stdout(stdout, port_tx, Arc::clone(&self.shared)));
        tokio::spawn(read_stderr(stderr));

        match tokio::time::timeout(launch.startup_timeout, port_rx).await {
            Ok(Ok(port)) => Ok(port),
            Ok(Err(_)) => bail!("sidecar exited before announcing its port"),
            Err(_) => bail!(
                "sidecar did not announce its port within {}s",
                launch.startup_timeout.as_secs_f32()
            ),
        }
    }

    /// Cheap liveness probe. A Running process found dead becomes Crashed.
    pub fn is_running(&self) -> bool {
        let mut lifecycle = self.shared.lock();
        if lifecycle.state != SidecarState::Running {
            return false;
        }
        let Some(child) = lifecycle.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::warn!(pid = ?lifecycle.pid, %status, "Sidecar process has exited");
                lifecycle.state = SidecarState::Crashed;
                lifecycle.port = None;
                false
            }
            Err(e) => {
                tracing::warn!(pid = ?lifecycle.pid, "Cannot query sidecar process status: {e}");
                false
            }
        }
    }

    #[must_use]
    pub fn handle(&self) -> SidecarHandle {
        let lifecycle = self.shared.lock();
        SidecarHandle {
            pid: lifecycle.pid,
            port: lifecycle.port,
            state: lifecycle.state,
        }
    }

    /// Terminate the process and release it. Safe to call repeatedly.
    pub async fn stop(&self) {
        let child = {
            let mut lifecycle = self.shared.lock();
            if lifecycle.state != SidecarState::NotStarted {
                lifecycle.state = SidecarState::Stopped;
            }
            lifecycle.port = None;
            lifecycle.child.take()
        };

        let Some(mut child) = child else {
            tracing::debug!("Sidecar process already released");
            return;
        };

        if let Ok(Some(_)) = child.try_wait() {
            tracing::debug!("Sidecar process had already terminated");
            return;
        }

        if let Err(e) = child.start_kill() {
            tracing::debug!("Failed to signal sidecar process: {e}");
        }
        if tokio::time::timeout(self.launch.shutdown_timeout, child.wait())
            .await
            .is_err()
        {
            tracing::warn!("Sidecar process did not exit within the shutdown timeout");
        } else {
            tracing::info!("Sidecar process stopped");
        }
    }
}

async fn read_stdout(stdout: ChildStdout, port_tx: oneshot::Sender<u16>, shared: Arc<Shared>) {
    let mut lines = BufReader::new(stdout).lines();
    let mut port_tx = Some(port_tx);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(target: "lintbridge::sidecar::stdout", "{line}");
                if port_tx.is_some()
                    && let Some(port) = parse_port(&line)
                    && let Some(tx) = port_tx.take()
                {
                    let _ = tx.send(port);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Sidecar stdout read error: {e}");
                break;
            }
        }
    }
    shared.mark_exited();
}

async fn read_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(target: "lintbridge::sidecar::stderr", "{line}");
    }
}

/// A launched (or launchable) sidecar, as seen by the client.
pub trait Sidecar: Send + Sync {
    fn start(&self) -> impl Future<Output = Result<u16, BridgeError>> + Send;
    fn is_running(&self) -> bool;
    fn stop(&self) -> impl Future<Output = ()> + Send;
    fn handle(&self) -> SidecarHandle;
}

impl Sidecar for SidecarProcess {
    async fn start(&self) -> Result<u16, BridgeError> {
        SidecarProcess::start(self).await
    }

    fn is_running(&self) -> bool {
        SidecarProcess::is_running(self)
    }

    async fn stop(&self) {
        SidecarProcess::stop(self).await;
    }

    fn handle(&self) -> SidecarHandle {
        SidecarProcess::handle(self)
    }
}

/// Creates a fresh sidecar for every (re)launch.
pub trait SidecarFactory: Send + Sync {
    type Process: Sidecar;

    fn create(&self) -> Result<Self::Process, BridgeError>;
}

/// Launches the engine's startup script with Node.js.
pub struct NodeSidecarFactory {
    provisioner: Arc<dyn ArtifactProvisioner>,
    node_command: String,
    port: u16,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
}

impl NodeSidecarFactory {
    #[must_use]
    pub fn new(provisioner: Arc<dyn ArtifactProvisioner>, config: &SidecarConfig) -> Self {
        Self {
            provisioner,
            node_command: config.node_command.clone(),
            port: config.port,
            startup_timeout: config.startup_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

impl SidecarFactory for NodeSidecarFactory {
    type Process = SidecarProcess;

    fn create(&self) -> Result<SidecarProcess, BridgeError> {
        let artifacts = self.provisioner.ensure_artifacts()?;
        let program = which::which(&self.node_command).map_err(|e| {
            BridgeError::process_start(format!("{} not found in PATH: {e}", self.node_command))
        })?;
        let launch = SidecarLaunch::new(program, artifacts.startup_script())
            .port(self.port)
            .startup_timeout(self.startup_timeout)
            .shutdown_timeout(self.shutdown_timeout);
        Ok(SidecarProcess::new(launch))
    }
}
