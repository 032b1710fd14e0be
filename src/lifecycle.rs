//! Lifecycle control: shutdown, runtime verbosity, and state snapshots.
//!
//! Everything is driven through [`ControlCommand`]s on a channel. OS signals
//! are only one producer: on unix SIGINT/SIGTERM request shutdown, SIGUSR2
//! toggles verbose logging and SIGUSR1 requests a state snapshot.
//!
//! A second shutdown request while already shutting down forces the exit
//! without waiting for in-flight work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::telemetry::VerbosityHandle;

/// Administrative commands accepted by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Stop accepting and dispatching work.
    Shutdown,
    /// Flip between the configured log level and debug.
    ToggleVerbose,
    /// Log queue and worker state on the next receive-loop iteration.
    Snapshot,
}

/// Sender side of the control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<ControlCommand>,
}

impl ControlHandle {
    /// Returns `false` once the controller has stopped.
    pub fn send(&self, command: ControlCommand) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// Process-wide lifecycle state shared by every component.
#[derive(Clone, Default)]
pub struct Lifecycle {
    token: CancellationToken,
    force: CancellationToken,
    snapshot_requested: Arc<AtomicBool>,
    verbosity: Option<VerbosityHandle>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbosity(mut self, verbosity: VerbosityHandle) -> Self {
        self.verbosity = Some(verbosity);
        self
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancelled when a shutdown is requested again during shutdown.
    pub fn force_token(&self) -> CancellationToken {
        self.force.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Consume a pending snapshot request.
    pub fn take_snapshot_request(&self) -> bool {
        self.snapshot_requested.swap(false, Ordering::AcqRel)
    }

    pub fn apply(&self, command: ControlCommand) {
        match command {
            ControlCommand::Shutdown if self.is_shutting_down() => {
                warn!("shutdown requested again, not waiting for in-flight work");
                self.force.cancel();
            }
            ControlCommand::Shutdown => {
                info!("shutdown requested");
                self.shutdown();
            }
            ControlCommand::ToggleVerbose => match self.verbosity {
                Some(ref verbosity) => match verbosity.toggle() {
                    Ok(raised) => info!(verbose = raised, "verbose logging toggled"),
                    Err(e) => warn!(error = %e, "failed to toggle verbose logging"),
                },
                None => debug!("verbose toggle ignored, no reloadable log filter"),
            },
            ControlCommand::Snapshot => {
                self.snapshot_requested.store(true, Ordering::Release);
            }
        }
    }

    /// Start the task that applies control commands until a forced exit.
    pub fn spawn_controller(&self) -> (ControlHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let lifecycle = self.clone();
        let task = tokio::spawn(async move {
            loop {
                let command = tokio::select! {
                    _ = lifecycle.force.cancelled() => break,
                    command = rx.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                };
                debug!(?command, "control command");
                lifecycle.apply(command);
            }
        });
        (ControlHandle { tx }, task)
    }

    /// Sleep before starting, cut short by shutdown.
    ///
    /// Returns `false` if shutdown was requested during the delay.
    pub async fn startup_delay(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.is_shutting_down();
        }
        info!(seconds = delay.as_secs(), "delaying startup");
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Translate OS signals into control commands.
    #[cfg(unix)]
    pub fn forward_signals(&self, handle: ControlHandle) -> Result<JoinHandle<()>> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut snapshot = signal(SignalKind::user_defined1())?;
        let mut verbose = signal(SignalKind::user_defined2())?;
        let force = self.force_token();

        Ok(tokio::spawn(async move {
            loop {
                let command = tokio::select! {
                    _ = force.cancelled() => break,
                    Some(()) = interrupt.recv() => ControlCommand::Shutdown,
                    Some(()) = terminate.recv() => ControlCommand::Shutdown,
                    Some(()) = snapshot.recv() => ControlCommand::Snapshot,
                    Some(()) = verbose.recv() => ControlCommand::ToggleVerbose,
                    else => break,
                };
                if !handle.send(command) {
                    break;
                }
            }
        }))
    }

    /// Translate Ctrl-C into shutdown commands.
    #[cfg(not(unix))]
    pub fn forward_signals(&self, handle: ControlHandle) -> Result<JoinHandle<()>> {
        let force = self.force_token();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = force.cancelled() => break,
                    result = tokio::signal::ctrl_c() => {
                        if result.is_err() || !handle.send(ControlCommand::Shutdown) {
                            break;
                        }
                    }
                }
            }
        }))
    }
}
