//! How game-server processes are started.
//!
//! The supervisor only sees a [`LaunchedProcess`]: a stream of
//! [`ProcessReport`]s, an exit notification and a kill switch. Where the
//! game server actually runs is up to the [`Launcher`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use parlor_protocol::{Codec, HANDOFF_ENV, HandoffContext, JsonCodec, ProcessReport};
use parlor_transport::{FrameConfig, FrameReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::SupervisorError;

/// A started game server, as seen by the supervisor.
///
/// `reports` closes when the process can no longer report (its stdout
/// closed). `exit` resolves with the exit code once it has stopped;
/// `None` means it was killed by a signal or the code is unknown.
pub struct LaunchedProcess {
    /// OS process id, if there is one.
    pub pid: Option<u32>,
    pub reports: mpsc::UnboundedReceiver<ProcessReport>,
    pub exit: oneshot::Receiver<Option<i32>>,
    /// Sending `()` kills the process. Dropping it does not.
    pub kill: oneshot::Sender<()>,
}

/// Starts game servers for the supervisor.
pub trait Launcher: Send + Sync + 'static {
    /// Starts one game server with `ctx` as its only input.
    ///
    /// # Errors
    /// Returns [`SupervisorError::SpawnFailed`] or
    /// [`SupervisorError::Handoff`] if nothing was started.
    fn launch(
        &self,
        ctx: &HandoffContext,
    ) -> Result<LaunchedProcess, SupervisorError>;
}

// ---------------------------------------------------------------------------
// CommandLauncher
// ---------------------------------------------------------------------------

/// Runs the game server as a child process.
///
/// The handoff context is serialized into the `PARLOR_HANDOFF`
/// environment variable; reports come back as frames on the child's
/// stdout. Stderr is inherited so the child's logs end up next to ours.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<String>,
    frame: FrameConfig,
}

impl CommandLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            frame: FrameConfig::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Launcher for CommandLauncher {
    fn launch(
        &self,
        ctx: &HandoffContext,
    ) -> Result<LaunchedProcess, SupervisorError> {
        let handoff = ctx.to_env_value()?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(HANDOFF_ENV, handoff)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(SupervisorError::SpawnFailed)?;
        let pid = child.id();
        let room_id = ctx.room_id;

        let (report_tx, reports) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            let frame = self.frame;
            tokio::spawn(async move {
                let mut reader = FrameReader::new(stdout, frame);
                loop {
                    match reader.read_frame().await {
                        Ok(Some(bytes)) => {
                            match JsonCodec.decode::<ProcessReport>(&bytes) {
                                Ok(report) => {
                                    if report_tx.send(report).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(%room_id, error = %e, "undecodable process report");
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(%room_id, error = %e, "report stream broken");
                            break;
                        }
                    }
                }
            });
        }

        let (exit_tx, exit) = oneshot::channel();
        let (kill, mut kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = &mut kill_rx => {
                    tracing::info!(%room_id, ?pid, "killing game server");
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(%room_id, error = %e, "failed to wait on game server");
                    None
                }
            };
            let _ = exit_tx.send(code);
        });

        tracing::info!(%room_id, ?pid, program = %self.program.display(), "game server launched");
        Ok(LaunchedProcess {
            pid,
            reports,
            exit,
            kill,
        })
    }
}
