//! Running game servers inside the lobby's own runtime.

use parlor_protocol::HandoffContext;
use parlor_supervisor::{LaunchedProcess, Launcher, SupervisorError};
use tokio::sync::{mpsc, oneshot};

use crate::serve;

/// A [`Launcher`] that runs each game server as a Tokio task instead of
/// a child process.
///
/// Handy for tests and single-binary deployments. Exit codes mimic a
/// process: `Some(0)` after a normal finish, `Some(1)` when the server
/// failed, `None` when it was killed or panicked.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessLauncher;

impl Launcher for InProcessLauncher {
    fn launch(
        &self,
        ctx: &HandoffContext,
    ) -> Result<LaunchedProcess, SupervisorError> {
        ctx.validate()?;
        let room_id = ctx.room_id;

        let (reports_tx, reports) = mpsc::unbounded_channel();
        let (exit_tx, exit) = oneshot::channel();
        let (kill, kill_rx) = oneshot::channel::<()>();

        let mut task = tokio::spawn(serve(ctx.clone(), reports_tx));
        tokio::spawn(async move {
            let code = tokio::select! {
                result = &mut task => match result {
                    Ok(Ok(_)) => Some(0),
                    Ok(Err(e)) => {
                        tracing::warn!(%room_id, error = %e, "in-process game server failed");
                        Some(1)
                    }
                    Err(e) => {
                        tracing::warn!(%room_id, error = %e, "in-process game server panicked");
                        None
                    }
                },
                Ok(()) = kill_rx => {
                    tracing::info!(%room_id, "killing in-process game server");
                    task.abort();
                    let _ = task.await;
                    None
                }
            };
            let _ = exit_tx.send(code);
        });

        tracing::info!(%room_id, "game server launched in-process");
        Ok(LaunchedProcess {
            pid: None,
            reports,
            exit,
            kill,
        })
    }
}
