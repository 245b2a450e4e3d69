//! The supervisor: one game-server process per room, watched until it
//! exits and turned into exactly one [`ExitReport`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parlor_protocol::{
    ExitReport, GameId, HandoffContext, ProcessReport, RoomId, ScoreEntry,
};
use tokio::sync::{Mutex, oneshot, watch};

use crate::{LaunchedProcess, Launcher, SupervisorError};

/// Lifecycle of a game-server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessHealth {
    /// Launched, not yet listening.
    Starting,
    Ready { bind_addr: String },
    /// At least one round has been resolved.
    Running { bind_addr: String, round: u32 },
    /// Gone. `code` is `None` when killed by a signal.
    Exited { code: Option<i32> },
}

impl ProcessHealth {
    pub fn bind_addr(&self) -> Option<&str> {
        match self {
            Self::Ready { bind_addr } | Self::Running { bind_addr, .. } => {
                Some(bind_addr)
            }
            _ => None,
        }
    }

    pub fn is_exited(&self) -> bool {
        matches!(self, Self::Exited { .. })
    }
}

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Default bound for [`Supervisor::await_ready`] callers.
    pub ready_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
        }
    }
}

/// Caller's view of one launched process. Cheap to clone.
///
/// Holds no control over the process lifetime; use
/// [`Supervisor::abort`] for that.
#[derive(Debug, Clone)]
pub struct GameProcessHandle {
    room_id: RoomId,
    game_id: GameId,
    pid: Option<u32>,
    health: watch::Receiver<ProcessHealth>,
    report: watch::Receiver<Option<ExitReport>>,
}

impl GameProcessHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn health(&self) -> ProcessHealth {
        self.health.borrow().clone()
    }

    /// Subscribes to health changes.
    pub fn health_watcher(&self) -> watch::Receiver<ProcessHealth> {
        self.health.clone()
    }
}

struct Entry {
    attempt: u64,
    kill: Option<oneshot::Sender<()>>,
    health: watch::Receiver<ProcessHealth>,
}

type Processes = Arc<Mutex<HashMap<RoomId, Entry>>>;

static NEXT_ATTEMPT: AtomicU64 = AtomicU64::new(1);

/// Spawns, monitors and reaps per-room game servers.
pub struct Supervisor {
    launcher: Arc<dyn Launcher>,
    config: SupervisorConfig,
    processes: Processes,
}

impl Supervisor {
    pub fn new(launcher: Arc<dyn Launcher>, config: SupervisorConfig) -> Self {
        Self {
            launcher,
            config,
            processes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Launches the game server for `ctx.room_id`.
    ///
    /// # Errors
    /// [`SupervisorError::AlreadyRunning`] if the room's previous process
    /// has not exited yet, or whatever the launcher reports.
    pub async fn spawn(
        &self,
        ctx: HandoffContext,
    ) -> Result<GameProcessHandle, SupervisorError> {
        let room_id = ctx.room_id;
        let mut processes = self.processes.lock().await;
        if let Some(entry) = processes.get(&room_id) {
            if !entry.health.borrow().is_exited() {
                return Err(SupervisorError::AlreadyRunning(room_id));
            }
        }

        let launched = self.launcher.launch(&ctx)?;
        let attempt = NEXT_ATTEMPT.fetch_add(1, Ordering::Relaxed);
        let (health_tx, health_rx) = watch::channel(ProcessHealth::Starting);
        let (report_tx, report_rx) = watch::channel(None);

        let LaunchedProcess {
            pid,
            reports,
            exit,
            kill,
        } = launched;

        let monitor = Monitor {
            room_id,
            game_id: ctx.game_id.clone(),
            attempt,
            last_scores: ctx
                .members
                .iter()
                .map(|m| ScoreEntry {
                    player_id: m.player_id,
                    score: 0,
                })
                .collect(),
            rounds: 0,
            bind_addr: None,
            finished: None,
            health: health_tx,
            report: report_tx,
            processes: Arc::clone(&self.processes),
        };
        tokio::spawn(monitor.run(reports, exit));

        processes.insert(
            room_id,
            Entry {
                attempt,
                kill: Some(kill),
                health: health_rx.clone(),
            },
        );
        tracing::info!(%room_id, game = %ctx.game_id, ?pid, "game server spawned");

        Ok(GameProcessHandle {
            room_id,
            game_id: ctx.game_id,
            pid,
            health: health_rx,
            report: report_rx,
        })
    }

    /// Waits until the process is listening and returns its address.
    ///
    /// # Errors
    /// [`SupervisorError::Timeout`] if it is not ready within `timeout`,
    /// [`SupervisorError::CrashedBeforeReady`] if it exited first. The
    /// process is left running on timeout; the caller decides whether to
    /// [`abort`](Self::abort) it.
    pub async fn await_ready(
        &self,
        handle: &GameProcessHandle,
        timeout: Duration,
    ) -> Result<String, SupervisorError> {
        let mut health = handle.health.clone();
        let wait = async move {
            loop {
                let current = health.borrow_and_update().clone();
                if let Some(addr) = current.bind_addr() {
                    return Ok(addr.to_string());
                }
                if let ProcessHealth::Exited { code } = current {
                    return Err(SupervisorError::CrashedBeforeReady { code });
                }
                if health.changed().await.is_err() {
                    return Err(SupervisorError::CrashedBeforeReady { code: None });
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(room_id = %handle.room_id, ?timeout, "game server not ready in time");
                Err(SupervisorError::Timeout(timeout))
            }
        }
    }

    /// Waits for the process to exit and returns its final report.
    ///
    /// Every process yields exactly one report: the one it sent, or a
    /// `Crashed` report built from its last progress if it sent none.
    pub async fn on_exit(
        &self,
        handle: &GameProcessHandle,
    ) -> Result<ExitReport, SupervisorError> {
        let mut report = handle.report.clone();
        let result = report
            .wait_for(|r| r.is_some())
            .await
            .map(|r| r.clone());
        match result {
            Ok(Some(report)) => Ok(report),
            _ => Err(SupervisorError::MonitorLost(handle.room_id)),
        }
    }

    /// Kills the room's process. Returns `false` if none is running.
    ///
    /// The monitor still produces the exit report.
    pub async fn abort(&self, room_id: RoomId) -> bool {
        let mut processes = self.processes.lock().await;
        let Some(entry) = processes.get_mut(&room_id) else {
            return false;
        };
        match entry.kill.take() {
            Some(kill) => {
                tracing::info!(%room_id, "aborting game server");
                kill.send(()).is_ok()
            }
            None => false,
        }
    }

    /// Kills every running process. Returns how many were signalled.
    pub async fn abort_all(&self) -> usize {
        let mut processes = self.processes.lock().await;
        let mut signalled = 0;
        for (room_id, entry) in processes.iter_mut() {
            if let Some(kill) = entry.kill.take() {
                tracing::info!(%room_id, "aborting game server");
                if kill.send(()).is_ok() {
                    signalled += 1;
                }
            }
        }
        signalled
    }

    /// Current health of a room's process, if it has one.
    pub async fn health(&self, room_id: RoomId) -> Option<ProcessHealth> {
        let processes = self.processes.lock().await;
        processes.get(&room_id).map(|e| e.health.borrow().clone())
    }

    /// Number of processes that have not exited yet.
    pub async fn running_count(&self) -> usize {
        let processes = self.processes.lock().await;
        processes
            .values()
            .filter(|e| !e.health.borrow().is_exited())
            .count()
    }
}

/// Folds one process's reports into its health and final report.
struct Monitor {
    room_id: RoomId,
    game_id: GameId,
    attempt: u64,
    last_scores: Vec<ScoreEntry>,
    rounds: u32,
    bind_addr: Option<String>,
    finished: Option<ExitReport>,
    health: watch::Sender<ProcessHealth>,
    report: watch::Sender<Option<ExitReport>>,
    processes: Processes,
}

impl Monitor {
    async fn run(
        mut self,
        mut reports: tokio::sync::mpsc::UnboundedReceiver<ProcessReport>,
        mut exit: oneshot::Receiver<Option<i32>>,
    ) {
        let mut reports_open = true;
        let code = loop {
            tokio::select! {
                report = reports.recv(), if reports_open => match report {
                    Some(report) => self.apply(report),
                    None => reports_open = false,
                },
                code = &mut exit => break code.unwrap_or(None),
            }
        };

        // A report written just before exit may still be in flight.
        while let Some(report) = reports.recv().await {
            self.apply(report);
        }

        let report = match self.finished.take() {
            Some(report) => report,
            None => {
                tracing::warn!(
                    room_id = %self.room_id,
                    ?code,
                    rounds = self.rounds,
                    "game server exited without a result"
                );
                ExitReport::crashed(
                    self.room_id,
                    self.game_id.clone(),
                    std::mem::take(&mut self.last_scores),
                    self.rounds,
                )
            }
        };
        tracing::info!(
            room_id = %self.room_id,
            ?code,
            status = %report.status,
            rounds = report.rounds_played,
            "game server exited"
        );

        // Drop the entry first so a respawn is possible as soon as the
        // report is visible.
        {
            let mut processes = self.processes.lock().await;
            if processes
                .get(&self.room_id)
                .is_some_and(|e| e.attempt == self.attempt)
            {
                processes.remove(&self.room_id);
            }
        }
        let _ = self.health.send(ProcessHealth::Exited { code });
        let _ = self.report.send(Some(report));
    }

    fn apply(&mut self, report: ProcessReport) {
        match report {
            ProcessReport::Ready { bind_addr } => {
                tracing::info!(room_id = %self.room_id, %bind_addr, "game server ready");
                self.bind_addr = Some(bind_addr.clone());
                let _ = self.health.send(ProcessHealth::Ready { bind_addr });
            }
            ProcessReport::Progress { round, scores } => {
                tracing::debug!(room_id = %self.room_id, round, "game server progress");
                self.rounds = round;
                self.last_scores = scores;
                if let Some(bind_addr) = self.bind_addr.clone() {
                    let _ = self
                        .health
                        .send(ProcessHealth::Running { bind_addr, round });
                }
            }
            ProcessReport::Finished { report } => {
                if self.finished.is_some() {
                    tracing::warn!(room_id = %self.room_id, "duplicate final report ignored");
                    return;
                }
                self.finished = Some(report);
            }
        }
    }
}
