//! Integration tests for the supervisor, driven by a scripted launcher.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use parlor_protocol::{
    CompletionStatus, ExitReport, GameId, HandoffContext, HandoffMember,
    PlayerId, ProcessReport, RankEntry, RoomId, ScoreEntry, StartPolicy,
};
use parlor_supervisor::{
    CommandLauncher, LaunchedProcess, Launcher, ProcessHealth, Supervisor,
    SupervisorConfig, SupervisorError,
};
use tokio::sync::{mpsc, oneshot};

// =========================================================================
// Scripted launcher
// =========================================================================

/// The test's side of a launched fake process.
struct Script {
    reports: mpsc::UnboundedSender<ProcessReport>,
    exit: oneshot::Sender<Option<i32>>,
    killed: oneshot::Receiver<()>,
}

impl Script {
    fn report(&self, report: ProcessReport) {
        self.reports.send(report).unwrap();
    }

    /// Closes the report stream and exits with `code`.
    fn exit(self, code: Option<i32>) {
        drop(self.reports);
        let _ = self.exit.send(code);
    }
}

#[derive(Default)]
struct ScriptedLauncher {
    launched: Mutex<Vec<Script>>,
    refuse: bool,
}

impl ScriptedLauncher {
    fn take(&self) -> Script {
        self.launched.lock().unwrap().remove(0)
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(
        &self,
        _ctx: &HandoffContext,
    ) -> Result<LaunchedProcess, SupervisorError> {
        if self.refuse {
            return Err(SupervisorError::SpawnFailed(std::io::Error::other(
                "refused",
            )));
        }
        let (reports_tx, reports) = mpsc::unbounded_channel();
        let (exit_tx, exit) = oneshot::channel();
        let (kill, killed) = oneshot::channel();
        self.launched.lock().unwrap().push(Script {
            reports: reports_tx,
            exit: exit_tx,
            killed,
        });
        Ok(LaunchedProcess {
            pid: None,
            reports,
            exit,
            kill,
        })
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn context(room: u64) -> HandoffContext {
    HandoffContext {
        room_id: RoomId(room),
        game_id: GameId::from("rps"),
        token_key: "00ff".into(),
        members: vec![
            HandoffMember {
                player_id: pid(1),
                display_name: "ann".into(),
            },
            HandoffMember {
                player_id: pid(2),
                display_name: "bob".into(),
            },
        ],
        config: serde_json::Value::Null,
        bind_host: "127.0.0.1".into(),
        bind_port: 0,
        min_players: 2,
        start_policy: StartPolicy::AllReady,
        round_deadline_ms: 1_000,
        handshake_timeout_ms: 1_000,
        start_timeout_ms: 1_000,
    }
}

fn scripted() -> (Arc<ScriptedLauncher>, Supervisor) {
    let launcher = Arc::new(ScriptedLauncher::default());
    let supervisor = Supervisor::new(launcher.clone(), SupervisorConfig::default());
    (launcher, supervisor)
}

fn completed_report(room: u64) -> ExitReport {
    let scores = vec![
        ScoreEntry { player_id: pid(1), score: 3 },
        ScoreEntry { player_id: pid(2), score: 1 },
    ];
    ExitReport {
        room_id: RoomId(room),
        game_id: GameId::from("rps"),
        status: CompletionStatus::Completed,
        ranking: RankEntry::rank(&scores),
        scores,
        rounds_played: 5,
        incomplete: false,
    }
}

// =========================================================================
// spawn
// =========================================================================

#[tokio::test]
async fn test_spawn_starts_in_starting_health() {
    let (_launcher, sup) = scripted();

    let handle = sup.spawn(context(1)).await.unwrap();

    assert_eq!(handle.room_id(), RoomId(1));
    assert_eq!(handle.health(), ProcessHealth::Starting);
    assert_eq!(sup.running_count().await, 1);
}

#[tokio::test]
async fn test_spawn_second_process_for_room_rejected() {
    let (_launcher, sup) = scripted();
    sup.spawn(context(1)).await.unwrap();

    let result = sup.spawn(context(1)).await;

    assert!(matches!(result, Err(SupervisorError::AlreadyRunning(RoomId(1)))));
}

#[tokio::test]
async fn test_spawn_launcher_failure_surfaces() {
    let launcher = Arc::new(ScriptedLauncher {
        refuse: true,
        ..ScriptedLauncher::default()
    });
    let sup = Supervisor::new(launcher, SupervisorConfig::default());

    let result = sup.spawn(context(1)).await;

    assert!(matches!(result, Err(SupervisorError::SpawnFailed(_))));
    assert_eq!(sup.running_count().await, 0);
}

#[tokio::test]
async fn test_spawn_after_exit_allowed() {
    let (launcher, sup) = scripted();
    let handle = sup.spawn(context(1)).await.unwrap();
    launcher.take().exit(Some(0));
    sup.on_exit(&handle).await.unwrap();

    assert!(sup.spawn(context(1)).await.is_ok());
}

// =========================================================================
// await_ready
// =========================================================================

#[tokio::test]
async fn test_await_ready_returns_bind_addr() {
    let (launcher, sup) = scripted();
    let handle = sup.spawn(context(1)).await.unwrap();
    launcher.take().report(ProcessReport::Ready {
        bind_addr: "127.0.0.1:7001".into(),
    });

    let addr = sup
        .await_ready(&handle, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(addr, "127.0.0.1:7001");
}

#[tokio::test(start_paused = true)]
async fn test_await_ready_times_out() {
    let (_launcher, sup) = scripted();
    let handle = sup.spawn(context(1)).await.unwrap();

    let result = sup.await_ready(&handle, Duration::from_secs(5)).await;

    assert!(matches!(result, Err(SupervisorError::Timeout(d)) if d == Duration::from_secs(5)));
}

#[tokio::test]
async fn test_await_ready_exit_first_is_crash_before_ready() {
    let (launcher, sup) = scripted();
    let handle = sup.spawn(context(1)).await.unwrap();
    launcher.take().exit(Some(2));

    let result = sup.await_ready(&handle, Duration::from_secs(5)).await;

    assert!(matches!(
        result,
        Err(SupervisorError::CrashedBeforeReady { code: Some(2) })
    ));
}

// =========================================================================
// on_exit
// =========================================================================

#[tokio::test]
async fn test_on_exit_returns_reported_result() {
    let (launcher, sup) = scripted();
    let handle = sup.spawn(context(4)).await.unwrap();
    let script = launcher.take();
    script.report(ProcessReport::Ready {
        bind_addr: "a:1".into(),
    });
    script.report(ProcessReport::Finished {
        report: completed_report(4),
    });
    script.exit(Some(0));

    let report = sup.on_exit(&handle).await.unwrap();

    assert_eq!(report, completed_report(4));
    assert_eq!(handle.health(), ProcessHealth::Exited { code: Some(0) });
    assert_eq!(sup.running_count().await, 0);
}

#[tokio::test]
async fn test_on_exit_crash_mid_match_synthesizes_incomplete_report() {
    let (launcher, sup) = scripted();
    let handle = sup.spawn(context(5)).await.unwrap();
    let script = launcher.take();
    script.report(ProcessReport::Ready {
        bind_addr: "a:1".into(),
    });
    script.report(ProcessReport::Progress {
        round: 2,
        scores: vec![
            ScoreEntry { player_id: pid(1), score: 1 },
            ScoreEntry { player_id: pid(2), score: 2 },
        ],
    });
    script.exit(None);

    let report = sup.on_exit(&handle).await.unwrap();

    assert_eq!(report.status, CompletionStatus::Crashed);
    assert!(report.incomplete);
    assert_eq!(report.rounds_played, 2);
    assert_eq!(report.ranking[0].player_id, pid(2));
    assert_eq!(report.room_id, RoomId(5));
}

#[tokio::test]
async fn test_on_exit_crash_before_progress_reports_zero_scores() {
    let (launcher, sup) = scripted();
    let handle = sup.spawn(context(6)).await.unwrap();
    launcher.take().exit(Some(101));

    let report = sup.on_exit(&handle).await.unwrap();

    assert_eq!(report.status, CompletionStatus::Crashed);
    assert_eq!(report.rounds_played, 0);
    assert_eq!(report.scores.len(), 2);
    assert!(report.scores.iter().all(|s| s.score == 0));
}

#[tokio::test]
async fn test_on_exit_multiple_waiters_see_same_report() {
    let (launcher, sup) = scripted();
    let handle = sup.spawn(context(7)).await.unwrap();
    let script = launcher.take();
    script.report(ProcessReport::Finished {
        report: completed_report(7),
    });
    script.exit(Some(0));

    let first = sup.on_exit(&handle).await.unwrap();
    let second = sup.on_exit(&handle.clone()).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_progress_moves_health_to_running() {
    let (launcher, sup) = scripted();
    let handle = sup.spawn(context(8)).await.unwrap();
    let script = launcher.take();
    let mut watcher = handle.health_watcher();
    script.report(ProcessReport::Ready {
        bind_addr: "a:1".into(),
    });
    script.report(ProcessReport::Progress {
        round: 1,
        scores: vec![],
    });

    let health = watcher
        .wait_for(|h| matches!(h, ProcessHealth::Running { .. }))
        .await
        .unwrap()
        .clone();

    assert_eq!(
        health,
        ProcessHealth::Running {
            bind_addr: "a:1".into(),
            round: 1
        }
    );
}

// =========================================================================
// abort
// =========================================================================

#[tokio::test]
async fn test_abort_signals_kill_switch() {
    let (launcher, sup) = scripted();
    sup.spawn(context(9)).await.unwrap();
    let script = launcher.take();

    assert!(sup.abort(RoomId(9)).await);
    assert!(script.killed.await.is_ok());
}

#[tokio::test]
async fn test_abort_unknown_room_returns_false() {
    let (_launcher, sup) = scripted();
    assert!(!sup.abort(RoomId(404)).await);
}

#[tokio::test]
async fn test_abort_all_signals_every_process() {
    let (launcher, sup) = scripted();
    sup.spawn(context(10)).await.unwrap();
    sup.spawn(context(11)).await.unwrap();

    assert_eq!(sup.abort_all().await, 2);
    assert!(launcher.take().killed.await.is_ok());
    assert!(launcher.take().killed.await.is_ok());
}

// =========================================================================
// CommandLauncher
// =========================================================================

#[tokio::test]
async fn test_command_launcher_missing_program_fails() {
    let sup = Supervisor::new(
        Arc::new(CommandLauncher::new("/nonexistent/parlor-game")),
        SupervisorConfig::default(),
    );

    let result = sup.spawn(context(20)).await;

    assert!(matches!(result, Err(SupervisorError::SpawnFailed(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_launcher_silent_exit_is_crash() {
    let launcher = CommandLauncher::new("sh").arg("-c").arg("exit 3");
    assert_eq!(launcher.program(), std::path::Path::new("sh"));
    let sup = Supervisor::new(Arc::new(launcher), SupervisorConfig::default());
    let handle = sup.spawn(context(21)).await.unwrap();
    assert!(handle.pid().is_some());

    let ready = sup.await_ready(&handle, Duration::from_secs(10)).await;
    let report = sup.on_exit(&handle).await.unwrap();

    assert!(matches!(
        ready,
        Err(SupervisorError::CrashedBeforeReady { code: Some(3) })
    ));
    assert_eq!(report.status, CompletionStatus::Crashed);
}
