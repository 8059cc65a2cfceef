//! Lifecycle tests against real child processes.
//!
//! The stand-in mission process is `sh -c 'sleep 30; exit 0' envmon-logger
//! ...`, so its argv carries the mission signature and the real
//! `/proc`-based probe recognises it.

use std::path::Path;
use std::time::{Duration, Instant};

use envmon_core::{EnvmonConfig, MissionProfile, MissionState};
use envmon_supervisor::{MissionSupervisor, SupervisorError, REAPER_WARNING};

fn config(dir: &Path, program: &str) -> EnvmonConfig {
    let mut config = EnvmonConfig::default();
    config.paths.state_file = dir.join("state.json");
    config.paths.pid_file = dir.join("logger.pid");
    config.paths.lock_file = dir.join("launch.lock");
    config.paths.missions_dir = dir.join("missions");
    config.logger.program = program.to_string();
    config.logger.args = vec![
        "-c".to_string(),
        "sleep 30; exit 0".to_string(),
        "envmon-logger".to_string(),
    ];
    config.logger.signature = "envmon-logger".to_string();
    config
}

fn supervisor(dir: &Path) -> MissionSupervisor {
    MissionSupervisor::new(&config(dir, "sh"))
}

async fn wait_for_idle(sup: &MissionSupervisor) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while sup.state_store().read().state != MissionState::Idle {
        assert!(Instant::now() < deadline, "device never returned to IDLE");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn kill(pid: u32, signal: libc::c_int) {
    unsafe {
        libc::kill(-(pid as libc::pid_t), signal);
    }
}

#[tokio::test]
async fn start_registers_pid_and_arms() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(dir.path());

    let receipt = sup.start(MissionProfile::default()).await.unwrap();

    assert_eq!(sup.registry().read(), Some(receipt.pid));
    let state = sup.state_store().read();
    assert_eq!(state.state, MissionState::Arming);
    assert_eq!(state.pid, Some(receipt.pid));
    assert_eq!(state.mission_id.as_deref(), Some(receipt.mission_id.as_str()));
    assert_eq!(state.profile, Some(MissionProfile::default()));

    let meta = sup.mission_store().read_meta(&receipt.mission_id).unwrap();
    assert!(!meta.is_finished());
    assert!(sup
        .mission_store()
        .process_log_path(&receipt.mission_id)
        .exists());

    let status = sup.status().await.unwrap();
    assert!(status.running);
    assert_eq!(status.device.pid, Some(receipt.pid));

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn second_start_is_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(dir.path());

    let first = sup.start(MissionProfile::default()).await.unwrap();
    let before = std::fs::read(sup.state_store().path()).unwrap();

    let err = sup.start(MissionProfile::default()).await.unwrap_err();
    match err {
        SupervisorError::AlreadyRunning { pid } => assert_eq!(pid, first.pid),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(std::fs::read(sup.state_store().path()).unwrap(), before);
    assert_eq!(sup.registry().read(), Some(first.pid));
    assert_eq!(sup.mission_store().list().unwrap(), vec![first.mission_id]);

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn concurrent_starts_launch_exactly_one_mission() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(dir.path());

    let (a, b) = tokio::join!(
        sup.start(MissionProfile::default()),
        sup.start(MissionProfile::default())
    );

    let (ok, err) = match (a, b) {
        (Ok(receipt), Err(e)) | (Err(e), Ok(receipt)) => (receipt, e),
        (a, b) => panic!("expected one success and one rejection, got {a:?} / {b:?}"),
    };
    assert!(matches!(err, SupervisorError::AlreadyRunning { pid } if pid == ok.pid));
    assert_eq!(sup.mission_store().list().unwrap().len(), 1);

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn external_kill_is_reaped_and_state_reset() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(dir.path());

    let receipt = sup.start(MissionProfile::default()).await.unwrap();
    kill(receipt.pid, libc::SIGKILL);

    wait_for_idle(&sup).await;

    let state = sup.state_store().read();
    assert_eq!(state.pid, None);
    assert_eq!(state.warnings, vec![REAPER_WARNING.to_string()]);
    assert_eq!(sup.registry().read(), None);

    let events =
        std::fs::read_to_string(sup.mission_store().events_path(&receipt.mission_id)).unwrap();
    assert!(events.contains("\"level\":\"WARN\""));

    let status = sup.status().await.unwrap();
    assert!(!status.running);
}

#[tokio::test]
async fn stop_then_stop_again_reports_not_running() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(dir.path());

    sup.start(MissionProfile::default()).await.unwrap();
    sup.stop().await.unwrap();
    assert_eq!(sup.registry().read(), None);

    wait_for_idle(&sup).await;

    let err = sup.stop().await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning));
    let err = sup.abort().await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning));
    assert_eq!(sup.state_store().read().state, MissionState::Idle);
}

#[tokio::test]
async fn abort_delivers_signal_to_mission() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(dir.path());

    let receipt = sup.start(MissionProfile::default()).await.unwrap();
    sup.abort().await.unwrap();

    // sh has no SIGUSR1 handler, so the default action terminates it.
    wait_for_idle(&sup).await;
    let meta = sup.mission_store().read_meta(&receipt.mission_id).unwrap();
    assert!(meta.is_finished());
}

#[tokio::test]
async fn launch_failure_leaves_no_running_mission() {
    let dir = tempfile::tempdir().unwrap();
    let sup = MissionSupervisor::new(&config(dir.path(), "/nonexistent/envmon-logger"));

    let err = sup.start(MissionProfile::default()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::LaunchFailure(_)));

    assert_eq!(sup.registry().read(), None);
    assert_eq!(sup.state_store().read().state, MissionState::Idle);

    let listing = sup.list_missions().await.unwrap();
    assert_eq!(listing.missions.len(), 1);
    assert_eq!(listing.incomplete_missions, listing.missions);
}

async fn wait_for_finished_meta(sup: &MissionSupervisor) -> String {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let missions = sup.mission_store().list().unwrap();
        if let [mission_id] = missions.as_slice() {
            if sup
                .mission_store()
                .read_meta(mission_id)
                .is_some_and(|meta| meta.is_finished())
            {
                return mission_id.clone();
            }
        }
        assert!(Instant::now() < deadline, "mission process was never reaped");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn state_write_failure_after_spawn_terminates_and_reaps_child() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let mut config = config(dir.path(), "sh");
    config.paths.state_file = blocker.join("state.json");
    let sup = MissionSupervisor::new(&config);

    let err = sup.start(MissionProfile::default()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Core(_)), "{err:?}");

    wait_for_finished_meta(&sup).await;
    assert_eq!(sup.registry().read(), None);
    assert!(sup.status().await.is_ok_and(|status| !status.running));
}

#[tokio::test]
async fn registry_write_failure_after_spawn_terminates_and_reaps_child() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let mut config = config(dir.path(), "sh");
    config.paths.pid_file = blocker.join("logger.pid");
    let sup = MissionSupervisor::new(&config);

    let err = sup.start(MissionProfile::default()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Io(_)), "{err:?}");

    wait_for_finished_meta(&sup).await;
    assert_eq!(sup.state_store().read().state, MissionState::Idle);
}
