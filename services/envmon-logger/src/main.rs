//! envmon mission process.
//!
//! Launched by the supervisor with the mission profile on the command
//! line. SIGTERM stops the mission gracefully; SIGUSR1 and SIGINT abort it.

mod args;
mod mission;
mod source;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

use envmon_core::mission_store::is_valid_mission_id;
use envmon_core::{logging, EnvmonConfig, MissionStore, StateStore};

use crate::args::MissionArgs;
use crate::mission::{MissionOutcome, MissionRunner, StopRequest};
use crate::source::StaticSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = MissionArgs::parse();
    let config = EnvmonConfig::load().context("loading configuration")?;
    logging::init_with_format(config.api.log_format);

    let mission_id = args.mission_id();
    if !is_valid_mission_id(&mission_id) {
        bail!("invalid mission id: {mission_id:?}");
    }
    let profile = args.profile();

    let (stop_tx, stop_rx) = watch::channel(None);
    spawn_signal_handlers(stop_tx).context("installing signal handlers")?;

    info!(
        mission_id = %mission_id,
        pid = std::process::id(),
        duration_s = profile.duration_s,
        sample_hz = profile.sample_hz,
        "Mission process starting"
    );

    let runner = MissionRunner::new(
        mission_id.clone(),
        profile.clone(),
        StateStore::new(&config.paths.state_file),
        MissionStore::new(&config.paths.missions_dir),
        StaticSource::new(profile.fixed_location),
    );

    let outcome = runner.run(stop_rx).await.map_err(|e| {
        error!(mission_id = %mission_id, error = %e, "Mission failed");
        e
    })?;

    if let MissionOutcome::PreflightFailed(reason) = &outcome {
        error!(mission_id = %mission_id, reason = %reason, "Mission preflight failed");
    }
    std::process::exit(outcome.exit_code());
}

/// Forward termination signals to the run loop. An abort is never
/// downgraded to a stop.
fn spawn_signal_handlers(tx: watch::Sender<Option<StopRequest>>) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                Some(()) = sigterm.recv() => StopRequest::Stop,
                Some(()) = sigusr1.recv() => StopRequest::Abort,
                Some(()) = sigint.recv() => StopRequest::Abort,
                else => break,
            };
            info!(?request, "Received termination signal");
            tx.send_if_modified(|current| {
                if *current == Some(StopRequest::Abort) || *current == Some(request) {
                    return false;
                }
                *current = Some(request);
                true
            });
        }
    });

    Ok(())
}
