//! sonny-daemon: voice-driven assistant for a small pan/tilt robot head
//!
//! The daemon:
//! - Listens for a wake phrase, then fuzzy-matches spoken commands
//! - Answers through espeak with a servo-driven mouth kept in lip-sync
//! - Follows a detected face with the pan/tilt servos
//! - Never hears its own voice: listening and speaking exclude each other
//!
//! Audio capture, speech recognition and camera access live in external
//! processes or behind traits; this binary is the control core.

mod audio;
mod commands;
mod config;
mod dialogue;
mod events;
mod hardware;
mod lifecycle;
mod speech;
mod state;
mod tracking;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::{ProcessMicrophone, ProcessRecognizer};
use crate::commands::{CommandKind, CommandMatcher};
use crate::config::Config;
use crate::dialogue::{DialogueController, DialogueSettings, Listener};
use crate::events::DialogueEvent;
use crate::hardware::HardwareLink;
use crate::lifecycle::{ShutdownSignal, StopToken};
use crate::speech::{EspeakEngine, SpeechActuator, SpeechGate, VoiceSettings};
use crate::state::SharedState;
use crate::tracking::{NoFaceDetector, TrackingController, UnavailableCamera};

/// How often the async side checks whether a worker requested shutdown
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "sonny-daemon starting");

    let config = Config::load()?;
    info!(
        serial_port = %config.serial_port,
        persona = %config.persona.name,
        "configuration loaded"
    );

    if config.recognizer_command.is_empty() {
        bail!("recognizer_command is not configured; set it in the config file");
    }

    // Speech is mandatory: without it the assistant cannot respond at all
    let engine = EspeakEngine::detect(&config.espeak_binary, &config.player_command)
        .context("speech engine failed to initialize")?;

    let link = Arc::new(HardwareLink::connect(
        &config.serial_port,
        config.baud_rate,
        config.serial_settle(),
    ));

    let (event_tx, _event_rx) = broadcast::channel::<DialogueEvent>(64);
    let shared = Arc::new(SharedState::new());
    let gate = Arc::new(SpeechGate::new());
    let stop = StopToken::new();
    let shutdown = ShutdownSignal::new();

    let speech = Arc::new(SpeechActuator::new(
        Arc::new(engine),
        Arc::clone(&link),
        Arc::clone(&gate),
        Arc::clone(&shared),
        VoiceSettings {
            primary: config.primary_voice.clone(),
            secondary: config.secondary_voice.clone(),
        },
        stop.clone(),
    )
    .with_timing(config.phoneme_timing()));

    let microphone = ProcessMicrophone::spawn(&config.microphone_command).context("failed to start microphone")?;
    let recognizer = ProcessRecognizer::new(config.recognizer_command.clone());
    let listener = Listener::new(
        Box::new(microphone),
        Box::new(recognizer),
        Arc::clone(&gate),
        stop.clone(),
        config.listen_timeout(),
    );

    let wake_phrases: Vec<String> = config.persona.wake_phrases().map(str::to_string).collect();
    let matcher = CommandMatcher::new(
        CommandKind::default_table().context("invalid command table")?,
        &wake_phrases,
        config.match_cutoff,
    );

    let controller = DialogueController::new(
        listener,
        matcher,
        speech,
        Arc::clone(&shared),
        Arc::clone(&link),
        DialogueSettings {
            persona: config.persona.clone(),
            silence_limit: config.silence_limit,
            announce_listening: config.announce_listening,
        },
        event_tx.clone(),
        stop.clone(),
    );

    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    // Subscribe before the dialogue thread can emit anything
    let mut event_rx = event_tx.subscribe();

    workers.push(controller.spawn().context("failed to spawn dialogue thread")?);

    let tracker = TrackingController::new(
        Arc::clone(&shared),
        Arc::clone(&link),
        Box::new(UnavailableCamera),
        Box::new(NoFaceDetector),
    );
    match tracker.start(stop.clone()) {
        Ok(handle) => workers.push(handle),
        Err(e) => {
            error!(?e, "failed to start face tracking");
            warn!("continuing without face tracking");
        }
    }

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Log dialogue events and watch for the exit command
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(DialogueEvent::ShutdownRequested) => {
                        info!("exit command received");
                        break;
                    }
                    Ok(event) => {
                        info!(%event, "dialogue event");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "dialogue event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {}

        // A worker gave up (e.g. the microphone died)
        _ = stop.stopped(STOP_POLL_INTERVAL) => {
            info!("stop requested by worker");
        }

        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to listen for shutdown signals"),
            }
        }
    }

    info!("shutting down...");
    stop.stop();

    let joined = tokio::task::spawn_blocking(move || {
        for worker in workers {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                error!(thread = %name, "worker thread panicked");
            }
        }
    })
    .await;
    if let Err(e) = joined {
        error!(?e, "failed to join worker threads");
    }

    link.release();

    info!("sonny-daemon stopped");

    Ok(())
}
