use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

use facility_core::{config, SyncConfig};
use facility_sync::{pipeline, Envelope};

use crate::error::{io_err, DaemonError};
use crate::paths::{is_config_file, watch_dir, DEBOUNCE_WINDOW};

/// Runs one pass and reports it as an envelope. Called on the blocking pool.
pub type PassRunner = Arc<dyn Fn(&Path, &SyncConfig, bool) -> Envelope + Send + Sync>;

type SharedConfig = Arc<RwLock<SyncConfig>>;

struct PassJob {
    source: &'static str,
    dry_run: bool,
    respond_to: oneshot::Sender<Envelope>,
}

/// Axum state for the trigger endpoint.
#[derive(Clone)]
pub struct TriggerState {
    jobs: mpsc::Sender<PassJob>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime against the configured registry and target.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let runner: PassRunner = Arc::new(|home: &Path, config: &SyncConfig, dry_run: bool| {
        pipeline::run_pass_at(home, config, dry_run).envelope()
    });
    run_with_runner(home, runner).await
}

async fn run_with_runner(home: PathBuf, runner: PassRunner) -> Result<(), DaemonError> {
    let initial = config::load_at(&home)?;
    let listen = initial.daemon.listen.clone();
    let interval_secs = initial.daemon.interval_secs.filter(|secs| *secs > 0);
    let shared: SharedConfig = Arc::new(RwLock::new(initial));

    let (job_tx, job_rx) = mpsc::channel::<PassJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = watcher_task(home, shared, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result =
                pass_processor_task(home, shared, runner, job_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let server_handle = {
        let shutdown = shutdown_tx.clone();
        let state = TriggerState {
            jobs: job_tx.clone(),
        };
        tokio::spawn(async move {
            let result = trigger_server_task(listen, state, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let schedule_handle = {
        let shutdown = shutdown_tx.clone();
        let jobs = job_tx.clone();
        tokio::spawn(async move {
            let result = schedule_task(interval_secs, jobs, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };
    drop(job_tx);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Runtime(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, processor_result, server_result, schedule_result, signal_result) = tokio::join!(
        watcher_handle,
        processor_handle,
        server_handle,
        schedule_handle,
        signal_handle
    );

    handle_join("config_watcher", watcher_result)?;
    handle_join("pass_processor", processor_result)?;
    handle_join("trigger_server", server_result)?;
    handle_join("schedule", schedule_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Trigger endpoint
// ---------------------------------------------------------------------------

/// Every method and path runs one pass and answers with its envelope.
pub fn router(state: TriggerState) -> Router {
    Router::new().fallback(trigger).with_state(state)
}

/// Query string accepted by the trigger; unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct TriggerParams {
    #[serde(default, alias = "dryRun")]
    dry_run: Option<bool>,
}

async fn trigger(State(state): State<TriggerState>, Query(params): Query<TriggerParams>) -> Response {
    let dry_run = params.dry_run.unwrap_or(false);
    match enqueue_pass(&state.jobs, "http", dry_run).await {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => {
            tracing::error!(error = %err, "trigger could not reach the pass processor");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

fn envelope_response(envelope: Envelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope)).into_response()
}

async fn trigger_server_task(
    listen: String,
    state: TriggerState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let listener = TcpListener::bind(&listen)
        .await
        .map_err(|source| DaemonError::Bind {
            addr: listen.clone(),
            source,
        })?;
    tracing::info!(addr = %listen, "trigger endpoint listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|err| DaemonError::Runtime(format!("trigger server failed: {err}")))
}

// ---------------------------------------------------------------------------
// Pass processing
// ---------------------------------------------------------------------------

async fn enqueue_pass(
    jobs: &mpsc::Sender<PassJob>,
    source: &'static str,
    dry_run: bool,
) -> Result<Envelope, DaemonError> {
    let (respond_to, response) = oneshot::channel();
    jobs.send(PassJob {
        source,
        dry_run,
        respond_to,
    })
    .await
    .map_err(|_| DaemonError::ChannelClosed("pass queue"))?;
    response
        .await
        .map_err(|_| DaemonError::ChannelClosed("pass response"))
}

/// Single consumer of the job queue; passes never overlap, so the cursor
/// files have one writer.
async fn pass_processor_task(
    home: PathBuf,
    shared: SharedConfig,
    runner: PassRunner,
    mut job_rx: mpsc::Receiver<PassJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();
                let snapshot = shared.read().await.clone();
                let runner = runner.clone();
                let home = home.clone();
                let dry_run = job.dry_run;

                let envelope = tokio::task::spawn_blocking(move || runner(&home, &snapshot, dry_run))
                    .await
                    .map_err(|err| DaemonError::Runtime(format!("pass task join error: {err}")))?;

                let state = envelope.properties.get("state").map(String::as_str).unwrap_or("-");
                if envelope.is_success() {
                    tracing::info!(
                        source = job.source,
                        dry_run,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "pass completed",
                    );
                } else {
                    tracing::error!(
                        source = job.source,
                        dry_run,
                        state,
                        error = %envelope.body["error"],
                        "pass failed",
                    );
                }

                let _ = job.respond_to.send(envelope);
            }
        }
    }

    Ok(())
}

async fn schedule_task(
    interval_secs: Option<u64>,
    jobs: mpsc::Sender<PassJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let Some(secs) = interval_secs else {
        let _ = shutdown_rx.recv().await;
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    tracing::info!(interval_secs = secs, "scheduled passes enabled");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if let Err(err) = enqueue_pass(&jobs, "schedule", false).await {
                    tracing::warn!(error = %err, "scheduled pass could not be queued");
                    break;
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Config reload
// ---------------------------------------------------------------------------

async fn watcher_task(
    home: PathBuf,
    shared: SharedConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let dir = watch_dir(&home);
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    let dir = fs::canonicalize(&dir).unwrap_or(dir);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut _watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    _watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    if !is_config_file(&path) {
                        continue;
                    }
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }
                    reload_config(&path, &shared).await;
                }
            }
        }
    }

    Ok(())
}

/// Swap in the config at `path`; a file that fails to load leaves the
/// running config in place.
async fn reload_config(path: &Path, shared: &SharedConfig) -> bool {
    let fresh = match config::load_from(path) {
        Ok(fresh) => fresh,
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "config reload failed, keeping previous config");
            return false;
        }
    };

    let mut current = shared.write().await;
    if *current == fresh {
        return false;
    }
    if current.daemon != fresh.daemon {
        tracing::warn!("daemon settings changed; they take effect after a restart");
    }
    *current = fresh;
    tracing::info!(path = %path.display(), "config reloaded");
    true
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
