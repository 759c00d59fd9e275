use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{error, info, trace, warn};
use yasso_core::engine::{Control, RunOutput, SimulationEngine};
use yasso_core::io::frame::{progress_frame, summary_frame};
use yasso_core::params::ParameterEnsemble;
use yasso_core::phase::RunKind;
use yasso_core::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(name = "yassod", about = "Yasso scenario streaming daemon")]
struct Args {
    /// Path to the scenario JSON document.
    #[arg(long, value_name = "PATH")]
    scenario: PathBuf,

    /// Whitespace-separated parameter ensemble.
    #[arg(long, value_name = "PATH")]
    parameters: PathBuf,

    /// Override the scenario's parameter set.
    #[arg(long = "parameter-set", value_name = "NAME")]
    parameter_set: Option<String>,

    /// Override the run seed.
    #[arg(long, value_name = "NUMBER")]
    seed: Option<u64>,

    /// Address to bind (defaults to 127.0.0.1).
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on for WebSocket clients.
    #[arg(long, default_value_t = 8788)]
    port: u16,

    /// Milliseconds to pause before each sample.
    #[arg(long = "sample-ms", default_value_t = 0u64)]
    sample_ms: u64,
}

#[derive(Clone)]
struct AppState {
    tx: broadcast::Sender<String>,
    /// Summary line of the finished run, replayed to late subscribers.
    summary: Arc<Mutex<Option<String>>>,
    shutdown: watch::Receiver<bool>,
}

fn load_inputs(args: &Args) -> Result<(Scenario, ParameterEnsemble)> {
    let mut scenario = Scenario::load_from_path(&args.scenario)
        .with_context(|| format!("failed to load scenario from {:?}", args.scenario))?;
    if let Some(name) = &args.parameter_set {
        scenario.run.parameter_set = name.clone();
    }
    if let Some(seed) = args.seed {
        scenario.run.seed = Some(seed);
        scenario.run.seed_phrase = None;
    }
    let ensemble = ParameterEnsemble::load_from_path(&args.parameters)
        .with_context(|| format!("failed to load parameters from {:?}", args.parameters))?;

    // configuration errors surface before the server starts
    scenario.validate()?;
    ensemble.require_usable()?;
    SimulationEngine::for_parameter_set(&scenario, &ensemble)?;
    Ok((scenario, ensemble))
}

/// Run the scenario on a blocking thread, broadcasting one progress frame per
/// sample and the summary frame at the end.
async fn stream_run(
    scenario: Scenario,
    ensemble: ParameterEnsemble,
    tx: broadcast::Sender<String>,
    summary: Arc<Mutex<Option<String>>>,
    cancel: Arc<AtomicBool>,
    sample_ms: u64,
) {
    let frames = tx.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<RunOutput> {
        let engine = SimulationEngine::for_parameter_set(&scenario, &ensemble)?;
        let mut progress = |kind: RunKind, sample: usize, total: usize| {
            if cancel.load(Ordering::Relaxed) {
                return Control::Cancel;
            }
            match progress_frame(kind, sample, total).to_ndjson() {
                Ok(line) => {
                    if frames.send(line).is_err() {
                        trace!(sample, "no subscribers for progress frame");
                    }
                }
                Err(err) => warn!(?err, "failed to serialize progress frame"),
            }
            if sample_ms > 0 {
                std::thread::sleep(Duration::from_millis(sample_ms));
            }
            Control::Continue
        };
        Ok(engine.simulate(&mut progress)?)
    })
    .await;

    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            error!(?err, "run failed");
            return;
        }
        Err(err) => {
            error!(?err, "run task panicked");
            return;
        }
    };
    info!(status = ?output.status, rows = output.tables.stock.len(), "run finished");

    match summary_frame(&output).to_ndjson() {
        Ok(line) => {
            *summary.lock().await = Some(line.clone());
            if tx.send(line).is_err() {
                trace!("no subscribers for summary frame");
            }
        }
        Err(err) => error!(?err, "failed to serialize summary frame"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    let (scenario, ensemble) = load_inputs(&args)?;

    let (tx, _rx) = broadcast::channel::<String>(128);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let summary = Arc::new(Mutex::new(None));
    let cancel = Arc::new(AtomicBool::new(false));
    let state = AppState {
        tx: tx.clone(),
        summary: Arc::clone(&summary),
        shutdown: shutdown_rx,
    };

    let run = tokio::spawn(stream_run(
        scenario,
        ensemble,
        tx,
        summary,
        Arc::clone(&cancel),
        args.sample_ms,
    ));

    let app = Router::new()
        .route("/stream", get(ws_handler))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind, args.port))?;

    let shutdown = async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(?err, "failed to listen for ctrl-c");
        }
        info!("interrupt received, cancelling run");
        cancel.store(true, Ordering::Relaxed);
        if let Err(err) = run.await {
            error!(?err, "run task failed");
        }
        if shutdown_tx.send(true).is_err() {
            trace!("no websocket clients to close");
        }
    };

    info!(%addr, "starting yassod");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| async move { handle_socket(socket, state).await })
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.tx.subscribe();
    let mut shutdown = state.shutdown.clone();
    let finished = state.summary.lock().await.clone();
    if let Some(line) = finished {
        if socket.send(Message::Text(line)).await.is_err() {
            return;
        }
    }
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(line) => {
                    if socket.send(Message::Text(line)).await.is_err() {
                        error!("websocket client disconnected");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagging, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}
