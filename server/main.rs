/// mri-server
///
/// HTTP front end for the MRI pipeline, served by a synchronous tiny_http
/// server.
///
/// Run with:
///   cargo run --bin mri-server --release -- --stage1 stage1.json --stage2 stage2.json
///
/// Endpoints:
///   GET  /health            liveness
///   POST /predict           image → JSON summary
///   POST /predict/overlay   image → Grad-CAM overlay PNG

mod handlers;
mod routes;
mod state;
mod util;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tiny_http::Server;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferrite_mri::PipelineConfig;
use state::ServerState;

#[derive(Parser)]
#[command(name = "mri-server")]
#[command(author, version, about = "HTTP service for MRI tumor screening with Grad-CAM overlays")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:7878")]
    addr: String,
    /// Stage-1 (screening) model JSON
    #[arg(long)]
    stage1: PathBuf,
    /// Stage-2 (subtype) model JSON
    #[arg(long)]
    stage2: PathBuf,
    /// Pipeline configuration JSON (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let config = match &args.config {
        Some(path) => PipelineConfig::load_json(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let server = Server::http(&args.addr).map_err(|e| anyhow!("failed to bind {}: {}", args.addr, e))?;
    let shared_state = Arc::new(ServerState::new(config, &args.stage1, &args.stage2));
    info!(addr = %args.addr, "listening");

    // One thread per request; the models load on the first prediction.
    for request in server.incoming_requests() {
        let state = shared_state.clone();
        std::thread::spawn(move || {
            routes::dispatch(request, state);
        });
    }
    Ok(())
}
