mod api;
mod assembler;
mod config;
mod frame_store;
mod models;
mod openapi;
mod pipeline;
mod process;
mod sequencer;
mod session;
mod session_dir;
mod session_registry;
mod startup;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

pub(crate) const VERSION: &str = env!("FRAME_CAPTURE_VERSION");

#[derive(Parser, Debug)]
#[command(name = "frame-capture-server", version = VERSION)]
pub(crate) struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Listening port on all interfaces (ignored when --bind is given)
    #[arg(long)]
    port: Option<u16>,

    /// Root directory for session frames and finished videos
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Optional server config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,frame_capture_server=info")
        }))
        .init();

    startup::run(args).await
}
