use std::path::PathBuf;
use std::sync::Arc;
use flatdoc::engine::Registry;
use flatdoc::sdk::discovery::{DATA_DIR_ENV, DEFAULT_DATA_DIR};
use flatdoc::server::Router;
use clap::Parser;
use std::env;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let data_dir = args.data_dir
        .or_else(|| env::var(DATA_DIR_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    let port = args.port
        .or_else(|| env::var("FLATDOC_PORT").ok())
        .unwrap_or_else(|| "7017".to_string());

    let store = Arc::new(Registry::new(&data_dir));
    let router = Router::new(store);

    log::info!("Starting Flatdoc daemon with data directory {:?}", data_dir);

    tokio::select! {
        res = router.listen(&port) => {
            if let Err(e) = res {
                log::error!("TCP Server failed: {}", e);
                return Err(e.into());
            }
        }
        _ = signal::ctrl_c() => {
            // Every write is complete before its reply is sent, so nothing is pending here.
            log::info!("Shutdown signal received. Exiting.");
        }
    }

    Ok(())
}
