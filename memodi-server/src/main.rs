use std::sync::Arc;

use clap::Parser;
use memodi_core::{MemodiConfig, MemodiError};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use memodi_server::state::AppState;
use memodi_server::subsystems::scoring;

#[derive(Parser, Debug)]
#[command(author, version, about = "Memodi clinical case simulator server", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "memodi.toml")]
    config: String,

    /// Check configuration and credentials, then exit
    #[arg(long)]
    check: bool,
}

fn load_config(path: &str) -> Result<MemodiConfig, MemodiError> {
    Ok(MemodiConfig::load(path)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let scorer = scoring::build_score_logger(&config.scoring);

    if args.check {
        if config.model.has_stored_key() {
            println!("✅ Model API key configured ({})", config.model.model);
        } else {
            println!("⚠️  No model API key; clients must supply one per session");
        }
        match scorer.store_name() {
            Some(name) => println!(
                "✅ Score logging via {} to '{}'",
                name, config.scoring.document_name
            ),
            None => println!("⚠️  Score logging disabled"),
        }
        return Ok(());
    }

    if !config.model.has_stored_key() {
        tracing::warn!("No model API key configured; sessions must provide api_key");
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(AppState::new(config, scorer));
    memodi_server::http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
