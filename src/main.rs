//! Letter Recognition Server
//!
//! Accepts an uploaded drawing of a letter, classifies it with a pretrained
//! ONNX model and returns the most likely characters with their probabilities.

mod config;
mod server;
mod vision;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;
use crate::vision::{LetterRecognizer, OnnxClassifier};

/// Letter Recognition Server - image classification over HTTP
#[derive(Parser, Debug)]
#[command(name = "letter-recognition-server")]
#[command(about = "Serves top-k letter predictions for uploaded images")]
struct Args {
    /// Config file (defaults to config.toml in the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model file, overrides the config
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Port to listen on, overrides the config
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log filter")?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let mut config = load_or_default_config(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.model.path = model;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    if args.write_default_config {
        let path = match args.config {
            Some(path) => path,
            None => config::default_config_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config::save_config(&config, &path)?;
        println!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    // No model, no server
    let model = OnnxClassifier::load(&config.model.path, config.model.intra_threads)
        .with_context(|| format!("Could not load model from {:?}", config.model.path))?;
    let recognizer = LetterRecognizer::from_config(Arc::new(model), &config);

    let app = server::router(recognizer, config.server.max_upload_bytes);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Load the config file given on the command line, else the default one if it
/// exists, else built-in defaults. An explicit path that fails to load is an error.
fn load_or_default_config(explicit: Option<&std::path::Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(path) = config::default_config_path() {
        if path.exists() {
            let config = config::load_config(&path)?;
            info!("Loaded configuration from {:?}", path);
            return Ok(config);
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
