use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use json_logs_mcp::config::{Config, ServerMode};
use json_logs_mcp::engine::LogEngine;
use json_logs_mcp::http::serve_http;
use json_logs_mcp::mcp::run_stdio;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to the stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1).map(String::as_str) {
        Some("-h") | Some("--help") => {
            eprintln!("Usage: {} [config.yaml|json]", args[0]);
            eprintln!("Without a config file the log directory is read from $JSON_LOGS_DIR (default ./logs).");
            return Ok(());
        }
        Some(path) => Config::load_from_path(Path::new(path))
            .with_context(|| format!("loading config {path}"))?,
        None => Config::from_env(),
    };

    info!("log directory: {}", config.log_dir.display());
    if !config.log_dir.is_dir() {
        warn!(
            "log directory {} does not exist; every operation will fail until it is created",
            config.log_dir.display()
        );
    }

    let mode = config.server.mode;
    let engine = Arc::new(LogEngine::new(Arc::new(config)));

    match mode {
        ServerMode::Stdio => run_stdio(engine).await.context("stdio transport")?,
        ServerMode::Http => serve_http(engine).await.context("http transport")?,
        ServerMode::Both => {
            let http_task = tokio::spawn(serve_http(engine.clone()));
            let stdio_task = tokio::spawn(run_stdio(engine));
            tokio::select! {
                res = http_task => res.context("http task panicked")?.context("http transport")?,
                res = stdio_task => res.context("stdio task panicked")?.context("stdio transport")?,
            }
        }
    }

    Ok(())
}
