use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use whisperd::cli::Cli;
use whisperd::config::{BackendConfig, Config};
use whisperd::server::{parse_uri, Server};
use whisperd::{registry, SessionError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let mut config = load_config(cli.config.as_deref())?;
    cli.apply(&mut config);

    let backend_config = BackendConfig::from_config(&config);
    // Resolution failure is fatal: no partial server start
    let backend = registry::resolve(&backend_config)
        .context("backend resolution failed, refusing to start")?;

    let addr = parse_uri(&config.server.uri).map_err(|e: SessionError| anyhow::anyhow!(e))?;
    let server = Arc::new(Server::new(
        backend,
        backend_config.language.clone(),
        config.server.max_buffer_bytes,
    ));

    info!(uri = %config.server.uri, "ready");
    tokio::select! {
        result = server.run(addr) => result.context("server terminated")?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    match path {
        // An explicitly given config file must exist and parse
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Config::load_or_default(&default_config_path()),
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("whisperd")
        .join("config.toml")
}

fn init_logging(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("whisperd={}", default_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
