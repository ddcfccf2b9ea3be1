use anyhow::{Context, Result};
use apm_intake::RuntimeConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Intake server for APM agent telemetry
#[derive(Parser)]
#[command(name = "apm-intake")]
#[command(version)]
#[command(about = "Intake server for APM agent telemetry", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try default locations, fall back to defaults
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    apply_cli_overrides(&mut config, &cli);

    // run_with_config initializes tracing as well; that call is a no-op
    apm_intake::init_tracing(&config);
    display_startup_info(&config);

    apm_intake::run_with_config(config).await
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.listen_addr = match config.server.listen_addr.parse::<SocketAddr>() {
            Ok(mut addr) => {
                addr.set_port(port);
                addr.to_string()
            }
            Err(_) => format!("0.0.0.0:{}", port),
        };
    }

    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }
}

fn display_startup_info(config: &RuntimeConfig) {
    use tracing::info;

    info!("╭─────────────────────────────────────────────────");
    info!("│ apm-intake v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!("│ Listen address: http://{}", config.server.listen_addr);
    info!("│ Log level: {}", config.server.log_level);
    info!(
        "│ Max decompressed body: {} MB",
        config.request.max_unzipped_size / 1_048_576
    );
    info!(
        "│ Concurrent requests: {} (max wait {}ms)",
        config.request.concurrent_requests, config.request.max_request_queue_time_ms
    );
    info!(
        "│ Authentication: {}",
        if config.auth.token().is_some() {
            "secret token"
        } else {
            "disabled"
        }
    );
    info!(
        "│ RUM: {}",
        if config.rum.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    if config.rum.enabled {
        info!("│   - Rate limit: {}/s per IP", config.rum.rate_limit);
        info!("│   - Allowed origins: {}", config.rum.allow_origins.join(", "));
    }

    info!("│ Queue capacity: {} batches", config.queue.capacity);
    info!("╰─────────────────────────────────────────────────");
}
