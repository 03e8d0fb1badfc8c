mod plugins;
mod stdio;

use std::{path::PathBuf, sync::Arc};

use {
    async_trait::async_trait,
    clap::Parser,
    sarah_bot::{BotError, DefaultBot, DefaultUserContextStore},
    sarah_common::BotType,
    sarah_runner::{Alerter, RunnerBuilder},
    tokio_util::sync::CancellationToken,
    tracing::{error, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::stdio::StdioAdapter;

#[derive(Parser)]
#[command(name = "sarah", about = "sarah: chat bot runner on the console", version)]
struct Cli {
    /// Config file (overrides discovery of ./sarah.toml and ~/.config/sarah/).
    #[arg(long, env = "SARAH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Directory holding per-bot plugin config files (overrides config value).
    #[arg(long, env = "SARAH_PLUGIN_CONFIG_ROOT")]
    plugin_config_root: Option<PathBuf>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9100).
    #[cfg(feature = "metrics")]
    #[arg(long, env = "SARAH_METRICS_ADDR")]
    metrics_addr: Option<std::net::SocketAddr>,

    /// Name the console user is known by.
    #[arg(long, default_value = "console")]
    user: String,
}

/// Logs go to stderr; stdout carries the conversation.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Reports stopped bots through the log.
struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn alert(&self, bot_type: &BotType, error: &BotError) -> anyhow::Result<()> {
        error!(%bot_type, error = %error, "bot stopped unexpectedly");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "sarah starting");

    let mut config = match &cli.config {
        Some(path) => sarah_config::load_config(path)?,
        None => sarah_config::discover_and_load(),
    };
    if let Some(root) = cli.plugin_config_root {
        config.runner.plugin_config_root = Some(root);
    }

    #[cfg(feature = "metrics")]
    sarah_metrics::init_metrics(sarah_metrics::MetricsRecorderConfig {
        enabled: cli.metrics_addr.is_some(),
        global_labels: Vec::new(),
        listen: cli.metrics_addr,
    })?;

    let store = Arc::new(DefaultUserContextStore::new(&config.context_cache));
    let bot = DefaultBot::with_store(Arc::new(StdioAdapter::new(cli.user)), store);

    let runner = RunnerBuilder::new(config)
        .bot(Arc::new(bot))
        .stash(plugins::stash()?)
        .alerter(Arc::new(LogAlerter))
        .build()?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            shutdown.cancel();
        }
    });

    runner.run(cancel).await?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "metrics")]
    #[test]
    fn metrics_are_served_only_when_an_address_is_given() {
        let cli = Cli::try_parse_from(["sarah"]).unwrap();
        assert!(cli.metrics_addr.is_none());

        let cli = Cli::try_parse_from(["sarah", "--metrics-addr", "127.0.0.1:9100"]).unwrap();
        assert_eq!(cli.metrics_addr, Some(([127, 0, 0, 1], 9100).into()));
    }
}
