use anyhow::Result;

mod cli;
mod clustering;
mod daily_activity;
mod metrics;
mod normalize;
mod retention;
#[cfg(test)]
mod test_support;
mod volume;
mod wallet_features;
mod wallet_ranking;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::var("ANALYTICS_CONFIG") {
        Ok(path) => common::config::Config::load_from(path)?,
        Err(_) => common::config::Config::load()?,
    };

    let dispatch =
        common::observability::build_dispatch("analytics", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let cmd = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;
    tracing::info!(command = ?cmd, wallet = %config.wallet.address, "analytics starting");

    if let Some(port) = config.observability.prometheus_port {
        metrics::install_prometheus(port)?;
        tracing::info!(port, "prometheus exporter listening");
    }
    metrics::describe();

    cli::run_command(&config, cmd).await
}
