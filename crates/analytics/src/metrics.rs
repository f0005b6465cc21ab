use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!(
        "analytics_transactions_normalized_total",
        "Number of raw transactions normalized."
    );
    describe_counter!(
        "analytics_rpc_requests_total",
        "Number of JSON-RPC requests made."
    );
    describe_counter!(
        "analytics_rpc_retries_total",
        "Number of JSON-RPC attempts retried after a failure."
    );
    describe_histogram!(
        "analytics_rpc_latency_ms",
        "JSON-RPC request latency in milliseconds."
    );
    describe_gauge!(
        "analytics_wallets_clustered",
        "Wallets assigned a segment in the last clustering run."
    );
    describe_gauge!(
        "analytics_retention_cohorts",
        "Cohorts in the last retention matrix."
    );
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}
