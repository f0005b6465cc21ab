use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use common::config::Config;
use common::solana::{fetch_transactions, SolanaRpcClient, TransactionSource};
use common::store;
use common::types::NormalizedTx;

use crate::clustering::{run_clustering, ClusterParams, ClusterStatus, ClusteringOutcome};
use crate::daily_activity::{compute_daily_active_wallets, with_moving_averages, ActivityTrend};
use crate::normalize::normalize_all;
use crate::retention::{build_retention_matrix, RetentionMatrix};
use crate::volume::{compute_transaction_volume, DailyVolume};
use crate::wallet_features::extract_wallet_features;
use crate::wallet_ranking::{extract_top_wallets, WalletRank};

const USAGE: &str = "usage: analytics [report | fetch [address] | normalize | active-wallets | volume | top-wallets [n] | segments [k] | retention [max_days]]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Report,
    Fetch { address: Option<String> },
    Normalize,
    ActiveWallets,
    Volume,
    TopWallets { n: Option<usize> },
    Segments { k: Option<usize> },
    Retention { max_days: Option<u32> },
}

fn optional_number<T, I>(args: &mut I, what: &str) -> std::result::Result<Option<T>, String>
where
    T: FromStr,
    I: Iterator<Item = String>,
{
    match args.next() {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("invalid {what}: {raw}\n{USAGE}")),
    }
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Command, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let Some(cmd) = args.next() else {
        return Ok(Command::Report);
    };

    let command = match cmd.as_str() {
        "report" => Command::Report,
        "fetch" => Command::Fetch {
            address: args.next(),
        },
        "normalize" => Command::Normalize,
        "active-wallets" => Command::ActiveWallets,
        "volume" => Command::Volume,
        "top-wallets" => Command::TopWallets {
            n: optional_number(&mut args, "wallet count")?,
        },
        "segments" => Command::Segments {
            k: optional_number(&mut args, "cluster count")?,
        },
        "retention" => Command::Retention {
            max_days: optional_number(&mut args, "max day offset")?,
        },
        other => return Err(format!("unknown command: {other}\n{USAGE}")),
    };

    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument: {extra}\n{USAGE}"));
    }
    Ok(command)
}

pub async fn run_command(config: &Config, cmd: Command) -> Result<()> {
    let prefix = config.wallet.prefix();
    match cmd {
        Command::Fetch { address } => {
            let client = SolanaRpcClient::new(&config.rpc)?;
            let address = address.unwrap_or_else(|| config.wallet.address.clone());
            let count = fetch_to_disk(config, &client, &address).await?;
            println!("Fetched {count} transactions for {address}");
            Ok(())
        }
        Command::Normalize => {
            let rows = normalize_to_disk(config)?;
            println!(
                "Normalized {} transactions into {}",
                rows.len(),
                config.storage.normalized_path(&prefix).display()
            );
            Ok(())
        }
        Command::ActiveWallets => {
            let trend = active_wallets(config, &load_dataset(config)?)?;
            print!("{}", render_activity(&trend));
            Ok(())
        }
        Command::Volume => {
            let volume = volume(config, &load_dataset(config)?)?;
            print!("{}", render_volume(&volume));
            Ok(())
        }
        Command::TopWallets { n } => {
            let top = top_wallets(config, &load_dataset(config)?, n)?;
            print!("{}", render_top_wallets(&top));
            Ok(())
        }
        Command::Segments { k } => {
            let outcome = segments(config, &load_dataset(config)?, k)?;
            print!("{}", render_segments(&outcome));
            Ok(())
        }
        Command::Retention { max_days } => {
            let matrix = retention(config, &load_dataset(config)?, max_days)?;
            print!("{}", render_retention(&matrix));
            Ok(())
        }
        Command::Report => {
            let txs = load_dataset(config)?;
            print!("{}", report(config, &txs)?);
            Ok(())
        }
    }
}

/// Fetch the configured history and save it as the raw JSON dump.
pub async fn fetch_to_disk<S: TransactionSource + Sync>(
    config: &Config,
    source: &S,
    address: &str,
) -> Result<usize> {
    let txs = fetch_transactions(
        source,
        address,
        config.rpc.max_pages,
        config.rpc.per_page,
        Duration::from_millis(config.rpc.page_delay_ms),
    )
    .await;
    let path = config.storage.raw_transactions_path(&config.wallet.prefix());
    store::save_raw_transactions(&path, &txs)?;
    tracing::info!(path = %path.display(), count = txs.len(), "saved raw transactions");
    Ok(txs.len())
}

pub fn normalize_to_disk(config: &Config) -> Result<Vec<NormalizedTx>> {
    let prefix = config.wallet.prefix();
    let raw_path = config.storage.raw_transactions_path(&prefix);
    let raws = store::load_raw_transactions(&raw_path)
        .with_context(|| format!("run `analytics fetch` first ({})", raw_path.display()))?;
    let rows = normalize_all(&raws);
    store::save_normalized(config.storage.normalized_path(&prefix), &rows)?;
    Ok(rows)
}

fn load_dataset(config: &Config) -> Result<Vec<NormalizedTx>> {
    let path = config.storage.normalized_path(&config.wallet.prefix());
    let txs = store::load_normalized(&path)
        .with_context(|| format!("run `analytics normalize` first ({})", path.display()))?;
    tracing::info!(path = %path.display(), rows = txs.len(), "loaded normalized dataset");
    Ok(txs)
}

fn output(config: &Config, name: &str) -> std::path::PathBuf {
    config.storage.output_path(&config.wallet.prefix(), name)
}

fn saved(path: &Path) {
    tracing::info!(path = %path.display(), "wrote output table");
}

fn active_wallets(config: &Config, txs: &[NormalizedTx]) -> Result<Vec<ActivityTrend>> {
    let trend = with_moving_averages(&compute_daily_active_wallets(txs));
    let path = output(config, "daily_active_wallets.csv");
    store::write_table(&path, &trend)?;
    saved(&path);
    Ok(trend)
}

fn volume(config: &Config, txs: &[NormalizedTx]) -> Result<Vec<DailyVolume>> {
    let volume = compute_transaction_volume(txs);
    let path = output(config, "transaction_volume.csv");
    store::write_table(&path, &volume)?;
    saved(&path);
    Ok(volume)
}

fn top_wallets(config: &Config, txs: &[NormalizedTx], n: Option<usize>) -> Result<Vec<WalletRank>> {
    let top = extract_top_wallets(txs, n.unwrap_or(config.analysis.top_n))?;
    let path = output(config, "top_wallets.csv");
    store::write_table(&path, &top)?;
    saved(&path);
    Ok(top)
}

fn cluster_params(config: &Config, k: Option<usize>) -> ClusterParams {
    let mut params = ClusterParams::from_analysis(&config.analysis);
    if let Some(k) = k {
        params.k = k;
    }
    params
}

fn segments(config: &Config, txs: &[NormalizedTx], k: Option<usize>) -> Result<ClusteringOutcome> {
    let features = extract_wallet_features(txs);
    let outcome = run_clustering(features.rows(), &cluster_params(config, k))?;
    if features.is_no_data() {
        return Ok(outcome);
    }
    let path = output(config, "user_segments.csv");
    store::write_table(&path, &outcome.assignments)?;
    saved(&path);
    Ok(outcome)
}

fn retention(config: &Config, txs: &[NormalizedTx], max_days: Option<u32>) -> Result<RetentionMatrix> {
    let matrix = build_retention_matrix(txs, max_days.unwrap_or(config.analysis.retention_max_days));
    let (header, rows) = matrix.to_table();
    let path = output(config, "retention.csv");
    store::write_rows(&path, &header, &rows)?;
    saved(&path);
    Ok(matrix)
}

/// The four dashboard views over one dataset, printed one after another.
fn report(config: &Config, txs: &[NormalizedTx]) -> Result<String> {
    let trend = with_moving_averages(&compute_daily_active_wallets(txs));
    let volume = compute_transaction_volume(txs);
    let top = extract_top_wallets(txs, config.analysis.top_n)?;
    let features = extract_wallet_features(txs);
    let outcome = run_clustering(features.rows(), &cluster_params(config, None))?;

    let mut out = String::new();
    for section in [
        render_activity(&trend),
        render_volume(&volume),
        render_top_wallets(&top),
        render_segments(&outcome),
    ] {
        out.push_str(&section);
        out.push('\n');
    }
    Ok(out)
}

fn fmt_avg(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

pub fn render_activity(trend: &[ActivityTrend]) -> String {
    let mut out = String::from("Daily active wallets:\n");
    for t in trend {
        let _ = writeln!(
            out,
            "{}  {:>6}  ma3={:>8}  ma7={:>8}",
            t.date,
            t.active_wallets,
            fmt_avg(t.ma_3),
            fmt_avg(t.ma_7)
        );
    }
    out
}

pub fn render_volume(volume: &[DailyVolume]) -> String {
    let mut out = String::from("Transaction volume:\n");
    for v in volume {
        let _ = writeln!(
            out,
            "{}  txs={:>6}  fee={:>12}  success={:>6.1}%",
            v.date,
            v.total_transactions,
            v.total_fee,
            v.success_rate * 100.0
        );
    }
    out
}

pub fn render_top_wallets(top: &[WalletRank]) -> String {
    let mut out = String::from("Top wallets:\n");
    for (rank, w) in top.iter().enumerate() {
        let _ = writeln!(out, "{:>3}  {:>6}  {}", rank + 1, w.tx_count, w.wallet);
    }
    out
}

pub fn render_segments(outcome: &ClusteringOutcome) -> String {
    let mut out = String::from("User segments:\n");
    match &outcome.status {
        ClusterStatus::NoData => {
            out.push_str("  (no wallet activity to segment)\n");
            return out;
        }
        ClusterStatus::Degenerate { wallets, requested } => {
            let _ = writeln!(
                out,
                "  only {wallets} wallets for {requested} clusters; all assigned to cluster 0"
            );
        }
        ClusterStatus::Clustered {
            inertia,
            iterations,
        } => {
            let _ = writeln!(out, "  inertia={inertia:.3}  iterations={iterations}");
        }
    }
    for a in &outcome.assignments {
        let _ = writeln!(
            out,
            "{:>3}  txs={:>6}  days={:>4}  contracts={:>4}  {}",
            a.cluster, a.tx_count, a.active_days, a.used_contracts, a.wallet
        );
    }
    out
}

pub fn render_retention(matrix: &RetentionMatrix) -> String {
    let mut out = String::from("Cohort retention:\n");
    let (header, rows) = matrix.to_table();
    let _ = writeln!(out, "{}", header.join("  "));
    for row in rows {
        let _ = writeln!(out, "{}", row.join("  "));
    }
    out
}
