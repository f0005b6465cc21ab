use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use common::types::NormalizedTx;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletFeatures {
    pub wallet: String,
    pub tx_count: u64,
    pub active_days: usize,
    pub used_contracts: usize,
}

impl WalletFeatures {
    /// Raw `(tx_count, active_days, used_contracts)`; no scaling.
    pub fn as_point(&self) -> [f64; 3] {
        [
            self.tx_count as f64,
            self.active_days as f64,
            self.used_contracts as f64,
        ]
    }
}

/// Result of feature extraction; `NoData` when no wallet appeared at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureExtraction {
    Extracted(Vec<WalletFeatures>),
    NoData,
}

impl FeatureExtraction {
    pub fn rows(&self) -> &[WalletFeatures] {
        match self {
            Self::Extracted(rows) => rows,
            Self::NoData => &[],
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }
}

#[derive(Default)]
struct WalletAccumulator<'a> {
    tx_count: u64,
    active_days: HashSet<NaiveDate>,
    contracts: HashSet<&'a str>,
}

/// Per-wallet occurrence count, distinct active days and distinct programs.
///
/// Every program of a transaction is attributed to every participant of that
/// transaction: the normalized shape does not bind instructions to accounts.
/// Undated transactions add to the count and contracts but not to active days.
pub fn extract_wallet_features(txs: &[NormalizedTx]) -> FeatureExtraction {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    let mut stats: Vec<WalletAccumulator<'_>> = Vec::new();

    for tx in txs {
        let date = tx.date();
        for wallet in &tx.account_keys {
            let slot = *index.entry(wallet.as_str()).or_insert_with(|| {
                order.push(wallet.as_str());
                stats.push(WalletAccumulator::default());
                stats.len() - 1
            });
            let acc = &mut stats[slot];
            acc.tx_count += 1;
            if let Some(date) = date {
                acc.active_days.insert(date);
            }
            acc.contracts
                .extend(tx.program_ids.iter().map(String::as_str));
        }
    }

    if order.is_empty() {
        tracing::warn!(transactions = txs.len(), "no wallet interactions to analyse");
        return FeatureExtraction::NoData;
    }

    let rows: Vec<WalletFeatures> = order
        .into_iter()
        .zip(stats)
        .map(|(wallet, acc)| WalletFeatures {
            wallet: wallet.to_string(),
            tx_count: acc.tx_count,
            active_days: acc.active_days.len(),
            used_contracts: acc.contracts.len(),
        })
        .collect();
    tracing::debug!(wallets = rows.len(), "extracted wallet features");
    FeatureExtraction::Extracted(rows)
}
