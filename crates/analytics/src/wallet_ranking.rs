use std::collections::HashMap;

use anyhow::Result;
use common::types::NormalizedTx;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletRank {
    pub wallet: String,
    /// Occurrences across all account-key lists, repeats included.
    pub tx_count: u64,
}

/// Occurrence count per wallet, in first-seen order.
pub fn count_wallet_occurrences(txs: &[NormalizedTx]) -> Vec<WalletRank> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut ranks: Vec<WalletRank> = Vec::new();
    for tx in txs {
        for wallet in &tx.account_keys {
            let slot = *index.entry(wallet.as_str()).or_insert_with(|| {
                ranks.push(WalletRank {
                    wallet: wallet.clone(),
                    tx_count: 0,
                });
                ranks.len() - 1
            });
            ranks[slot].tx_count += 1;
        }
    }
    ranks
}

/// Top `top_n` wallets by occurrence count. Ties keep first-seen order.
pub fn extract_top_wallets(txs: &[NormalizedTx], top_n: usize) -> Result<Vec<WalletRank>> {
    anyhow::ensure!(top_n > 0, "top_n must be positive");
    let mut ranks = count_wallet_occurrences(txs);
    ranks.sort_by(|a, b| b.tx_count.cmp(&a.tx_count));
    ranks.truncate(top_n);
    tracing::debug!(top_n, returned = ranks.len(), "ranked wallets");
    Ok(ranks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_day, tx, undated};

    fn pairs(ranks: &[WalletRank]) -> Vec<(&str, u64)> {
        ranks.iter().map(|r| (r.wallet.as_str(), r.tx_count)).collect()
    }

    #[test]
    fn test_top_two_of_sample_day() {
        let top = extract_top_wallets(&sample_day(), 2).unwrap();
        assert_eq!(pairs(&top), vec![("A", 2), ("B", 2)]);
    }

    #[test]
    fn test_repeated_key_in_one_transaction_counts_twice() {
        let txs = vec![
            tx("2025-01-01 00:00:00", &["A", "A"], &[], None),
            tx("2025-01-01 00:00:01", &["B"], &[], None),
        ];
        let top = extract_top_wallets(&txs, 10).unwrap();
        assert_eq!(pairs(&top), vec![("A", 2), ("B", 1)]);
    }

    #[test]
    fn test_undated_transactions_still_count() {
        let txs = vec![undated(tx("2025-01-01 00:00:00", &["Z"], &[], None))];
        assert_eq!(pairs(&extract_top_wallets(&txs, 1).unwrap()), vec![("Z", 1)]);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let txs = vec![
            tx("2025-01-01 00:00:00", &["C", "B"], &[], None),
            tx("2025-01-01 00:00:01", &["A", "B"], &[], None),
        ];
        let top = extract_top_wallets(&txs, 3).unwrap();
        assert_eq!(pairs(&top), vec![("B", 2), ("C", 1), ("A", 1)]);
    }

    #[test]
    fn test_top_n_clamped_to_dataset() {
        let top = extract_top_wallets(&sample_day(), 50).unwrap();
        assert_eq!(top.len(), 3);
        assert!(top.windows(2).all(|w| w[0].tx_count >= w[1].tx_count));
    }

    #[test]
    fn test_zero_top_n_rejected() {
        assert!(extract_top_wallets(&sample_day(), 0).is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_top_wallets(&[], 10).unwrap().is_empty());
    }
}
