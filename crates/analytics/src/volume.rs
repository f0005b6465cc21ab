use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::types::NormalizedTx;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyVolume {
    pub date: NaiveDate,
    pub total_transactions: usize,
    /// Lamports; transactions without a fee are skipped, not zeroed.
    pub total_fee: u64,
    pub success_rate: f64,
}

#[derive(Default)]
struct DayTotals {
    transactions: usize,
    fee: u64,
    succeeded: usize,
}

pub fn compute_transaction_volume(txs: &[NormalizedTx]) -> Vec<DailyVolume> {
    let mut by_day: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
    for tx in txs {
        let Some(date) = tx.date() else {
            continue;
        };
        let totals = by_day.entry(date).or_default();
        totals.transactions += 1;
        totals.fee = totals.fee.saturating_add(tx.fee.unwrap_or(0));
        if tx.success {
            totals.succeeded += 1;
        }
    }

    // Groups exist only for days with at least one transaction.
    by_day
        .into_iter()
        .map(|(date, t)| DailyVolume {
            date,
            total_transactions: t.transactions,
            total_fee: t.fee,
            success_rate: t.succeeded as f64 / t.transactions as f64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{day, failed, sample_day, tx, undated};

    #[test]
    fn test_single_day_volume() {
        let volume = compute_transaction_volume(&sample_day());
        assert_eq!(
            volume,
            vec![DailyVolume {
                date: day("2025-01-01"),
                total_transactions: 3,
                total_fee: 60,
                success_rate: 1.0,
            }]
        );
    }

    #[test]
    fn test_missing_fees_are_skipped() {
        let txs = vec![
            tx("2025-01-01 00:00:00", &["A"], &[], None),
            tx("2025-01-01 01:00:00", &["A"], &[], Some(5000)),
            tx("2025-01-02 01:00:00", &["A"], &[], None),
        ];
        let volume = compute_transaction_volume(&txs);
        assert_eq!(volume[0].total_fee, 5000);
        assert_eq!(volume[0].total_transactions, 2);
        // all-null day sums to zero but still counts its transaction
        assert_eq!(volume[1].total_fee, 0);
        assert_eq!(volume[1].total_transactions, 1);
    }

    #[test]
    fn test_success_rate_is_mean_of_flags() {
        let txs = vec![
            tx("2025-01-01 00:00:00", &["A"], &[], Some(1)),
            failed(tx("2025-01-01 01:00:00", &["A"], &[], Some(1))),
            failed(tx("2025-01-01 02:00:00", &["A"], &[], Some(1))),
            tx("2025-01-01 03:00:00", &["A"], &[], Some(1)),
        ];
        let volume = compute_transaction_volume(&txs);
        assert!((volume[0].success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_total_transactions_sum_to_dated_rows() {
        let txs = vec![
            tx("2025-01-01 00:00:00", &["A"], &[], Some(1)),
            tx("2025-01-03 00:00:00", &["B"], &[], Some(1)),
            undated(tx("2025-01-03 00:00:00", &["B"], &[], Some(1))),
            tx("2025-01-03 05:00:00", &["C"], &[], None),
        ];
        let volume = compute_transaction_volume(&txs);
        let total: usize = volume.iter().map(|v| v.total_transactions).sum();
        assert_eq!(total, 3);
        assert_eq!(
            volume.iter().map(|v| v.date).collect::<Vec<_>>(),
            vec![day("2025-01-01"), day("2025-01-03")]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(compute_transaction_volume(&[]).is_empty());
    }
}
