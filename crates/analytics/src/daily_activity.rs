use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use common::types::NormalizedTx;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub active_wallets: usize,
}

/// Daily activity with trailing means over the preceding rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityTrend {
    pub date: NaiveDate,
    pub active_wallets: usize,
    pub ma_3: Option<f64>,
    pub ma_7: Option<f64>,
}

/// Distinct participant wallets per UTC day, ascending by date. Transactions
/// without a block time or without participants are left out, so a day only
/// appears once some wallet was active on it.
pub fn compute_daily_active_wallets(txs: &[NormalizedTx]) -> Vec<DailyActivity> {
    let mut by_day: BTreeMap<NaiveDate, HashSet<&str>> = BTreeMap::new();
    for tx in txs {
        if tx.account_keys.is_empty() {
            continue;
        }
        let Some(date) = tx.date() else {
            continue;
        };
        by_day
            .entry(date)
            .or_default()
            .extend(tx.account_keys.iter().map(String::as_str));
    }

    by_day
        .into_iter()
        .map(|(date, wallets)| DailyActivity {
            date,
            active_wallets: wallets.len(),
        })
        .collect()
}

/// Rolling means are row-based and stay `None` until the window is full.
pub fn with_moving_averages(daily: &[DailyActivity]) -> Vec<ActivityTrend> {
    let counts: Vec<f64> = daily.iter().map(|d| d.active_wallets as f64).collect();
    daily
        .iter()
        .enumerate()
        .map(|(i, d)| ActivityTrend {
            date: d.date,
            active_wallets: d.active_wallets,
            ma_3: trailing_mean(&counts, i, 3),
            ma_7: trailing_mean(&counts, i, 7),
        })
        .collect()
}

fn trailing_mean(values: &[f64], end: usize, window: usize) -> Option<f64> {
    if end + 1 < window {
        return None;
    }
    let slice = &values[end + 1 - window..=end];
    Some(slice.iter().sum::<f64>() / window as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{day, sample_day, tx, undated};

    #[test]
    fn test_single_day_counts_distinct_wallets() {
        let daily = compute_daily_active_wallets(&sample_day());
        assert_eq!(
            daily,
            vec![DailyActivity {
                date: day("2025-01-01"),
                active_wallets: 3
            }]
        );
    }

    #[test]
    fn test_duplicate_keys_within_a_transaction_count_once() {
        let txs = vec![tx("2025-01-02 00:00:00", &["A", "A", "B"], &[], None)];
        assert_eq!(compute_daily_active_wallets(&txs)[0].active_wallets, 2);
    }

    #[test]
    fn test_days_are_sorted_and_undated_rows_skipped() {
        let txs = vec![
            tx("2025-01-03 10:00:00", &["A"], &[], None),
            undated(tx("2025-01-01 10:00:00", &["X", "Y", "Z"], &[], None)),
            tx("2025-01-01 23:59:59", &["A", "B"], &[], None),
            tx("2025-01-02 00:00:00", &["C"], &[], None),
        ];
        let daily = compute_daily_active_wallets(&txs);
        let got: Vec<(NaiveDate, usize)> = daily.iter().map(|d| (d.date, d.active_wallets)).collect();
        assert_eq!(
            got,
            vec![
                (day("2025-01-01"), 2),
                (day("2025-01-02"), 1),
                (day("2025-01-03"), 1),
            ]
        );
    }

    #[test]
    fn test_day_without_participants_is_not_reported() {
        let txs = vec![
            tx("2025-01-01 00:00:00", &["A"], &[], None),
            tx("2025-01-02 00:00:00", &[], &["P1"], Some(5)),
        ];
        let daily = compute_daily_active_wallets(&txs);
        assert_eq!(
            daily,
            vec![DailyActivity {
                date: day("2025-01-01"),
                active_wallets: 1
            }]
        );
        assert!(compute_daily_active_wallets(&txs[1..]).is_empty());
    }

    #[test]
    fn test_idempotent_and_bounded_by_distinct_wallets() {
        let txs = vec![
            tx("2025-01-01 01:00:00", &["A", "B"], &[], None),
            tx("2025-01-02 01:00:00", &["B", "C", "D"], &[], None),
        ];
        let first = compute_daily_active_wallets(&txs);
        assert_eq!(first, compute_daily_active_wallets(&txs));
        assert!(first.iter().all(|d| d.active_wallets <= 4));
    }

    #[test]
    fn test_empty_input_gives_empty_table() {
        assert!(compute_daily_active_wallets(&[]).is_empty());
        assert!(with_moving_averages(&[]).is_empty());
    }

    #[test]
    fn test_moving_averages_fill_once_window_is_full() {
        let daily: Vec<DailyActivity> = (1..=7)
            .map(|i| DailyActivity {
                date: day(&format!("2025-01-{i:02}")),
                active_wallets: i,
            })
            .collect();
        let trend = with_moving_averages(&daily);

        assert_eq!(trend[0].ma_3, None);
        assert_eq!(trend[1].ma_3, None);
        assert_eq!(trend[2].ma_3, Some(2.0));
        assert_eq!(trend[6].ma_3, Some(6.0));
        assert!(trend[..6].iter().all(|t| t.ma_7.is_none()));
        assert_eq!(trend[6].ma_7, Some(4.0));
    }
}
