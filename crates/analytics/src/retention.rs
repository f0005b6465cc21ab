use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use common::types::NormalizedTx;

/// Retention fractions per first-seen cohort for day offsets `0..=max_days`.
///
/// Rows only extend over the span of days the data covers; offsets past it
/// but within `max_days` read as 0.0 through [`RetentionMatrix::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionMatrix {
    max_days: u32,
    width: usize,
    rows: BTreeMap<NaiveDate, Vec<f64>>,
}

impl RetentionMatrix {
    pub fn cohorts(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    pub fn max_days(&self) -> u32 {
        self.max_days
    }

    pub fn get(&self, cohort: NaiveDate, offset: u32) -> Option<f64> {
        let row = self.rows.get(&cohort)?;
        if offset > self.max_days {
            return None;
        }
        Some(row.get(offset as usize).copied().unwrap_or(0.0))
    }

    /// Offsets present in every row: `0..width`.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row(&self, cohort: NaiveDate) -> Option<&[f64]> {
        self.rows.get(&cohort).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header `first_date,0,1,..` up to the widest offset held, and one text
    /// row per cohort.
    pub fn to_table(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let header = std::iter::once("first_date".to_string())
            .chain((0..self.width).map(|d| d.to_string()))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|(cohort, fractions)| {
                std::iter::once(cohort.to_string())
                    .chain(fractions.iter().map(|f| format!("{f:.3}")))
                    .collect()
            })
            .collect();
        (header, rows)
    }
}

/// Three decimals, halves to even.
fn round3(value: f64) -> f64 {
    (value * 1000.0).round_ties_even() / 1000.0
}

pub fn build_retention_matrix(txs: &[NormalizedTx], max_days: u32) -> RetentionMatrix {
    let mut pairs: HashSet<(&str, NaiveDate)> = HashSet::new();
    let mut first_seen: HashMap<&str, NaiveDate> = HashMap::new();
    let mut observed: Option<(NaiveDate, NaiveDate)> = None;
    for tx in txs {
        let Some(date) = tx.date() else {
            continue;
        };
        if tx.account_keys.is_empty() {
            continue;
        }
        observed = Some(match observed {
            Some((lo, hi)) => (lo.min(date), hi.max(date)),
            None => (date, date),
        });
        for wallet in &tx.account_keys {
            pairs.insert((wallet.as_str(), date));
            first_seen
                .entry(wallet.as_str())
                .and_modify(|first| *first = (*first).min(date))
                .or_insert(date);
        }
    }

    // No offset can exceed the span of observed days.
    let span = observed.map_or(0, |(lo, hi)| (hi - lo).num_days().max(0) as u64);
    let width = span.min(u64::from(max_days)) as usize + 1;
    let mut counts: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (wallet, date) in pairs {
        let Some(&first) = first_seen.get(wallet) else {
            continue;
        };
        let offset = (date - first).num_days();
        if offset > i64::from(max_days) {
            continue;
        }
        // (wallet, date) pairs are unique, so each wallet lands once per offset.
        counts.entry(first).or_insert_with(|| vec![0; width])[offset as usize] += 1;
    }

    let rows: BTreeMap<NaiveDate, Vec<f64>> = counts
        .into_iter()
        .filter_map(|(cohort, row)| {
            let size = row[0];
            if size == 0 {
                return None;
            }
            let fractions = row.iter().map(|&n| round3(n as f64 / size as f64)).collect();
            Some((cohort, fractions))
        })
        .collect();

    metrics::gauge!("analytics_retention_cohorts").set(rows.len() as f64);
    tracing::debug!(cohorts = rows.len(), max_days, "built retention matrix");
    RetentionMatrix {
        max_days,
        width,
        rows,
    }
}
