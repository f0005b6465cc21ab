//! Fixtures shared by the pipeline unit tests.

use chrono::{NaiveDate, NaiveDateTime};
use common::types::NormalizedTx;

pub fn at(datetime: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M:%S").unwrap()
}

pub fn day(date: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()
}

/// Successful transaction at `datetime` with the given participants and programs.
pub fn tx(datetime: &str, accounts: &[&str], programs: &[&str], fee: Option<u64>) -> NormalizedTx {
    NormalizedTx {
        signature: Some(format!("sig-{datetime}-{}", accounts.join("-"))),
        block_time: Some(at(datetime).and_utc()),
        slot: Some(1),
        fee,
        err: None,
        success: true,
        program_ids: programs.iter().map(|p| (*p).to_string()).collect(),
        account_keys: accounts.iter().map(|a| (*a).to_string()).collect(),
    }
}

pub fn failed(mut tx: NormalizedTx) -> NormalizedTx {
    tx.err = Some(serde_json::json!({"InstructionError": [0, "Custom"]}));
    tx.success = false;
    tx
}

pub fn undated(mut tx: NormalizedTx) -> NormalizedTx {
    tx.block_time = None;
    tx
}

/// Three transactions on 2025-01-01: {A,B}/[P1], {B,C}/[P2], {A}/[P1], fees 10/20/30.
pub fn sample_day() -> Vec<NormalizedTx> {
    vec![
        tx("2025-01-01 08:00:00", &["A", "B"], &["P1"], Some(10)),
        tx("2025-01-01 12:00:00", &["B", "C"], &["P2"], Some(20)),
        tx("2025-01-01 18:00:00", &["A"], &["P1"], Some(30)),
    ]
}
