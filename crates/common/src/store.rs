use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::types::{NormalizedTx, RawTransaction};

const BLOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column order of the persisted normalized table.
pub const NORMALIZED_COLUMNS: [&str; 8] = [
    "signature",
    "blockTime",
    "slot",
    "fee",
    "err",
    "success",
    "programIds",
    "accountKeys",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} row {row}: column {column}: {source}", .path.display())]
    Codec {
        path: PathBuf,
        row: usize,
        column: &'static str,
        #[source]
        source: CodecError,
    },
    #[error("{} row {row}: invalid {column} value {value:?}", .path.display())]
    InvalidValue {
        path: PathBuf,
        row: usize,
        column: &'static str,
        value: String,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Flat CSV shape of a [`NormalizedTx`]; every cell stays text until validated.
#[derive(Debug, Serialize, Deserialize)]
struct NormalizedRecord {
    signature: Option<String>,
    #[serde(rename = "blockTime")]
    block_time: Option<String>,
    slot: Option<String>,
    fee: Option<String>,
    err: Option<String>,
    success: String,
    #[serde(rename = "programIds")]
    program_ids: String,
    #[serde(rename = "accountKeys")]
    account_keys: String,
}

impl From<&NormalizedTx> for NormalizedRecord {
    fn from(tx: &NormalizedTx) -> Self {
        Self {
            signature: tx.signature.clone(),
            block_time: tx
                .block_time
                .map(|t| t.format(BLOCK_TIME_FORMAT).to_string()),
            slot: tx.slot.map(|s| s.to_string()),
            fee: tx.fee.map(|f| f.to_string()),
            err: tx.err.as_ref().map(serde_json::Value::to_string),
            success: tx.success.to_string(),
            program_ids: codec::encode_list(&tx.program_ids),
            account_keys: codec::encode_list(&tx.account_keys),
        }
    }
}

struct RowContext<'a> {
    path: &'a Path,
    row: usize,
}

impl RowContext<'_> {
    fn invalid(&self, column: &'static str, value: &str) -> StoreError {
        StoreError::InvalidValue {
            path: self.path.to_path_buf(),
            row: self.row,
            column,
            value: value.to_string(),
        }
    }

    fn list(&self, column: &'static str, text: &str) -> Result<Vec<String>, StoreError> {
        codec::decode_list(text).map_err(|source| StoreError::Codec {
            path: self.path.to_path_buf(),
            row: self.row,
            column,
            source,
        })
    }
}

impl NormalizedRecord {
    fn into_tx(self, ctx: &RowContext<'_>) -> Result<NormalizedTx, StoreError> {
        let block_time = match non_empty(self.block_time) {
            Some(text) => {
                Some(parse_block_time(&text).ok_or_else(|| ctx.invalid("blockTime", &text))?)
            }
            None => None,
        };
        let slot = match non_empty(self.slot) {
            Some(text) => Some(parse_count(&text).ok_or_else(|| ctx.invalid("slot", &text))?),
            None => None,
        };
        let fee = match non_empty(self.fee) {
            Some(text) => Some(parse_count(&text).ok_or_else(|| ctx.invalid("fee", &text))?),
            None => None,
        };
        // Opaque column: non-JSON text (e.g. a foreign repr) is kept verbatim.
        let err = non_empty(self.err).map(|text| {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        });
        let success = parse_bool(&self.success).ok_or_else(|| ctx.invalid("success", &self.success))?;

        Ok(NormalizedTx {
            signature: non_empty(self.signature),
            block_time,
            slot,
            fee,
            err,
            success,
            program_ids: ctx.list("programIds", &self.program_ids)?,
            account_keys: ctx.list("accountKeys", &self.account_keys)?,
        })
    }
}

fn non_empty(cell: Option<String>) -> Option<String> {
    cell.filter(|s| !s.trim().is_empty())
}

/// Accepts `YYYY-MM-DD HH:MM:SS[.fff]`, RFC 3339, or integer epoch seconds.
fn parse_block_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    text.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Non-negative integral quantity, written either as an integer or as a float
/// with no fractional part (`5000.0`).
fn parse_count(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<u64>() {
        return Some(n);
    }
    let f = text.parse::<f64>().ok()?;
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "true" | "True" | "TRUE" | "1" => Some(true),
        "false" | "False" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

fn create_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))
        }
        _ => Ok(()),
    }
}

pub fn load_raw_transactions(path: impl AsRef<Path>) -> Result<Vec<RawTransaction>, StoreError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let txs: Vec<RawTransaction> =
        serde_json::from_str(&content).map_err(|e| StoreError::json(path, e))?;
    tracing::debug!(path = %path.display(), count = txs.len(), "loaded raw transactions");
    Ok(txs)
}

pub fn save_raw_transactions(
    path: impl AsRef<Path>,
    txs: &[RawTransaction],
) -> Result<(), StoreError> {
    let path = path.as_ref();
    create_parent(path)?;
    let file = File::create(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::to_writer(std::io::BufWriter::new(file), txs)
        .map_err(|e| StoreError::json(path, e))?;
    tracing::debug!(path = %path.display(), count = txs.len(), "saved raw transactions");
    Ok(())
}

pub fn save_normalized(path: impl AsRef<Path>, rows: &[NormalizedTx]) -> Result<(), StoreError> {
    let path = path.as_ref();
    create_parent(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| StoreError::csv(path, e))?;
    writer
        .write_record(NORMALIZED_COLUMNS)
        .map_err(|e| StoreError::csv(path, e))?;
    for tx in rows {
        writer
            .serialize(NormalizedRecord::from(tx))
            .map_err(|e| StoreError::csv(path, e))?;
    }
    writer.flush().map_err(|e| StoreError::io(path, e))?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "saved normalized table");
    Ok(())
}

pub fn load_normalized(path: impl AsRef<Path>) -> Result<Vec<NormalizedTx>, StoreError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize::<NormalizedRecord>().enumerate() {
        let record = record.map_err(|e| StoreError::csv(path, e))?;
        let ctx = RowContext { path, row: idx + 1 };
        rows.push(record.into_tx(&ctx)?);
    }
    tracing::debug!(path = %path.display(), rows = rows.len(), "loaded normalized table");
    Ok(rows)
}

/// Write serializable rows as CSV with a header derived from the row type.
/// An empty slice produces an empty file.
pub fn write_table<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<(), StoreError> {
    let path = path.as_ref();
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| StoreError::csv(path, e))?;
    }
    writer.flush().map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Write a table whose columns are only known at runtime.
pub fn write_rows(
    path: impl AsRef<Path>,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<(), StoreError> {
    let path = path.as_ref();
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    writer
        .write_record(header)
        .map_err(|e| StoreError::csv(path, e))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| StoreError::csv(path, e))?;
    }
    writer.flush().map_err(|e| StoreError::io(path, e))?;
    Ok(())
}
