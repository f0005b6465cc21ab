use chrono::DateTime;
use common::types::{LoadedAddresses, NormalizedTx, RawMessage, RawTransaction};

/// Flatten one raw record. Missing substructures yield nulls/empty lists, never
/// an error.
pub fn normalize_transaction(raw: &RawTransaction) -> NormalizedTx {
    let body = raw.transaction.as_ref();
    let message = body.and_then(|b| b.message.as_ref());
    let meta = raw.meta.as_ref();

    let account_keys: Vec<String> = message
        .map(|m| {
            m.account_keys
                .iter()
                .map(|k| k.pubkey().to_string())
                .collect()
        })
        .unwrap_or_default();
    let program_ids = message
        .map(|m| {
            resolve_program_ids(
                m,
                &account_keys,
                meta.and_then(|m| m.loaded_addresses.as_ref()),
            )
        })
        .unwrap_or_default();
    let err = meta.and_then(|m| m.err.clone());

    NormalizedTx {
        signature: body.and_then(|b| b.signatures.first().cloned()),
        block_time: raw
            .block_time
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        slot: raw.slot,
        fee: meta.and_then(|m| m.fee),
        success: err.is_none(),
        err,
        program_ids,
        account_keys,
    }
}

/// Program id per instruction. `programIdIndex` indexes the static keys
/// followed by loaded writable then loaded readonly addresses.
fn resolve_program_ids(
    message: &RawMessage,
    account_keys: &[String],
    loaded: Option<&LoadedAddresses>,
) -> Vec<String> {
    message
        .instructions
        .iter()
        .filter_map(|ix| {
            let resolved = match (&ix.program_id, ix.program_id_index) {
                (Some(id), _) => Some(id.clone()),
                (None, Some(idx)) => lookup_key(idx, account_keys, loaded).map(str::to_string),
                (None, None) => None,
            };
            if resolved.is_none() {
                tracing::debug!(
                    program_id_index = ix.program_id_index,
                    "instruction without resolvable program id"
                );
            }
            resolved
        })
        .collect()
}

fn lookup_key<'a>(
    idx: usize,
    account_keys: &'a [String],
    loaded: Option<&'a LoadedAddresses>,
) -> Option<&'a str> {
    if let Some(key) = account_keys.get(idx) {
        return Some(key.as_str());
    }
    let loaded = loaded?;
    let rest = idx.checked_sub(account_keys.len())?;
    loaded
        .writable
        .iter()
        .chain(&loaded.readonly)
        .nth(rest)
        .map(String::as_str)
}

pub fn normalize_all(raws: &[RawTransaction]) -> Vec<NormalizedTx> {
    let rows: Vec<NormalizedTx> = raws.iter().map(normalize_transaction).collect();
    let missing_time = rows.iter().filter(|r| r.block_time.is_none()).count();
    metrics::counter!("analytics_transactions_normalized_total").increment(rows.len() as u64);
    tracing::info!(rows = rows.len(), missing_time, "normalized transactions");
    rows
}
