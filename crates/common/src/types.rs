use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Transaction as returned by `getTransaction`. Every level is optional so that
/// partial payloads still normalize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub slot: Option<u64>,
    #[serde(rename = "blockTime", default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub transaction: Option<RawTxBody>,
    #[serde(default)]
    pub meta: Option<RawMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTxBody {
    #[serde(default)]
    pub signatures: Vec<String>,
    #[serde(default)]
    pub message: Option<RawMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(rename = "accountKeys", default)]
    pub account_keys: Vec<AccountKey>,
    #[serde(default)]
    pub instructions: Vec<RawInstruction>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `json` encoding lists bare addresses, `jsonParsed` wraps them with signer flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountKey {
    Plain(String),
    Parsed {
        pubkey: String,
        #[serde(default)]
        signer: bool,
        #[serde(default)]
        writable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

impl AccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            Self::Plain(key) => key,
            Self::Parsed { pubkey, .. } => pubkey,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawInstruction {
    #[serde(rename = "programId", default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    #[serde(
        rename = "programIdIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub program_id_index: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMeta {
    #[serde(default)]
    pub fee: Option<u64>,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(
        rename = "loadedAddresses",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub loaded_addresses: Option<LoadedAddresses>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Address-table lookups of a v0 message; they extend the index space used by
/// `programIdIndex`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedAddresses {
    #[serde(default)]
    pub writable: Vec<String>,
    #[serde(default)]
    pub readonly: Vec<String>,
}

/// Entry of `getSignaturesForAddress`.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: Option<u64>,
    #[serde(rename = "blockTime")]
    pub block_time: Option<i64>,
    pub err: Option<Value>,
}

/// One row of the normalized table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTx {
    pub signature: Option<String>,
    pub block_time: Option<DateTime<Utc>>,
    pub slot: Option<u64>,
    /// Lamports. `None` when the source omitted it; sums skip it.
    pub fee: Option<u64>,
    pub err: Option<Value>,
    pub success: bool,
    /// One entry per resolvable instruction.
    pub program_ids: Vec<String>,
    /// Not deduplicated.
    pub account_keys: Vec<String>,
}

impl NormalizedTx {
    /// UTC calendar day of the block time.
    pub fn date(&self) -> Option<NaiveDate> {
        self.block_time.map(|t| t.date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_encoded_transaction() {
        let json = r#"{
            "slot": 310000000,
            "blockTime": 1735689600,
            "transaction": {
                "signatures": ["5sig"],
                "message": {
                    "accountKeys": ["A", "B", "Prog"],
                    "instructions": [{"programIdIndex": 2, "accounts": [0, 1], "data": "3Bxs"}]
                }
            },
            "meta": {"fee": 5000, "err": null, "logMessages": []}
        }"#;
        let tx: RawTransaction = serde_json::from_str(json).unwrap();
        let message = tx.transaction.as_ref().unwrap().message.as_ref().unwrap();
        assert_eq!(message.account_keys[1].pubkey(), "B");
        assert_eq!(message.instructions[0].program_id_index, Some(2));
        assert!(message.instructions[0].extra.contains_key("data"));
        assert_eq!(tx.meta.as_ref().unwrap().fee, Some(5000));
        assert!(tx.meta.as_ref().unwrap().extra.contains_key("logMessages"));
    }

    #[test]
    fn test_parse_json_parsed_account_keys() {
        let json = r#"{
            "transaction": {
                "signatures": [],
                "message": {
                    "accountKeys": [{"pubkey": "A", "signer": true, "writable": true, "source": "transaction"}],
                    "instructions": [{"programId": "11111111111111111111111111111111"}]
                }
            }
        }"#;
        let tx: RawTransaction = serde_json::from_str(json).unwrap();
        let message = tx.transaction.unwrap().message.unwrap();
        assert_eq!(message.account_keys[0].pubkey(), "A");
        assert!(matches!(
            message.account_keys[0],
            AccountKey::Parsed { signer: true, .. }
        ));
        assert_eq!(
            message.instructions[0].program_id.as_deref(),
            Some("11111111111111111111111111111111")
        );
    }

    #[test]
    fn test_empty_object_is_a_valid_raw_transaction() {
        let tx: RawTransaction = serde_json::from_str("{}").unwrap();
        assert!(tx.transaction.is_none());
        assert!(tx.meta.is_none());
        assert!(tx.block_time.is_none());
    }

    #[test]
    fn test_normalized_date_is_utc_day() {
        let tx = NormalizedTx {
            block_time: DateTime::from_timestamp(1_735_775_999, 0),
            ..NormalizedTx::default()
        };
        assert_eq!(tx.date(), NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(NormalizedTx::default().date(), None);
    }
}
