use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::RpcSettings;
use crate::types::{RawTransaction, SignatureInfo};

/// Bounded retry with a uniformly random pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RpcSettings) -> Self {
        Self {
            max_attempts: settings.max_retries,
            backoff_min: Duration::from_millis(settings.backoff_min_ms),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
        }
    }

    fn jitter(&self) -> Duration {
        if self.backoff_max <= self.backoff_min {
            return self.backoff_min;
        }
        rand::thread_rng().gen_range(self.backoff_min..=self.backoff_max)
    }
}

pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1_u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_attempts => {
                return Err(err.context(format!("{op_name} failed after {attempt} attempts")));
            }
            Err(err) => {
                let delay = policy.jitter();
                warn!(
                    op = op_name,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "attempt failed; retrying"
                );
                metrics::counter!("analytics_rpc_retries_total").increment(1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Anything that can page through an address's signatures and resolve them to
/// transactions.
pub trait TransactionSource {
    fn fetch_signatures(
        &self,
        address: &str,
        limit: u32,
        before: Option<&str>,
    ) -> impl Future<Output = Result<Vec<SignatureInfo>>> + Send;

    fn fetch_transaction(
        &self,
        signature: &str,
    ) -> impl Future<Output = Result<Option<RawTransaction>>> + Send;
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct SolanaRpcClient {
    url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl SolanaRpcClient {
    pub fn new(settings: &RpcSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            url: settings.url.clone(),
            client,
            retry: RetryPolicy::from_settings(settings),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<Option<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let body = &body;
        let client = &self.client;
        let url = self.url.as_str();

        with_retry(&self.retry, method, move || async move {
            let started = Instant::now();
            metrics::counter!("analytics_rpc_requests_total", "method" => method).increment(1);

            let resp = client
                .post(url)
                .json(body)
                .send()
                .await
                .with_context(|| format!("{method} request failed"))?;
            metrics::histogram!("analytics_rpc_latency_ms", "method" => method)
                .record(started.elapsed().as_secs_f64() * 1000.0);

            let status = resp.status();
            if !status.is_success() {
                anyhow::bail!("{method} returned HTTP {status}");
            }

            let envelope: RpcResponse<T> = resp
                .json()
                .await
                .with_context(|| format!("failed to deserialize {method} response"))?;
            if let Some(err) = envelope.error {
                anyhow::bail!("{method} rpc error {}: {}", err.code, err.message);
            }
            Ok(envelope.result)
        })
        .await
    }
}

impl TransactionSource for SolanaRpcClient {
    async fn fetch_signatures(
        &self,
        address: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>> {
        let mut options = json!({ "limit": limit });
        if let Some(before) = before {
            options["before"] = json!(before);
        }
        let sigs: Option<Vec<SignatureInfo>> = self
            .call("getSignaturesForAddress", json!([address, options]))
            .await?;
        Ok(sigs.unwrap_or_default())
    }

    async fn fetch_transaction(&self, signature: &str) -> Result<Option<RawTransaction>> {
        self.call(
            "getTransaction",
            json!([
                signature,
                { "encoding": "json", "maxSupportedTransactionVersion": 0 }
            ]),
        )
        .await
    }
}

/// Page backwards through `address`'s history using the last signature of each
/// page as the cursor. Failures are tolerated: a failed page ends pagination,
/// a failed or missing transaction is skipped.
pub async fn fetch_transactions<S: TransactionSource + Sync>(
    source: &S,
    address: &str,
    max_pages: u32,
    per_page: u32,
    page_delay: Duration,
) -> Vec<RawTransaction> {
    let mut all_txs = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut before: Option<String> = None;

    for page in 1..=max_pages {
        info!(page, address, "fetching signature page");
        let sigs = match source
            .fetch_signatures(address, per_page, before.as_deref())
            .await
        {
            Ok(sigs) => sigs,
            Err(err) => {
                warn!(page, error = %err, "signature page failed; stopping pagination");
                break;
            }
        };
        if sigs.is_empty() {
            info!(page, "no more signatures");
            break;
        }

        for item in &sigs {
            if !seen.insert(item.signature.clone()) {
                continue;
            }
            match source.fetch_transaction(&item.signature).await {
                Ok(Some(tx)) => all_txs.push(tx),
                Ok(None) => debug!(signature = %item.signature, "transaction not available"),
                Err(err) => {
                    warn!(signature = %item.signature, error = %err, "skipping transaction");
                }
            }
        }

        before = sigs.last().map(|s| s.signature.clone());
        tokio::time::sleep(page_delay).await;
    }

    info!(count = all_txs.len(), address, "fetch complete");
    all_txs
}
