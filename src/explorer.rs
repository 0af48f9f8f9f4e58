use crate::chains::ChainEndpoint;
use crate::error::ExplorerError;
use alloy_primitives::{Address, Bytes, hex};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

/// A transaction row from the explorer's account history.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub hash: String,
    pub block_number: u64,
    pub timestamp: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
    pub is_error: bool,
}

/// Verified-source record for a contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractSource {
    pub contract_name: String,
}

/// Token metadata as reported by the explorer. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenInfo {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub token_type: Option<String>,
}

/// Read-only queries against a chain explorer.
#[async_trait]
pub trait Explorer: Send + Sync {
    /// Transactions involving `wallet`, most recent first.
    async fn transactions(
        &self,
        endpoint: &ChainEndpoint,
        wallet: Address,
    ) -> Result<Vec<RawTransaction>, ExplorerError>;

    /// `None` when the contract has no verified source.
    async fn contract_source(
        &self,
        endpoint: &ChainEndpoint,
        address: Address,
    ) -> Result<Option<ContractSource>, ExplorerError>;

    async fn token_info(
        &self,
        endpoint: &ChainEndpoint,
        address: Address,
    ) -> Result<Option<TokenInfo>, ExplorerError>;

    /// `eth_call` against the latest block through the explorer proxy.
    async fn call(
        &self,
        endpoint: &ChainEndpoint,
        to: Address,
        data: Bytes,
    ) -> Result<Bytes, ExplorerError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<Value>,
}

impl Envelope {
    fn is_failure(&self) -> bool {
        self.status.as_deref() == Some("0")
    }

    fn failure_reason(&self) -> String {
        match &self.result {
            Value::String(s) if !s.is_empty() => s.clone(),
            _ => self
                .message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxRow {
    hash: String,
    block_number: String,
    time_stamp: String,
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    input: String,
    #[serde(default)]
    is_error: String,
}

impl TryFrom<TxRow> for RawTransaction {
    type Error = String;

    fn try_from(row: TxRow) -> Result<Self, Self::Error> {
        let block_number = row
            .block_number
            .parse()
            .map_err(|_| format!("bad blockNumber {}", row.block_number))?;
        let timestamp = row
            .time_stamp
            .parse()
            .map_err(|_| format!("bad timeStamp {}", row.time_stamp))?;
        let from = Address::from_str(&row.from).map_err(|e| format!("bad from: {e}"))?;
        let to = if row.to.is_empty() {
            None
        } else {
            Some(Address::from_str(&row.to).map_err(|e| format!("bad to: {e}"))?)
        };
        let input = if row.input.is_empty() {
            Bytes::new()
        } else {
            Bytes::from_str(&row.input).map_err(|e| format!("bad input: {e}"))?
        };

        Ok(RawTransaction {
            hash: row.hash,
            block_number,
            timestamp,
            from,
            to,
            input,
            is_error: row.is_error == "1",
        })
    }
}

/// Etherscan-compatible explorer client (Etherscan, Basescan, Arbiscan, Celoscan).
#[derive(Clone)]
pub struct EtherscanClient {
    http: reqwest::Client,
    request_timeout: Duration,
    max_retries: usize,
}

impl EtherscanClient {
    pub fn new(request_timeout: Duration, max_retries: usize) -> Result<Self, ExplorerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("approval-indexer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExplorerError::Http(e.to_string()))?;

        Ok(EtherscanClient {
            http,
            request_timeout,
            max_retries,
        })
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.max_retries)
    }

    async fn query(
        &self,
        endpoint: &ChainEndpoint,
        params: Vec<(&'static str, String)>,
    ) -> Result<Envelope, ExplorerError> {
        let mut params = params;
        if let Some(key) = &endpoint.api_key {
            params.push(("apikey", key.clone()));
        }

        let client = self.clone();
        let url = endpoint.api_url.clone();
        RetryIf::spawn(
            self.get_retry_strategy(),
            move || {
                let client = client.clone();
                let url = url.clone();
                let params = params.clone();
                async move {
                    let result = client.send_once(&url, &params).await;
                    if let Err(e) = &result {
                        warn!("Explorer request to {} failed: {}", url, e);
                    }
                    result
                }
            },
            |e: &ExplorerError| e.is_transient(),
        )
        .await
    }

    async fn send_once(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<Envelope, ExplorerError> {
        let secs = self.request_timeout.as_secs();
        let response = match timeout(self.request_timeout, self.http.get(url).query(params).send())
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(ExplorerError::Timeout(secs)),
            Ok(Err(e)) => return Err(ExplorerError::Http(e.to_string())),
            Err(_) => return Err(ExplorerError::Timeout(secs)),
        };

        if !response.status().is_success() {
            return Err(ExplorerError::Status(response.status().as_u16()));
        }

        let envelope = match timeout(self.request_timeout, response.json::<Envelope>()).await {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(e)) => return Err(ExplorerError::Decode(e.to_string())),
            Err(_) => return Err(ExplorerError::Timeout(secs)),
        };

        // Explorers report throttling inside a 200 response.
        if envelope.is_failure() && envelope.failure_reason().to_lowercase().contains("rate limit")
        {
            return Err(ExplorerError::Api(envelope.failure_reason()));
        }

        Ok(envelope)
    }
}

#[async_trait]
impl Explorer for EtherscanClient {
    async fn transactions(
        &self,
        endpoint: &ChainEndpoint,
        wallet: Address,
    ) -> Result<Vec<RawTransaction>, ExplorerError> {
        let envelope = self
            .query(
                endpoint,
                vec![
                    ("module", "account".to_string()),
                    ("action", "txlist".to_string()),
                    ("address", format!("{wallet:?}")),
                    ("startblock", "0".to_string()),
                    ("endblock", "99999999".to_string()),
                    ("sort", "desc".to_string()),
                ],
            )
            .await?;

        parse_transactions(envelope)
    }

    async fn contract_source(
        &self,
        endpoint: &ChainEndpoint,
        address: Address,
    ) -> Result<Option<ContractSource>, ExplorerError> {
        let envelope = self
            .query(
                endpoint,
                vec![
                    ("module", "contract".to_string()),
                    ("action", "getsourcecode".to_string()),
                    ("address", format!("{address:?}")),
                ],
            )
            .await?;

        parse_contract_source(envelope)
    }

    async fn token_info(
        &self,
        endpoint: &ChainEndpoint,
        address: Address,
    ) -> Result<Option<TokenInfo>, ExplorerError> {
        let envelope = self
            .query(
                endpoint,
                vec![
                    ("module", "token".to_string()),
                    ("action", "tokeninfo".to_string()),
                    ("contractaddress", format!("{address:?}")),
                ],
            )
            .await?;

        Ok(parse_token_info(envelope))
    }

    async fn call(
        &self,
        endpoint: &ChainEndpoint,
        to: Address,
        data: Bytes,
    ) -> Result<Bytes, ExplorerError> {
        let envelope = self
            .query(
                endpoint,
                vec![
                    ("module", "proxy".to_string()),
                    ("action", "eth_call".to_string()),
                    ("to", format!("{to:?}")),
                    ("data", hex::encode_prefixed(&data)),
                    ("tag", "latest".to_string()),
                ],
            )
            .await?;

        parse_call_result(envelope)
    }
}

fn parse_transactions(envelope: Envelope) -> Result<Vec<RawTransaction>, ExplorerError> {
    if envelope.is_failure() && !envelope.result.is_array() {
        if envelope
            .message
            .as_deref()
            .is_some_and(|m| m.contains("No transactions found"))
        {
            return Ok(Vec::new());
        }
        return Err(ExplorerError::Api(envelope.failure_reason()));
    }

    let rows = match envelope.result {
        Value::Array(rows) => rows,
        Value::Null => return Ok(Vec::new()),
        other => return Err(ExplorerError::Decode(format!("unexpected txlist result: {other}"))),
    };

    let total = rows.len();
    let transactions: Vec<RawTransaction> = rows
        .into_iter()
        .filter_map(|row| {
            serde_json::from_value::<TxRow>(row)
                .map_err(|e| e.to_string())
                .and_then(RawTransaction::try_from)
                .map_err(|e| debug!("Dropping malformed transaction row: {}", e))
                .ok()
        })
        .collect();

    if transactions.len() < total {
        debug!(
            "Kept {} of {} transaction rows",
            transactions.len(),
            total
        );
    }

    Ok(transactions)
}

fn parse_contract_source(envelope: Envelope) -> Result<Option<ContractSource>, ExplorerError> {
    if envelope.is_failure() {
        return Err(ExplorerError::Api(envelope.failure_reason()));
    }

    let name = envelope
        .result
        .get(0)
        .and_then(|entry| entry.get("ContractName"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if name.is_empty() {
        return Ok(None);
    }

    Ok(Some(ContractSource {
        contract_name: name.to_string(),
    }))
}

fn parse_token_info(envelope: Envelope) -> Option<TokenInfo> {
    if envelope.is_failure() {
        debug!("Token info unavailable: {}", envelope.failure_reason());
        return None;
    }

    // Some explorers wrap the record in a one-element array.
    let record = match &envelope.result {
        Value::Array(entries) => entries.first()?,
        Value::Object(_) => &envelope.result,
        _ => return None,
    };

    let text = |key: &str| {
        record
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Some(TokenInfo {
        name: text("tokenName"),
        symbol: text("symbol"),
        decimals: text("divisor").and_then(|d| d.parse().ok()),
        token_type: text("tokenType"),
    })
}

fn parse_call_result(envelope: Envelope) -> Result<Bytes, ExplorerError> {
    if let Some(error) = envelope.error {
        return Err(ExplorerError::Api(error.to_string()));
    }

    match envelope.result {
        Value::String(hex) => {
            Bytes::from_str(&hex).map_err(|e| ExplorerError::Decode(format!("{hex}: {e}")))
        }
        other => Err(ExplorerError::Decode(format!("unexpected eth_call result: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{Chain, ChainRegistry};
    use alloy_primitives::address;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const RATE_LIMITED: &str = r#"{"status":"0","message":"NOTOK","result":"Max rate limit reached"}"#;
    const VERIFIED: &str = r#"{"status":"1","message":"OK","result":[{"ContractName":"FiatTokenV2"}]}"#;

    /// Serves `bodies` in order over plain HTTP, repeating the last one, and
    /// counts the requests it answered.
    async fn serve(bodies: Vec<&'static str>) -> (ChainEndpoint, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let n = counter.fetch_add(1, Ordering::SeqCst);
                let body = bodies[n.min(bodies.len() - 1)];
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        let endpoint = ChainRegistry::new()
            .with_api_url(Chain::Ethereum, format!("http://{addr}/api"))
            .endpoint(Chain::Ethereum);
        (endpoint, hits)
    }

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_txlist_and_drops_malformed_rows() {
        let env = envelope(json!({
            "status": "1",
            "message": "OK",
            "result": [
                {
                    "hash": "0xaa",
                    "blockNumber": "19000000",
                    "timeStamp": "1700000000",
                    "from": "0x1111111111111111111111111111111111111111",
                    "to": "0x2222222222222222222222222222222222222222",
                    "input": "0x095ea7b3",
                    "isError": "0"
                },
                {
                    "hash": "0xbb",
                    "blockNumber": "not-a-number",
                    "timeStamp": "1700000000",
                    "from": "0x1111111111111111111111111111111111111111",
                    "to": "",
                    "input": "0x"
                }
            ]
        }));

        let txs = parse_transactions(env).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].block_number, 19_000_000);
        assert_eq!(txs[0].input.as_ref(), &[0x09, 0x5e, 0xa7, 0xb3]);
        assert!(!txs[0].is_error);
    }

    #[test]
    fn empty_history_is_not_an_error() {
        let env = envelope(json!({
            "status": "0",
            "message": "No transactions found",
            "result": []
        }));
        assert!(parse_transactions(env).unwrap().is_empty());
    }

    #[test]
    fn api_failure_surfaces_reason() {
        let env = envelope(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Invalid API Key"
        }));
        let err = parse_transactions(env).unwrap_err();
        assert!(matches!(err, ExplorerError::Api(ref m) if m == "Invalid API Key"));
    }

    #[test]
    fn unverified_contract_has_no_source() {
        let env = envelope(json!({
            "status": "1",
            "message": "OK",
            "result": [{ "ContractName": "", "SourceCode": "" }]
        }));
        assert!(parse_contract_source(env).unwrap().is_none());
    }

    #[test]
    fn token_info_accepts_array_or_object() {
        let from_array = parse_token_info(envelope(json!({
            "status": "1",
            "result": [{ "tokenName": "Tether USD", "symbol": "USDT", "divisor": "6", "tokenType": "ERC20" }]
        })))
        .unwrap();
        assert_eq!(from_array.symbol.as_deref(), Some("USDT"));
        assert_eq!(from_array.decimals, Some(6));

        let from_object = parse_token_info(envelope(json!({
            "status": "1",
            "result": { "tokenName": "Azuki", "tokenType": "ERC721" }
        })))
        .unwrap();
        assert_eq!(from_object.token_type.as_deref(), Some("ERC721"));
        assert!(from_object.symbol.is_none());
    }

    #[tokio::test]
    async fn retries_rate_limit_reported_in_a_success_response() {
        let (endpoint, hits) = serve(vec![RATE_LIMITED, VERIFIED]).await;
        let client = EtherscanClient::new(Duration::from_secs(5), 1).unwrap();

        let source = client
            .contract_source(&endpoint, address!("c000000000000000000000000000000000000003"))
            .await
            .unwrap();
        assert_eq!(source.unwrap().contract_name, "FiatTokenV2");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_rate_limit_gives_up_after_retries() {
        let (endpoint, hits) = serve(vec![RATE_LIMITED]).await;
        let client = EtherscanClient::new(Duration::from_secs(5), 1).unwrap();

        let err = client
            .contract_source(&endpoint, address!("c000000000000000000000000000000000000003"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExplorerError::Api(ref m) if m == "Max rate limit reached"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn call_result_decodes_hex() {
        let env = envelope(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x01ff" }));
        assert_eq!(parse_call_result(env).unwrap().as_ref(), &[0x01, 0xff]);
    }
}
