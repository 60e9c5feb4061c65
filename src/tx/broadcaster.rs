//! Transaction Broadcaster
//!
//! Serializes a signed envelope into the exact body shape each network's
//! REST endpoint expects and submits it. The broadcast mode (async/sync/
//! block) is fixed per deployment configuration, never chosen per call.

use async_trait::async_trait;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{BroadcastMode, Config};
use crate::error::{AnthemError, AnthemResult};
use crate::log_info;
use crate::types::*;

// =============================================================================
// Chain Client Boundary
// =============================================================================

/// Stateless REST/RPC access to one deployment's chain endpoints. Raw
/// responses are returned as JSON and normalized by the caller, so tests
/// can feed recorded chain payloads straight through a mock.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// POST a network-specific broadcast body, returning the raw response
    async fn submit_transaction(
        &self,
        network: Network,
        body: &serde_json::Value,
    ) -> AnthemResult<serde_json::Value>;

    /// Raw transaction-by-hash response; `None` while the chain does not
    /// know the hash yet
    async fn transaction_by_hash(
        &self,
        network: Network,
        hash: &str,
    ) -> AnthemResult<Option<serde_json::Value>>;
}

// =============================================================================
// Envelope Serialization
// =============================================================================

/// Build the broadcast body for a signed envelope. Each network has a
/// distinct envelope shape; the match is exhaustive over the unsigned
/// payload variants.
pub fn broadcast_body(
    envelope: &SignedTransactionEnvelope,
    mode: BroadcastMode,
) -> AnthemResult<serde_json::Value> {
    let body = match &envelope.unsigned {
        UnsignedTransaction::Cosmos(doc) => json!({
            "tx": {
                "msg": doc.msgs,
                "fee": doc.fee,
                "memo": doc.memo,
                "signatures": [{
                    "signature": envelope.signature,
                    "account_number": envelope.account_number.to_string(),
                    "sequence": envelope.sequence.to_string(),
                    "pub_key": {
                        "type": "tendermint/PubKeySecp256k1",
                        "value": envelope.public_key,
                    },
                }],
            },
            "mode": mode.as_str(),
        }),
        UnsignedTransaction::Celo(call) => json!({
            "from": envelope.transaction.sender,
            "call": call,
            "signature": envelope.signature,
        }),
        UnsignedTransaction::Oasis(tx) => json!({
            "untrusted_raw_value": tx,
            "signature": {
                "signature": envelope.signature,
                "public_key": envelope.public_key,
            },
        }),
    };

    Ok(body)
}

/// Extract the transaction hash from a broadcast response, surfacing the
/// chain's raw error payload when submission was rejected.
pub fn parse_broadcast_response(
    network: Network,
    response: &serde_json::Value,
) -> AnthemResult<String> {
    // Cosmos LCD reports rejection inline with a non-zero code
    if let Some(code) = response.get("code").and_then(|c| c.as_u64()) {
        if code != 0 {
            let raw_log = response
                .get("raw_log")
                .and_then(|l| l.as_str())
                .unwrap_or("broadcast rejected");
            return Err(AnthemError::broadcast_failed(raw_log.to_string())
                .with_details(response.to_string()));
        }
    }

    let hash = match network {
        Network::Cosmos | Network::Terra | Network::Kava => {
            response.get("txhash").and_then(|h| h.as_str())
        }
        Network::Celo => response
            .get("transactionHash")
            .or_else(|| response.get("hash"))
            .and_then(|h| h.as_str()),
        Network::Oasis => response.get("hash").and_then(|h| h.as_str()),
        Network::Polkadot => None,
    };

    hash.map(|h| h.to_string()).ok_or_else(|| {
        AnthemError::broadcast_failed("No transaction hash in broadcast response")
            .with_details(response.to_string())
    })
}

/// Submit a signed envelope and return its hash. Consumes the envelope
/// logically once: callers must not re-broadcast the same envelope, since
/// submission is at-least-once and a retry could double-submit.
pub async fn broadcast(
    client: &dyn ChainClient,
    config: &Config,
    envelope: &SignedTransactionEnvelope,
) -> AnthemResult<BroadcastResult> {
    let network = envelope.transaction.network;
    let body = broadcast_body(envelope, config.broadcast_mode)?;

    let response = client.submit_transaction(network, &body).await?;
    let hash = parse_broadcast_response(network, &response)?;

    log_info!("broadcaster", "Transaction submitted",
        network = network.name(),
        hash = hash,
    );

    Ok(BroadcastResult {
        hash,
        submitted_at: current_timestamp(),
    })
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// Reqwest-backed [`ChainClient`] over the configured REST endpoints
pub struct HttpChainClient {
    client: reqwest::Client,
    config: Config,
}

impl HttpChainClient {
    pub fn new(config: Config) -> AnthemResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AnthemError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn broadcast_url(&self, network: Network) -> String {
        let base = self.config.endpoint(network);
        match network {
            Network::Cosmos | Network::Terra | Network::Kava => format!("{}/txs", base),
            Network::Celo | Network::Oasis | Network::Polkadot => {
                format!("{}/api/v1/transactions", base)
            }
        }
    }

    fn tx_url(&self, network: Network, hash: &str) -> String {
        let base = self.config.endpoint(network);
        match network {
            Network::Cosmos | Network::Terra | Network::Kava => {
                format!("{}/txs/{}", base, hash)
            }
            Network::Celo | Network::Oasis | Network::Polkadot => {
                format!("{}/api/v1/transactions/{}", base, hash)
            }
        }
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn submit_transaction(
        &self,
        network: Network,
        body: &serde_json::Value,
    ) -> AnthemResult<serde_json::Value> {
        let response = self
            .client
            .post(self.broadcast_url(network))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(AnthemError::broadcast_failed(format!(
                "Broadcast endpoint returned {}",
                status
            ))
            .with_details(text));
        }

        serde_json::from_str(&text).map_err(|e| {
            AnthemError::parse_error(format!("Failed to parse broadcast response: {}", e))
                .with_details(text)
        })
    }

    async fn transaction_by_hash(
        &self,
        network: Network,
        hash: &str,
    ) -> AnthemResult<Option<serde_json::Value>> {
        let response = self.client.get(self.tx_url(network, hash)).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(AnthemError::network_error(format!(
                "Transaction query returned {}",
                status
            )));
        }

        let json = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| AnthemError::parse_error(format!("Failed to parse tx response: {}", e)))?;

        Ok(Some(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation;
    use crate::tx::builder;

    fn sample_envelope() -> SignedTransactionEnvelope {
        let mut key = vec![0x02];
        key.extend_from_slice(&[0x66; 32]);
        let sender = derivation::derive_address(Network::Cosmos, &key)
            .unwrap()
            .address;
        let validator = derivation::to_validator_address(&sender, Network::Cosmos).unwrap();

        let intent = PendingTransaction {
            network: Network::Cosmos,
            action: TxAction::Delegate,
            sender,
            recipient: None,
            validator: Some(validator),
            validator_destination: None,
            amount: "10000000".to_string(),
            memo: None,
            fee: None,
            proposal_id: None,
            vote: None,
        };
        let context = ChainContext {
            chain_id: "cosmoshub-4".to_string(),
            account_number: 12345,
            sequence: 42,
            available_balance: "50000000".to_string(),
        };
        let unsigned = builder::build_unsigned_transaction(&intent, &context).unwrap();

        SignedTransactionEnvelope {
            transaction: intent,
            unsigned,
            signature: "c2lnbmF0dXJl".to_string(),
            public_key: "cHVibGlja2V5".to_string(),
            account_number: 12345,
            sequence: 42,
        }
    }

    #[test]
    fn test_cosmos_broadcast_body_shape() {
        let body = broadcast_body(&sample_envelope(), BroadcastMode::Block).unwrap();

        assert_eq!(body["mode"], "block");
        assert_eq!(body["tx"]["signatures"][0]["signature"], "c2lnbmF0dXJl");
        assert_eq!(
            body["tx"]["signatures"][0]["pub_key"]["type"],
            "tendermint/PubKeySecp256k1"
        );
        assert_eq!(body["tx"]["signatures"][0]["sequence"], "42");
        assert_eq!(body["tx"]["msg"][0]["type"], "cosmos-sdk/MsgDelegate");
    }

    #[test]
    fn test_parse_broadcast_success() {
        let response = serde_json::json!({"txhash": "ABC123", "height": "0"});
        let hash = parse_broadcast_response(Network::Cosmos, &response).unwrap();
        assert_eq!(hash, "ABC123");
    }

    #[test]
    fn test_parse_broadcast_rejection() {
        let response = serde_json::json!({
            "code": 4,
            "raw_log": "signature verification failed",
        });
        let err = parse_broadcast_response(Network::Cosmos, &response).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::BroadcastFailed);
        assert!(err.message.contains("signature verification failed"));
        // Raw payload preserved
        assert!(err.details.unwrap().contains("\"code\":4"));
    }

    #[test]
    fn test_parse_broadcast_missing_hash() {
        let response = serde_json::json!({"height": "10"});
        assert!(parse_broadcast_response(Network::Cosmos, &response).is_err());
    }
}
