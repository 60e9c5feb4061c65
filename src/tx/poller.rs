//! Confirmation Poller
//!
//! Repeatedly queries the chain for a broadcast hash until it lands in a
//! block or fails. Poll failures at the transport level are assumed
//! transient and retried with a longer delay; chain-level failure is
//! terminal. The loop is strictly sequential and bounded by
//! `max_poll_attempts` so a dropped transaction cannot poll forever.

use tokio::sync::watch;

use crate::config::Config;
use crate::error::{AnthemError, AnthemResult};
use crate::log_debug;
use crate::tx::broadcaster::ChainClient;
use crate::types::{ConfirmationResult, ConfirmedTransaction, Network};

/// Message surfaced when a transaction ran out of gas
pub const OUT_OF_GAS_MSG: &str =
    "The transaction failed because it ran out of gas. Please try again with a higher gas amount.";

/// Message surfaced when polling gives up
pub const POLL_TIMEOUT_MSG: &str =
    "The transaction has not been confirmed yet. It may still be included in a block; check the transaction status before retrying.";

/// Query the chain once and normalize the response
pub async fn poll_once(
    client: &dyn ChainClient,
    network: Network,
    hash: &str,
) -> AnthemResult<ConfirmationResult> {
    let response = client.transaction_by_hash(network, hash).await?;
    Ok(normalize_poll_response(network, response.as_ref()))
}

/// Normalize a raw transaction-by-hash response into a confirmation
/// result. `None` means the chain does not know the hash yet.
pub fn normalize_poll_response(
    network: Network,
    response: Option<&serde_json::Value>,
) -> ConfirmationResult {
    let json = match response {
        Some(json) => json,
        None => return ConfirmationResult::Pending,
    };

    match network {
        Network::Cosmos | Network::Terra | Network::Kava => {
            // A non-zero code is a chain-level failure with the reason in raw_log
            if let Some(code) = json.get("code").and_then(|c| c.as_u64()) {
                if code != 0 {
                    let reason = json
                        .get("raw_log")
                        .and_then(|l| l.as_str())
                        .unwrap_or("Transaction failed")
                        .to_string();
                    return ConfirmationResult::Failed { reason };
                }
            }

            match parse_height(json.get("height")) {
                Some(height) if height > 0 => ConfirmationResult::Confirmed { height },
                _ => ConfirmationResult::Pending,
            }
        }
        Network::Celo => {
            let status = json.get("status").and_then(|s| s.as_str());
            if status == Some("0x0") {
                let reason = json
                    .get("revertReason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("Transaction reverted")
                    .to_string();
                return ConfirmationResult::Failed { reason };
            }

            let height = json
                .get("blockNumber")
                .and_then(|b| b.as_str())
                .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok());
            match height {
                Some(height) => ConfirmationResult::Confirmed { height },
                None => ConfirmationResult::Pending,
            }
        }
        Network::Oasis => {
            let success = json.get("success").and_then(|s| s.as_bool());
            match success {
                Some(false) => ConfirmationResult::Failed {
                    reason: json
                        .get("error")
                        .and_then(|e| e.as_str())
                        .unwrap_or("Transaction failed")
                        .to_string(),
                },
                Some(true) => match parse_height(json.get("height")) {
                    Some(height) => ConfirmationResult::Confirmed { height },
                    None => ConfirmationResult::Pending,
                },
                None => ConfirmationResult::Pending,
            }
        }
        Network::Polkadot => ConfirmationResult::Failed {
            reason: "Polkadot transactions are not tracked".to_string(),
        },
    }
}

/// Height fields arrive as either strings or numbers depending on the chain
fn parse_height(value: Option<&serde_json::Value>) -> Option<u64> {
    let value = value?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Map a chain-level failure reason onto a typed error, special-casing the
/// out-of-gas log so the user gets an actionable message instead of the
/// raw chain text.
pub fn failure_error(reason: &str) -> AnthemError {
    if reason.to_lowercase().contains("out of gas") {
        AnthemError::out_of_gas(OUT_OF_GAS_MSG).with_details(reason.to_string())
    } else {
        AnthemError::transaction_failed(reason.to_string())
    }
}

/// Poll until the transaction confirms, fails, the attempt budget runs
/// out, or the dialog closes. Waits `poll_interval` between pending polls
/// and `poll_error_interval` after a transport-level error.
pub async fn wait_for_confirmation(
    client: &dyn ChainClient,
    config: &Config,
    network: Network,
    hash: &str,
    mut cancel: watch::Receiver<bool>,
) -> AnthemResult<ConfirmedTransaction> {
    let mut attempts: u32 = 0;

    loop {
        if *cancel.borrow() {
            return Err(AnthemError::cancelled());
        }

        attempts += 1;

        match poll_once(client, network, hash).await {
            Ok(ConfirmationResult::Confirmed { height }) => {
                return Ok(ConfirmedTransaction {
                    hash: hash.to_string(),
                    height,
                });
            }
            Ok(ConfirmationResult::Failed { reason }) => {
                return Err(failure_error(&reason));
            }
            Ok(ConfirmationResult::Pending) => {
                if attempts >= config.max_poll_attempts {
                    return Err(AnthemError::confirmation_timeout(POLL_TIMEOUT_MSG));
                }
                log_debug!("poller", "Transaction still pending",
                    hash = hash,
                    attempt = attempts,
                );
                sleep_unless_cancelled(config.poll_interval, &mut cancel).await?;
            }
            Err(e) => {
                // Transport-level poll errors are transient by design
                if attempts >= config.max_poll_attempts {
                    return Err(AnthemError::confirmation_timeout(POLL_TIMEOUT_MSG)
                        .with_details(e.to_string()));
                }
                log_debug!("poller", "Poll attempt failed, retrying",
                    hash = hash,
                    error = e.message,
                );
                sleep_unless_cancelled(config.poll_error_interval, &mut cancel).await?;
            }
        }
    }
}

async fn sleep_unless_cancelled(
    delay: std::time::Duration,
    cancel: &mut watch::Receiver<bool>,
) -> AnthemResult<()> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        changed = cancel.changed() => {
            if changed.is_err() || *cancel.borrow() {
                Err(AnthemError::cancelled())
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cosmos_confirmed() {
        let json = serde_json::json!({"height": "500", "txhash": "ABC123"});
        assert_eq!(
            normalize_poll_response(Network::Cosmos, Some(&json)),
            ConfirmationResult::Confirmed { height: 500 }
        );
    }

    #[test]
    fn test_normalize_cosmos_failed() {
        let json = serde_json::json!({
            "height": "510",
            "code": 11,
            "raw_log": "out of gas in location: WritePerByte",
        });
        let result = normalize_poll_response(Network::Cosmos, Some(&json));
        match result {
            ConfirmationResult::Failed { reason } => {
                assert!(reason.contains("out of gas"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_missing_is_pending() {
        assert_eq!(
            normalize_poll_response(Network::Cosmos, None),
            ConfirmationResult::Pending
        );
        // Known hash but not yet in a block
        let json = serde_json::json!({"txhash": "ABC123"});
        assert_eq!(
            normalize_poll_response(Network::Cosmos, Some(&json)),
            ConfirmationResult::Pending
        );
    }

    #[test]
    fn test_normalize_celo() {
        let confirmed = serde_json::json!({"status": "0x1", "blockNumber": "0x1f4"});
        assert_eq!(
            normalize_poll_response(Network::Celo, Some(&confirmed)),
            ConfirmationResult::Confirmed { height: 500 }
        );

        let reverted = serde_json::json!({"status": "0x0"});
        assert!(matches!(
            normalize_poll_response(Network::Celo, Some(&reverted)),
            ConfirmationResult::Failed { .. }
        ));
    }

    #[test]
    fn test_failure_error_out_of_gas() {
        let err = failure_error("out of gas in location: WritePerByte; gasWanted: 150000");
        assert_eq!(err.code, crate::error::ErrorCode::OutOfGas);
        assert_eq!(err.message, OUT_OF_GAS_MSG);
        assert!(err.details.unwrap().contains("gasWanted"));

        let generic = failure_error("insufficient fee");
        assert_eq!(generic.code, crate::error::ErrorCode::TransactionFailed);
        assert_eq!(generic.message, "insufficient fee");
    }
}
