//! Transaction Builder
//!
//! Turns a validated transaction intent plus chain context into the
//! network's canonical unsigned payload. All validation happens here,
//! before any device interaction is attempted.

use serde_json::json;

use crate::derivation;
use crate::error::{AnthemError, AnthemResult};
use crate::types::*;

/// Exact message surfaced when the amount exceeds the spendable balance
pub const MAX_AVAILABLE_MSG: &str = "Final value is greater than the maximum available.";

// =============================================================================
// Fee Defaults
// =============================================================================

/// Default gas limit applied when the intent does not set one
pub fn default_gas_limit(action: TxAction) -> u64 {
    match action {
        TxAction::Redelegate => 250_000,
        _ => 200_000,
    }
}

/// Default gas price in base denomination per gas unit
pub fn default_gas_price(network: Network) -> f64 {
    match network {
        Network::Cosmos => 0.025,
        Network::Terra => 0.015,
        Network::Kava => 0.05,
        // Celo and Oasis fees are computed by the chain's own fee model
        Network::Celo | Network::Oasis | Network::Polkadot => 0.0,
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Parse an amount string in base denomination. Amounts are integral
/// (the base unit is indivisible) and must be positive.
pub fn parse_base_amount(amount: &str) -> AnthemResult<u128> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(AnthemError::invalid_input("Please enter a transaction amount"));
    }

    let value: u128 = trimmed
        .parse()
        .map_err(|_| AnthemError::invalid_input("Amount must be a positive whole number"))?;

    if value == 0 {
        return Err(AnthemError::invalid_input("Amount must be greater than zero"));
    }

    Ok(value)
}

/// Convert a display-unit amount string ("10", "0.5") to the base
/// denomination for a network ("10000000" uatom for 10 ATOM).
pub fn display_to_base(amount: &str, network: Network) -> AnthemResult<String> {
    let trimmed = amount.trim();
    let decimals = network.decimals() as usize;

    let (integer_str, fraction_str) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    if integer_str.is_empty() && fraction_str.is_empty() {
        return Err(AnthemError::invalid_input("Please enter a transaction amount"));
    }

    if fraction_str.len() > decimals {
        return Err(AnthemError::invalid_input(format!(
            "{} supports at most {} decimal places",
            network.ticker(),
            decimals
        )));
    }

    let integer: u128 = if integer_str.is_empty() {
        0
    } else {
        integer_str
            .parse()
            .map_err(|_| AnthemError::invalid_input("Amount must be a positive number"))?
    };

    let padded = format!("{:0<width$}", fraction_str, width = decimals);
    let fraction: u128 = if padded.is_empty() {
        0
    } else {
        padded
            .parse()
            .map_err(|_| AnthemError::invalid_input("Amount must be a positive number"))?
    };

    let base = integer
        .checked_mul(10u128.pow(decimals as u32))
        .and_then(|v| v.checked_add(fraction))
        .ok_or_else(|| AnthemError::invalid_input("Amount overflow"))?;

    Ok(base.to_string())
}

/// Convert a base-denomination amount to its display form
pub fn base_to_display(amount: &str, network: Network) -> AnthemResult<String> {
    let raw = parse_base_amount(amount)?;
    let decimals = network.decimals() as u32;
    let divisor = 10u128.pow(decimals);

    let integer = raw / divisor;
    let fraction = raw % divisor;

    if fraction == 0 {
        return Ok(integer.to_string());
    }

    let frac_str = format!("{:0>width$}", fraction, width = decimals as usize);
    Ok(format!("{}.{}", integer, frac_str.trim_end_matches('0')))
}

/// Fail-fast intent validation. Runs before any device interaction:
/// invalid intents never reach the hardware.
pub fn validate_intent(intent: &PendingTransaction, context: &ChainContext) -> AnthemResult<()> {
    derivation::validate_address(&intent.sender, intent.network)?;

    if intent.action.requires_amount() {
        let amount = parse_base_amount(&intent.amount)?;
        let ceiling = parse_base_amount(&context.available_balance)
            .map_err(|e| AnthemError::internal(format!("Bad balance ceiling: {}", e.message)))?;
        if amount > ceiling {
            return Err(AnthemError::insufficient_funds(MAX_AVAILABLE_MSG));
        }
    }

    if intent.action.requires_validator() && intent.validator.is_none() {
        return Err(AnthemError::invalid_input(
            "Please select a validator before continuing",
        ));
    }

    if let Some(validator) = &intent.validator {
        derivation::validate_address(validator, intent.network)?;
    }

    if intent.action == TxAction::Send {
        match &intent.recipient {
            None => {
                return Err(AnthemError::invalid_input("Please enter a recipient address"));
            }
            Some(recipient) => derivation::validate_address(recipient, intent.network)?,
        }
    }

    Ok(())
}

// =============================================================================
// Builder
// =============================================================================

/// Build the canonical unsigned transaction for an intent.
///
/// Every (network, action) pair is matched exhaustively; adding a network
/// or action without extending this dispatch is a compile error rather
/// than a runtime surprise.
pub fn build_unsigned_transaction(
    intent: &PendingTransaction,
    context: &ChainContext,
) -> AnthemResult<UnsignedTransaction> {
    validate_intent(intent, context)?;

    match intent.network {
        Network::Cosmos | Network::Terra | Network::Kava => {
            build_cosmos_sign_doc(intent, context).map(UnsignedTransaction::Cosmos)
        }
        Network::Celo => build_celo_call(intent).map(UnsignedTransaction::Celo),
        Network::Oasis => build_oasis_tx(intent).map(UnsignedTransaction::Oasis),
        Network::Polkadot => Err(AnthemError::operation_not_supported(
            "Polkadot transactions cannot be signed yet",
        )),
    }
}

fn unsupported_action(network: Network, action: TxAction) -> AnthemError {
    AnthemError::operation_not_supported(format!(
        "{:?} is not available on {}",
        action,
        network.name()
    ))
}

/// Cosmos-family amino sign document
fn build_cosmos_sign_doc(
    intent: &PendingTransaction,
    context: &ChainContext,
) -> AnthemResult<StdSignDoc> {
    let network = intent.network;
    let denom = network.denom();

    let msg = match intent.action {
        TxAction::Send => {
            let recipient = intent.recipient.as_deref().unwrap_or_default();
            json!({
                "type": "cosmos-sdk/MsgSend",
                "value": {
                    "from_address": intent.sender,
                    "to_address": recipient,
                    "amount": [{"denom": denom, "amount": intent.amount}],
                }
            })
        }
        TxAction::Delegate => {
            let validator = intent.validator.as_deref().unwrap_or_default();
            json!({
                "type": "cosmos-sdk/MsgDelegate",
                "value": {
                    "delegator_address": intent.sender,
                    "validator_address": validator,
                    "amount": {"denom": denom, "amount": intent.amount},
                }
            })
        }
        TxAction::Undelegate => {
            let validator = intent.validator.as_deref().unwrap_or_default();
            json!({
                "type": "cosmos-sdk/MsgUndelegate",
                "value": {
                    "delegator_address": intent.sender,
                    "validator_address": validator,
                    "amount": {"denom": denom, "amount": intent.amount},
                }
            })
        }
        TxAction::Redelegate => {
            let source = intent.validator.as_deref().unwrap_or_default();
            let destination = intent.validator_destination.as_deref().ok_or_else(|| {
                AnthemError::invalid_input("Please select a destination validator")
            })?;
            json!({
                "type": "cosmos-sdk/MsgBeginRedelegate",
                "value": {
                    "delegator_address": intent.sender,
                    "validator_src_address": source,
                    "validator_dst_address": destination,
                    "amount": {"denom": denom, "amount": intent.amount},
                }
            })
        }
        TxAction::Claim => {
            let validator = intent.validator.as_deref().unwrap_or_default();
            json!({
                "type": "cosmos-sdk/MsgWithdrawDelegationReward",
                "value": {
                    "delegator_address": intent.sender,
                    "validator_address": validator,
                }
            })
        }
        TxAction::Vote => {
            let proposal_id = intent.proposal_id.ok_or_else(|| {
                AnthemError::invalid_input("Please select a governance proposal")
            })?;
            let vote = intent
                .vote
                .ok_or_else(|| AnthemError::invalid_input("Please choose a vote option"))?;
            json!({
                "type": "cosmos-sdk/MsgVote",
                "value": {
                    "proposal_id": proposal_id.to_string(),
                    "voter": intent.sender,
                    "option": cosmos_vote_option(vote),
                }
            })
        }
        TxAction::Lock
        | TxAction::Unlock
        | TxAction::Withdraw
        | TxAction::Activate
        | TxAction::Revoke
        | TxAction::Upvote => return Err(unsupported_action(network, intent.action)),
    };

    let fee = build_cosmos_fee(intent, network);

    Ok(StdSignDoc {
        chain_id: context.chain_id.clone(),
        account_number: context.account_number.to_string(),
        sequence: context.sequence.to_string(),
        fee,
        msgs: vec![msg],
        memo: intent.memo.clone().unwrap_or_default(),
    })
}

fn cosmos_vote_option(vote: VoteChoice) -> &'static str {
    match vote {
        VoteChoice::Yes => "Yes",
        VoteChoice::No => "No",
        VoteChoice::NoWithVeto => "NoWithVeto",
        VoteChoice::Abstain => "Abstain",
    }
}

fn build_cosmos_fee(intent: &PendingTransaction, network: Network) -> StdFee {
    let settings = intent.fee.clone().unwrap_or_default();
    let gas = settings
        .gas_limit
        .unwrap_or_else(|| default_gas_limit(intent.action));
    let price: f64 = settings
        .gas_price
        .and_then(|p| p.parse().ok())
        .unwrap_or_else(|| default_gas_price(network));

    let fee_amount = (gas as f64 * price).ceil() as u128;

    StdFee {
        amount: vec![Coin {
            denom: network.denom().to_string(),
            amount: fee_amount.to_string(),
        }],
        gas: gas.to_string(),
    }
}

/// Celo contract-call description
fn build_celo_call(intent: &PendingTransaction) -> AnthemResult<CeloContractCall> {
    let network = intent.network;

    match intent.action {
        TxAction::Send => Ok(CeloContractCall::Transfer {
            to: intent.recipient.clone().unwrap_or_default(),
            amount: intent.amount.clone(),
        }),
        TxAction::Lock => Ok(CeloContractCall::Lock {
            amount: intent.amount.clone(),
        }),
        TxAction::Unlock => Ok(CeloContractCall::Unlock {
            amount: intent.amount.clone(),
        }),
        TxAction::Withdraw => {
            // The UI passes the pending-withdrawal index through proposal_id
            let index = intent.proposal_id.unwrap_or(0) as u32;
            Ok(CeloContractCall::Withdraw { index })
        }
        TxAction::Vote => {
            if let Some(proposal_id) = intent.proposal_id {
                let vote = intent
                    .vote
                    .ok_or_else(|| AnthemError::invalid_input("Please choose a vote option"))?;
                Ok(CeloContractCall::GovernanceVote { proposal_id, vote })
            } else {
                let group = intent.validator.clone().ok_or_else(|| {
                    AnthemError::invalid_input("Please select a validator group")
                })?;
                parse_base_amount(&intent.amount)?;
                Ok(CeloContractCall::Vote {
                    group,
                    amount: intent.amount.clone(),
                })
            }
        }
        TxAction::Activate => Ok(CeloContractCall::Activate {
            group: intent.validator.clone().unwrap_or_default(),
        }),
        TxAction::Revoke => Ok(CeloContractCall::Revoke {
            group: intent.validator.clone().unwrap_or_default(),
            amount: intent.amount.clone(),
        }),
        TxAction::Upvote => {
            let proposal_id = intent.proposal_id.ok_or_else(|| {
                AnthemError::invalid_input("Please select a governance proposal")
            })?;
            Ok(CeloContractCall::Upvote { proposal_id })
        }
        TxAction::Delegate | TxAction::Undelegate | TxAction::Redelegate | TxAction::Claim => {
            Err(unsupported_action(network, intent.action))
        }
    }
}

/// Oasis staking transaction shape
fn build_oasis_tx(intent: &PendingTransaction) -> AnthemResult<OasisTransaction> {
    let network = intent.network;

    match intent.action {
        TxAction::Send => Ok(OasisTransaction::Transfer {
            to: intent.recipient.clone().unwrap_or_default(),
            amount: intent.amount.clone(),
        }),
        TxAction::Delegate => Ok(OasisTransaction::AddEscrow {
            account: intent.validator.clone().unwrap_or_default(),
            amount: intent.amount.clone(),
        }),
        TxAction::Undelegate => Ok(OasisTransaction::ReclaimEscrow {
            account: intent.validator.clone().unwrap_or_default(),
            shares: intent.amount.clone(),
        }),
        TxAction::Redelegate
        | TxAction::Claim
        | TxAction::Vote
        | TxAction::Lock
        | TxAction::Unlock
        | TxAction::Withdraw
        | TxAction::Activate
        | TxAction::Revoke
        | TxAction::Upvote => Err(unsupported_action(network, intent.action)),
    }
}

// =============================================================================
// Canonical Serialization
// =============================================================================

/// Bytes the device signs. Serialization is canonical: keys sorted, no
/// whitespace, null fields omitted, so the signature is deterministic.
pub fn sign_bytes(unsigned: &UnsignedTransaction) -> AnthemResult<Vec<u8>> {
    let value = serde_json::to_value(unsigned)?;
    Ok(canonical_json_bytes(&value))
}

/// Serialize JSON canonically (sorted keys, no whitespace, nulls dropped)
pub fn canonical_json_bytes(value: &serde_json::Value) -> Vec<u8> {
    fn serialize_canonical(value: &serde_json::Value, out: &mut Vec<u8>) {
        match value {
            serde_json::Value::Null => out.extend_from_slice(b"null"),
            serde_json::Value::Bool(b) => {
                out.extend_from_slice(if *b { b"true" } else { b"false" });
            }
            serde_json::Value::Number(n) => {
                out.extend_from_slice(n.to_string().as_bytes());
            }
            serde_json::Value::String(s) => {
                out.push(b'"');
                for c in s.chars() {
                    match c {
                        '"' => out.extend_from_slice(b"\\\""),
                        '\\' => out.extend_from_slice(b"\\\\"),
                        '\n' => out.extend_from_slice(b"\\n"),
                        '\r' => out.extend_from_slice(b"\\r"),
                        '\t' => out.extend_from_slice(b"\\t"),
                        c if c.is_control() => {
                            out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
                        }
                        c => {
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                        }
                    }
                }
                out.push(b'"');
            }
            serde_json::Value::Array(arr) => {
                out.push(b'[');
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    serialize_canonical(v, out);
                }
                out.push(b']');
            }
            serde_json::Value::Object(obj) => {
                out.push(b'{');
                let mut keys: Vec<_> = obj.keys().collect();
                keys.sort();
                let mut first = true;
                for key in keys {
                    // Undefined/null fields are dropped before signing
                    if obj[key].is_null() {
                        continue;
                    }
                    if !first {
                        out.push(b',');
                    }
                    first = false;
                    out.push(b'"');
                    out.extend_from_slice(key.as_bytes());
                    out.push(b'"');
                    out.push(b':');
                    serialize_canonical(&obj[key], out);
                }
                out.push(b'}');
            }
        }
    }

    let mut out = Vec::new();
    serialize_canonical(value, &mut out);
    out
}
