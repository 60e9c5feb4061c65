//! Shared types for the Anthem signing core
//!
//! All data structures that cross module boundaries are defined here
//! for consistent serialization toward the UI layer.

use serde::{Deserialize, Serialize};

// =============================================================================
// Network Types
// =============================================================================

/// Supported proof-of-stake networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Cosmos,
    Terra,
    Kava,
    Celo,
    Oasis,
    Polkadot,
}

impl Network {
    /// Cosmos SDK chains sharing the StdSignDoc signing convention
    pub fn is_cosmos_family(&self) -> bool {
        matches!(self, Network::Cosmos | Network::Terra | Network::Kava)
    }

    /// Whether Ledger signing is implemented for this network.
    /// Oasis and Polkadot are read-only (address entry) networks.
    pub fn supports_ledger(&self) -> bool {
        matches!(
            self,
            Network::Cosmos | Network::Terra | Network::Kava | Network::Celo
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Cosmos => "COSMOS",
            Network::Terra => "TERRA",
            Network::Kava => "KAVA",
            Network::Celo => "CELO",
            Network::Oasis => "OASIS",
            Network::Polkadot => "POLKADOT",
        }
    }

    pub fn ticker(&self) -> &'static str {
        match self {
            Network::Cosmos => "ATOM",
            Network::Terra => "LUNA",
            Network::Kava => "KAVA",
            Network::Celo => "CELO",
            Network::Oasis => "ROSE",
            Network::Polkadot => "DOT",
        }
    }

    /// Base (indivisible) denomination amounts are expressed in
    pub fn denom(&self) -> &'static str {
        match self {
            Network::Cosmos => "uatom",
            Network::Terra => "uluna",
            Network::Kava => "ukava",
            Network::Celo => "wei",
            Network::Oasis => "nano-rose",
            Network::Polkadot => "planck",
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Network::Cosmos | Network::Terra | Network::Kava => 6,
            Network::Celo => 18,
            Network::Oasis => 9,
            Network::Polkadot => 10,
        }
    }

    /// Chain id string used in sign documents and broadcast envelopes
    pub fn chain_id(&self) -> &'static str {
        match self {
            Network::Cosmos => "cosmoshub-4",
            Network::Terra => "columbus-5",
            Network::Kava => "kava-9",
            Network::Celo => "celo-mainnet",
            Network::Oasis => "oasis-3",
            Network::Polkadot => "polkadot",
        }
    }

    /// Bech32 account prefix, where the network uses bech32 addresses
    pub fn account_prefix(&self) -> Option<&'static str> {
        match self {
            Network::Cosmos => Some("cosmos"),
            Network::Terra => Some("terra"),
            Network::Kava => Some("kava"),
            Network::Oasis => Some("oasis"),
            Network::Celo | Network::Polkadot => None,
        }
    }

    /// Bech32 validator-operator prefix for Cosmos-family networks
    pub fn validator_prefix(&self) -> Option<&'static str> {
        match self {
            Network::Cosmos => Some("cosmosvaloper"),
            Network::Terra => Some("terravaloper"),
            Network::Kava => Some("kavavaloper"),
            Network::Celo | Network::Oasis | Network::Polkadot => None,
        }
    }

    /// Minimum Ledger app version required before signing is attempted
    pub fn min_app_version(&self) -> Option<&'static str> {
        match self {
            Network::Cosmos | Network::Terra | Network::Kava => Some("1.1.1"),
            Network::Celo => Some("1.0.1"),
            Network::Oasis | Network::Polkadot => None,
        }
    }

    /// BIP44 derivation path used for Ledger key derivation
    pub fn derivation_path(&self) -> Option<&'static str> {
        match self {
            Network::Cosmos | Network::Terra | Network::Kava => Some("m/44'/118'/0'/0/0"),
            Network::Celo => Some("m/44'/52752'/0'/0/0"),
            Network::Oasis | Network::Polkadot => None,
        }
    }

    pub fn all() -> &'static [Network] {
        &[
            Network::Cosmos,
            Network::Terra,
            Network::Kava,
            Network::Celo,
            Network::Oasis,
            Network::Polkadot,
        ]
    }
}

// =============================================================================
// Transaction Intent Types
// =============================================================================

/// User-selected transaction action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxAction {
    Send,
    Delegate,
    Undelegate,
    Redelegate,
    Claim,
    Vote,
    Lock,
    Unlock,
    Withdraw,
    Activate,
    Revoke,
    Upvote,
}

impl TxAction {
    /// Actions that require a validator or group selection before signing
    pub fn requires_validator(&self) -> bool {
        matches!(
            self,
            TxAction::Delegate
                | TxAction::Undelegate
                | TxAction::Redelegate
                | TxAction::Claim
                | TxAction::Activate
                | TxAction::Revoke
        )
    }

    /// Actions that move an explicit amount
    pub fn requires_amount(&self) -> bool {
        !matches!(
            self,
            TxAction::Claim | TxAction::Activate | TxAction::Upvote | TxAction::Vote
        )
    }
}

/// Governance vote choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Yes,
    No,
    NoWithVeto,
    Abstain,
}

/// Fee and gas settings supplied with the intent; fields left `None`
/// fall back to the per-network defaults in [`crate::config`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeSettings {
    pub gas_limit: Option<u64>,
    /// Gas price in base denomination per gas unit, as a decimal string
    pub gas_price: Option<String>,
}

/// A user's unsigned transaction intent, handed in by the UI once a
/// transaction form is submitted. Immutable once given to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub network: Network,
    pub action: TxAction,
    pub sender: String,
    /// Recipient for transfers
    pub recipient: Option<String>,
    /// Validator or group address for staking/governance actions
    pub validator: Option<String>,
    /// Destination validator for redelegations
    pub validator_destination: Option<String>,
    /// Amount in the base (indivisible) denomination, as a decimal string
    pub amount: String,
    pub memo: Option<String>,
    pub fee: Option<FeeSettings>,
    /// Governance proposal id for vote/upvote actions
    pub proposal_id: Option<u64>,
    pub vote: Option<VoteChoice>,
}

/// Chain-side context required to build a sign document, fetched by the
/// caller before signing starts. `available_balance` is the ceiling the
/// amount is validated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainContext {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
    /// Spendable balance in base denomination
    pub available_balance: String,
}

// =============================================================================
// Sign Document Types
// =============================================================================

/// Coin denomination and amount (string to handle large values)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

/// Standard fee block of a Cosmos-family sign document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdFee {
    pub amount: Vec<Coin>,
    pub gas: String,
}

/// Cosmos-family amino sign document. Field values are strings per the
/// chain's signing convention; serialization must be canonical (sorted
/// keys, nulls omitted) for signature determinism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdSignDoc {
    pub chain_id: String,
    pub account_number: String,
    pub sequence: String,
    pub fee: StdFee,
    pub msgs: Vec<serde_json::Value>,
    pub memo: String,
}

/// Celo contract-call description. Gas is handled by the chain's fee
/// market, so no separate fee entry exists here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CeloContractCall {
    Transfer {
        to: String,
        /// Big-integer amount string in wei
        amount: String,
    },
    Lock {
        amount: String,
    },
    Unlock {
        amount: String,
    },
    Withdraw {
        /// Index of the matured pending withdrawal being claimed
        index: u32,
    },
    Vote {
        group: String,
        amount: String,
    },
    Activate {
        group: String,
    },
    Revoke {
        group: String,
        amount: String,
    },
    Upvote {
        proposal_id: u64,
    },
    GovernanceVote {
        proposal_id: u64,
        vote: VoteChoice,
    },
}

/// Oasis staking transaction shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OasisTransaction {
    Transfer { to: String, amount: String },
    AddEscrow { account: String, amount: String },
    ReclaimEscrow { account: String, shares: String },
}

/// A canonical, network-specific unsigned transaction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "network_format", rename_all = "snake_case")]
pub enum UnsignedTransaction {
    Cosmos(StdSignDoc),
    Celo(CeloContractCall),
    Oasis(OasisTransaction),
}

// =============================================================================
// Signing / Broadcast Result Types
// =============================================================================

/// A pending transaction plus its device signature, ready to broadcast.
/// Consumed exactly once by the broadcaster; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransactionEnvelope {
    pub transaction: PendingTransaction,
    pub unsigned: UnsignedTransaction,
    /// Signature bytes, base64
    pub signature: String,
    /// Compressed public key bytes, base64
    pub public_key: String,
    pub account_number: u64,
    pub sequence: u64,
}

/// Result of a successful broadcast submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub hash: String,
    /// Unix timestamp of submission
    pub submitted_at: u64,
}

/// Normalized outcome of a single confirmation poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfirmationResult {
    Confirmed { height: u64 },
    Failed { reason: String },
    Pending,
}

/// Terminal confirmation details surfaced to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedTransaction {
    pub hash: String,
    pub height: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_prefixes() {
        assert_eq!(Network::Cosmos.account_prefix(), Some("cosmos"));
        assert_eq!(Network::Terra.validator_prefix(), Some("terravaloper"));
        assert_eq!(Network::Kava.account_prefix(), Some("kava"));
        assert_eq!(Network::Celo.account_prefix(), None);
        assert_eq!(Network::Oasis.account_prefix(), Some("oasis"));
    }

    #[test]
    fn test_ledger_support_matrix() {
        assert!(Network::Cosmos.supports_ledger());
        assert!(Network::Celo.supports_ledger());
        assert!(!Network::Oasis.supports_ledger());
        assert!(!Network::Polkadot.supports_ledger());
    }

    #[test]
    fn test_action_requirements() {
        assert!(TxAction::Delegate.requires_validator());
        assert!(TxAction::Revoke.requires_validator());
        assert!(!TxAction::Send.requires_validator());
        assert!(!TxAction::Claim.requires_amount());
        assert!(TxAction::Lock.requires_amount());
    }

    #[test]
    fn test_network_serde_shape() {
        let json = serde_json::to_string(&Network::Cosmos).unwrap();
        assert_eq!(json, "\"cosmos\"");
        let action = serde_json::to_string(&TxAction::Undelegate).unwrap();
        assert_eq!(action, "\"UNDELEGATE\"");
    }
}
