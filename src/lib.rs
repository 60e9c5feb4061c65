//! Anthem Signing Core
//!
//! Transaction signing, broadcast, and confirmation tracking for the
//! Anthem multi-network staking dashboard. Non-custodial: private keys
//! never leave the Ledger device; this crate derives addresses, builds
//! canonical sign documents, drives the signing dialog state machine,
//! and tracks broadcast transactions to a terminal state.
//!
//! # Architecture
//!
//! - **transport**: hardware-wallet channel selection (HID/USB/U2F)
//! - **ledger**: device sessions, status-word mapping, connect retry
//! - **derivation**: per-network address derivation and validation
//! - **tx**: transaction building, signing orchestration, broadcasting,
//!   confirmation polling
//! - **config**: endpoints, broadcast mode, retry/poll tuning
//!
//! # Boundaries
//!
//! The UI layer hands in a [`types::PendingTransaction`] and consumes
//! [`tx::orchestrator::TxEvent`]s; vendor Ledger app bindings are injected
//! behind [`ledger::LedgerApp`], and chain REST access behind
//! [`tx::broadcaster::ChainClient`]. Nothing here renders anything.

pub mod config;
pub mod derivation;
pub mod error;
pub mod ledger;
pub mod transport;
pub mod tx;
pub mod types;
pub mod utils;

// Re-export key types for convenience
pub use config::{BroadcastMode, Config};
pub use error::{AnthemError, AnthemResult, ErrorCode};
pub use types::*;

pub use transport::{acquire_transport, Transport, TransportError, TransportKind, TransportProbe};
pub use tx::broadcaster::{ChainClient, HttpChainClient};
pub use tx::orchestrator::{
    CancelHandle, DeviceConnector, SigningOrchestrator, SigningStage, TxEvent,
};
