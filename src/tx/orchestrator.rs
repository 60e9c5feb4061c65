//! Signing Orchestrator
//!
//! Drives a pending transaction through SETUP → SIGN → CONFIRM → PENDING
//! → SUCCESS/FAILURE. Owns the device session for the lifetime of one
//! signing dialog, emits the fixed event set the UI renders, and resets
//! cleanly from every state when the dialog closes.

use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::error::{AnthemError, AnthemResult, ErrorCode};
use crate::ledger::{connect_with_retry, DeviceSession, LedgerApp};
use crate::tx::broadcaster::{self, ChainClient};
use crate::tx::builder;
use crate::tx::poller;
use crate::types::*;
use crate::{log_debug, log_error};

/// Message surfaced when a broadcast submission fails. Deliberately
/// non-committal: submission is at-least-once, so the transaction may
/// have landed even though the response was an error.
pub const BROADCAST_UNCERTAIN_MSG: &str =
    "The transaction broadcast may still have succeeded. Please wait a moment and refresh your balances before trying again.";

// =============================================================================
// States and Events
// =============================================================================

/// Dialog state machine stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SigningStage {
    Setup,
    Sign,
    Confirm,
    Pending,
    Success,
    Failure,
}

/// Events consumed by the UI layer. Exactly one terminal event is emitted
/// per attempt; the UI owns all rendering triggered by these.
#[derive(Debug, Clone)]
pub enum TxEvent {
    SignTransactionSuccess(Box<SignedTransactionEnvelope>),
    SignTransactionFailure(AnthemError),
    BroadcastTransactionSuccess(BroadcastResult),
    BroadcastTransactionFailure(AnthemError),
    TransactionConfirmed(ConfirmedTransaction),
    TransactionFailed(AnthemError),
}

// =============================================================================
// Device Connector Boundary
// =============================================================================

/// Produces per-network Ledger app handles. Injected so the orchestrator
/// never constructs vendor SDK clients itself; one connector is scoped to
/// one signing session.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, network: Network) -> AnthemResult<Box<dyn LedgerApp>>;
}

/// Handle the UI uses to signal that the signing dialog was closed.
/// Cancels any outstanding device-connection retry loop and prevents an
/// in-flight signature from being broadcast.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn close_dialog(&self) {
        let _ = self.tx.send(true);
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// The signing state machine for one dialog lifecycle
pub struct SigningOrchestrator {
    config: Config,
    connector: Arc<dyn DeviceConnector>,
    client: Arc<dyn ChainClient>,
    events: mpsc::UnboundedSender<TxEvent>,

    stage: SigningStage,
    pending: Option<PendingTransaction>,
    context: Option<ChainContext>,
    unsigned: Option<UnsignedTransaction>,
    envelope: Option<SignedTransactionEnvelope>,
    session: Option<DeviceSession>,

    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl SigningOrchestrator {
    /// Create an orchestrator and the event stream the UI subscribes to
    pub fn new(
        config: Config,
        connector: Arc<dyn DeviceConnector>,
        client: Arc<dyn ChainClient>,
    ) -> (Self, mpsc::UnboundedReceiver<TxEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let orchestrator = Self {
            config,
            connector,
            client,
            events,
            stage: SigningStage::Setup,
            pending: None,
            context: None,
            unsigned: None,
            envelope: None,
            session: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        };

        (orchestrator, receiver)
    }

    pub fn stage(&self) -> SigningStage {
        self.stage
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn pending_transaction(&self) -> Option<&PendingTransaction> {
        self.pending.as_ref()
    }

    /// Handle for the UI's dialog-close button
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    fn emit(&self, event: TxEvent) {
        let _ = self.events.send(event);
    }

    /// Accept a transaction intent while in SETUP. The builder runs
    /// immediately so validation errors surface before the user is asked
    /// to touch the device; an invalid intent leaves the stage unchanged.
    pub fn set_intent(
        &mut self,
        intent: PendingTransaction,
        context: ChainContext,
    ) -> AnthemResult<()> {
        if self.stage != SigningStage::Setup {
            return Err(AnthemError::invalid_input(
                "A transaction is already in flight; close the dialog first",
            ));
        }

        let unsigned = builder::build_unsigned_transaction(&intent, &context)?;

        self.pending = Some(intent);
        self.context = Some(context);
        self.unsigned = Some(unsigned);
        Ok(())
    }

    /// SETUP → SIGN: connect to the device (with retry), request the
    /// signature, and assemble the envelope. On success the stage moves
    /// to CONFIRM and `SignTransactionSuccess` is emitted; every failure
    /// is converted to a `SignTransactionFailure` event, never an
    /// unhandled propagation into the UI.
    pub async fn sign(&mut self) -> AnthemResult<SignedTransactionEnvelope> {
        if self.stage != SigningStage::Setup || self.unsigned.is_none() {
            return Err(AnthemError::invalid_input(
                "No validated transaction is ready for signing",
            ));
        }
        if self.session.is_some() {
            return Err(AnthemError::invalid_input(
                "A device session is already active",
            ));
        }

        self.stage = SigningStage::Sign;

        match self.sign_inner().await {
            Ok(envelope) => {
                self.stage = SigningStage::Confirm;
                self.emit(TxEvent::SignTransactionSuccess(Box::new(envelope.clone())));
                Ok(envelope)
            }
            Err(e) if e.code == ErrorCode::Cancelled => {
                self.reset().await;
                Err(e)
            }
            Err(e) => {
                log_error!("orchestrator", "Signing failed", error = e.message);
                self.stage = SigningStage::Failure;
                if let Some(session) = self.session.take() {
                    session.close().await;
                }
                self.emit(TxEvent::SignTransactionFailure(e.clone()));
                Err(e)
            }
        }
    }

    async fn sign_inner(&mut self) -> AnthemResult<SignedTransactionEnvelope> {
        let intent = self
            .pending
            .clone()
            .ok_or_else(|| AnthemError::internal("Missing pending transaction"))?;
        let context = self
            .context
            .clone()
            .ok_or_else(|| AnthemError::internal("Missing chain context"))?;
        let unsigned = self
            .unsigned
            .clone()
            .ok_or_else(|| AnthemError::internal("Missing unsigned transaction"))?;

        let network = intent.network;
        let connector = self.connector.clone();

        let session = connect_with_retry(
            || {
                let connector = connector.clone();
                async move {
                    let app = connector.connect(network).await?;
                    DeviceSession::open(app, network).await
                }
            },
            &self.config,
            self.cancel_rx.clone(),
        )
        .await?;

        // The connected device must hold the sender address
        if session.address.address != intent.sender {
            session.close().await;
            return Err(AnthemError::signing_failed(format!(
                "The connected device derives {}, not the sender address",
                session.address.address
            )));
        }

        let payload = builder::sign_bytes(&unsigned)?;
        log_debug!("orchestrator", "Requesting device signature",
            network = network.name(),
            payload_bytes = payload.len(),
        );

        let signature = match session.sign(&payload).await {
            Ok(signature) => signature,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };

        // A dialog closed mid-signature discards the result
        if self.is_cancelled() {
            session.close().await;
            return Err(AnthemError::cancelled());
        }

        let engine = base64::engine::general_purpose::STANDARD;
        let public_key = hex::decode(&session.address.public_key_hex)?;

        let envelope = SignedTransactionEnvelope {
            transaction: intent,
            unsigned,
            signature: engine.encode(signature),
            public_key: engine.encode(public_key),
            account_number: context.account_number,
            sequence: context.sequence,
        };

        self.session = Some(session);
        self.envelope = Some(envelope.clone());
        Ok(envelope)
    }

    /// CONFIRM → PENDING → SUCCESS/FAILURE: the user confirmed the
    /// broadcast. Submits the envelope, then polls until terminal.
    pub async fn confirm_and_broadcast(&mut self) -> AnthemResult<ConfirmedTransaction> {
        if self.stage != SigningStage::Confirm {
            return Err(AnthemError::invalid_input(
                "No signed transaction is awaiting broadcast",
            ));
        }
        let envelope = self
            .envelope
            .clone()
            .ok_or_else(|| AnthemError::internal("Missing signed envelope"))?;

        // A closed dialog must never broadcast its in-flight signature
        if self.is_cancelled() {
            self.reset().await;
            return Err(AnthemError::cancelled());
        }

        self.stage = SigningStage::Pending;

        let result = match broadcaster::broadcast(self.client.as_ref(), &self.config, &envelope)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                log_error!("orchestrator", "Broadcast failed", error = e.message);
                self.stage = SigningStage::Failure;
                let surfaced = AnthemError::broadcast_failed(BROADCAST_UNCERTAIN_MSG)
                    .with_details(e.to_string());
                self.emit(TxEvent::BroadcastTransactionFailure(surfaced.clone()));
                return Err(surfaced);
            }
        };

        self.emit(TxEvent::BroadcastTransactionSuccess(result.clone()));

        match poller::wait_for_confirmation(
            self.client.as_ref(),
            &self.config,
            envelope.transaction.network,
            &result.hash,
            self.cancel_rx.clone(),
        )
        .await
        {
            Ok(confirmed) => {
                self.stage = SigningStage::Success;
                self.emit(TxEvent::TransactionConfirmed(confirmed.clone()));
                Ok(confirmed)
            }
            Err(e) if e.code == ErrorCode::Cancelled => {
                self.reset().await;
                Err(e)
            }
            Err(e) => {
                self.stage = SigningStage::Failure;
                self.emit(TxEvent::TransactionFailed(e.clone()));
                Err(e)
            }
        }
    }

    /// Return to SETUP from any state: tear down the device session and
    /// discard every in-progress artifact. Safe to call repeatedly; a
    /// reset orchestrator holds no session and no pending transaction.
    pub async fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }

        self.pending = None;
        self.context = None;
        self.unsigned = None;
        self.envelope = None;
        self.stage = SigningStage::Setup;

        // Re-arm the dialog-closed signal for the next attempt
        let _ = self.cancel_tx.send(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation;

    struct NoDevice;

    #[async_trait]
    impl DeviceConnector for NoDevice {
        async fn connect(&self, _network: Network) -> AnthemResult<Box<dyn LedgerApp>> {
            Err(AnthemError::user_rejected())
        }
    }

    struct NoChain;

    #[async_trait]
    impl ChainClient for NoChain {
        async fn submit_transaction(
            &self,
            _network: Network,
            _body: &serde_json::Value,
        ) -> AnthemResult<serde_json::Value> {
            Err(AnthemError::network_error("offline"))
        }

        async fn transaction_by_hash(
            &self,
            _network: Network,
            _hash: &str,
        ) -> AnthemResult<Option<serde_json::Value>> {
            Ok(None)
        }
    }

    fn orchestrator() -> (SigningOrchestrator, mpsc::UnboundedReceiver<TxEvent>) {
        SigningOrchestrator::new(Config::default(), Arc::new(NoDevice), Arc::new(NoChain))
    }

    fn cosmos_intent() -> (PendingTransaction, ChainContext) {
        let mut key = vec![0x02];
        key.extend_from_slice(&[0x77; 32]);
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
            account_number: 1,
            sequence: 0,
            available_balance: "50000000".to_string(),
        };
        (intent, context)
    }

    #[tokio::test]
    async fn test_sign_requires_intent() {
        let (mut orch, _events) = orchestrator();
        let err = orch.sign().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert_eq!(orch.stage(), SigningStage::Setup);
    }

    #[tokio::test]
    async fn test_invalid_intent_stays_in_setup() {
        let (mut orch, _events) = orchestrator();
        let (mut intent, context) = cosmos_intent();
        intent.amount = "999999999".to_string(); // above ceiling

        let err = orch.set_intent(intent, context).unwrap_err();
        assert_eq!(err.message, builder::MAX_AVAILABLE_MSG);
        assert_eq!(orch.stage(), SigningStage::Setup);
        assert!(orch.pending_transaction().is_none());
    }

    #[tokio::test]
    async fn test_device_rejection_emits_failure_event() {
        let (mut orch, mut events) = orchestrator();
        let (intent, context) = cosmos_intent();
        orch.set_intent(intent, context).unwrap();

        let err = orch.sign().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UserRejected);
        assert_eq!(orch.stage(), SigningStage::Failure);

        match events.try_recv().unwrap() {
            TxEvent::SignTransactionFailure(e) => {
                assert_eq!(e.code, ErrorCode::UserRejected)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reset_is_idempotent_from_failure() {
        let (mut orch, _events) = orchestrator();
        let (intent, context) = cosmos_intent();
        orch.set_intent(intent, context).unwrap();
        let _ = orch.sign().await;
        assert_eq!(orch.stage(), SigningStage::Failure);

        orch.reset().await;
        assert_eq!(orch.stage(), SigningStage::Setup);
        assert!(!orch.has_session());
        assert!(orch.pending_transaction().is_none());

        // Resetting again changes nothing
        orch.reset().await;
        assert_eq!(orch.stage(), SigningStage::Setup);
    }

    #[tokio::test]
    async fn test_confirm_requires_signature() {
        let (mut orch, _events) = orchestrator();
        let err = orch.confirm_and_broadcast().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}
