//! Ledger device sessions
//!
//! Wraps the vendor app bindings behind one trait, maps the device's APDU
//! status words onto typed errors, gates on the on-device app version, and
//! runs the cancellable connect retry loop. A session is exclusively owned
//! by one signing dialog and torn down when the dialog closes.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::Config;
use crate::derivation::{self, DerivedAddress};
use crate::error::{AnthemError, AnthemResult, ErrorCode};
use crate::types::Network;
use crate::utils::version;
use crate::log_debug;

// =============================================================================
// Status Words
// =============================================================================

/// Success
pub const SW_OK: u16 = 0x9000;
/// Device is locked / screensaver active
pub const SW_SCREENSAVER: u16 = 0x6804;
/// Conditions of use not satisfied: the user rejected on-device
pub const SW_CONDITIONS_NOT_SATISFIED: u16 = 0x6985;

/// Map a Ledger status word onto a typed error. `SW_OK` maps to `None`.
pub fn error_from_status(sw: u16) -> Option<AnthemError> {
    match sw {
        SW_OK => None,
        SW_SCREENSAVER => Some(AnthemError::screensaver_active()),
        SW_CONDITIONS_NOT_SATISFIED => Some(AnthemError::user_rejected()),
        other => Some(
            AnthemError::device_error(format!("Device returned status 0x{:04x}", other))
                .with_details(format!("status_word={}", other)),
        ),
    }
}

// =============================================================================
// App Boundary
// =============================================================================

/// The per-network Ledger app bindings (Cosmos app, Celo app, ...) as this
/// core consumes them. Implementations wrap a [`crate::transport::Transport`]
/// and the vendor SDK; tests inject mocks.
#[async_trait]
pub trait LedgerApp: Send + Sync {
    /// On-device application version string, e.g. "1.5.3"
    async fn app_version(&self) -> AnthemResult<String>;

    /// Public key at the derivation path
    async fn public_key(&self, path: &str) -> AnthemResult<Vec<u8>>;

    /// Request an on-device signature over the canonical payload bytes
    async fn sign(&self, path: &str, payload: &[u8]) -> AnthemResult<Vec<u8>>;

    /// Close the underlying transport. Safe to call more than once.
    async fn close(&self);
}

// =============================================================================
// Device Session
// =============================================================================

/// A live hardware-wallet connection scoped to one signing dialog
pub struct DeviceSession {
    app: Box<dyn LedgerApp>,
    pub network: Network,
    pub address: DerivedAddress,
    pub app_version: String,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("app_version", &self.app_version)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Connect to the network's app on the device: read the app version,
    /// enforce the minimum, then derive the public key and address. The
    /// version gate runs before any key derivation is attempted.
    pub async fn open(app: Box<dyn LedgerApp>, network: Network) -> AnthemResult<Self> {
        if !network.supports_ledger() {
            return Err(AnthemError::operation_not_supported(format!(
                "Ledger signing is not supported for {}",
                network.name()
            )));
        }

        let path = network
            .derivation_path()
            .expect("ledger-capable networks declare a derivation path");

        let app_version = app.app_version().await?;
        if let Some(required) = network.min_app_version() {
            if !version::is_at_least(&app_version, required)? {
                return Err(AnthemError::invalid_app_version(format!(
                    "{} Ledger app {} or later is required",
                    network.name(),
                    required
                ))
                .with_details(format!("Device reports {}", app_version)));
            }
        }

        let public_key = app.public_key(path).await?;
        let address = derivation::derive_address(network, &public_key)?;

        log_debug!("ledger", "Device session opened",
            network = network.name(),
            app_version = app_version,
            address = address.address,
        );

        Ok(Self {
            app,
            network,
            address,
            app_version,
        })
    }

    /// Request an on-device signature over the payload
    pub async fn sign(&self, payload: &[u8]) -> AnthemResult<Vec<u8>> {
        let path = self
            .network
            .derivation_path()
            .expect("session networks declare a derivation path");
        self.app.sign(path, payload).await
    }

    /// Tear down the transport
    pub async fn close(&self) {
        self.app.close().await;
    }
}

// =============================================================================
// Connect Retry Loop
// =============================================================================

/// Retry delay for a failed connection attempt. The screensaver condition
/// gets a much longer wait so the user has time to unlock the device.
pub fn retry_delay_for(err: &AnthemError, config: &Config) -> Duration {
    if err.code == ErrorCode::ScreensaverActive {
        config.screensaver_retry_delay
    } else {
        config.connect_retry_delay
    }
}

/// Re-attempt a device connection until it succeeds, the error becomes
/// fatal, or the dialog-closed signal arrives. Transient transport errors
/// wait `connect_retry_delay`; a detected screensaver waits
/// `screensaver_retry_delay`.
pub async fn connect_with_retry<F, Fut>(
    connect: F,
    config: &Config,
    mut cancel: watch::Receiver<bool>,
) -> AnthemResult<DeviceSession>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = AnthemResult<DeviceSession>>,
{
    loop {
        if *cancel.borrow() {
            return Err(AnthemError::cancelled());
        }

        match connect().await {
            Ok(session) => return Ok(session),
            Err(e) if e.is_transient_device_error() => {
                let delay = retry_delay_for(&e, config);
                log_debug!("ledger", "Device connection failed, retrying",
                    delay_ms = delay.as_millis(),
                    code = format!("{:?}", e.code),
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = cancel.changed() => {
                        if changed.is_err() || *cancel.borrow() {
                            return Err(AnthemError::cancelled());
                        }
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct ScriptedApp {
        version: String,
        public_key: Vec<u8>,
        version_calls: Arc<AtomicU32>,
        pubkey_calls: Arc<AtomicU32>,
    }

    impl ScriptedApp {
        fn new(version: &str) -> Self {
            let mut key = vec![0x02];
            key.extend_from_slice(&[0x33; 32]);
            Self {
                version: version.to_string(),
                public_key: key,
                version_calls: Arc::new(AtomicU32::new(0)),
                pubkey_calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl LedgerApp for ScriptedApp {
        async fn app_version(&self) -> AnthemResult<String> {
            self.version_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.version.clone())
        }

        async fn public_key(&self, _path: &str) -> AnthemResult<Vec<u8>> {
            self.pubkey_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.public_key.clone())
        }

        async fn sign(&self, _path: &str, payload: &[u8]) -> AnthemResult<Vec<u8>> {
            Ok(payload.iter().rev().cloned().collect())
        }

        async fn close(&self) {}
    }

    #[test]
    fn test_status_word_mapping() {
        assert!(error_from_status(SW_OK).is_none());
        assert_eq!(
            error_from_status(SW_SCREENSAVER).unwrap().code,
            ErrorCode::ScreensaverActive
        );
        assert_eq!(
            error_from_status(SW_CONDITIONS_NOT_SATISFIED).unwrap().code,
            ErrorCode::UserRejected
        );
        assert_eq!(
            error_from_status(0x6e00).unwrap().code,
            ErrorCode::DeviceError
        );
    }

    #[tokio::test]
    async fn test_open_session() {
        let app = ScriptedApp::new("1.5.3");
        let session = DeviceSession::open(Box::new(app), Network::Cosmos)
            .await
            .unwrap();
        assert!(session.address.address.starts_with("cosmos1"));
        assert_eq!(session.app_version, "1.5.3");
    }

    #[tokio::test]
    async fn test_version_gate_blocks_derivation() {
        let app = ScriptedApp::new("1.0.3");
        let pubkey_calls = app.pubkey_calls.clone();

        let err = DeviceSession::open(Box::new(app), Network::Cosmos)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAppVersion);
        assert!(err.message.contains("1.1.1"));
        // Key derivation never ran
        assert_eq!(pubkey_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_network_short_circuits() {
        let app = ScriptedApp::new("1.5.3");
        let version_calls = app.version_calls.clone();

        let err = DeviceSession::open(Box::new(app), Network::Oasis)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationNotSupported);
        // No device I/O at all
        assert_eq!(version_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retry_delay_selection() {
        let config = Config::default();
        assert_eq!(
            retry_delay_for(&AnthemError::screensaver_active(), &config),
            Duration::from_millis(6500)
        );
        assert_eq!(
            retry_delay_for(&AnthemError::device_error("busy"), &config),
            Duration::from_millis(500)
        );
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_in = attempts.clone();

        let mut config = Config::default();
        config.connect_retry_delay = Duration::from_millis(1);

        let (_tx, rx) = watch::channel(false);
        let session = connect_with_retry(
            move || {
                let attempts = attempts_in.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AnthemError::device_error("not ready"))
                    } else {
                        DeviceSession::open(Box::new(ScriptedApp::new("1.5.3")), Network::Cosmos)
                            .await
                    }
                }
            },
            &config,
            rx,
        )
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(session.network, Network::Cosmos);
    }

    #[tokio::test]
    async fn test_retry_stops_on_fatal_error() {
        let (_tx, rx) = watch::channel(false);
        let err = connect_with_retry(
            || async { Err(AnthemError::user_rejected()) },
            &Config::default(),
            rx,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::UserRejected);
    }

    #[tokio::test]
    async fn test_retry_cancelled_by_dialog_close() {
        let mut config = Config::default();
        config.connect_retry_delay = Duration::from_millis(50);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            connect_with_retry(
                || async { Err(AnthemError::device_error("not ready")) },
                &config,
                rx,
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::Cancelled);
    }
}
