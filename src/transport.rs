//! Hardware-wallet transport selection
//!
//! Probes the host environment for a usable Ledger communication channel
//! in a fixed priority order and opens the first one available. HID and
//! USB are preferred over the legacy U2F path because they support richer
//! device interaction.

use crate::error::{AnthemError, AnthemResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Low-level channel kinds, in selection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Hid,
    Usb,
    U2f,
}

impl TransportKind {
    /// Fixed probe order
    pub const PRIORITY: [TransportKind; 3] =
        [TransportKind::Hid, TransportKind::Usb, TransportKind::U2f];
}

/// Low-level failures reported by transport implementations, before they
/// are folded into the unified error type
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Channel not available: {0}")]
    Unavailable(String),

    #[error("Device I/O failed: {0}")]
    Io(String),

    #[error("Device returned status word 0x{0:04x}")]
    Status(u16),
}

impl From<TransportError> for AnthemError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Unavailable(msg) => AnthemError::transport_unavailable(msg),
            TransportError::Io(msg) => AnthemError::device_error(msg),
            TransportError::Status(sw) => crate::ledger::error_from_status(sw)
                .unwrap_or_else(|| AnthemError::device_error("Unexpected status word")),
        }
    }
}

/// An open low-level channel to a Ledger device. The concrete
/// implementation wraps whatever the host environment provides; this
/// core only needs exchange and close.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Send an APDU frame and await the device's response
    async fn exchange(&self, apdu: &[u8]) -> AnthemResult<Vec<u8>>;

    /// Close the underlying channel. Safe to call more than once.
    async fn close(&self);
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Capability probe for one transport kind
#[async_trait]
pub trait TransportProbe: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether the host environment exposes this channel at all
    fn is_supported(&self) -> bool;

    /// Open the channel
    async fn create(&self) -> AnthemResult<Box<dyn Transport>>;
}

/// Open the highest-priority supported transport. Capability presence
/// decides which probe is chosen; a failure opening the chosen channel
/// propagates rather than falling through to a lower-priority one.
pub async fn acquire_transport(
    probes: &[Box<dyn TransportProbe>],
) -> AnthemResult<Box<dyn Transport>> {
    for kind in TransportKind::PRIORITY {
        if let Some(probe) = probes.iter().find(|p| p.kind() == kind && p.is_supported()) {
            return probe.create().await;
        }
    }

    Err(AnthemError::transport_unavailable(
        "This browser does not support HID, USB, or U2F hardware wallet transports",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTransport {
        kind: TransportKind,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        async fn exchange(&self, apdu: &[u8]) -> AnthemResult<Vec<u8>> {
            Ok(apdu.to_vec())
        }

        async fn close(&self) {}
    }

    struct FakeProbe {
        kind: TransportKind,
        supported: bool,
    }

    #[async_trait]
    impl TransportProbe for FakeProbe {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        fn is_supported(&self) -> bool {
            self.supported
        }

        async fn create(&self) -> AnthemResult<Box<dyn Transport>> {
            Ok(Box::new(FakeTransport { kind: self.kind }))
        }
    }

    fn probe(kind: TransportKind, supported: bool) -> Box<dyn TransportProbe> {
        Box::new(FakeProbe { kind, supported })
    }

    #[tokio::test]
    async fn test_priority_order() {
        // All supported: HID wins even when registered last
        let probes = vec![
            probe(TransportKind::U2f, true),
            probe(TransportKind::Usb, true),
            probe(TransportKind::Hid, true),
        ];
        let transport = acquire_transport(&probes).await.unwrap();
        assert_eq!(transport.kind(), TransportKind::Hid);
    }

    #[tokio::test]
    async fn test_fallback_to_u2f() {
        let probes = vec![
            probe(TransportKind::Hid, false),
            probe(TransportKind::Usb, false),
            probe(TransportKind::U2f, true),
        ];
        let transport = acquire_transport(&probes).await.unwrap();
        assert_eq!(transport.kind(), TransportKind::U2f);
    }

    #[test]
    fn test_transport_error_mapping() {
        let err: AnthemError = TransportError::Unavailable("no HID".to_string()).into();
        assert_eq!(err.code, crate::error::ErrorCode::TransportUnavailable);

        // Screensaver status word keeps its distinguished classification
        let err: AnthemError = TransportError::Status(0x6804).into();
        assert_eq!(err.code, crate::error::ErrorCode::ScreensaverActive);

        let err: AnthemError = TransportError::Status(0x6985).into();
        assert_eq!(err.code, crate::error::ErrorCode::UserRejected);
    }

    #[tokio::test]
    async fn test_no_transport_available() {
        let probes = vec![
            probe(TransportKind::Hid, false),
            probe(TransportKind::Usb, false),
            probe(TransportKind::U2f, false),
        ];
        let err = acquire_transport(&probes).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::TransportUnavailable);
    }
}
