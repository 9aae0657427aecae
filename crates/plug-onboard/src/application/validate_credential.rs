//! ValidateCredentialUseCase: proves an operator-supplied local key against a live plug.
//!
//! The validator opens a session to the selected candidate, asks for its
//! status once, and classifies what came back.  The whole round trip is a
//! single bounded attempt; running out of time is reported the same way as a
//! refused connection.
//!
//! # Architecture
//!
//! This use case depends only on the [`DeviceTransport`] / [`DeviceSession`]
//! traits.  The TCP implementation lives in
//! `infrastructure::network::device_link`; tests inject doubles.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use plug_core::{
    classify_status, Command, DeviceId, FilteredCandidate, ProtocolError, ProtocolVersion, StatusReply,
    ValidationOutcome,
};
use thiserror::Error;
use tokio::time;
use tracing::{info, warn};

/// Default bound on one validation round trip.
pub const DEFAULT_VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for device transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The device address could not be turned into a socket address.
    #[error("invalid device address {0:?}")]
    InvalidAddress(String),
    /// The TCP connection to the device failed.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The device sent bytes that are not a valid frame or payload.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The device answered with a frame that is not a status reply.
    #[error("unexpected {0:?} frame in reply")]
    UnexpectedReply(Command),
    /// The device closed the connection before replying.
    #[error("connection closed by device")]
    Closed,
    /// The round trip did not finish in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

/// Everything a transport needs to talk to one device.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub device_id: DeviceId,
    pub address: String,
    pub secret: String,
    pub protocol_version: ProtocolVersion,
}

impl SessionParams {
    pub fn for_candidate(candidate: &FilteredCandidate, secret: &str) -> Self {
        Self {
            device_id: candidate.device_id().clone(),
            address: candidate.address().to_string(),
            secret: secret.to_string(),
            protocol_version: candidate.protocol_version().clone(),
        }
    }
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("device_id", &self.device_id)
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .field("protocol_version", &self.protocol_version)
            .finish()
    }
}

/// Trait for opening a session to a device.
///
/// Infrastructure implementations use TCP; test implementations script replies.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Connects to the device described by `params`.
    async fn open_session(
        &self,
        params: &SessionParams,
    ) -> Result<Box<dyn DeviceSession>, TransportError>;
}

/// An open session to one device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceSession: Send {
    /// Requests the device status.  An `Ok` reply may still carry an error field.
    async fn query_status(&mut self) -> Result<StatusReply, TransportError>;
}

/// Checks a secret against a candidate with one bounded status round trip.
pub struct CredentialValidator {
    transport: Arc<dyn DeviceTransport>,
    timeout: Duration,
}

impl CredentialValidator {
    pub fn new(transport: Arc<dyn DeviceTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Validates `secret` against `candidate`.
    ///
    /// Never fails: transport problems and timeouts become
    /// [`ValidationOutcome::Unreachable`], an error field in the reply becomes
    /// [`ValidationOutcome::InvalidSecret`].
    pub async fn validate(&self, candidate: &FilteredCandidate, secret: &str) -> ValidationOutcome {
        let params = SessionParams::for_candidate(candidate, secret);
        info!(
            "attempting to connect to device {} at {}",
            params.device_id, params.address
        );

        let outcome = match time::timeout(self.timeout, self.round_trip(&params)).await {
            Err(_) => ValidationOutcome::unreachable(TransportError::Timeout(self.timeout)),
            Ok(Err(e)) => ValidationOutcome::unreachable(e),
            Ok(Ok(reply)) => classify_status(candidate, secret, reply),
        };

        match &outcome {
            ValidationOutcome::Valid(_) => {
                info!("successfully connected to device {}", params.device_id)
            }
            ValidationOutcome::InvalidSecret { reason } => {
                warn!("device {} rejected the local key: {reason}", params.device_id)
            }
            ValidationOutcome::Unreachable { cause } => {
                warn!("device {} unreachable: {cause}", params.device_id)
            }
        }
        outcome
    }

    async fn round_trip(&self, params: &SessionParams) -> Result<StatusReply, TransportError> {
        let mut session = self.transport.open_session(params).await?;
        session.query_status().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
