//! OnboardDeviceUseCase: the guided scan → select → key → commit flow.
//!
//! An [`OnboardingSession`] is a small state machine driven by one operator:
//!
//! ```text
//! AwaitingScan ──start_scan──► AwaitingSelection ──select_device──► AwaitingSecret
//!      │                              │                                  │
//!      │ (all committed)              │                           submit_secret (Valid)
//!      ▼                              ▼                                  ▼
//!   Aborted ◄─────────────cancel──────┴───────────────────────────── Committed
//! ```
//!
//! Recoverable problems (nothing found, wrong key, device unreachable) keep
//! the session where it is and report a [`StepError`] so the operator can
//! retry.  [`SessionError`] is only returned when the caller drives the
//! session wrongly, for example selecting an address that was never offered.
//!
//! The only path into `Committed` is a `Valid` validation outcome for the
//! selected candidate followed by a successful `commit`.  Exactly one commit
//! happens per session.

use std::sync::Arc;

use async_trait::async_trait;
use plug_core::{
    filter_candidates, DeviceRecord, FilteredCandidate, RawCandidate, ValidationOutcome,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::manage_devices::{DeviceStore, StoreError};
use crate::application::validate_credential::CredentialValidator;

// ── Discovery port ────────────────────────────────────────────────────────────

/// Error type for a LAN sweep that could not run.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The discovery socket could not be bound.
    #[error("failed to bind discovery socket on port {port}: {source}")]
    BindFailed {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    /// The socket failed while listening.
    #[error("discovery socket error: {0}")]
    Io(#[from] std::io::Error),
    /// The background sweep task panicked or was cancelled.
    #[error("discovery task failed: {0}")]
    Task(String),
}

/// Port for sweeping the LAN for announcing devices.
///
/// "Nothing found" is `Ok(vec![])`, never an error.
#[async_trait]
pub trait DiscoveryProbe: Send + Sync {
    async fn scan(&self, verbose: bool, retry_budget: u32)
        -> Result<Vec<RawCandidate>, DiscoveryError>;
}

/// Parameters forwarded to [`DiscoveryProbe::scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub verbose: bool,
    pub retry_budget: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            verbose: false,
            retry_budget: 20,
        }
    }
}

// ── Session vocabulary ────────────────────────────────────────────────────────

/// The form the operator is currently looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Scan,
    SelectDevice,
    DeviceKey,
}

impl Step {
    /// Step identifier used by the operator surface.
    pub fn id(&self) -> &'static str {
        match self {
            Step::Scan => "user",
            Step::SelectDevice => "select_device",
            Step::DeviceKey => "device_key",
        }
    }

    /// Form field a [`StepError`] on this step is attached to.
    ///
    /// Everything that goes wrong on the key step, including an unreachable
    /// device, is reported against the key the operator just entered.
    pub fn error_field(&self) -> &'static str {
        match self {
            Step::DeviceKey => "local_key",
            Step::Scan | Step::SelectDevice => "base",
        }
    }
}

/// Recoverable problem shown on the current form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepError {
    NoDevicesFound,
    ScanFailed,
    InvalidKey,
    CannotConnect,
    Unknown,
}

impl StepError {
    pub fn code(&self) -> &'static str {
        match self {
            StepError::NoDevicesFound => "no_devices_found",
            StepError::ScanFailed => "scan_failed",
            StepError::InvalidKey => "invalid_key",
            StepError::CannotConnect => "cannot_connect",
            StepError::Unknown => "unknown",
        }
    }
}

/// Why a session ended without committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Every discovered device is already stored.
    NoNewDevices,
    /// Another session committed the same device first.
    AlreadyConfigured,
    Cancelled,
}

impl AbortReason {
    pub fn code(&self) -> &'static str {
        match self {
            AbortReason::NoNewDevices => "no_new_devices",
            AbortReason::AlreadyConfigured => "already_configured",
            AbortReason::Cancelled => "cancelled",
        }
    }
}

/// Session state.  Terminal states are `Committed` and `Aborted`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    AwaitingScan,
    AwaitingSelection { candidates: Vec<FilteredCandidate> },
    AwaitingSecret { selected: FilteredCandidate },
    Committed { entry_id: Uuid, record: DeviceRecord },
    Aborted { reason: AbortReason },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::AwaitingScan => "awaiting_scan",
            SessionState::AwaitingSelection { .. } => "awaiting_selection",
            SessionState::AwaitingSecret { .. } => "awaiting_secret",
            SessionState::Committed { .. } => "committed",
            SessionState::Aborted { .. } => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Committed { .. } | SessionState::Aborted { .. }
        )
    }
}

/// What the caller should show after an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The session waits on `step`; `error` is set when the last submission
    /// was rejected.
    Pending { step: Step, error: Option<StepError> },
    Aborted(AbortReason),
    Committed { entry_id: Uuid, record: DeviceRecord },
}

/// Caller misuse of a session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {operation} while session is {state}")]
    InvalidTransition {
        state: &'static str,
        operation: &'static str,
    },
    #[error("no offered candidate has address {0}")]
    UnknownCandidate(String),
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One operator's onboarding attempt.
pub struct OnboardingSession {
    state: SessionState,
    probe: Arc<dyn DiscoveryProbe>,
    validator: Arc<CredentialValidator>,
    store: Arc<dyn DeviceStore>,
    scan: ScanSettings,
}

impl OnboardingSession {
    pub fn new(
        probe: Arc<dyn DiscoveryProbe>,
        validator: Arc<CredentialValidator>,
        store: Arc<dyn DeviceStore>,
        scan: ScanSettings,
    ) -> Self {
        Self {
            state: SessionState::AwaitingScan,
            probe,
            validator,
            store,
            scan,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Candidates offered for selection; empty outside `AwaitingSelection`.
    pub fn candidates(&self) -> &[FilteredCandidate] {
        match &self.state {
            SessionState::AwaitingSelection { candidates } => candidates,
            _ => &[],
        }
    }

    pub fn selected(&self) -> Option<&FilteredCandidate> {
        match &self.state {
            SessionState::AwaitingSecret { selected } => Some(selected),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Sweeps the LAN and offers the devices that are not stored yet.
    pub async fn start_scan(&mut self) -> Result<StepOutcome, SessionError> {
        self.expect_state("start_scan", |s| matches!(s, SessionState::AwaitingScan))?;

        info!(
            "scanning LAN for devices (retry budget {})",
            self.scan.retry_budget
        );
        let raw = match self
            .probe
            .scan(self.scan.verbose, self.scan.retry_budget)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("device scan failed: {e}");
                return Ok(pending(Step::Scan, Some(StepError::ScanFailed)));
            }
        };

        if raw.is_empty() {
            info!("no devices answered the scan");
            return Ok(pending(Step::Scan, Some(StepError::NoDevicesFound)));
        }

        let committed = match self.store.list_committed_identifiers() {
            Ok(ids) => ids,
            Err(e) => {
                error!("could not read stored devices: {e}");
                return Ok(pending(Step::Scan, Some(StepError::Unknown)));
            }
        };

        let candidates = filter_candidates(&raw, &committed);
        debug!(
            "{} discovered, {} already stored, {} offered",
            raw.len(),
            committed.len(),
            candidates.len()
        );

        if candidates.is_empty() {
            info!("all discovered devices are already configured");
            return Ok(self.abort(AbortReason::NoNewDevices));
        }

        self.state = SessionState::AwaitingSelection { candidates };
        Ok(pending(Step::SelectDevice, None))
    }

    /// Picks the offered candidate at `address`.
    pub fn select_device(&mut self, address: &str) -> Result<StepOutcome, SessionError> {
        let SessionState::AwaitingSelection { candidates } = &self.state else {
            return Err(self.invalid("select_device"));
        };

        let selected = candidates
            .iter()
            .find(|c| c.address() == address)
            .cloned()
            .ok_or_else(|| SessionError::UnknownCandidate(address.to_string()))?;

        info!("selected {}", selected.label());
        self.state = SessionState::AwaitingSecret { selected };
        Ok(pending(Step::DeviceKey, None))
    }

    /// Validates `secret` against the selected device and commits on success.
    pub async fn submit_secret(&mut self, secret: &str) -> Result<StepOutcome, SessionError> {
        let selected = match &self.state {
            SessionState::AwaitingSecret { selected } => selected.clone(),
            _ => return Err(self.invalid("submit_secret")),
        };

        if secret.trim().is_empty() {
            return Ok(pending(Step::DeviceKey, Some(StepError::InvalidKey)));
        }

        let handshake = match self.validator.validate(&selected, secret).await {
            ValidationOutcome::Valid(handshake) => handshake,
            ValidationOutcome::InvalidSecret { .. } => {
                return Ok(pending(Step::DeviceKey, Some(StepError::InvalidKey)));
            }
            ValidationOutcome::Unreachable { .. } => {
                return Ok(pending(Step::DeviceKey, Some(StepError::CannotConnect)));
            }
        };

        if !handshake.confirms(&selected, secret) {
            error!(
                "handshake for {} does not match the selected candidate; not committing",
                selected.device_id()
            );
            return Ok(pending(Step::DeviceKey, Some(StepError::CannotConnect)));
        }

        let record = DeviceRecord::from_handshake(handshake);
        match self.commit(&record).await {
            Ok(entry_id) => {
                info!("committed {} as entry {entry_id}", record.title());
                self.state = SessionState::Committed {
                    entry_id,
                    record: record.clone(),
                };
                Ok(StepOutcome::Committed { entry_id, record })
            }
            Err(StoreError::DuplicateDevice(id)) => {
                warn!("device {id} was committed by another session");
                Ok(self.abort(AbortReason::AlreadyConfigured))
            }
            Err(e) => {
                error!(
                    "device {} validated but could not be stored: {e}",
                    record.device_id()
                );
                Ok(pending(Step::DeviceKey, Some(StepError::Unknown)))
            }
        }
    }

    /// Runs the store's commit on the blocking pool; file-backed stores write to disk.
    async fn commit(&self, record: &DeviceRecord) -> Result<Uuid, StoreError> {
        let store = Arc::clone(&self.store);
        let record = record.clone();
        tokio::task::spawn_blocking(move || store.commit(&record))
            .await
            .unwrap_or_else(|e| Err(StoreError::Unavailable(format!("commit task failed: {e}"))))
    }

    /// Abandons the session, dropping candidates and selection.
    pub fn cancel(&mut self) -> Result<StepOutcome, SessionError> {
        if self.state.is_terminal() {
            return Err(self.invalid("cancel"));
        }
        info!("onboarding cancelled in state {}", self.state.name());
        Ok(self.abort(AbortReason::Cancelled))
    }

    fn abort(&mut self, reason: AbortReason) -> StepOutcome {
        self.state = SessionState::Aborted { reason };
        StepOutcome::Aborted(reason)
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: impl Fn(&SessionState) -> bool,
    ) -> Result<(), SessionError> {
        if allowed(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state.name(),
            operation,
        }
    }
}

fn pending(step: Step, error: Option<StepError>) -> StepOutcome {
    StepOutcome::Pending { step, error }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::manage_devices::{DeviceEntry, DeviceOptions};
    use crate::application::validate_credential::{
        DeviceSession, DeviceTransport, SessionParams, TransportError,
    };
    use plug_core::{DeviceDescriptor, DeviceId, ProtocolVersion, StatusReply};
    use serde_json::{json, Map};
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    // ── Test doubles ──────────────────────────────────────────────────────────

    struct FixedProbe(Result<Vec<RawCandidate>, ()>);

    #[async_trait]
    impl DiscoveryProbe for FixedProbe {
        async fn scan(
            &self,
            _verbose: bool,
            _retry_budget: u32,
        ) -> Result<Vec<RawCandidate>, DiscoveryError> {
            self.0
                .clone()
                .map_err(|_| DiscoveryError::Task("probe offline".to_string()))
        }
    }

    /// Answers with a status map when the secret matches, an error otherwise.
    /// Addresses in `offline` refuse the connection.
    struct KeyedTransport {
        key: String,
        offline: Vec<String>,
        opened: Mutex<Vec<SessionParams>>,
    }

    struct KeyedSession(StatusReply);

    #[async_trait]
    impl DeviceSession for KeyedSession {
        async fn query_status(&mut self) -> Result<StatusReply, TransportError> {
            Ok(self.0.clone())
        }
    }

    #[async_trait]
    impl DeviceTransport for KeyedTransport {
        async fn open_session(
            &self,
            params: &SessionParams,
        ) -> Result<Box<dyn DeviceSession>, TransportError> {
            self.opened.lock().unwrap().push(params.clone());
            if self.offline.contains(&params.address) {
                return Err(TransportError::Closed);
            }
            let reply = if params.secret == self.key {
                let mut dps = Map::new();
                dps.insert("1".to_string(), json!(true));
                StatusReply::status(params.device_id.as_str(), dps)
            } else {
                StatusReply::error("Check device key or version", "914")
            };
            Ok(Box::new(KeyedSession(reply)))
        }
    }

    /// Records every commit; can be told to fail with a given error.
    #[derive(Default)]
    struct RecordingStore {
        committed: Mutex<Vec<DeviceRecord>>,
        existing: HashSet<DeviceId>,
        fail_commit: Option<fn(&DeviceRecord) -> StoreError>,
    }

    impl DeviceStore for RecordingStore {
        fn list_committed_identifiers(&self) -> Result<HashSet<DeviceId>, StoreError> {
            Ok(self.existing.clone())
        }

        fn commit(&self, record: &DeviceRecord) -> Result<Uuid, StoreError> {
            if let Some(fail) = self.fail_commit {
                return Err(fail(record));
            }
            self.committed.lock().unwrap().push(record.clone());
            Ok(Uuid::new_v4())
        }

        fn remove(&self, entry_id: Uuid) -> Result<(), StoreError> {
            Err(StoreError::EntryNotFound(entry_id))
        }

        fn entries(&self) -> Result<Vec<DeviceEntry>, StoreError> {
            Ok(Vec::new())
        }

        fn update_options(&self, entry_id: Uuid, _: DeviceOptions) -> Result<(), StoreError> {
            Err(StoreError::EntryNotFound(entry_id))
        }
    }

    fn raw(address: &str, id: &str) -> RawCandidate {
        RawCandidate::new(
            address,
            DeviceDescriptor {
                device_id: DeviceId::new(id).unwrap(),
                protocol_version: ProtocolVersion::parse("3.3").unwrap(),
                metadata: BTreeMap::new(),
            },
        )
    }

    fn ids(list: &[&str]) -> HashSet<DeviceId> {
        list.iter().map(|id| DeviceId::new(*id).unwrap()).collect()
    }

    struct Fixture {
        transport: Arc<KeyedTransport>,
        store: Arc<RecordingStore>,
        session: OnboardingSession,
    }

    fn fixture(sweep: Result<Vec<RawCandidate>, ()>, store: RecordingStore) -> Fixture {
        let transport = Arc::new(KeyedTransport {
            key: "s3cret".to_string(),
            offline: Vec::new(),
            opened: Mutex::new(Vec::new()),
        });
        build(sweep, store, transport)
    }

    fn build(
        sweep: Result<Vec<RawCandidate>, ()>,
        store: RecordingStore,
        transport: Arc<KeyedTransport>,
    ) -> Fixture {
        let store = Arc::new(store);
        let validator = Arc::new(CredentialValidator::new(
            transport.clone(),
            Duration::from_millis(500),
        ));
        let session = OnboardingSession::new(
            Arc::new(FixedProbe(sweep)),
            validator,
            store.clone(),
            ScanSettings::default(),
        );
        Fixture {
            transport,
            store,
            session,
        }
    }

    fn store_with(existing: &[&str]) -> RecordingStore {
        RecordingStore {
            existing: ids(existing),
            ..Default::default()
        }
    }

    // ── start_scan ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_scan_offers_only_uncommitted_devices() {
        // Arrange
        let mut f = fixture(
            Ok(vec![raw("10.0.0.5", "A"), raw("10.0.0.6", "B")]),
            store_with(&["A"]),
        );

        // Act
        let outcome = f.session.start_scan().await.unwrap();

        // Assert
        assert_eq!(outcome, pending(Step::SelectDevice, None));
        let offered = f.session.candidates();
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].device_id().as_str(), "B");
        assert_eq!(offered[0].address(), "10.0.0.6");
    }

    #[tokio::test]
    async fn test_empty_scan_reports_no_devices_found_and_stays() {
        let mut f = fixture(Ok(Vec::new()), store_with(&[]));

        let outcome = f.session.start_scan().await.unwrap();

        assert_eq!(outcome, pending(Step::Scan, Some(StepError::NoDevicesFound)));
        assert_eq!(f.session.state(), &SessionState::AwaitingScan);
    }

    #[tokio::test]
    async fn test_failed_scan_reports_scan_failed_and_can_retry() {
        let mut f = fixture(Err(()), store_with(&[]));

        let first = f.session.start_scan().await.unwrap();
        let second = f.session.start_scan().await.unwrap();

        assert_eq!(first, pending(Step::Scan, Some(StepError::ScanFailed)));
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_all_committed_aborts_with_no_new_devices() {
        let mut f = fixture(
            Ok(vec![raw("10.0.0.5", "A"), raw("10.0.0.6", "B")]),
            store_with(&["A", "B"]),
        );

        let outcome = f.session.start_scan().await.unwrap();

        assert_eq!(outcome, StepOutcome::Aborted(AbortReason::NoNewDevices));
        assert!(f.session.is_finished());
    }

    // ── select_device ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_select_unknown_address_keeps_state() {
        let mut f = fixture(Ok(vec![raw("10.0.0.6", "B")]), store_with(&[]));
        f.session.start_scan().await.unwrap();

        let result = f.session.select_device("10.0.0.99");

        assert_eq!(
            result,
            Err(SessionError::UnknownCandidate("10.0.0.99".to_string()))
        );
        assert_eq!(f.session.candidates().len(), 1);
    }

    #[test]
    fn test_select_before_scan_is_invalid_transition() {
        let mut f = fixture(Ok(Vec::new()), store_with(&[]));

        let result = f.session.select_device("10.0.0.6");

        assert_eq!(
            result,
            Err(SessionError::InvalidTransition {
                state: "awaiting_scan",
                operation: "select_device",
            })
        );
    }

    // ── submit_secret ─────────────────────────────────────────────────────────

    async fn at_secret_step(f: &mut Fixture) {
        f.session.start_scan().await.unwrap();
        f.session.select_device("10.0.0.6").unwrap();
    }

    #[tokio::test]
    async fn test_correct_secret_commits_exactly_once() {
        // Arrange
        let mut f = fixture(
            Ok(vec![raw("10.0.0.5", "A"), raw("10.0.0.6", "B")]),
            store_with(&["A"]),
        );
        at_secret_step(&mut f).await;

        // Act
        let outcome = f.session.submit_secret("s3cret").await.unwrap();

        // Assert
        let committed = f.store.committed.lock().unwrap();
        assert_eq!(committed.len(), 1);
        let record = &committed[0];
        assert_eq!(record.device_id().as_str(), "B");
        assert_eq!(record.address(), "10.0.0.6");
        assert_eq!(record.protocol_version().as_str(), "3.3");
        assert_eq!(record.secret(), "s3cret");
        assert!(matches!(outcome, StepOutcome::Committed { .. }));
        assert!(matches!(f.session.state(), SessionState::Committed { .. }));
    }

    #[tokio::test]
    async fn test_wrong_secret_keeps_selection_for_retry() {
        // Arrange
        let mut f = fixture(Ok(vec![raw("10.0.0.6", "B")]), store_with(&[]));
        at_secret_step(&mut f).await;

        // Act
        let rejected = f.session.submit_secret("wrong").await.unwrap();

        // Assert
        assert_eq!(rejected, pending(Step::DeviceKey, Some(StepError::InvalidKey)));
        assert_eq!(f.session.selected().unwrap().address(), "10.0.0.6");
        assert!(f.store.committed.lock().unwrap().is_empty());

        let accepted = f.session.submit_secret("s3cret").await.unwrap();
        assert!(matches!(accepted, StepOutcome::Committed { .. }));
        assert_eq!(f.store.committed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_device_reports_cannot_connect() {
        let transport = Arc::new(KeyedTransport {
            key: "s3cret".to_string(),
            offline: vec!["10.0.0.6".to_string()],
            opened: Mutex::new(Vec::new()),
        });
        let mut f = build(Ok(vec![raw("10.0.0.6", "B")]), store_with(&[]), transport);
        at_secret_step(&mut f).await;

        let outcome = f.session.submit_secret("s3cret").await.unwrap();

        assert_eq!(outcome, pending(Step::DeviceKey, Some(StepError::CannotConnect)));
        assert!(f.session.selected().is_some());
        assert!(f.store.committed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_secret_does_not_contact_device() {
        let mut f = fixture(Ok(vec![raw("10.0.0.6", "B")]), store_with(&[]));
        at_secret_step(&mut f).await;

        let outcome = f.session.submit_secret("   ").await.unwrap();

        assert_eq!(outcome, pending(Step::DeviceKey, Some(StepError::InvalidKey)));
        assert!(f.transport.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_on_commit_aborts_already_configured() {
        let store = RecordingStore {
            fail_commit: Some(|r: &DeviceRecord| StoreError::DuplicateDevice(r.device_id().clone())),
            ..Default::default()
        };
        let mut f = fixture(Ok(vec![raw("10.0.0.6", "B")]), store);
        at_secret_step(&mut f).await;

        let outcome = f.session.submit_secret("s3cret").await.unwrap();

        assert_eq!(outcome, StepOutcome::Aborted(AbortReason::AlreadyConfigured));
    }

    #[tokio::test]
    async fn test_store_failure_after_valid_stays_for_retry() {
        let store = RecordingStore {
            fail_commit: Some(|_: &DeviceRecord| StoreError::Unavailable("disk full".to_string())),
            ..Default::default()
        };
        let mut f = fixture(Ok(vec![raw("10.0.0.6", "B")]), store);
        at_secret_step(&mut f).await;

        let outcome = f.session.submit_secret("s3cret").await.unwrap();

        assert_eq!(outcome, pending(Step::DeviceKey, Some(StepError::Unknown)));
        assert!(matches!(f.session.state(), SessionState::AwaitingSecret { .. }));
    }

    #[tokio::test]
    async fn test_submit_after_commit_is_invalid_transition() {
        let mut f = fixture(Ok(vec![raw("10.0.0.6", "B")]), store_with(&[]));
        at_secret_step(&mut f).await;
        f.session.submit_secret("s3cret").await.unwrap();

        let again = f.session.submit_secret("s3cret").await;

        assert!(matches!(
            again,
            Err(SessionError::InvalidTransition { state: "committed", .. })
        ));
        assert_eq!(f.store.committed.lock().unwrap().len(), 1);
    }

    // ── cancel ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_cancel_discards_selection() {
        let mut f = fixture(Ok(vec![raw("10.0.0.6", "B")]), store_with(&[]));
        at_secret_step(&mut f).await;

        let outcome = f.session.cancel().unwrap();

        assert_eq!(outcome, StepOutcome::Aborted(AbortReason::Cancelled));
        assert!(f.session.selected().is_none());
        assert!(f.session.candidates().is_empty());
    }

    #[test]
    fn test_cancel_twice_is_invalid_transition() {
        let mut f = fixture(Ok(Vec::new()), store_with(&[]));
        f.session.cancel().unwrap();

        assert!(f.session.cancel().is_err());
    }

    #[test]
    fn test_key_step_errors_attach_to_local_key() {
        assert_eq!(Step::DeviceKey.error_field(), "local_key");
        assert_eq!(Step::Scan.error_field(), "base");
        assert_eq!(StepError::NoDevicesFound.code(), "no_devices_found");
    }
}
