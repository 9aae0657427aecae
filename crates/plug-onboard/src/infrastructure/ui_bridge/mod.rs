//! Operator command bridge: exposes application-layer operations as
//! form-shaped steps.
//!
//! Every function here takes the shared [`AppState`] and returns a
//! [`CommandResult`], so a front end (the interactive CLI in `main.rs`, or a
//! web/desktop shell) can drive onboarding without knowing about sessions,
//! traits, or stores.
//!
//! # Steps
//!
//! | step id         | fields                       | errors on          |
//! |-----------------|------------------------------|--------------------|
//! | `user`          | none (starts the scan)       | `base`             |
//! | `select_device` | `device`: one of the offered | –                  |
//! | `device_key`    | `local_key`: secret          | `local_key`        |
//! | `init` (options)| `scan_interval`: integer     | `scan_interval`    |
//!
//! A step either renders another [`StepView::Form`], ends with
//! [`StepView::Abort`], or finishes with [`StepView::CreateEntry`].
//!
//! # `CommandResult<T>` wrapper
//!
//! All commands return `CommandResult<T>` rather than `Result<T, E>` so every
//! response has the same shape: `{ success, data, error }`.  Recoverable
//! onboarding problems (wrong key, nothing found) are *successful* commands
//! whose form carries an error; `success: false` is reserved for misuse such
//! as an unknown session id.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::application::{
    manage_devices::{DeviceCatalog, DeviceEntry, DeviceStore, ManageError},
    manage_sessions::{SessionRegistry, SharedSession},
    onboard_device::{DiscoveryProbe, OnboardingSession, ScanSettings, Step, StepOutcome},
    validate_credential::{CredentialValidator, DeviceTransport},
};
use crate::infrastructure::{
    network::{device_link::TcpDeviceTransport, discovery::UdpDiscoveryProbe},
    storage::config::{AppConfig, ConfigError},
};

// ── Shared application state ──────────────────────────────────────────────────

/// State shared by every bridge command.
///
/// The session registry sits behind an async mutex; each session inside it
/// has its own lock, so the registry lock is only held for lookups.
pub struct AppState {
    pub sessions: Mutex<SessionRegistry>,
    probe: Arc<dyn DiscoveryProbe>,
    validator: Arc<CredentialValidator>,
    store: Arc<dyn DeviceStore>,
    scan: ScanSettings,
}

impl AppState {
    pub fn new(
        probe: Arc<dyn DiscoveryProbe>,
        transport: Arc<dyn DeviceTransport>,
        store: Arc<dyn DeviceStore>,
        scan: ScanSettings,
        validate_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(SessionRegistry::new()),
            probe,
            validator: Arc::new(CredentialValidator::new(transport, validate_timeout)),
            store,
            scan,
        })
    }

    /// Wires the UDP probe and TCP transport described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the discovery settings are unusable.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn DeviceStore>,
    ) -> Result<Arc<Self>, ConfigError> {
        let probe = UdpDiscoveryProbe::new(config.discovery_settings()?);
        let transport = TcpDeviceTransport::new(config.device.port);
        Ok(Self::new(
            Arc::new(probe),
            Arc::new(transport),
            store,
            config.scan_settings(),
            config.validate_timeout(),
        ))
    }

    fn new_session(&self) -> OnboardingSession {
        OnboardingSession::new(
            Arc::clone(&self.probe),
            Arc::clone(&self.validator),
            Arc::clone(&self.store),
            self.scan,
        )
    }

    fn catalog(&self) -> DeviceCatalog {
        DeviceCatalog::new(Arc::clone(&self.store))
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Select,
    Secret,
    Integer,
}

/// One choice of a `select` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDto {
    pub value: String,
    pub label: String,
}

/// One input on a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDto {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    /// Choices for `select` fields, in discovery order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDto {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            options: Vec::new(),
            default: None,
        }
    }
}

/// What the operator should see next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepView {
    Form {
        step_id: String,
        fields: Vec<FieldDto>,
        /// Field name (or `base`) → error code.
        errors: BTreeMap<String, String>,
        placeholders: BTreeMap<String, String>,
    },
    Abort {
        reason: String,
    },
    CreateEntry {
        title: String,
        data: BTreeMap<String, String>,
    },
}

impl StepView {
    fn form(step_id: &str, fields: Vec<FieldDto>) -> Self {
        StepView::Form {
            step_id: step_id.to_string(),
            fields,
            errors: BTreeMap::new(),
            placeholders: BTreeMap::new(),
        }
    }

    fn with_error(mut self, field: &str, code: &str) -> Self {
        if let StepView::Form { errors, .. } = &mut self {
            errors.insert(field.to_string(), code.to_string());
        }
        self
    }
}

/// A step view together with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingDto {
    pub session_id: String,
    pub view: StepView,
}

/// A stored device as shown to the operator.  The local key is not exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDto {
    pub entry_id: String,
    pub title: String,
    pub device_id: String,
    pub ip: String,
    pub version: String,
    pub scan_interval: u32,
}

impl From<&DeviceEntry> for DeviceDto {
    fn from(e: &DeviceEntry) -> Self {
        Self {
            entry_id: e.entry_id.to_string(),
            title: e.title.clone(),
            device_id: e.device_id.to_string(),
            ip: e.ip.clone(),
            version: e.version.to_string(),
            scan_interval: e.options.scan_interval(),
        }
    }
}

/// Unified response wrapper used by bridge commands.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn render(session: &OnboardingSession, outcome: &StepOutcome) -> StepView {
    match outcome {
        StepOutcome::Pending { step, error } => {
            let view = render_step(session, *step);
            match error {
                Some(e) => view.with_error(step.error_field(), e.code()),
                None => view,
            }
        }
        StepOutcome::Aborted(reason) => StepView::Abort {
            reason: reason.code().to_string(),
        },
        StepOutcome::Committed { record, .. } => {
            let mut data = BTreeMap::new();
            data.insert("device_id".to_string(), record.device_id().to_string());
            data.insert("ip".to_string(), record.address().to_string());
            data.insert("local_key".to_string(), record.secret().to_string());
            data.insert("version".to_string(), record.protocol_version().to_string());
            StepView::CreateEntry {
                title: record.title(),
                data,
            }
        }
    }
}

fn render_step(session: &OnboardingSession, step: Step) -> StepView {
    match step {
        Step::Scan => StepView::form(step.id(), Vec::new()),
        Step::SelectDevice => {
            let mut device = FieldDto::new("device", FieldKind::Select);
            device.options = session
                .candidates()
                .iter()
                .map(|c| ChoiceDto {
                    value: c.address().to_string(),
                    label: c.label().to_string(),
                })
                .collect();
            StepView::form(step.id(), vec![device])
        }
        Step::DeviceKey => {
            let mut view =
                StepView::form(step.id(), vec![FieldDto::new("local_key", FieldKind::Secret)]);
            if let (Some(selected), StepView::Form { placeholders, .. }) =
                (session.selected(), &mut view)
            {
                placeholders.insert("device_id".to_string(), selected.device_id().to_string());
                placeholders.insert("ip".to_string(), selected.address().to_string());
            }
            view
        }
    }
}

fn options_view(scan_interval: u32) -> StepView {
    let mut field = FieldDto::new("scan_interval", FieldKind::Integer);
    field.default = Some(Value::from(scan_interval));
    StepView::form("init", vec![field])
}

async fn lookup(state: &AppState, session_id: &str) -> Result<(Uuid, SharedSession), String> {
    let id: Uuid = session_id
        .parse()
        .map_err(|e| format!("invalid session id: {e}"))?;
    let session = state
        .sessions
        .lock()
        .await
        .get(id)
        .ok_or_else(|| format!("unknown onboarding session {id}"))?;
    Ok((id, session))
}

/// Deregisters the session if it reached a terminal state.
async fn release_if_finished(state: &AppState, id: Uuid, finished: bool) {
    if finished {
        state.sessions.lock().await.deregister(id);
    }
}

fn parse_entry_id(entry_id: &str) -> Result<Uuid, String> {
    entry_id
        .parse()
        .map_err(|e| format!("invalid entry id: {e}"))
}

// ── Onboarding commands ───────────────────────────────────────────────────────

/// Starts a new onboarding session and returns its first form.
pub async fn begin_onboarding(state: Arc<AppState>) -> CommandResult<OnboardingDto> {
    let session = state.new_session();
    let view = render_step(&session, Step::Scan);
    let id = {
        let mut sessions = state.sessions.lock().await;
        sessions.prune_finished();
        sessions.register(session)
    };
    CommandResult::ok(OnboardingDto {
        session_id: id.to_string(),
        view,
    })
}

/// Submits the `user` step: sweeps the LAN.
pub async fn submit_scan(state: Arc<AppState>, session_id: String) -> CommandResult<OnboardingDto> {
    let (id, shared) = match lookup(&state, &session_id).await {
        Ok(found) => found,
        Err(e) => return CommandResult::err(e),
    };
    let mut session = shared.lock().await;
    let outcome = match session.start_scan().await {
        Ok(outcome) => outcome,
        Err(e) => return CommandResult::err(e.to_string()),
    };
    let view = render(&session, &outcome);
    let finished = session.is_finished();
    drop(session);
    release_if_finished(&state, id, finished).await;
    CommandResult::ok(OnboardingDto { session_id, view })
}

/// Submits the `select_device` step.
pub async fn submit_selection(
    state: Arc<AppState>,
    session_id: String,
    address: String,
) -> CommandResult<OnboardingDto> {
    let (_, shared) = match lookup(&state, &session_id).await {
        Ok(found) => found,
        Err(e) => return CommandResult::err(e),
    };
    let mut session = shared.lock().await;
    match session.select_device(&address) {
        Ok(outcome) => CommandResult::ok(OnboardingDto {
            view: render(&session, &outcome),
            session_id,
        }),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Submits the `device_key` step: validates the key and commits on success.
pub async fn submit_device_key(
    state: Arc<AppState>,
    session_id: String,
    local_key: String,
) -> CommandResult<OnboardingDto> {
    let (id, shared) = match lookup(&state, &session_id).await {
        Ok(found) => found,
        Err(e) => return CommandResult::err(e),
    };
    let mut session = shared.lock().await;
    let outcome = match session.submit_secret(&local_key).await {
        Ok(outcome) => outcome,
        Err(e) => return CommandResult::err(e.to_string()),
    };
    let view = render(&session, &outcome);
    let finished = session.is_finished();
    drop(session);
    release_if_finished(&state, id, finished).await;
    CommandResult::ok(OnboardingDto { session_id, view })
}

/// Abandons a session.
pub async fn cancel_onboarding(state: Arc<AppState>, session_id: String) -> CommandResult<StepView> {
    let (id, shared) = match lookup(&state, &session_id).await {
        Ok(found) => found,
        Err(e) => return CommandResult::err(e),
    };
    let result = shared.lock().await.cancel();
    state.sessions.lock().await.deregister(id);
    match result {
        Ok(StepOutcome::Aborted(reason)) => CommandResult::ok(StepView::Abort {
            reason: reason.code().to_string(),
        }),
        Ok(other) => {
            warn!("cancel produced unexpected outcome {other:?}");
            CommandResult::err("session did not abort")
        }
        Err(e) => CommandResult::err(e.to_string()),
    }
}

// ── Catalogue commands ────────────────────────────────────────────────────────

/// Returns every stored device.
pub async fn list_devices(state: Arc<AppState>) -> CommandResult<Vec<DeviceDto>> {
    match state.catalog().list() {
        Ok(entries) => CommandResult::ok(entries.iter().map(DeviceDto::from).collect()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Deletes a stored device.
pub async fn remove_device(state: Arc<AppState>, entry_id: String) -> CommandResult<()> {
    let id = match parse_entry_id(&entry_id) {
        Ok(id) => id,
        Err(e) => return CommandResult::err(e),
    };
    match state.catalog().remove(id) {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Returns the options form (`init`) for a stored device.
pub async fn options_form(state: Arc<AppState>, entry_id: String) -> CommandResult<StepView> {
    let id = match parse_entry_id(&entry_id) {
        Ok(id) => id,
        Err(e) => return CommandResult::err(e),
    };
    match state.catalog().get(id) {
        Ok(entry) => CommandResult::ok(options_view(entry.options.scan_interval())),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Submits the options form.
///
/// An out-of-range interval re-renders the form with an error on
/// `scan_interval`; success returns a `CreateEntry` carrying the saved value.
pub async fn submit_options(
    state: Arc<AppState>,
    entry_id: String,
    scan_interval: u32,
) -> CommandResult<StepView> {
    let id = match parse_entry_id(&entry_id) {
        Ok(id) => id,
        Err(e) => return CommandResult::err(e),
    };
    match state.catalog().set_scan_interval(id, scan_interval) {
        Ok(options) => {
            let mut data = BTreeMap::new();
            data.insert(
                "scan_interval".to_string(),
                options.scan_interval().to_string(),
            );
            CommandResult::ok(StepView::CreateEntry {
                title: String::new(),
                data,
            })
        }
        Err(ManageError::Options(_)) => CommandResult::ok(
            options_view(scan_interval).with_error("scan_interval", "invalid_scan_interval"),
        ),
        Err(ManageError::Store(e)) => CommandResult::err(e.to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
