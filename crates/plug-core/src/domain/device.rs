//! Device identity and the records that flow through an onboarding session.
//!
//! Discovery produces loosely-shaped JSON announcements.  They are normalized
//! into a [`DeviceDescriptor`] at the boundary so nothing deeper in the state
//! machine ever touches raw transport data:
//!
//! ```text
//! announcement JSON ──► DeviceDescriptor ──► RawCandidate ──► FilteredCandidate
//!                                                                   │
//!                                        Handshake (Valid outcome) ─┴─► DeviceRecord
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::validation::Handshake;

/// Protocol version assumed when an announcement does not carry one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "3.3";

/// Number of identifier characters shown in an entry title.
const TITLE_ID_CHARS: usize = 12;

/// Error type for descriptor normalization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// The announcement payload is not a JSON object.
    #[error("announcement is not a JSON object")]
    NotAnObject,
    /// Neither `gwId` nor `devId` carried a non-empty string.
    #[error("announcement carries no device identifier")]
    MissingDeviceId,
    /// The version is not of the form `<major>.<minor>`.
    #[error("invalid protocol version {0:?}")]
    InvalidVersion(String),
}

// ── DeviceId ──────────────────────────────────────────────────────────────────

/// Stable identifier a plug reports about itself (`gwId` on the wire).
///
/// This is the dedup key: a device whose identifier is already stored is
/// never offered again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates an identifier from `raw`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::MissingDeviceId`] if `raw` is blank.
    pub fn new(raw: impl Into<String>) -> Result<Self, DescriptorError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DescriptorError::MissingDeviceId);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns at most the first 12 characters, used in entry titles.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(TITLE_ID_CHARS) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

// ── ProtocolVersion ───────────────────────────────────────────────────────────

/// Device protocol version tag, always `<major>.<minor>` (e.g. `"3.3"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolVersion(String);

impl ProtocolVersion {
    /// Parses a version tag.
    ///
    /// A bare major number (`"3"`) is accepted and widened to `"3.0"`.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::InvalidVersion`] for anything that is not
    /// one or two dot-separated decimal numbers.
    pub fn parse(raw: &str) -> Result<Self, DescriptorError> {
        let trimmed = raw.trim();
        let invalid = || DescriptorError::InvalidVersion(raw.to_string());

        let (major, minor) = match trimmed.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (trimmed, "0"),
        };
        let is_number = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        if !is_number(major) || !is_number(minor) {
            return Err(invalid());
        }
        Ok(Self(format!("{major}.{minor}")))
    }

    /// Normalizes a JSON `version` field, which devices send either as a
    /// string or as a bare number.
    fn from_json(value: &Value) -> Result<Self, DescriptorError> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => Self::parse(&n.to_string()),
            other => Err(DescriptorError::InvalidVersion(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self(DEFAULT_PROTOCOL_VERSION.to_string())
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProtocolVersion> for String {
    fn from(version: ProtocolVersion) -> Self {
        version.0
    }
}

// ── DeviceDescriptor / RawCandidate ───────────────────────────────────────────

/// The fixed descriptor schema every discovery transport is normalized into.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub device_id: DeviceId,
    pub protocol_version: ProtocolVersion,
    /// Every other announcement field (`productKey`, `ability`, `encrypt`, ...).
    pub metadata: BTreeMap<String, Value>,
}

impl DeviceDescriptor {
    /// Builds a descriptor from an announcement payload.
    ///
    /// The identifier is taken from `gwId`, falling back to `devId`.  A
    /// missing `version` defaults to [`DEFAULT_PROTOCOL_VERSION`].
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] if the payload is not an object, has no
    /// identifier, or carries an unparseable version.
    pub fn from_announcement(value: &Value) -> Result<Self, DescriptorError> {
        let object = value.as_object().ok_or(DescriptorError::NotAnObject)?;

        let device_id = ["gwId", "devId"]
            .iter()
            .filter_map(|key| object.get(*key).and_then(Value::as_str))
            .find(|s| !s.trim().is_empty())
            .ok_or(DescriptorError::MissingDeviceId)
            .and_then(|s| DeviceId::new(s))?;

        let protocol_version = match object.get("version") {
            Some(Value::Null) | None => ProtocolVersion::default(),
            Some(v) => ProtocolVersion::from_json(v)?,
        };

        let metadata = object
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "gwId" | "devId" | "version"))
            .map(|(key, v)| (key.clone(), v.clone()))
            .collect();

        Ok(Self {
            device_id,
            protocol_version,
            metadata,
        })
    }
}

/// One device observed during a single discovery sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    /// Network address the announcement came from (IPv4 dotted quad in practice).
    pub address: String,
    pub descriptor: DeviceDescriptor,
}

impl RawCandidate {
    pub fn new(address: impl Into<String>, descriptor: DeviceDescriptor) -> Self {
        Self {
            address: address.into(),
            descriptor,
        }
    }
}

// ── FilteredCandidate ─────────────────────────────────────────────────────────

/// A not-yet-stored device offered to the operator for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredCandidate {
    address: String,
    device_id: DeviceId,
    protocol_version: ProtocolVersion,
    label: String,
}

impl FilteredCandidate {
    /// Creates a candidate and computes its display label,
    /// `"{id} ({address}) - v{version}"`.
    pub fn new(
        address: impl Into<String>,
        device_id: DeviceId,
        protocol_version: ProtocolVersion,
    ) -> Self {
        let address = address.into();
        let label = format!("{device_id} ({address}) - v{protocol_version}");
        Self {
            address,
            device_id,
            protocol_version,
            label,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn protocol_version(&self) -> &ProtocolVersion {
        &self.protocol_version
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl From<&RawCandidate> for FilteredCandidate {
    fn from(raw: &RawCandidate) -> Self {
        Self::new(
            raw.address.clone(),
            raw.descriptor.device_id.clone(),
            raw.descriptor.protocol_version.clone(),
        )
    }
}

// ── DeviceRecord ──────────────────────────────────────────────────────────────

/// The durable artifact of a successful onboarding.
///
/// The only constructor is [`DeviceRecord::from_handshake`], and a
/// [`Handshake`] only exists inside a `Valid` outcome, so a record always
/// carries a tuple that was proven against the live device.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    device_id: DeviceId,
    address: String,
    secret: String,
    protocol_version: ProtocolVersion,
}

impl DeviceRecord {
    /// Promotes a confirmed handshake into a record.
    pub fn from_handshake(handshake: Handshake) -> Self {
        let (device_id, address, secret, protocol_version) = handshake.into_parts();
        Self {
            device_id,
            address,
            secret,
            protocol_version,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn protocol_version(&self) -> &ProtocolVersion {
        &self.protocol_version
    }

    /// Human-readable title for the stored entry.
    pub fn title(&self) -> String {
        format!("Smart Plug {}", self.device_id.short())
    }
}

impl fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("device_id", &self.device_id)
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .field("protocol_version", &self.protocol_version)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
