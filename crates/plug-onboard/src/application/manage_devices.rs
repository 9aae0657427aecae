//! ManageDevicesUseCase: the stored device catalogue and per-entry options.
//!
//! Every successful onboarding ends with one [`DeviceEntry`] in the store.
//! This module owns the [`DeviceStore`] port that both the onboarding flow
//! and the catalogue operations (list, remove, edit options) go through.
//!
//! # Entry lifecycle
//!
//! ```text
//! DeviceRecord ──commit──► DeviceEntry ──update_options──► DeviceEntry
//!                               │
//!                             remove
//! ```
//!
//! Identifier uniqueness is the store's job: `commit` must refuse a second
//! entry for a `device_id` that is already present, inside the same critical
//! section that writes the entry.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use plug_core::{DeviceId, DeviceRecord, ProtocolVersion};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Default seconds between status polls of a stored plug.
pub const DEFAULT_SCAN_INTERVAL: u32 = 30;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error type for the persistence port.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An entry for this identifier already exists.
    #[error("device {0} is already configured")]
    DuplicateDevice(DeviceId),
    /// No entry with this id exists.
    #[error("no stored entry with id {0}")]
    EntryNotFound(Uuid),
    /// The backing storage could not be read or written.
    #[error("device store unavailable: {0}")]
    Unavailable(String),
}

/// Error type for invalid option values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("scan interval must be at least 1 second, got {0}")]
    InvalidScanInterval(u32),
}

/// Error type for catalogue operations.
#[derive(Debug, Error)]
pub enum ManageError {
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ── Entry types ───────────────────────────────────────────────────────────────

/// Tunables attached to a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OptionsFile", into = "OptionsFile")]
pub struct DeviceOptions {
    scan_interval: u32,
}

impl DeviceOptions {
    /// Creates options, rejecting a zero scan interval.
    pub fn new(scan_interval: u32) -> Result<Self, OptionsError> {
        if scan_interval < 1 {
            return Err(OptionsError::InvalidScanInterval(scan_interval));
        }
        Ok(Self { scan_interval })
    }

    pub fn scan_interval(&self) -> u32 {
        self.scan_interval
    }
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

/// On-disk shape of [`DeviceOptions`]; validated on the way in.
#[derive(Serialize, Deserialize)]
struct OptionsFile {
    #[serde(default = "default_scan_interval")]
    scan_interval: u32,
}

fn default_scan_interval() -> u32 {
    DEFAULT_SCAN_INTERVAL
}

impl TryFrom<OptionsFile> for DeviceOptions {
    type Error = OptionsError;

    fn try_from(file: OptionsFile) -> Result<Self, Self::Error> {
        Self::new(file.scan_interval)
    }
}

impl From<DeviceOptions> for OptionsFile {
    fn from(options: DeviceOptions) -> Self {
        Self {
            scan_interval: options.scan_interval,
        }
    }
}

/// A committed device as persisted by the store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub entry_id: Uuid,
    pub title: String,
    pub device_id: DeviceId,
    pub ip: String,
    pub local_key: String,
    #[serde(default)]
    pub version: ProtocolVersion,
    #[serde(default)]
    pub options: DeviceOptions,
}

impl DeviceEntry {
    /// Builds a new entry with default options from a validated record.
    pub fn from_record(entry_id: Uuid, record: &DeviceRecord) -> Self {
        Self {
            entry_id,
            title: record.title(),
            device_id: record.device_id().clone(),
            ip: record.address().to_string(),
            local_key: record.secret().to_string(),
            version: record.protocol_version().clone(),
            options: DeviceOptions::default(),
        }
    }
}

impl fmt::Debug for DeviceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEntry")
            .field("entry_id", &self.entry_id)
            .field("title", &self.title)
            .field("device_id", &self.device_id)
            .field("ip", &self.ip)
            .field("local_key", &"<redacted>")
            .field("version", &self.version)
            .field("options", &self.options)
            .finish()
    }
}

// ── Port ──────────────────────────────────────────────────────────────────────

/// Persistence port for committed devices.
///
/// Implementations must be safe to share between concurrent onboarding
/// sessions.  The calls are synchronous: a store is a small local document.
pub trait DeviceStore: Send + Sync {
    /// Identifiers of every stored entry.
    fn list_committed_identifiers(&self) -> Result<HashSet<DeviceId>, StoreError>;

    /// Persists `record` as a new entry and returns its id.
    ///
    /// Returns [`StoreError::DuplicateDevice`] when the identifier is already
    /// stored.
    fn commit(&self, record: &DeviceRecord) -> Result<Uuid, StoreError>;

    /// Deletes the entry with `entry_id`.
    fn remove(&self, entry_id: Uuid) -> Result<(), StoreError>;

    /// Snapshot of all entries in insertion order.
    fn entries(&self) -> Result<Vec<DeviceEntry>, StoreError>;

    /// Replaces the options of the entry with `entry_id`.
    fn update_options(&self, entry_id: Uuid, options: DeviceOptions) -> Result<(), StoreError>;
}

// ── Use case ──────────────────────────────────────────────────────────────────

/// Catalogue operations over a [`DeviceStore`].
pub struct DeviceCatalog {
    store: Arc<dyn DeviceStore>,
}

impl DeviceCatalog {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self { store }
    }

    /// All stored entries, ordered by title.
    pub fn list(&self) -> Result<Vec<DeviceEntry>, StoreError> {
        let mut entries = self.store.entries()?;
        entries.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(entries)
    }

    /// Looks up one entry.
    pub fn get(&self, entry_id: Uuid) -> Result<DeviceEntry, StoreError> {
        self.store
            .entries()?
            .into_iter()
            .find(|entry| entry.entry_id == entry_id)
            .ok_or(StoreError::EntryNotFound(entry_id))
    }

    pub fn remove(&self, entry_id: Uuid) -> Result<(), StoreError> {
        self.store.remove(entry_id)?;
        info!("removed device entry {entry_id}");
        Ok(())
    }

    /// Validates and stores a new scan interval for `entry_id`.
    pub fn set_scan_interval(
        &self,
        entry_id: Uuid,
        scan_interval: u32,
    ) -> Result<DeviceOptions, ManageError> {
        let options = DeviceOptions::new(scan_interval)?;
        self.store.update_options(entry_id, options)?;
        info!("entry {entry_id}: scan interval set to {scan_interval}s");
        Ok(options)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
