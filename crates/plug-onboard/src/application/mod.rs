//! Application layer use cases for the onboarding host.
//!
//! Use cases here orchestrate `plug_core` domain objects to fulfil an
//! operator goal.  They depend on traits (ports) rather than sockets or files,
//! so the infrastructure can be swapped in tests without touching this code.
//!
//! # Sub-modules
//!
//! - **`onboard_device`** – The guided session: scan, select, enter the local
//!   key, commit.  Owns the [`onboard_device::DiscoveryProbe`] port.
//!
//! - **`validate_credential`** – One bounded status round trip proving a local
//!   key.  Owns the [`validate_credential::DeviceTransport`] port.
//!
//! - **`manage_devices`** – The stored device catalogue and per-entry options.
//!   Owns the [`manage_devices::DeviceStore`] port.
//!
//! - **`manage_sessions`** – Registry of in-flight sessions held by the host.

pub mod manage_devices;
pub mod manage_sessions;
pub mod onboard_device;
pub mod validate_credential;
