//! Network infrastructure for the onboarding host.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Listens for UDP `Announce` broadcasts from plugs and
//!   turns them into raw candidates.  Implements the `DiscoveryProbe` port.
//!
//! - **`device_link`** – Opens a TCP connection to one plug and performs the
//!   signed status query used to validate a local key.  Implements the
//!   `DeviceTransport` port.

pub mod device_link;
pub mod discovery;
