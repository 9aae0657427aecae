//! # plug-onboard
//!
//! Host application that onboards smart plugs found on the local network.
//!
//! - **`application`** – Use cases behind traits: the onboarding session,
//!   credential validation, the device catalogue, and the session registry.
//! - **`infrastructure`** – UDP discovery, the TCP device link, the TOML
//!   configuration store, and the operator-facing bridge.

pub mod application;
pub mod infrastructure;
