//! Infrastructure layer for the onboarding host.
//!
//! Contains OS-facing adapters: UDP discovery, the TCP device link, the TOML
//! configuration store, and the operator-facing command bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and `plug_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
pub mod ui_bridge;
