//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads and writes the TOML configuration file and
//! provides [`config::ConfigDeviceStore`], the file-backed `DeviceStore` that
//! keeps committed plugs in the same document as the host settings.

pub mod config;
