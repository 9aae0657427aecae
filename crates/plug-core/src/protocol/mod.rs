//! LAN frame protocol spoken between the onboarding host and a smart plug.
//!
//! Two exchanges exist:
//!
//! - **Announce** – plugs periodically broadcast a UDP frame whose payload is a
//!   JSON descriptor (`gwId`, `version`, `productKey`, ...).
//! - **StatusQuery** – the host opens a TCP connection to a plug and sends a
//!   signed status query; the plug answers with its data points or an error.
//!
//! # Sub-modules
//!
//! - **`messages`** – Frame layout constants, command codes, and the JSON
//!   payload types.
//! - **`codec`** – Converts [`messages::Frame`] values to bytes and back.
//! - **`signing`** – HMAC signatures proving a query was made with the local key.
//! - **`sequence`** – Thread-safe frame sequence counter.

pub mod codec;
pub mod messages;
pub mod sequence;
pub mod signing;

pub use codec::{decode_frame, encode_frame, ProtocolError};
pub use sequence::SequenceCounter;
