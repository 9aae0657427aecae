//! # plug-core
//!
//! Shared library for smart-plug onboarding containing the device data model,
//! candidate filtering, credential-validation outcomes, and the LAN frame codec.
//!
//! This crate has zero dependencies on sockets, files, or async runtimes.
//! Everything here can be unit-tested without a network.
//!
//! # Architecture overview
//!
//! Onboarding a plug is a short transaction: sweep the LAN for announcing
//! devices, drop the ones that are already stored, let the operator pick one,
//! prove the operator's local key against the live device, and only then hand
//! a [`DeviceRecord`] to the store.
//!
//! - **`domain`** – Pure onboarding rules.  [`filter_candidates`] turns raw
//!   discovery results into the deduplicated list offered to the operator, and
//!   [`classify_status`] turns a device reply into a [`ValidationOutcome`].
//!   A [`DeviceRecord`] can only be built from the [`Handshake`] carried by a
//!   `Valid` outcome.
//!
//! - **`protocol`** – How bytes travel between the onboarding host and a plug:
//!   a fixed 16-byte header, a JSON payload, and a 4-byte trailer.

pub mod domain;
pub mod protocol;

pub use domain::candidates::filter_candidates;
pub use domain::device::{
    DescriptorError, DeviceDescriptor, DeviceId, DeviceRecord, FilteredCandidate,
    ProtocolVersion, RawCandidate, DEFAULT_PROTOCOL_VERSION,
};
pub use domain::validation::{classify_status, Handshake, ValidationOutcome};
pub use protocol::codec::{decode_frame, encode_frame, ProtocolError};
pub use protocol::messages::{Command, Frame, StatusQuery, StatusReply};
