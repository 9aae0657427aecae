//! Domain entities for smart-plug onboarding.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies.  Code in `plug-onboard` (application use cases, sockets,
//! the config store) depends on these types, never the other way round.

/// Device identifiers, descriptors, candidates, and the committed record.
pub mod device;

/// Filtering raw discovery results into selectable candidates.
pub mod candidates;

/// Classifying a device status reply into a validation outcome.
pub mod validation;
