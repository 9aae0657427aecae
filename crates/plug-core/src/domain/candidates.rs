//! Candidate filtering: which discovered devices may be offered to the operator.
//!
//! [`filter_candidates`] is a pure function over one discovery sweep and a
//! snapshot of the identifiers already stored.  It guarantees:
//!
//! - no returned candidate has an identifier in the committed snapshot;
//! - identifiers are pairwise distinct (first-seen wins when one device
//!   announces itself from two addresses, e.g. mid DHCP reassignment);
//! - discovery order is preserved, so repeated renders list devices the same way.
//!
//! The snapshot can go stale while the operator is choosing.  The store
//! enforces identifier uniqueness again at commit time.

use std::collections::HashSet;

use tracing::debug;

use crate::domain::device::{DeviceId, FilteredCandidate, RawCandidate};

/// Filters one discovery sweep down to new, distinct, labelled candidates.
///
/// An empty `raw` slice yields an empty result; that is "nothing found", not
/// an error.
pub fn filter_candidates(
    raw: &[RawCandidate],
    committed: &HashSet<DeviceId>,
) -> Vec<FilteredCandidate> {
    let mut seen: HashSet<&DeviceId> = HashSet::with_capacity(raw.len());
    let mut candidates = Vec::with_capacity(raw.len());

    for entry in raw {
        let id = &entry.descriptor.device_id;

        if committed.contains(id) {
            debug!("skipping already configured device {id}");
            continue;
        }
        if !seen.insert(id) {
            debug!(
                "device {id} also announced from {}; keeping first-seen address",
                entry.address
            );
            continue;
        }

        candidates.push(FilteredCandidate::from(entry));
    }

    candidates
}

// ── Tests ─────────────────────────────────────────────────────────────────────
