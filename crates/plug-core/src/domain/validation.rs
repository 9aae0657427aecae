//! Credential validation outcomes.
//!
//! A device reply is authoritative only in one direction: an explicit error
//! field always means the secret was rejected, even when other fields are
//! present.  A reply merely arriving is not proof of a correct secret; it must
//! also carry a status map.

use serde_json::{Map, Value};

use crate::domain::device::{DeviceId, FilteredCandidate, ProtocolVersion};
use crate::protocol::messages::StatusReply;

/// Proof that a status round trip succeeded for one exact
/// (identifier, address, secret, version) tuple.
///
/// Fields are private and the only producer is [`classify_status`], so
/// holding a `Handshake` means the device accepted this secret.
#[derive(Clone, PartialEq)]
pub struct Handshake {
    device_id: DeviceId,
    address: String,
    secret: String,
    protocol_version: ProtocolVersion,
    status: Map<String, Value>,
}

impl Handshake {
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn protocol_version(&self) -> &ProtocolVersion {
        &self.protocol_version
    }

    /// Data points the device reported during the handshake.
    pub fn status(&self) -> &Map<String, Value> {
        &self.status
    }

    /// Returns `true` if this handshake was made for `candidate` with `secret`.
    pub fn confirms(&self, candidate: &FilteredCandidate, secret: &str) -> bool {
        self.device_id == *candidate.device_id()
            && self.address == candidate.address()
            && self.protocol_version == *candidate.protocol_version()
            && self.secret == secret
    }

    pub(crate) fn into_parts(self) -> (DeviceId, String, String, ProtocolVersion) {
        (self.device_id, self.address, self.secret, self.protocol_version)
    }
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("device_id", &self.device_id)
            .field("address", &self.address)
            .field("protocol_version", &self.protocol_version)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Result of checking an operator-supplied secret against a live device.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// The device answered with a well-formed status; the secret is correct.
    Valid(Handshake),
    /// The device answered with an explicit error field.
    InvalidSecret { reason: String },
    /// The device could not be reached, timed out, or sent an unusable reply.
    Unreachable { cause: String },
}

impl ValidationOutcome {
    /// Builds an `Unreachable` outcome from any displayable cause.
    pub fn unreachable(cause: impl std::fmt::Display) -> Self {
        Self::Unreachable {
            cause: cause.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Classifies a status reply received from `candidate` for `secret`.
///
/// - error field present → [`ValidationOutcome::InvalidSecret`]
/// - status map present → [`ValidationOutcome::Valid`]
/// - neither → [`ValidationOutcome::Unreachable`] (malformed reply)
pub fn classify_status(
    candidate: &FilteredCandidate,
    secret: &str,
    reply: StatusReply,
) -> ValidationOutcome {
    if let Some(error) = reply.error {
        let reason = match reply.error_code {
            Some(Value::String(code)) => format!("{error} (code {code})"),
            Some(code) => format!("{error} (code {code})"),
            None => error,
        };
        return ValidationOutcome::InvalidSecret { reason };
    }

    match reply.dps {
        Some(status) => ValidationOutcome::Valid(Handshake {
            device_id: candidate.device_id().clone(),
            address: candidate.address().to_string(),
            secret: secret.to_string(),
            protocol_version: candidate.protocol_version().clone(),
            status,
        }),
        None => ValidationOutcome::unreachable("device reply carried no status fields"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::DeviceRecord;
    use serde_json::json;

    fn candidate() -> FilteredCandidate {
        FilteredCandidate::new(
            "10.0.0.6",
            DeviceId::new("B").unwrap(),
            ProtocolVersion::parse("3.3").unwrap(),
        )
    }

    fn reply(value: Value) -> StatusReply {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_status_with_dps_is_valid() {
        // Arrange
        let r = reply(json!({ "devId": "B", "dps": { "1": true, "19": 125 } }));

        // Act
        let outcome = classify_status(&candidate(), "k3y", r);

        // Assert
        match outcome {
            ValidationOutcome::Valid(handshake) => {
                assert!(handshake.confirms(&candidate(), "k3y"));
                assert_eq!(handshake.status().get("1"), Some(&json!(true)));
            }
            other => panic!("expected Valid, got {other:?}"),
        }
    }

    #[test]
    fn test_error_field_wins_over_status_fields() {
        let r = reply(json!({ "Error": "Check device key or version", "Err": "914", "dps": {} }));
        let outcome = classify_status(&candidate(), "wrong", r);
        assert_eq!(
            outcome,
            ValidationOutcome::InvalidSecret {
                reason: "Check device key or version (code 914)".to_string()
            }
        );
    }

    #[test]
    fn test_error_without_code_keeps_message() {
        let r = reply(json!({ "Error": "decrypt failed" }));
        let outcome = classify_status(&candidate(), "wrong", r);
        assert_eq!(
            outcome,
            ValidationOutcome::InvalidSecret {
                reason: "decrypt failed".to_string()
            }
        );
    }

    #[test]
    fn test_reply_without_status_or_error_is_not_valid() {
        let r = reply(json!({ "devId": "B" }));
        let outcome = classify_status(&candidate(), "k3y", r);
        assert!(matches!(outcome, ValidationOutcome::Unreachable { .. }));
    }

    #[test]
    fn test_handshake_does_not_confirm_other_secret() {
        let r = reply(json!({ "dps": { "1": false } }));
        let ValidationOutcome::Valid(handshake) = classify_status(&candidate(), "k3y", r) else {
            panic!("expected Valid");
        };
        assert!(!handshake.confirms(&candidate(), "other"));
    }

    #[test]
    fn test_record_from_handshake_carries_exact_tuple() {
        let r = reply(json!({ "dps": { "1": false } }));
        let ValidationOutcome::Valid(handshake) = classify_status(&candidate(), "k3y", r) else {
            panic!("expected Valid");
        };

        let record = DeviceRecord::from_handshake(handshake);

        assert_eq!(record.device_id().as_str(), "B");
        assert_eq!(record.address(), "10.0.0.6");
        assert_eq!(record.secret(), "k3y");
        assert_eq!(record.protocol_version().as_str(), "3.3");
        assert_eq!(record.title(), "Smart Plug B");
        assert!(!format!("{record:?}").contains("k3y"), "secret must be redacted");
    }
}
