//! Status-query signatures.
//!
//! The local key never travels on the wire.  Instead the host signs
//! `"{devId}|{t}"` with HMAC-SHA256 keyed by the local key, and the plug
//! recomputes the signature with its own copy.  A mismatch makes the plug
//! reply with an `Error` field, which the validator classifies as a wrong key.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::protocol::codec::ProtocolError;
use crate::protocol::messages::StatusQuery;

type HmacSha256 = Hmac<Sha256>;

/// Computes the hex signature for a status query.
///
/// # Errors
///
/// Returns [`ProtocolError::Signing`] if the MAC cannot be keyed.
pub fn sign_status_query(secret: &str, dev_id: &str, t: u64) -> Result<String, ProtocolError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ProtocolError::Signing(e.to_string()))?;
    mac.update(signed_material(dev_id, t).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Returns `true` if `query.sig` was produced with `secret`.
///
/// Uses the constant-time comparison provided by [`Mac::verify_slice`].
pub fn verify_status_query(secret: &str, query: &StatusQuery) -> bool {
    let Ok(signature) = hex::decode(query.sig.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed_material(&query.dev_id, query.t).as_bytes());
    mac.verify_slice(&signature).is_ok()
}

impl StatusQuery {
    /// Builds a signed query for `dev_id` at Unix time `t`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Signing`] if the signature cannot be computed.
    pub fn signed(dev_id: &str, secret: &str, t: u64) -> Result<Self, ProtocolError> {
        Ok(Self {
            gw_id: dev_id.to_string(),
            dev_id: dev_id.to_string(),
            uid: dev_id.to_string(),
            t,
            sig: sign_status_query(secret, dev_id, t)?,
        })
    }
}

fn signed_material(dev_id: &str, t: u64) -> String {
    format!("{dev_id}|{t}")
}
