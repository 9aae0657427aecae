//! UDP broadcast-based plug discovery.
//!
//! Plugs announce themselves by broadcasting an `Announce` frame on the
//! discovery port (default 6666) every few seconds.  The payload is a JSON
//! descriptor such as:
//!
//! ```json
//! { "ip": "10.0.0.6", "gwId": "bf01...", "version": "3.3", "productKey": "..." }
//! ```
//!
//! A sweep binds the discovery port, listens in short windows, and collects
//! one [`RawCandidate`] per announcing address.  Socket I/O is synchronous and
//! runs on Tokio's blocking pool so the async executor is never stalled.
//!
//! # Sweep deadline
//!
//! The socket read timeout is `poll_interval`.  Every window that ends without
//! a datagram consumes one retry from the budget; the sweep ends when the
//! budget is spent or `retry_budget × poll_interval` has elapsed, whichever
//! comes first.  A LAN flooded with announcements therefore still finishes.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use plug_core::protocol::codec::decode_json;
use plug_core::{decode_frame, Command, DeviceDescriptor, ProtocolVersion, RawCandidate};
use serde_json::Value;
use tracing::{debug, info};

use crate::application::onboard_device::{DiscoveryError, DiscoveryProbe};

const RECV_BUFFER_LEN: usize = 4096;

/// Socket settings for a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    pub bind_address: IpAddr,
    pub port: u16,
    pub poll_interval: Duration,
    /// Version assumed for announcements that omit one.
    pub default_version: ProtocolVersion,
}

/// [`DiscoveryProbe`] that listens for UDP announcements.
pub struct UdpDiscoveryProbe {
    settings: DiscoverySettings,
}

impl UdpDiscoveryProbe {
    pub fn new(settings: DiscoverySettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DiscoveryProbe for UdpDiscoveryProbe {
    async fn scan(
        &self,
        verbose: bool,
        retry_budget: u32,
    ) -> Result<Vec<RawCandidate>, DiscoveryError> {
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || sweep(&settings, verbose, retry_budget))
            .await
            .map_err(|e| DiscoveryError::Task(e.to_string()))?
    }
}

/// Runs one blocking sweep.
fn sweep(
    settings: &DiscoverySettings,
    verbose: bool,
    retry_budget: u32,
) -> Result<Vec<RawCandidate>, DiscoveryError> {
    let addr = SocketAddr::new(settings.bind_address, settings.port);
    let socket = UdpSocket::bind(addr).map_err(|source| DiscoveryError::BindFailed {
        port: settings.port,
        source,
    })?;
    socket.set_read_timeout(Some(settings.poll_interval))?;
    info!("listening for plug announcements on UDP {addr}");

    let deadline = Instant::now() + settings.poll_interval * retry_budget;
    let mut retries_left = retry_budget;
    let mut found = Announcements::default();
    let mut buf = vec![0u8; RECV_BUFFER_LEN];

    while retries_left > 0 && Instant::now() < deadline {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => {
                retries_left -= 1;
                continue;
            }
            Err(e) => return Err(DiscoveryError::Io(e)),
        };

        match parse_announcement(&buf[..len], src, &settings.default_version) {
            Some(candidate) => {
                if verbose {
                    info!(
                        "announcement from {src}: {} v{}",
                        candidate.descriptor.device_id, candidate.descriptor.protocol_version
                    );
                }
                found.record(candidate);
            }
            None => debug!("ignored {len}-byte datagram from {src}"),
        }
    }

    let candidates = found.into_vec();
    info!("sweep finished: {} device(s) announced", candidates.len());
    Ok(candidates)
}

/// Decodes one datagram into a candidate, or `None` if it is not a usable
/// announcement.
///
/// The address comes from the payload's `ip` field when present, otherwise
/// from the datagram's source.
fn parse_announcement(
    datagram: &[u8],
    src: SocketAddr,
    default_version: &ProtocolVersion,
) -> Option<RawCandidate> {
    let (frame, _) = decode_frame(datagram)
        .map_err(|e| debug!("undecodable datagram from {src}: {e}"))
        .ok()?;
    if frame.command != Command::Announce {
        debug!("unexpected {:?} frame on discovery port from {src}", frame.command);
        return None;
    }

    let payload: Value = decode_json(&frame)
        .map_err(|e| debug!("bad announcement payload from {src}: {e}"))
        .ok()?;
    let mut descriptor = DeviceDescriptor::from_announcement(&payload)
        .map_err(|e| debug!("rejected announcement from {src}: {e}"))
        .ok()?;
    if payload.get("version").map_or(true, Value::is_null) {
        descriptor.protocol_version = default_version.clone();
    }

    let address = payload
        .get("ip")
        .and_then(Value::as_str)
        .and_then(|ip| ip.parse::<IpAddr>().ok())
        .unwrap_or_else(|| src.ip());

    Some(RawCandidate::new(address.to_string(), descriptor))
}

/// Sweep results keyed by address, in first-arrival order.
#[derive(Default)]
struct Announcements {
    order: Vec<RawCandidate>,
    index: HashMap<String, usize>,
}

impl Announcements {
    /// Adds a candidate; a repeat from the same address refreshes its descriptor.
    fn record(&mut self, candidate: RawCandidate) {
        match self.index.get(&candidate.address) {
            Some(&i) => self.order[i] = candidate,
            None => {
                self.index.insert(candidate.address.clone(), self.order.len());
                self.order.push(candidate);
            }
        }
    }

    fn into_vec(self) -> Vec<RawCandidate> {
        self.order
    }
}

/// Returns `true` for OS timeout / would-block errors that end a listen window.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use plug_core::protocol::codec::encode_json;
    use serde_json::json;

    fn src() -> SocketAddr {
        "10.0.0.9:49152".parse().unwrap()
    }

    fn announce(payload: Value) -> Vec<u8> {
        encode_json(Command::Announce, 1, &payload).unwrap()
    }

    #[test]
    fn test_is_timeout_error_recognises_timed_out_and_would_block() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "t");
        let would_block = std::io::Error::new(std::io::ErrorKind::WouldBlock, "w");

        assert!(is_timeout_error(&timed_out));
        assert!(is_timeout_error(&would_block));
    }

    #[test]
    fn test_is_timeout_error_returns_false_for_other_errors() {
        let e = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!is_timeout_error(&e));
    }

    #[test]
    fn test_parse_announcement_prefers_payload_ip() {
        // Arrange
        let bytes = announce(json!({ "ip": "10.0.0.6", "gwId": "B", "version": "3.4" }));

        // Act
        let candidate = parse_announcement(&bytes, src(), &ProtocolVersion::default()).unwrap();

        // Assert
        assert_eq!(candidate.address, "10.0.0.6");
        assert_eq!(candidate.descriptor.device_id.as_str(), "B");
        assert_eq!(candidate.descriptor.protocol_version.as_str(), "3.4");
    }

    #[test]
    fn test_parse_announcement_falls_back_to_source_ip() {
        let bytes = announce(json!({ "gwId": "B", "version": "3.3" }));

        let candidate = parse_announcement(&bytes, src(), &ProtocolVersion::default()).unwrap();

        assert_eq!(candidate.address, "10.0.0.9");
    }

    #[test]
    fn test_parse_announcement_missing_version_uses_configured_default() {
        let bytes = announce(json!({ "gwId": "B" }));
        let configured = ProtocolVersion::parse("3.1").unwrap();

        let candidate = parse_announcement(&bytes, src(), &configured).unwrap();

        assert_eq!(candidate.descriptor.protocol_version, configured);
    }

    #[test]
    fn test_parse_announcement_rejects_payload_without_id() {
        let bytes = announce(json!({ "ip": "10.0.0.6", "version": "3.3" }));
        assert!(parse_announcement(&bytes, src(), &ProtocolVersion::default()).is_none());
    }

    #[test]
    fn test_parse_announcement_ignores_non_announce_frames() {
        let bytes = encode_json(Command::StatusQuery, 1, &json!({ "gwId": "B" })).unwrap();
        assert!(parse_announcement(&bytes, src(), &ProtocolVersion::default()).is_none());
    }

    #[test]
    fn test_parse_announcement_ignores_garbage() {
        assert!(parse_announcement(b"hello", src(), &ProtocolVersion::default()).is_none());
    }

    #[test]
    fn test_repeat_from_same_address_refreshes_in_place() {
        // Arrange
        let mut found = Announcements::default();
        let first = parse_announcement(
            &announce(json!({ "ip": "10.0.0.5", "gwId": "A", "version": "3.3" })),
            src(),
            &ProtocolVersion::default(),
        )
        .unwrap();
        let other = parse_announcement(
            &announce(json!({ "ip": "10.0.0.6", "gwId": "B" })),
            src(),
            &ProtocolVersion::default(),
        )
        .unwrap();
        let refreshed = parse_announcement(
            &announce(json!({ "ip": "10.0.0.5", "gwId": "A", "version": "3.4" })),
            src(),
            &ProtocolVersion::default(),
        )
        .unwrap();

        // Act
        found.record(first);
        found.record(other);
        found.record(refreshed);
        let candidates = found.into_vec();

        // Assert
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].address, "10.0.0.5");
        assert_eq!(candidates[0].descriptor.protocol_version.as_str(), "3.4");
        assert_eq!(candidates[1].address, "10.0.0.6");
    }
}
