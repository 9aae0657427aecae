//! TCP link to a single plug.
//!
//! A validation round trip is:
//!
//! 1. Connect to `ip:device_port` (default 6668).
//! 2. Send a `StatusQuery` frame whose payload is signed with the local key.
//! 3. Read exactly one frame back: 16-byte header first, then the payload and
//!    trailer whose length the header declares.
//! 4. Decode the JSON payload into a [`StatusReply`].
//!
//! Timeouts are not handled here; the caller bounds the whole round trip.
//!
//! The framing is the simplified one in [`plug_core::protocol::messages`]
//! (no CRC, no payload encryption, HMAC-signed queries).  It is not a driver
//! for commercial plug firmware.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use plug_core::protocol::codec::{decode_json, encode_json, frame_len};
use plug_core::protocol::messages::HEADER_SIZE;
use plug_core::protocol::SequenceCounter;
use plug_core::{decode_frame, Command, Frame, StatusQuery, StatusReply};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::application::validate_credential::{
    DeviceSession, DeviceTransport, SessionParams, TransportError,
};

/// [`DeviceTransport`] over plain TCP.
pub struct TcpDeviceTransport {
    port: u16,
    sequence: Arc<SequenceCounter>,
}

impl TcpDeviceTransport {
    /// `port` is used for addresses that do not name one.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            sequence: Arc::new(SequenceCounter::new()),
        }
    }

    fn resolve(&self, address: &str) -> Result<SocketAddr, TransportError> {
        if let Ok(addr) = address.parse::<SocketAddr>() {
            return Ok(addr);
        }
        address
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, self.port))
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))
    }
}

#[async_trait]
impl DeviceTransport for TcpDeviceTransport {
    async fn open_session(
        &self,
        params: &SessionParams,
    ) -> Result<Box<dyn DeviceSession>, TransportError> {
        let addr = self.resolve(&params.address)?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::ConnectFailed {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        debug!("connected to {addr} (protocol v{})", params.protocol_version);

        Ok(Box::new(TcpDeviceSession {
            stream,
            params: params.clone(),
            sequence: Arc::clone(&self.sequence),
        }))
    }
}

/// One open connection to a plug.
pub struct TcpDeviceSession {
    stream: TcpStream,
    params: SessionParams,
    sequence: Arc<SequenceCounter>,
}

#[async_trait]
impl DeviceSession for TcpDeviceSession {
    async fn query_status(&mut self) -> Result<StatusReply, TransportError> {
        let query = StatusQuery::signed(
            self.params.device_id.as_str(),
            &self.params.secret,
            unix_seconds(),
        )?;
        let bytes = encode_json(Command::StatusQuery, self.sequence.next(), &query)?;
        self.stream.write_all(&bytes).await?;

        let frame = read_frame(&mut self.stream).await?;
        if frame.command != Command::StatusQuery {
            return Err(TransportError::UnexpectedReply(frame.command));
        }
        debug!(
            "status reply from {}: {} byte payload",
            self.params.device_id,
            frame.payload.len()
        );
        Ok(decode_json(&frame)?)
    }
}

/// Reads one complete frame from `stream`.
///
/// A connection closed before the header is complete is reported as
/// [`TransportError::Closed`].
pub async fn read_frame(stream: &mut TcpStream) -> Result<Frame, TransportError> {
    let mut buf = vec![0u8; HEADER_SIZE];
    match stream.read_exact(&mut buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::Closed)
        }
        Err(e) => return Err(e.into()),
    }

    let total = frame_len(&buf)?;
    buf.resize(total, 0);
    stream.read_exact(&mut buf[HEADER_SIZE..]).await?;

    let (frame, _) = decode_frame(&buf)?;
    Ok(frame)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
