//! Binary codec for encoding and decoding plug frames.
//!
//! Wire format:
//! ```text
//! [prefix:4][seq:4][command:4][payload_len:4][payload:N][suffix:4]
//! ```
//! Header size 16 bytes, trailer 4 bytes.  All integers are big-endian.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::protocol::messages::{
    Command, Frame, FRAME_PREFIX, FRAME_SUFFIX, HEADER_SIZE, MAX_PAYLOAD_LEN, TRAILER_SIZE,
};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The frame does not start with the expected prefix.
    #[error("bad frame prefix: 0x{0:08X}")]
    BadPrefix(u32),

    /// The frame does not end with the expected suffix.
    #[error("bad frame suffix: 0x{0:08X}")]
    BadSuffix(u32),

    /// The command field is not a recognized value.
    #[error("unknown command: 0x{0:02X}")]
    UnknownCommand(u32),

    /// The declared payload length exceeds [`MAX_PAYLOAD_LEN`].
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// The payload is not the JSON document the command requires.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The request signature could not be computed.
    #[error("signing failed: {0}")]
    Signing(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Frame`] into bytes including header and trailer.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds
/// [`MAX_PAYLOAD_LEN`].
///
/// # Examples
///
/// ```rust
/// use plug_core::protocol::{decode_frame, encode_frame};
/// use plug_core::protocol::messages::{Command, Frame};
///
/// let frame = Frame { sequence: 7, command: Command::StatusQuery, payload: b"{}".to_vec() };
/// let bytes = encode_frame(&frame).unwrap();
/// let (decoded, consumed) = decode_frame(&bytes).unwrap();
/// assert_eq!(decoded, frame);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    if frame.payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(frame.payload.len()));
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + frame.payload.len() + TRAILER_SIZE);
    buf.extend_from_slice(&FRAME_PREFIX.to_be_bytes());
    buf.extend_from_slice(&frame.sequence.to_be_bytes());
    buf.extend_from_slice(&(frame.command as u32).to_be_bytes());
    buf.extend_from_slice(&(frame.payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&frame.payload);
    buf.extend_from_slice(&FRAME_SUFFIX.to_be_bytes());
    Ok(buf)
}

/// Decodes one [`Frame`] from the beginning of `bytes`.
///
/// Returns the frame and the number of bytes consumed, so stream readers can
/// advance their cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are truncated or malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), ProtocolError> {
    let total = frame_len(bytes)?;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let command_raw = read_u32(bytes, 8);
    let command = Command::try_from(command_raw).map_err(ProtocolError::UnknownCommand)?;

    let suffix = read_u32(bytes, total - TRAILER_SIZE);
    if suffix != FRAME_SUFFIX {
        return Err(ProtocolError::BadSuffix(suffix));
    }

    let frame = Frame {
        sequence: read_u32(bytes, 4),
        command,
        payload: bytes[HEADER_SIZE..total - TRAILER_SIZE].to_vec(),
    };
    Ok((frame, total))
}

/// Reads the header at the start of `header` and returns the full frame
/// length (header + payload + trailer).
///
/// Stream readers call this after reading [`HEADER_SIZE`] bytes to learn how
/// many more bytes belong to the frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] for a short header, a bad prefix, or an
/// oversized payload length.
pub fn frame_len(header: &[u8]) -> Result<usize, ProtocolError> {
    if header.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: header.len(),
        });
    }

    let prefix = read_u32(header, 0);
    if prefix != FRAME_PREFIX {
        return Err(ProtocolError::BadPrefix(prefix));
    }

    let payload_len = read_u32(header, 12) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(payload_len));
    }
    Ok(HEADER_SIZE + payload_len + TRAILER_SIZE)
}

/// Serializes `payload` as JSON and wraps it in an encoded frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] if serialization fails or the result is too large.
pub fn encode_json<T: Serialize>(
    command: Command,
    sequence: u32,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload =
        serde_json::to_vec(payload).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;
    encode_frame(&Frame {
        sequence,
        command,
        payload,
    })
}

/// Parses the JSON payload of `frame` into `T`.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if the payload is not valid
/// JSON for `T`.
pub fn decode_json<T: DeserializeOwned>(frame: &Frame) -> Result<T, ProtocolError> {
    serde_json::from_slice(&frame.payload).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
