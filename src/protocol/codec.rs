//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Opcode(1) │ Size (2) │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! The size field is the payload byte count, big-endian. One frame carries
//! exactly one message; the transport is responsible for delivering whole
//! frames.

use crate::catalog::{CURVE_BLOCK_INFO, CURVE_BLOCK_SIZE};
use crate::error::{FerroError, Result};

use super::{Message, Opcode};

/// Header size: 1 byte opcode + 2 bytes payload size
pub const HEADER_SIZE: usize = 3;

/// Maximum payload size: a full curve block plus its transfer header
pub const MAX_PAYLOAD: usize = CURVE_BLOCK_INFO + CURVE_BLOCK_SIZE;

/// Maximum frame size
pub const MAX_MESSAGE: usize = HEADER_SIZE + MAX_PAYLOAD;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a message into a caller-provided buffer
///
/// Returns the number of bytes written.
///
/// # Panics
///
/// Panics if `buf` is shorter than the encoded frame. Buffers of
/// [`MAX_MESSAGE`] bytes always fit.
pub fn encode_message_into(message: &Message, buf: &mut [u8]) -> Result<usize> {
    if message.payload.len() > MAX_PAYLOAD {
        return Err(FerroError::ParamInvalid(format!(
            "payload of {} bytes exceeds maximum {}",
            message.payload.len(),
            MAX_PAYLOAD
        )));
    }

    let total = HEADER_SIZE + message.payload.len();
    buf[0] = message.opcode as u8;
    buf[1..HEADER_SIZE].copy_from_slice(&(message.payload.len() as u16).to_be_bytes());
    buf[HEADER_SIZE..total].copy_from_slice(&message.payload);

    Ok(total)
}

/// Encode a message to a fresh byte vector
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    if message.payload.len() > MAX_PAYLOAD {
        return Err(FerroError::ParamInvalid(format!(
            "payload of {} bytes exceeds maximum {}",
            message.payload.len(),
            MAX_PAYLOAD
        )));
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + message.payload.len());
    frame.push(message.opcode as u8);
    frame.extend_from_slice(&(message.payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(&message.payload);

    Ok(frame)
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a received frame
///
/// The declared payload size is authoritative: a frame shorter than the
/// header, or whose actual payload length disagrees with the header, is a
/// communication fault.
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    if bytes.len() < HEADER_SIZE {
        return Err(FerroError::Comm(format!(
            "short frame: expected at least {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let opcode = Opcode::from_u8(bytes[0])
        .ok_or_else(|| FerroError::Comm(format!("unknown opcode: 0x{:02x}", bytes[0])))?;

    let declared = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
    if declared > MAX_PAYLOAD {
        return Err(FerroError::Comm(format!(
            "declared payload of {} bytes exceeds maximum {}",
            declared, MAX_PAYLOAD
        )));
    }

    let actual = bytes.len() - HEADER_SIZE;
    if declared != actual {
        return Err(FerroError::Comm(format!(
            "declared payload of {} bytes but received {}",
            declared, actual
        )));
    }

    Ok(Message {
        opcode,
        payload: bytes[HEADER_SIZE..].to_vec(),
    })
}
