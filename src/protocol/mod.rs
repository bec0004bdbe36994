//! Protocol Module
//!
//! Defines the wire protocol spoken with the device server.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Opcode(1) │ Size (2) │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! All multi-byte integers are big-endian. The declared size is
//! authoritative: a frame whose byte count disagrees with its header is
//! rejected as a communication fault.
//!
//! ### Opcode Families
//! - 0x00..=0x0D: discovery queries and their list responses
//! - 0x10..=0x13: variable/group reads and value responses
//! - 0x20..=0x28: variable/group writes and binary operations
//! - 0x30..=0x32: group administration
//! - 0x40..=0x42: curve block transfer
//! - 0x50..=0x53: function execution
//! - 0xE0..=0xE8: status responses (OK and error reports)

mod codec;
mod message;
mod opcode;

pub use codec::{
    decode_message, encode_message, encode_message_into, HEADER_SIZE, MAX_MESSAGE, MAX_PAYLOAD,
};
pub use message::Message;
pub use opcode::{BinOp, Opcode};
