//! # ferrolink
//!
//! A synchronous client for the FerroLink device-control protocol, used to
//! interrogate and manipulate embedded servers exposing four entity kinds:
//! - Variables: opaque byte-valued registers
//! - Groups: ordered aggregates of variables
//! - Curves: large block-addressable byte arrays with checksums
//! - Functions: remote callable routines with fixed-size input and output
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Command Surface                          │
//! │          (one operation per protocol verb)                   │
//! └───────────┬─────────────────────────────────┬───────────────┘
//!             │                                 │
//! ┌───────────▼───────────┐          ┌──────────▼──────────┐
//! │    Command Engine     │          │   Entity Catalog    │
//! │ (one request, one     │          │ (handles, validity) │
//! │       response)       │          └─────────────────────┘
//! └───────────┬───────────┘
//!             │
//! ┌───────────▼───────────┐
//! │      Frame Codec      │
//! │ (opcode + size + data)│
//! └───────────┬───────────┘
//!             │
//! ┌───────────▼───────────┐
//! │       Transport       │
//! │ (caller send/recv)    │
//! └───────────────────────┘
//! ```
//!
//! The client owns no socket or serial line: it drives a caller-supplied
//! [`Transport`] that moves whole frames. Every command is strictly
//! synchronous and serialized: one request, one response.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod client;
pub mod error;
pub mod protocol;
pub mod transport;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use catalog::{
    Curve, CurveHandle, FuncHandle, Function, Group, GroupHandle, VarHandle, Variable,
};
pub use client::{Client, FuncResult, Version};
pub use error::{FerroError, Result};
pub use protocol::{BinOp, Message, Opcode};
pub use transport::{CallbackTransport, Transport};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ferrolink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
