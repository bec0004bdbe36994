//! Entity catalog
//!
//! Typed in-memory model of the server's Variables, Groups, Curves and
//! Functions. The catalog is populated during the init handshake and
//! afterwards mutated only by the group-administration and
//! checksum-recalculation commands, which repopulate whole lists.
//!
//! ## Handles
//!
//! Commands name entities through typed generational handles. A handle
//! records the entry's index plus the generation of the list it was minted
//! from; repopulating a list bumps its generation, so handles taken before
//! a repopulation are rejected instead of silently aliasing a different
//! entity.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{FerroError, Result};

// =============================================================================
// Wire Encoding Constants
// =============================================================================

/// A variable descriptor size of 0 wraps around to this many bytes
pub const VAR_MAX_SIZE: usize = 128;

/// Bytes per curve record in a curve list response
pub const CURVE_LIST_INFO: usize = 5;

/// Size of the `curve_id, offset` prefix of a block transfer payload
pub const CURVE_BLOCK_INFO: usize = 3;

/// Bytes per curve block
pub const CURVE_BLOCK_SIZE: usize = 16_384;

/// Length of a curve checksum
pub const CURVE_CSUM_SIZE: usize = 16;

/// A curve block count of 0 wraps around to this many blocks
pub const CURVE_MAX_BLOCKS: u32 = 65_536;

/// Descriptor bit flagging a writable entity
const WRITABLE_MASK: u8 = 0x80;

/// Descriptor bits carrying a size or member count
const SIZE_MASK: u8 = 0x7F;

/// Entity ids are single bytes, so no list holds more than this many entries
pub(crate) const MAX_ENTITIES: usize = 256;

// =============================================================================
// Handles
// =============================================================================

/// Marker for variable handles
pub enum VarKind {}
/// Marker for group handles
pub enum GroupKind {}
/// Marker for curve handles
pub enum CurveKind {}
/// Marker for function handles
pub enum FuncKind {}

/// Shared surface of the handle kind markers
pub trait EntityKind {
    /// Kind name used in diagnostics
    const NAME: &'static str;
}

impl EntityKind for VarKind {
    const NAME: &'static str = "variable";
}
impl EntityKind for GroupKind {
    const NAME: &'static str = "group";
}
impl EntityKind for CurveKind {
    const NAME: &'static str = "curve";
}
impl EntityKind for FuncKind {
    const NAME: &'static str = "function";
}

/// Typed generational reference to a catalog entry
///
/// Minted by the client's accessor methods; becomes stale when the
/// corresponding list is repopulated.
pub struct Handle<K> {
    index: u8,
    generation: u32,
    _kind: PhantomData<fn() -> K>,
}

/// Handle to a catalog variable
pub type VarHandle = Handle<VarKind>;
/// Handle to a catalog group
pub type GroupHandle = Handle<GroupKind>;
/// Handle to a catalog curve
pub type CurveHandle = Handle<CurveKind>;
/// Handle to a catalog function
pub type FuncHandle = Handle<FuncKind>;

impl<K> Handle<K> {
    /// Entity id this handle refers to
    pub fn id(self) -> u8 {
        self.index
    }
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<K> Eq for Handle<K> {}

impl<K: EntityKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({}@g{})", K::NAME, self.index, self.generation)
    }
}

// =============================================================================
// Entities
// =============================================================================

/// An opaque byte-valued register on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Dense id, equal to the list index
    pub id: u8,

    /// Value size in bytes, 1..=[`VAR_MAX_SIZE`]
    pub size: usize,

    /// Whether the server accepts writes to this variable
    pub writable: bool,
}

impl Variable {
    /// Decode one descriptor byte from a variable list response
    ///
    /// Bit 7 is the writable flag; bits 0-6 are the size, with 0 meaning
    /// [`VAR_MAX_SIZE`].
    pub(crate) fn from_descriptor(id: u8, raw: u8) -> Self {
        let size = match (raw & SIZE_MASK) as usize {
            0 => VAR_MAX_SIZE,
            size => size,
        };
        Self {
            id,
            size,
            writable: raw & WRITABLE_MASK != 0,
        }
    }
}

/// An ordered aggregate of variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Dense id, equal to the list index
    pub id: u8,

    /// Whether every member accepts writes
    pub writable: bool,

    /// Total value size: the sum of the member variable sizes
    pub size: usize,

    /// Member variables, in server order
    pub(crate) members: Vec<VarHandle>,
}

impl Group {
    /// Member variables, in server order
    pub fn members(&self) -> &[VarHandle] {
        &self.members
    }

    /// Decode the writable flag and expected member count from one
    /// descriptor byte of a group list response
    pub(crate) fn from_descriptor(raw: u8) -> (bool, usize) {
        (raw & WRITABLE_MASK != 0, (raw & SIZE_MASK) as usize)
    }
}

/// A block-addressable byte array on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curve {
    /// Dense id, equal to the list index
    pub id: u8,

    /// Whether the server accepts block writes to this curve
    pub writable: bool,

    /// Bytes per block
    pub block_size: u16,

    /// Block count, 1..=[`CURVE_MAX_BLOCKS`]
    pub nblocks: u32,

    /// Server-computed checksum, zero-filled when the fetch failed
    pub checksum: [u8; CURVE_CSUM_SIZE],
}

impl Curve {
    /// Decode the 5-byte records of a curve list response
    ///
    /// Record layout: `writable:u8, block_size:u16 BE, nblocks:u16 BE`,
    /// with a block count of 0 meaning [`CURVE_MAX_BLOCKS`].
    pub(crate) fn parse_list(payload: &[u8]) -> Result<Vec<Self>> {
        if payload.len() % CURVE_LIST_INFO != 0 {
            return Err(FerroError::Comm(format!(
                "curve list payload of {} bytes is not a multiple of {}",
                payload.len(),
                CURVE_LIST_INFO
            )));
        }

        let count = payload.len() / CURVE_LIST_INFO;
        if count > MAX_ENTITIES {
            return Err(FerroError::Comm(format!(
                "curve list reports {count} entries, more than the {MAX_ENTITIES} addressable"
            )));
        }

        let mut curves = Vec::with_capacity(count);
        for (id, record) in payload.chunks_exact(CURVE_LIST_INFO).enumerate() {
            let nblocks = match u16::from_be_bytes([record[3], record[4]]) {
                0 => CURVE_MAX_BLOCKS,
                n => u32::from(n),
            };
            curves.push(Self {
                id: id as u8,
                writable: record[0] != 0,
                block_size: u16::from_be_bytes([record[1], record[2]]),
                nblocks,
                checksum: [0; CURVE_CSUM_SIZE],
            });
        }

        Ok(curves)
    }
}

/// A remote callable routine with fixed-size input and output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Dense id, equal to the list index
    pub id: u8,

    /// Input size in bytes, at most 15
    pub input_size: usize,

    /// Output size in bytes, at most 15
    pub output_size: usize,
}

impl Function {
    /// Decode one descriptor byte from a function list response
    ///
    /// High nibble is the input size, low nibble the output size.
    pub(crate) fn from_descriptor(id: u8, raw: u8) -> Self {
        Self {
            id,
            input_size: usize::from(raw >> 4),
            output_size: usize::from(raw & 0x0F),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One per-kind entity list plus its generation counter
///
/// A single generic replaces the four near-identical contains/get-list
/// routines a per-kind expansion would need.
pub(crate) struct Registry<K, T> {
    items: Vec<T>,
    generation: u32,
    _kind: PhantomData<fn() -> K>,
}

impl<K: EntityKind, T> Registry<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            generation: 0,
            _kind: PhantomData,
        }
    }

    pub(crate) fn items(&self) -> &[T] {
        &self.items
    }

    /// Mint a live handle for the entry at `index`
    pub(crate) fn handle_of(&self, index: usize) -> Option<Handle<K>> {
        if index < self.items.len() {
            Some(Handle {
                index: index as u8,
                generation: self.generation,
                _kind: PhantomData,
            })
        } else {
            None
        }
    }

    /// Resolve a handle against the current list
    ///
    /// Rejects handles minted before the last repopulation.
    pub(crate) fn resolve(&self, handle: Handle<K>) -> Result<&T> {
        if handle.generation != self.generation {
            return Err(FerroError::ParamInvalid(format!(
                "stale {} handle (catalog has been repopulated)",
                K::NAME
            )));
        }
        self.items.get(usize::from(handle.index)).ok_or_else(|| {
            FerroError::ParamInvalid(format!("unknown {} handle {}", K::NAME, handle.index))
        })
    }

    /// Replace the whole list, invalidating outstanding handles
    pub(crate) fn replace(&mut self, items: Vec<T>) {
        self.generation = self.generation.wrapping_add(1);
        self.items = items;
    }

    /// Drop every entry, invalidating outstanding handles
    pub(crate) fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.items.clear();
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// The client's view of the server's entities
pub(crate) struct Catalog {
    pub(crate) vars: Registry<VarKind, Variable>,
    pub(crate) groups: Registry<GroupKind, Group>,
    pub(crate) curves: Registry<CurveKind, Curve>,
    pub(crate) funcs: Registry<FuncKind, Function>,
}

impl Catalog {
    pub(crate) fn new() -> Self {
        Self {
            vars: Registry::new(),
            groups: Registry::new(),
            curves: Registry::new(),
            funcs: Registry::new(),
        }
    }
}
