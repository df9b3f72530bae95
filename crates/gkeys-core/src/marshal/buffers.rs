//! Per-type staging buffers for one in-flight message.
//!
//! # The bucket contract
//!
//! Filling drains a message's fields *in wire order* into one FIFO bucket per
//! primitive type.  Getters pop the front of the matching bucket.  That means
//! a getter validates only type-bucket membership, never position: the
//! relative order of two values of *different* types is not rechecked at get
//! time.  A handler's declared argument order must therefore equal the wire
//! order of the call – this is a caller contract, and the single most
//! safety-critical invariant of the layer.  A handler that declares
//! `(string, byte)` against a `[byte, string]` message does not fail; it
//! retrieves the right values with the wrong association.
//!
//! Reading more values of a type than the message supplied is a hard error
//! ([`MarshalError::MissingArgument`]).  Not reading all of them is a leak:
//! the dispatcher logs the residue after the call and clears the buffers.
//!
//! One `ValueBuffers` value is owned by one dispatch context and passed
//! explicitly through extraction; nothing here is global or thread-local.

use std::collections::VecDeque;

use crate::error::MarshalError;
use crate::message::{Message, WireType, WireValue};

/// Dispatch-scoped staging area: one FIFO bucket per primitive wire type.
#[derive(Debug, Default)]
pub struct ValueBuffers {
    bools: VecDeque<bool>,
    bytes: VecDeque<u8>,
    u16s: VecDeque<u16>,
    u32s: VecDeque<u32>,
    u64s: VecDeque<u64>,
    strings: VecDeque<String>,
    string_arrays: VecDeque<Vec<String>>,
}

impl ValueBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies every field of `message` by its primitive type and appends
    /// it to the matching bucket, preserving wire order within each bucket.
    ///
    /// Every representable field maps to exactly one bucket, so with this
    /// transport there is no "unsupported wire type" path; the match below is
    /// exhaustive by construction.
    pub fn fill_from_message(&mut self, message: &Message) {
        for field in message.fields() {
            match field {
                WireValue::Bool(v) => self.bools.push_back(*v),
                WireValue::Byte(v) => self.bytes.push_back(*v),
                WireValue::U16(v) => self.u16s.push_back(*v),
                WireValue::U32(v) => self.u32s.push_back(*v),
                WireValue::U64(v) => self.u64s.push_back(*v),
                WireValue::Str(v) => self.strings.push_back(v.clone()),
                WireValue::StrArray(v) => self.string_arrays.push_back(v.clone()),
            }
        }
    }

    // ── Typed getters ─────────────────────────────────────────────────────────

    pub fn next_bool(&mut self) -> Result<bool, MarshalError> {
        self.bools.pop_front().ok_or(MarshalError::MissingArgument {
            wanted: WireType::Bool,
        })
    }

    pub fn next_byte(&mut self) -> Result<u8, MarshalError> {
        self.bytes.pop_front().ok_or(MarshalError::MissingArgument {
            wanted: WireType::Byte,
        })
    }

    pub fn next_u16(&mut self) -> Result<u16, MarshalError> {
        self.u16s.pop_front().ok_or(MarshalError::MissingArgument {
            wanted: WireType::U16,
        })
    }

    pub fn next_u32(&mut self) -> Result<u32, MarshalError> {
        self.u32s.pop_front().ok_or(MarshalError::MissingArgument {
            wanted: WireType::U32,
        })
    }

    pub fn next_u64(&mut self) -> Result<u64, MarshalError> {
        self.u64s.pop_front().ok_or(MarshalError::MissingArgument {
            wanted: WireType::U64,
        })
    }

    pub fn next_string(&mut self) -> Result<String, MarshalError> {
        self.strings
            .pop_front()
            .ok_or(MarshalError::MissingArgument {
                wanted: WireType::Str,
            })
    }

    pub fn next_string_array(&mut self) -> Result<Vec<String>, MarshalError> {
        self.string_arrays
            .pop_front()
            .ok_or(MarshalError::MissingArgument {
                wanted: WireType::StrArray,
            })
    }

    // ── Residue inspection ────────────────────────────────────────────────────

    /// Number of unread values remaining in the bucket for `wire_type`.
    pub fn remaining(&self, wire_type: WireType) -> usize {
        match wire_type {
            WireType::Bool => self.bools.len(),
            WireType::Byte => self.bytes.len(),
            WireType::U16 => self.u16s.len(),
            WireType::U32 => self.u32s.len(),
            WireType::U64 => self.u64s.len(),
            WireType::Str => self.strings.len(),
            WireType::StrArray => self.string_arrays.len(),
        }
    }

    /// Per-type leftover counts for every non-empty bucket.
    pub fn residue(&self) -> Vec<(WireType, usize)> {
        const ALL: [WireType; 7] = [
            WireType::Bool,
            WireType::Byte,
            WireType::U16,
            WireType::U32,
            WireType::U64,
            WireType::Str,
            WireType::StrArray,
        ];
        ALL.iter()
            .map(|t| (*t, self.remaining(*t)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    /// True when every bucket has been fully drained.
    pub fn is_empty(&self) -> bool {
        self.residue().is_empty()
    }

    /// Empties all buckets.
    pub fn clear(&mut self) {
        self.bools.clear();
        self.bytes.clear();
        self.u16s.clear();
        self.u32s.clear();
        self.u64s.clear();
        self.strings.clear();
        self.string_arrays.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
