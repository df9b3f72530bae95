//! Composite argument codecs.
//!
//! Everything here is built purely from the primitive getters/appenders plus
//! enum range validation – no composite type has its own wire representation
//! beyond the primitives it is assembled from:
//!
//! | composite        | wire layout                                        |
//! |------------------|----------------------------------------------------|
//! | string argument  | length (u32), then the string value if length ≠ 0  |
//! | `MKey`           | ordinal (byte), range-validated                    |
//! | M-key array      | count (byte), then count ordinals                  |
//! | `MacroEvent`     | code (byte), kind (byte, validated), interval (u16)|
//! | `MacroSequence`  | concatenated events; count travels out of band     |
//!
//! An inner [`MarshalError::MissingArgument`] raised partway through a
//! composite decode is translated into [`MarshalError::Truncated`], so one
//! missing primitive surfaces as one semantic decode error rather than a raw
//! bucket underflow.

use tracing::warn;

use crate::error::MarshalError;
use crate::keys::{MKey, MacroEvent, MacroEventKind, MacroSequence};
use crate::marshal::buffers::ValueBuffers;
use crate::marshal::builder::ReplyBuilder;
use crate::message::WireType;

/// Maps an inner bucket underflow to a semantic truncation error.
fn reconstructing<T>(
    what: &'static str,
    result: Result<T, MarshalError>,
) -> Result<T, MarshalError> {
    result.map_err(|e| match e {
        MarshalError::MissingArgument { .. } => MarshalError::Truncated { what },
        other => other,
    })
}

// ── String arguments ──────────────────────────────────────────────────────────

/// Appends a string argument: a length field, then the value (skipped when
/// the string is empty).
pub fn append_string_arg(builder: &mut ReplyBuilder, value: &str) -> Result<(), MarshalError> {
    builder.append_u32(value.len() as u32)?;
    if !value.is_empty() {
        builder.append_raw_string(value)?;
    }
    Ok(())
}

/// Extracts a string argument.
///
/// A declared length of zero yields an empty string without consuming a
/// string slot.  A length/value disagreement is logged as a warning but is
/// not fatal – the value wins.
pub fn next_string_arg(bufs: &mut ValueBuffers) -> Result<String, MarshalError> {
    let declared = reconstructing("string length", bufs.next_u32())? as usize;
    if declared == 0 {
        return Ok(String::new());
    }
    let value = reconstructing("string value", bufs.next_string())?;
    if value.len() != declared {
        warn!(
            "string argument length mismatch: declared {declared}, actual {}",
            value.len()
        );
    }
    Ok(value)
}

// ── M-key identifiers ─────────────────────────────────────────────────────────

pub fn append_mkey(builder: &mut ReplyBuilder, key: MKey) -> Result<(), MarshalError> {
    builder.append_byte(key as u8)
}

pub fn next_mkey(bufs: &mut ValueBuffers) -> Result<MKey, MarshalError> {
    let raw = reconstructing("M-key identifier", bufs.next_byte())?;
    MKey::try_from(raw).map_err(|_| MarshalError::BadEnum {
        what: "M-key identifier",
        value: raw,
        max: MKey::MAX_ORDINAL,
    })
}

/// Appends a count-prefixed M-key array (at most 255 elements).
pub fn append_mkey_array(builder: &mut ReplyBuilder, keys: &[MKey]) -> Result<(), MarshalError> {
    if keys.len() > u8::MAX as usize {
        return Err(MarshalError::BuildFailure(format!(
            "M-key array of {} elements exceeds the count byte",
            keys.len()
        )));
    }
    builder.append_byte(keys.len() as u8)?;
    for key in keys {
        append_mkey(builder, *key)?;
    }
    Ok(())
}

/// Extracts a count-prefixed M-key array.
///
/// Fails with [`MarshalError::Truncated`] if the byte bucket runs out before
/// the declared count is consumed.
pub fn next_mkey_array(bufs: &mut ValueBuffers) -> Result<Vec<MKey>, MarshalError> {
    let count = reconstructing("M-key array count", bufs.next_byte())? as usize;
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        keys.push(reconstructing("M-key array element", next_mkey(bufs))?);
    }
    Ok(keys)
}

// ── Macro events ──────────────────────────────────────────────────────────────

pub fn append_macro_event(
    builder: &mut ReplyBuilder,
    event: &MacroEvent,
) -> Result<(), MarshalError> {
    builder.append_byte(event.code)?;
    builder.append_byte(event.kind as u8)?;
    builder.append_u16(event.interval_ms)
}

pub fn next_macro_event(bufs: &mut ValueBuffers) -> Result<MacroEvent, MarshalError> {
    let code = reconstructing("macro event", bufs.next_byte())?;
    let raw_kind = reconstructing("macro event", bufs.next_byte())?;
    // Validate the kind before constructing anything.
    let kind = MacroEventKind::try_from(raw_kind).map_err(|_| MarshalError::BadEnum {
        what: "macro event kind",
        value: raw_kind,
        max: MacroEventKind::MAX_ORDINAL,
    })?;
    let interval_ms = reconstructing("macro event", bufs.next_u16())?;
    Ok(MacroEvent {
        code,
        kind,
        interval_ms,
    })
}

// ── Macro sequences ───────────────────────────────────────────────────────────

pub fn append_macro_sequence(
    builder: &mut ReplyBuilder,
    sequence: &MacroSequence,
) -> Result<(), MarshalError> {
    for event in sequence.iter() {
        append_macro_event(builder, event)?;
    }
    Ok(())
}

/// Extracts a macro sequence.
///
/// With `count: Some(n)` exactly `n` events are decoded (the count was
/// supplied out of band, e.g. by a preceding field).  With `count: None` the
/// sequence is self-delimited: events are drained until the byte bucket is
/// empty, and as a post-condition no interval values may remain either –
/// leftover residue means the fields were never a whole number of events.
pub fn next_macro_sequence(
    bufs: &mut ValueBuffers,
    count: Option<usize>,
) -> Result<MacroSequence, MarshalError> {
    let mut events = Vec::new();
    match count {
        Some(n) => {
            for _ in 0..n {
                events.push(next_macro_event(bufs)?);
            }
        }
        None => {
            while bufs.remaining(WireType::Byte) > 0 {
                events.push(next_macro_event(bufs)?);
            }
            if bufs.remaining(WireType::U16) > 0 {
                return Err(MarshalError::MalformedMessage(format!(
                    "{} interval value(s) left after self-delimited macro sequence",
                    bufs.remaining(WireType::U16)
                )));
            }
        }
    }
    Ok(MacroSequence::new(events))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
