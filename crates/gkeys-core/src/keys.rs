//! Domain composite types carried across the bus boundary.
//!
//! These are the shapes the device-control services exchange with clients:
//! M-key identifiers, macro events, and macro sequences.  On the wire every
//! one of them is encoded purely in terms of the primitive field types; the
//! codecs live in [`crate::marshal::codec`].

use std::fmt;

// ── M-key identifiers ─────────────────────────────────────────────────────────

/// One of the keyboard's macro-bank keys.
///
/// Wire-encoded as a single byte equal to the ordinal.  Decode validates the
/// byte against [`MKey::MAX_ORDINAL`]; anything above is a decode failure,
/// never a silent clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MKey {
    M1 = 0x00,
    M2 = 0x01,
    M3 = 0x02,
    /// The macro-record key.
    MR = 0x03,
}

impl MKey {
    /// Highest valid wire ordinal.
    pub const MAX_ORDINAL: u8 = MKey::MR as u8;

    /// All bank keys in ordinal order.
    pub const ALL: [MKey; 4] = [MKey::M1, MKey::M2, MKey::M3, MKey::MR];
}

impl TryFrom<u8> for MKey {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MKey::M1),
            0x01 => Ok(MKey::M2),
            0x02 => Ok(MKey::M3),
            0x03 => Ok(MKey::MR),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MKey::M1 => f.write_str("M1"),
            MKey::M2 => f.write_str("M2"),
            MKey::M3 => f.write_str("M3"),
            MKey::MR => f.write_str("MR"),
        }
    }
}

// ── Macro events ──────────────────────────────────────────────────────────────

/// What a single macro event does when replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MacroEventKind {
    KeyDown = 0x00,
    KeyUp = 0x01,
    /// Pure wait; the key code is ignored by replay.
    Delay = 0x02,
}

impl MacroEventKind {
    /// Highest valid wire ordinal.
    pub const MAX_ORDINAL: u8 = MacroEventKind::Delay as u8;
}

impl TryFrom<u8> for MacroEventKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MacroEventKind::KeyDown),
            0x01 => Ok(MacroEventKind::KeyUp),
            0x02 => Ok(MacroEventKind::Delay),
            _ => Err(()),
        }
    }
}

/// One step of a recorded macro.
///
/// Wire layout: key code (byte), event kind (byte, range-validated before
/// construction), interval to the next event in milliseconds (uint16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroEvent {
    pub code: u8,
    pub kind: MacroEventKind,
    pub interval_ms: u16,
}

impl MacroEvent {
    pub fn new(code: u8, kind: MacroEventKind, interval_ms: u16) -> Self {
        Self {
            code,
            kind,
            interval_ms,
        }
    }
}

// ── Macro sequences ───────────────────────────────────────────────────────────

/// An ordered run of macro events.
///
/// On the wire a sequence is the plain concatenation of its events; the
/// element count travels out of band (a preceding field, or "drain until the
/// message is exhausted" for self-delimited decodes).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MacroSequence {
    events: Vec<MacroEvent>,
}

impl MacroSequence {
    pub fn new(events: Vec<MacroEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[MacroEvent] {
        &self.events
    }

    pub fn iter(&self) -> impl Iterator<Item = &MacroEvent> {
        self.events.iter()
    }
}

impl From<Vec<MacroEvent>> for MacroSequence {
    fn from(events: Vec<MacroEvent>) -> Self {
        Self { events }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
