//! Device collaborator seam.
//!
//! The dispatch core is agnostic to what the device does; the services only
//! see the [`KeyboardDevice`] trait, injected at registration time.  Real USB
//! enumeration and HID traffic live outside this repository; the simulated
//! implementation in `infrastructure::device` stands in for the hardware.
//!
//! Recording is the one long-running device operation.  It must never block
//! the dispatch thread, so [`KeyboardDevice::begin_recording`] returns a
//! session id at once and the finished macro is funneled back through a
//! [`RecordingFinished`] event on a channel the daemon pumps; the macro
//! service resolves the open reply from there.

use gkeys_core::{CallError, MKey, MacroSequence};
use thiserror::Error;
use uuid::Uuid;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Domain failure raised by the device collaborator.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No macro is stored on this bank/key combination.
    #[error("no macro stored on bank {bank} key {key:#04x}")]
    EmptySlot { bank: MKey, key: u8 },

    /// A recording session is already open; the hardware records one macro
    /// at a time.
    #[error("a recording session is already in progress")]
    RecordingBusy,

    /// The recording session id is unknown (already finished or never started).
    #[error("unknown recording session {0}")]
    UnknownSession(Uuid),

    /// No profile with this name exists.
    #[error("no such profile: {0}")]
    NoSuchProfile(String),

    /// The device went away mid-operation.
    #[error("device detached")]
    Detached,
}

impl From<DeviceError> for CallError {
    fn from(e: DeviceError) -> Self {
        CallError::new(e.to_string())
    }
}

// ── Types ─────────────────────────────────────────────────────────────────────

/// A stored macro: how often it replays, and its event run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMacro {
    pub repeat: u8,
    pub sequence: MacroSequence,
}

/// Completion event for an asynchronous recording session.
#[derive(Debug)]
pub struct RecordingFinished {
    pub session: Uuid,
    pub result: Result<StoredMacro, DeviceError>,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Opaque device collaborator the services call out to.
///
/// Infrastructure implementations talk to hardware; test implementations
/// record calls and hand back canned data.
pub trait KeyboardDevice: Send + Sync {
    /// Loads the macro stored on `bank`/`key`.
    fn load_macro(&self, bank: MKey, key: u8) -> Result<StoredMacro, DeviceError>;

    /// Stores a macro on `bank`/`key`, replacing any previous one.
    fn store_macro(&self, bank: MKey, key: u8, macro_: StoredMacro) -> Result<(), DeviceError>;

    /// Removes every macro stored on `bank`.
    fn clear_bank(&self, bank: MKey) -> Result<(), DeviceError>;

    /// Starts recording a macro onto `bank`/`key`.  Returns the session id
    /// immediately; the finished macro arrives later as a
    /// [`RecordingFinished`] event.
    fn begin_recording(&self, bank: MKey, key: u8) -> Result<Uuid, DeviceError>;

    /// Current bank selected by the M-keys.
    fn active_bank(&self) -> MKey;

    /// Selects a bank, as if the user pressed the M-key.
    fn set_active_bank(&self, bank: MKey);

    /// Hardware key code currently mapped to `key`.
    fn mapping(&self, key: MKey) -> u16;

    /// Remaps `key` to `code`.
    fn set_mapping(&self, key: MKey, code: u16);

    /// Resets the listed keys to their factory mapping.
    fn reset_mappings(&self, keys: &[MKey]);

    /// Names of all stored profiles.
    fn profiles(&self) -> Vec<String>;

    /// Name of the active profile.
    fn active_profile(&self) -> String;

    /// Activates the named profile.  Returns `false` when it was already
    /// active.
    fn activate_profile(&self, name: &str) -> Result<bool, DeviceError>;
}
