//! Simulated keyboard device.
//!
//! Implements the [`KeyboardDevice`] seam entirely in memory so the daemon
//! runs (and is tested) without a physical device or USB stack.

use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use gkeys_core::{MKey, MacroEvent, MacroEventKind, MacroSequence};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::device::{
    DeviceError, KeyboardDevice, RecordingFinished, StoredMacro,
};

/// Factory mapping applied to keys that were never remapped.
const DEFAULT_MAPPING: u16 = 0x0000;

#[derive(Debug)]
struct SimulatedState {
    macros: HashMap<(MKey, u8), StoredMacro>,
    mappings: HashMap<MKey, u16>,
    active_bank: MKey,
    profiles: Vec<String>,
    active_profile: usize,
    recording: Option<Uuid>,
}

/// In-memory stand-in for the USB keyboard.
///
/// With `auto_complete` enabled, every recording session finishes on its own
/// after a short delay with a canned two-event macro – enough for the daemon
/// binary to demonstrate the full async reply path.  Tests disable it and
/// drive [`SimulatedKeyboard::complete_recording`] by hand.
pub struct SimulatedKeyboard {
    state: Mutex<SimulatedState>,
    events: UnboundedSender<RecordingFinished>,
    auto_complete: bool,
}

impl SimulatedKeyboard {
    pub fn new(
        profiles: Vec<String>,
        active_profile: String,
        events: UnboundedSender<RecordingFinished>,
        auto_complete: bool,
    ) -> Self {
        let active_index = profiles
            .iter()
            .position(|p| *p == active_profile)
            .unwrap_or(0);
        Self {
            state: Mutex::new(SimulatedState {
                macros: HashMap::new(),
                mappings: HashMap::new(),
                active_bank: MKey::M1,
                profiles,
                active_profile: active_index,
                recording: None,
            }),
            events,
            auto_complete,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        self.state.lock().expect("device state lock poisoned")
    }

    /// Session id of the open recording, if any.
    pub fn open_recording(&self) -> Option<Uuid> {
        self.lock().recording
    }

    /// Finishes the open recording session with `result`.
    ///
    /// The event is queued for the daemon's completion pump; the caller does
    /// not touch the open reply directly.
    pub fn complete_recording(
        &self,
        session: Uuid,
        result: Result<StoredMacro, DeviceError>,
    ) -> Result<(), DeviceError> {
        {
            let mut state = self.lock();
            match state.recording {
                Some(open) if open == session => state.recording = None,
                _ => return Err(DeviceError::UnknownSession(session)),
            }
        }
        if self.events.send(RecordingFinished { session, result }).is_err() {
            warn!("recording completion dropped: event channel closed");
        }
        Ok(())
    }
}

impl KeyboardDevice for SimulatedKeyboard {
    fn load_macro(&self, bank: MKey, key: u8) -> Result<StoredMacro, DeviceError> {
        self.lock()
            .macros
            .get(&(bank, key))
            .cloned()
            .ok_or(DeviceError::EmptySlot { bank, key })
    }

    fn store_macro(&self, bank: MKey, key: u8, macro_: StoredMacro) -> Result<(), DeviceError> {
        self.lock().macros.insert((bank, key), macro_);
        Ok(())
    }

    fn clear_bank(&self, bank: MKey) -> Result<(), DeviceError> {
        self.lock().macros.retain(|(b, _), _| *b != bank);
        Ok(())
    }

    fn begin_recording(&self, bank: MKey, key: u8) -> Result<Uuid, DeviceError> {
        let session = {
            let mut state = self.lock();
            if state.recording.is_some() {
                return Err(DeviceError::RecordingBusy);
            }
            let session = Uuid::new_v4();
            state.recording = Some(session);
            session
        };
        debug!("recording session {session} opened on bank {bank} key {key:#04x}");

        if self.auto_complete {
            // Pretend the user typed a short macro and released MR.
            let events = self.events.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                let canned = StoredMacro {
                    repeat: 1,
                    sequence: MacroSequence::new(vec![
                        MacroEvent::new(key, MacroEventKind::KeyDown, 40),
                        MacroEvent::new(key, MacroEventKind::KeyUp, 0),
                    ]),
                };
                if events
                    .send(RecordingFinished {
                        session,
                        result: Ok(canned),
                    })
                    .is_err()
                {
                    warn!("recording completion dropped: event channel closed");
                }
            });
            // The auto-completed session is no longer open on the device.
            self.lock().recording = None;
        }
        Ok(session)
    }

    fn active_bank(&self) -> MKey {
        self.lock().active_bank
    }

    fn set_active_bank(&self, bank: MKey) {
        self.lock().active_bank = bank;
    }

    fn mapping(&self, key: MKey) -> u16 {
        self.lock()
            .mappings
            .get(&key)
            .copied()
            .unwrap_or(DEFAULT_MAPPING)
    }

    fn set_mapping(&self, key: MKey, code: u16) {
        self.lock().mappings.insert(key, code);
    }

    fn reset_mappings(&self, keys: &[MKey]) {
        let mut state = self.lock();
        for key in keys {
            state.mappings.remove(key);
        }
    }

    fn profiles(&self) -> Vec<String> {
        self.lock().profiles.clone()
    }

    fn active_profile(&self) -> String {
        let state = self.lock();
        state
            .profiles
            .get(state.active_profile)
            .cloned()
            .unwrap_or_default()
    }

    fn activate_profile(&self, name: &str) -> Result<bool, DeviceError> {
        let mut state = self.lock();
        let index = state
            .profiles
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| DeviceError::NoSuchProfile(name.to_string()))?;
        if index == state.active_profile {
            return Ok(false);
        }
        state.active_profile = index;
        Ok(true)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
