//! Macro bank operations exposed on `com.gkeys.Macros`.
//!
//! | member          | kind         | in                        | out                      |
//! |-----------------|--------------|---------------------------|--------------------------|
//! | `GetMacro`      | method       | bank, key                 | repeat, events           |
//! | `SetMacro`      | method       | bank, key, repeat, events | –                        |
//! | `ClearBank`     | method       | bank                      | –                        |
//! | `StartRecording`| async method | bank, key                 | session, repeat, events  |
//! | `BankSwitched`  | signal       | bank                      | –                        |
//! | `RecordingAborted` | signal    | reason                    | –                        |
//!
//! `StartRecording` is the asynchronous path: the reply is answered with the
//! session id immediately, held open while the user records, and completed
//! with the captured events when the device reports the session finished.
//! While it is open, other calls on the connection dispatch normally.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gkeys_core::marshal::codec;
use gkeys_core::{
    ArgType, AsyncReplyCompleter, BusAddress, BusSelector, CallError, CallRegistry, Handler,
    Message, RegistryError, ReplyBuilder, ReplySink, SerialCounter,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::device::{KeyboardDevice, RecordingFinished, StoredMacro};

/// Interface every macro-bank member lives on.
pub const INTERFACE: &str = "com.gkeys.Macros";

/// Registers and services the macro-bank operations.
pub struct MacroService {
    device: Arc<dyn KeyboardDevice>,
    selector: BusSelector,
    object_path: String,
    /// Replies held open by `StartRecording`, keyed by session id.
    pending: Arc<Mutex<HashMap<Uuid, AsyncReplyCompleter>>>,
    sink: Arc<dyn ReplySink>,
    serials: Arc<SerialCounter>,
}

impl MacroService {
    pub fn new(
        device: Arc<dyn KeyboardDevice>,
        selector: BusSelector,
        object_path: impl Into<String>,
        sink: Arc<dyn ReplySink>,
        serials: Arc<SerialCounter>,
    ) -> Self {
        Self {
            device,
            selector,
            object_path: object_path.into(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            sink,
            serials,
        }
    }

    fn member(&self, name: &str) -> BusAddress {
        BusAddress::new(self.selector, self.object_path.clone(), INTERFACE, name)
    }

    /// Registers every macro-bank handler.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Duplicate`] if any address is already taken; the
    /// daemon treats this as fatal at start-up.
    pub fn register(&self, registry: &mut CallRegistry) -> Result<(), RegistryError> {
        let device = Arc::clone(&self.device);
        registry.register(Handler::method(
            self.member("GetMacro"),
            vec![ArgType::MKey, ArgType::Byte],
            vec![ArgType::Byte, ArgType::MacroSequence],
            move |args, reply| {
                let bank = args[0]
                    .as_mkey()
                    .ok_or_else(|| CallError::invalid_args("bank"))?;
                let key = args[1]
                    .as_byte()
                    .ok_or_else(|| CallError::invalid_args("key"))?;
                let stored = device.load_macro(bank, key)?;
                reply.append_byte(stored.repeat)?;
                codec::append_macro_sequence(reply, &stored.sequence)?;
                Ok(())
            },
        ))?;

        let device = Arc::clone(&self.device);
        registry.register(Handler::method(
            self.member("SetMacro"),
            vec![ArgType::MKey, ArgType::Byte, ArgType::Byte, ArgType::MacroSequence],
            vec![],
            move |args, _reply| {
                let bank = args[0]
                    .as_mkey()
                    .ok_or_else(|| CallError::invalid_args("bank"))?;
                let key = args[1]
                    .as_byte()
                    .ok_or_else(|| CallError::invalid_args("key"))?;
                let repeat = args[2]
                    .as_byte()
                    .ok_or_else(|| CallError::invalid_args("repeat"))?;
                let sequence = args[3]
                    .as_macro_sequence()
                    .ok_or_else(|| CallError::invalid_args("events"))?
                    .clone();
                device.store_macro(bank, key, StoredMacro { repeat, sequence })?;
                Ok(())
            },
        ))?;

        let device = Arc::clone(&self.device);
        registry.register(Handler::method(
            self.member("ClearBank"),
            vec![ArgType::MKey],
            vec![],
            move |args, _reply| {
                let bank = args[0]
                    .as_mkey()
                    .ok_or_else(|| CallError::invalid_args("bank"))?;
                device.clear_bank(bank)?;
                Ok(())
            },
        ))?;

        let device = Arc::clone(&self.device);
        let pending = Arc::clone(&self.pending);
        registry.register(Handler::async_method(
            self.member("StartRecording"),
            vec![ArgType::MKey, ArgType::Byte],
            vec![ArgType::Str, ArgType::Byte, ArgType::MacroSequence],
            move |args, completer| {
                let bank = args[0]
                    .as_mkey()
                    .ok_or_else(|| CallError::invalid_args("bank"))?;
                let key = args[1]
                    .as_byte()
                    .ok_or_else(|| CallError::invalid_args("key"))?;
                let session = match device.begin_recording(bank, key) {
                    Ok(session) => session,
                    Err(e) => {
                        let text = e.to_string();
                        if let Err(sink_err) = completer.fail(text.clone()) {
                            warn!("could not answer failed StartRecording: {sink_err}");
                        }
                        return Err(CallError::new(text));
                    }
                };
                // Immediate result; the recorded events follow at completion.
                completer.append_string(&session.to_string())?;
                pending
                    .lock()
                    .expect("pending recordings lock poisoned")
                    .insert(session, completer);
                Ok(())
            },
        ))?;

        let device = Arc::clone(&self.device);
        registry.register(Handler::signal(
            self.member("BankSwitched"),
            vec![ArgType::MKey],
            move |args, _| {
                let bank = args[0]
                    .as_mkey()
                    .ok_or_else(|| CallError::invalid_args("bank"))?;
                debug!("bank switched to {bank}");
                device.set_active_bank(bank);
                Ok(())
            },
        ))?;

        // Emitted by this service; registered so discovery lists its shape.
        registry.register(Handler::signal(
            self.member("RecordingAborted"),
            vec![ArgType::Str],
            |args, _| {
                if let Some(reason) = args[0].as_str() {
                    debug!("peer echoed RecordingAborted: {reason}");
                }
                Ok(())
            },
        ))?;

        Ok(())
    }

    /// Number of recording replies currently held open.
    pub fn open_recordings(&self) -> usize {
        self.pending
            .lock()
            .expect("pending recordings lock poisoned")
            .len()
    }

    /// Resolves the open `StartRecording` reply for a finished session.
    ///
    /// Success appends the deferred fields (repeat count and recorded events)
    /// and commits; failure answers the caller with an error reply and
    /// broadcasts `RecordingAborted`.
    pub fn finish_recording(&self, finished: RecordingFinished) {
        let completer = self
            .pending
            .lock()
            .expect("pending recordings lock poisoned")
            .remove(&finished.session);
        let Some(completer) = completer else {
            warn!(
                "recording completion for unknown session {}; ignored",
                finished.session
            );
            return;
        };

        match finished.result {
            Ok(stored) => {
                let appended = completer
                    .append_byte(stored.repeat)
                    .and_then(|_| completer.append_macro_sequence(&stored.sequence));
                if let Err(e) = appended {
                    warn!("could not append recorded macro: {e}");
                }
                if let Err(e) = completer.commit() {
                    error!("could not deliver recording reply: {e}");
                }
            }
            Err(device_err) => {
                let reason = device_err.to_string();
                if let Err(e) = completer.fail(reason.clone()) {
                    error!("could not deliver recording error reply: {e}");
                }
                self.emit_recording_aborted(&reason);
            }
        }
    }

    fn emit_recording_aborted(&self, reason: &str) {
        let mut builder = ReplyBuilder::new();
        let body = codec::append_string_arg(&mut builder, reason).and_then(|_| builder.into_body());
        match body {
            Ok(body) => {
                let signal = Message::signal(self.member("RecordingAborted"), self.serials.next(), body);
                if let Err(e) = self.sink.send(signal) {
                    warn!("could not broadcast RecordingAborted: {e}");
                }
            }
            Err(e) => warn!("could not build RecordingAborted signal: {e}"),
        }
    }
}
