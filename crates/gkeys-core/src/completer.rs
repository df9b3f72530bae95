//! Deferred completion of asynchronous method replies.
//!
//! An [`AsyncReplyCompleter`] is handed to an `AsyncMethod` callback in place
//! of a plain reply builder.  The callback appends its immediate result,
//! stashes the completer wherever the deferred work lives, and returns; other
//! messages may be dispatched on the same connection while the reply is held
//! open.  When the deferred values arrive, the holder appends them and calls
//! [`AsyncReplyCompleter::commit`].
//!
//! # Why `commit(self)` takes ownership
//!
//! The contract is "at most one commit, no appends after commit".  Instead
//! of runtime flags, `commit` and `fail` consume the completer, so both
//! misuses are unrepresentable: after `completer.commit()` the value is
//! gone and there is nothing left to append to.
//!
//! Dropping a completer that was never committed sends an error reply, so the
//! exactly-one-reply invariant holds even when a handler abandons its call.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, warn};

use crate::error::MarshalError;
use crate::keys::MacroSequence;
use crate::marshal::codec;
use crate::marshal::ReplyBuilder;
use crate::message::{Message, ReplySink, SinkError};

/// Shared state of one open reply.  The dispatcher keeps a handle to observe
/// whether the reply has been sent after the callback returns.
#[derive(Debug)]
pub(crate) struct ReplyState {
    /// The open reply body; taken on commit/fail/abandon.
    pub(crate) builder: Option<ReplyBuilder>,
    /// True once any reply (success or error) has gone to the sink.
    pub(crate) sent: bool,
}

/// Handle to an open, not-yet-sent asynchronous method reply.
pub struct AsyncReplyCompleter {
    state: Arc<Mutex<ReplyState>>,
    serial: u32,
    sink: Arc<dyn ReplySink>,
    /// Set by commit/fail so the drop guard stays quiet.
    finished: bool,
}

impl AsyncReplyCompleter {
    pub(crate) fn new(serial: u32, sink: Arc<dyn ReplySink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReplyState {
                builder: Some(ReplyBuilder::new()),
                sent: false,
            })),
            serial,
            sink,
            finished: false,
        }
    }

    pub(crate) fn state_handle(&self) -> Arc<Mutex<ReplyState>> {
        Arc::clone(&self.state)
    }

    /// Serial of the call this reply answers.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    fn lock(&self) -> MutexGuard<'_, ReplyState> {
        self.state.lock().expect("reply state lock poisoned")
    }

    fn append_with(
        &self,
        f: impl FnOnce(&mut ReplyBuilder) -> Result<(), MarshalError>,
    ) -> Result<(), MarshalError> {
        let mut state = self.lock();
        match state.builder.as_mut() {
            Some(builder) => f(builder),
            None => Err(MarshalError::BuildFailure(
                "reply is no longer open".into(),
            )),
        }
    }

    // ── Appends (delegating to the argument codec) ────────────────────────────

    pub fn append_bool(&self, v: bool) -> Result<(), MarshalError> {
        self.append_with(|b| b.append_bool(v))
    }

    pub fn append_byte(&self, v: u8) -> Result<(), MarshalError> {
        self.append_with(|b| b.append_byte(v))
    }

    pub fn append_u16(&self, v: u16) -> Result<(), MarshalError> {
        self.append_with(|b| b.append_u16(v))
    }

    pub fn append_u32(&self, v: u32) -> Result<(), MarshalError> {
        self.append_with(|b| b.append_u32(v))
    }

    pub fn append_u64(&self, v: u64) -> Result<(), MarshalError> {
        self.append_with(|b| b.append_u64(v))
    }

    /// Appends a length-prefixed string argument.
    pub fn append_string(&self, v: &str) -> Result<(), MarshalError> {
        self.append_with(|b| codec::append_string_arg(b, v))
    }

    pub fn append_string_array(&self, v: Vec<String>) -> Result<(), MarshalError> {
        self.append_with(|b| b.append_string_array(v))
    }

    pub fn append_macro_sequence(&self, seq: &MacroSequence) -> Result<(), MarshalError> {
        self.append_with(|b| codec::append_macro_sequence(b, seq))
    }

    // ── Completion ────────────────────────────────────────────────────────────

    /// Sends the reply.  Consumes the completer: there is no second commit
    /// and no append-after-commit.
    ///
    /// A hosed body is discarded and an error reply is sent in its place.
    ///
    /// # Errors
    ///
    /// [`SinkError`] only when even the error reply could not be delivered;
    /// the connection is then presumed unusable.
    pub fn commit(mut self) -> Result<(), SinkError> {
        self.finished = true;
        let (serial, body_result) = {
            let mut state = self.lock();
            if state.sent {
                // Unreachable through public API; guarded for the drop path.
                return Ok(());
            }
            let builder = state.builder.take();
            state.sent = true;
            match builder {
                Some(b) => (self.serial, b.into_body()),
                None => (
                    self.serial,
                    Err(MarshalError::BuildFailure("reply is no longer open".into())),
                ),
            }
        };
        match body_result {
            Ok(body) => self.sink.send(Message::method_return(serial, body)),
            Err(e) => {
                warn!("discarding hosed deferred reply for serial {serial}: {e}");
                self.sink.send(Message::error_reply(serial, e.to_string()))
            }
        }
    }

    /// Abandons the partial result and answers the call with an error reply
    /// carrying `text`.  Consumes the completer.
    pub fn fail(mut self, text: impl Into<String>) -> Result<(), SinkError> {
        self.finished = true;
        {
            let mut state = self.lock();
            if state.sent {
                return Ok(());
            }
            state.builder = None;
            state.sent = true;
        }
        self.sink
            .send(Message::error_reply(self.serial, text.into()))
    }
}

impl Drop for AsyncReplyCompleter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let abandoned = {
            let mut state = self.lock();
            if state.sent {
                false
            } else {
                state.builder = None;
                state.sent = true;
                true
            }
        };
        if abandoned {
            error!(
                "async reply for serial {} dropped without commit; sending error reply",
                self.serial
            );
            if let Err(e) = self
                .sink
                .send(Message::error_reply(self.serial, "reply abandoned before commit"))
            {
                warn!("could not deliver abandonment error reply: {e}");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
