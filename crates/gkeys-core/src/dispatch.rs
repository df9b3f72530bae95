//! The dispatch engine: resolve, extract, invoke, reply.
//!
//! One dispatcher serves one bus connection and processes messages strictly
//! one at a time, in arrival order.  A dispatch moves through the phases
//!
//! ```text
//! Resolving → ExtractingArgs → Invoking → BuildingReply → Sending
//! ```
//!
//! with an error exit from every phase: failures on a method call become an
//! error reply, failures on a signal are logged and dropped.  The invariant
//! enforced on every path – success, extraction failure, invocation failure,
//! build failure – is:
//!
//! - **exactly one** reply (success or error) per method call,
//! - **zero** replies per signal.
//!
//! Staging buffers are created per dispatch and die with it; values a handler
//! leaves unread are logged as a leak before the buffers are discarded.  The
//! only sanctioned way a reply outlives its dispatch is the `AsyncMethod`
//! deferred-completion window, during which further messages may be
//! dispatched while the [`AsyncReplyCompleter`] holds that one reply open.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::completer::AsyncReplyCompleter;
use crate::error::{DispatchError, MarshalError};
use crate::marshal::{ReplyBuilder, ValueBuffers};
use crate::message::{Message, MessageKind, ReplySink, WireValue};
use crate::registry::{extract_args, CallRegistry, Callback, HandlerKind};

// ── Phases ────────────────────────────────────────────────────────────────────

/// Where in the dispatch state machine a failure occurred.  Carried in log
/// records for diagnosis; the machine itself is the straight-line flow of
/// [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchPhase {
    Resolving,
    ExtractingArgs,
    Invoking,
    BuildingReply,
    Sending,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchPhase::Resolving => "resolving",
            DispatchPhase::ExtractingArgs => "extracting arguments",
            DispatchPhase::Invoking => "invoking",
            DispatchPhase::BuildingReply => "building reply",
            DispatchPhase::Sending => "sending",
        };
        f.write_str(name)
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What a single dispatch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A reply – success or error – was sent for a method call.
    Replied,
    /// A signal was processed (or dropped); nothing was sent.
    SignalHandled,
    /// An asynchronous method holds its reply open; a completer will send it.
    Deferred,
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Drives inbound messages through registered handlers and out the sink.
pub struct Dispatcher {
    registry: Arc<CallRegistry>,
    sink: Arc<dyn ReplySink>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CallRegistry>, sink: Arc<dyn ReplySink>) -> Self {
        Self { registry, sink }
    }

    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    /// Dispatches one inbound message.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandlerNotFound`] for an unmatched method call –
    ///   answering the caller is then the transport layer's job.
    /// - [`DispatchError::Unroutable`] for messages that are neither calls
    ///   nor signals.
    /// - [`DispatchError::ErrorReplyFailed`] when even the error reply could
    ///   not be delivered; the connection is presumed unusable.
    pub fn dispatch(&self, message: &Message) -> Result<DispatchOutcome, DispatchError> {
        let is_signal = match message.kind() {
            MessageKind::MethodCall => false,
            MessageKind::Signal => true,
            MessageKind::MethodReturn | MessageKind::Error => {
                return Err(DispatchError::Unroutable("reply kinds are not calls"))
            }
        };
        let address = message
            .address()
            .ok_or(DispatchError::Unroutable("message carries no address"))?;

        // ── Resolving ─────────────────────────────────────────────────────────
        let handler = match self.registry.lookup(address) {
            Some(h) => h,
            None if is_signal => {
                debug!("signal {address} has no listener; dropped");
                return Ok(DispatchOutcome::SignalHandled);
            }
            None => return Err(DispatchError::HandlerNotFound(address.clone())),
        };

        let kind_matches = matches!(
            (message.kind(), handler.kind()),
            (MessageKind::MethodCall, HandlerKind::Method)
                | (MessageKind::MethodCall, HandlerKind::AsyncMethod)
                | (MessageKind::Signal, HandlerKind::Signal)
        );
        if !kind_matches {
            warn!(
                "dispatch of {address} failed during {}: call kind {:?} does not match handler kind {:?}",
                DispatchPhase::Resolving,
                message.kind(),
                handler.kind()
            );
            if is_signal {
                return Ok(DispatchOutcome::SignalHandled);
            }
            return self.send_error_reply(
                message.serial(),
                format!("{}.{} is not callable as a method", address.interface, address.member),
            );
        }

        // ── ExtractingArgs ────────────────────────────────────────────────────
        let mut bufs = ValueBuffers::new();
        bufs.fill_from_message(message);
        let args = match extract_args(&mut bufs, handler.args_in()) {
            Ok(args) => args,
            Err(e) => {
                warn!(
                    "dispatch of {address} failed during {}: {e}",
                    DispatchPhase::ExtractingArgs
                );
                // The business callback is never invoked on a getter failure.
                if is_signal {
                    return Ok(DispatchOutcome::SignalHandled);
                }
                return self.send_error_reply(message.serial(), e.to_string());
            }
        };

        // ── Invoking / BuildingReply / Sending ────────────────────────────────
        let outcome = match (handler.kind(), handler.callback()) {
            (HandlerKind::Signal, Callback::Sync(callback)) => {
                // Signals never produce a reply; a scratch builder absorbs
                // anything the callback appends.
                let mut scratch = ReplyBuilder::new();
                if let Err(e) = callback(&args, &mut scratch) {
                    warn!(
                        "dispatch of {address} failed during {}: {e} (signal; dropped)",
                        DispatchPhase::Invoking
                    );
                }
                Ok(DispatchOutcome::SignalHandled)
            }

            (HandlerKind::Method, Callback::Sync(callback)) => {
                let mut builder = ReplyBuilder::new();
                match callback(&args, &mut builder) {
                    Ok(()) => self.deliver(address, message.serial(), builder.into_body()),
                    Err(e) => {
                        warn!(
                            "dispatch of {address} failed during {}: {e}",
                            DispatchPhase::Invoking
                        );
                        drop(builder);
                        self.send_error_reply(message.serial(), e.to_string())
                    }
                }
            }

            (HandlerKind::AsyncMethod, Callback::Deferred(callback)) => {
                let completer =
                    AsyncReplyCompleter::new(message.serial(), Arc::clone(&self.sink));
                let state = completer.state_handle();
                let result = callback(&args, completer);
                let sent = state.lock().expect("reply state lock poisoned").sent;
                match result {
                    Ok(()) if sent => Ok(DispatchOutcome::Replied),
                    Ok(()) => Ok(DispatchOutcome::Deferred),
                    Err(e) if sent => {
                        // The completer was dropped or failed inside the
                        // callback; its reply already went out.
                        warn!(
                            "dispatch of {address} failed during {}: {e}",
                            DispatchPhase::Invoking
                        );
                        Ok(DispatchOutcome::Replied)
                    }
                    Err(e) => {
                        warn!(
                            "async handler for {address} returned an error while \
                             holding its reply open: {e}"
                        );
                        Ok(DispatchOutcome::Deferred)
                    }
                }
            }

            // Kind/callback pairing is enforced by the Handler constructors;
            // a mismatched pair still answers the caller.
            (_, _) => {
                if is_signal {
                    Ok(DispatchOutcome::SignalHandled)
                } else {
                    self.send_error_reply(
                        message.serial(),
                        "handler callback does not match its declared kind",
                    )
                }
            }
        };

        let residue = bufs.residue();
        if !residue.is_empty() {
            warn!("handler for {address} left unread values: {residue:?}");
            bufs.clear();
        }

        outcome
    }

    /// Sends a finished success reply, downgrading build or send failures to
    /// an error reply so the caller still hears back exactly once.
    fn deliver(
        &self,
        address: &crate::message::BusAddress,
        serial: u32,
        body: Result<Vec<WireValue>, MarshalError>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                // Partial body is already abandoned by `into_body`.
                warn!(
                    "dispatch of {address} failed during {}: {e}",
                    DispatchPhase::BuildingReply
                );
                return self.send_error_reply(serial, e.to_string());
            }
        };
        match self.sink.send(Message::method_return(serial, body)) {
            Ok(()) => Ok(DispatchOutcome::Replied),
            Err(e) => {
                warn!(
                    "dispatch of {address} failed during {}: {e}",
                    DispatchPhase::Sending
                );
                self.send_error_reply(serial, e.to_string())
            }
        }
    }

    fn send_error_reply(
        &self,
        serial: u32,
        text: impl Into<String>,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.sink
            .send(Message::error_reply(serial, text))
            .map(|_| DispatchOutcome::Replied)
            .map_err(|source| DispatchError::ErrorReplyFailed { serial, source })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use crate::message::{BusAddress, BusSelector, SinkError};
    use crate::registry::{ArgType, Handler};
    use std::sync::Mutex;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Records everything sent; can be told to fail all sends.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Message>>,
        fail_sends: Mutex<bool>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<Message> {
            self.sent.lock().unwrap().clone()
        }

        fn set_failing(&self, failing: bool) {
            *self.fail_sends.lock().unwrap() = failing;
        }
    }

    impl ReplySink for RecordingSink {
        fn send(&self, message: Message) -> Result<(), SinkError> {
            if *self.fail_sends.lock().unwrap() {
                return Err(SinkError::Rejected("injected failure".into()));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn addr(member: &str) -> BusAddress {
        BusAddress::new(
            BusSelector::System,
            "/com/gkeys/Keyboard",
            "com.gkeys.Test",
            member,
        )
    }

    fn dispatcher_with(handlers: Vec<Handler>) -> (Dispatcher, Arc<RecordingSink>) {
        let mut registry = CallRegistry::new();
        for h in handlers {
            registry.register(h).unwrap();
        }
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::clone(&sink) as Arc<dyn ReplySink>,
        );
        (dispatcher, sink)
    }

    // ── Method success ────────────────────────────────────────────────────────

    #[test]
    fn test_method_success_sends_one_method_return() {
        // Arrange – an echo method: byte in, byte out
        let handler = Handler::method(
            addr("Echo"),
            vec![ArgType::Byte],
            vec![ArgType::Byte],
            |args, reply| {
                let v = args[0].as_byte().unwrap();
                reply.append_byte(v)?;
                Ok(())
            },
        );
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        // Act
        let outcome = dispatcher
            .dispatch(&Message::method_call(
                addr("Echo"),
                11,
                vec![WireValue::Byte(42)],
            ))
            .unwrap();

        // Assert
        assert_eq!(outcome, DispatchOutcome::Replied);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), MessageKind::MethodReturn);
        assert_eq!(sent[0].serial(), 11);
        assert_eq!(sent[0].body(), &[WireValue::Byte(42)]);
    }

    // ── Exactly-one-reply across failure classes ──────────────────────────────

    #[test]
    fn test_extraction_failure_sends_exactly_one_error_reply() {
        let handler = Handler::method(
            addr("Needy"),
            vec![ArgType::U64],
            vec![],
            |_, _| panic!("callback must not run when extraction fails"),
        );
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        // Call with an empty body: extraction of the u64 fails.
        let outcome = dispatcher
            .dispatch(&Message::method_call(addr("Needy"), 3, vec![]))
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), MessageKind::Error);
        assert_eq!(sent[0].serial(), 3);
    }

    #[test]
    fn test_invocation_failure_sends_exactly_one_error_reply() {
        let handler = Handler::method(addr("Broken"), vec![], vec![], |_, _| {
            Err(CallError::new("bank is empty"))
        });
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        let outcome = dispatcher
            .dispatch(&Message::method_call(addr("Broken"), 5, vec![]))
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), MessageKind::Error);
        assert_eq!(sent[0].body(), &[WireValue::Str("bank is empty".into())]);
    }

    #[test]
    fn test_build_failure_discards_partial_reply_and_sends_error() {
        // The callback hoses its own builder by appending into a sink-side
        // limit; a hosed body must never be sent.
        let handler = Handler::method(addr("Hosed"), vec![], vec![], |_, reply| {
            // Simulate transport refusal partway through.
            *reply = ReplyBuilder::with_capacity_limit(1);
            reply.append_u32(1)?;
            match reply.append_u32(2) {
                Err(_) => Ok(()), // keep going; dispatcher must notice the hosed builder
                Ok(()) => unreachable!(),
            }
        });
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        let outcome = dispatcher
            .dispatch(&Message::method_call(addr("Hosed"), 8, vec![]))
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1, "exactly one reply even on build failure");
        assert_eq!(sent[0].kind(), MessageKind::Error);
    }

    #[test]
    fn test_unsendable_error_reply_surfaces_to_caller() {
        let handler = Handler::method(addr("Broken"), vec![], vec![], |_, _| {
            Err(CallError::new("domain failure"))
        });
        let (dispatcher, sink) = dispatcher_with(vec![handler]);
        sink.set_failing(true);

        let err = dispatcher
            .dispatch(&Message::method_call(addr("Broken"), 9, vec![]))
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::ErrorReplyFailed { serial: 9, .. }
        ));
    }

    // ── Signals ───────────────────────────────────────────────────────────────

    #[test]
    fn test_signal_success_sends_nothing() {
        let hits = Arc::new(Mutex::new(0u32));
        let hits_clone = Arc::clone(&hits);
        let handler = Handler::signal(addr("Blink"), vec![ArgType::Bool], move |args, _| {
            assert_eq!(args[0].as_bool(), Some(true));
            *hits_clone.lock().unwrap() += 1;
            Ok(())
        });
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        let outcome = dispatcher
            .dispatch(&Message::signal(
                addr("Blink"),
                2,
                vec![WireValue::Bool(true)],
            ))
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::SignalHandled);
        assert_eq!(*hits.lock().unwrap(), 1);
        assert!(sink.sent().is_empty(), "signals never produce a reply");
    }

    #[test]
    fn test_signal_failure_sends_nothing() {
        let handler = Handler::signal(addr("Blink"), vec![], |_, _| {
            Err(CallError::new("flaky"))
        });
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        let outcome = dispatcher
            .dispatch(&Message::signal(addr("Blink"), 2, vec![]))
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::SignalHandled);
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_signal_extraction_failure_sends_nothing() {
        let handler = Handler::signal(addr("Blink"), vec![ArgType::U32], |_, _| Ok(()));
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        let outcome = dispatcher
            .dispatch(&Message::signal(addr("Blink"), 2, vec![]))
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::SignalHandled);
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_signal_without_listener_is_dropped() {
        let (dispatcher, sink) = dispatcher_with(vec![]);

        let outcome = dispatcher
            .dispatch(&Message::signal(addr("Nobody"), 2, vec![]))
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::SignalHandled);
        assert!(sink.sent().is_empty());
    }

    // ── Resolution failures ───────────────────────────────────────────────────

    #[test]
    fn test_method_without_handler_is_handler_not_found() {
        let (dispatcher, sink) = dispatcher_with(vec![]);

        let err = dispatcher
            .dispatch(&Message::method_call(addr("Nobody"), 4, vec![]))
            .unwrap_err();

        assert!(matches!(err, DispatchError::HandlerNotFound(_)));
        // Answering the caller is the transport's job, not the core's.
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_stray_reply_is_unroutable() {
        let (dispatcher, _) = dispatcher_with(vec![]);
        let err = dispatcher
            .dispatch(&Message::method_return(1, vec![]))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unroutable(_)));
    }

    #[test]
    fn test_method_call_to_signal_member_gets_error_reply() {
        let handler = Handler::signal(addr("Blink"), vec![], |_, _| Ok(()));
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        let outcome = dispatcher
            .dispatch(&Message::method_call(addr("Blink"), 6, vec![]))
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), MessageKind::Error);
    }

    // ── Ordering contract ─────────────────────────────────────────────────────

    #[test]
    fn test_declared_order_matching_wire_order_recovers_values() {
        // Wire: [byte=5, string-arg "abc", byte=7]; declared (byte, str, byte).
        let handler = Handler::method(
            addr("Ordered"),
            vec![ArgType::Byte, ArgType::Str, ArgType::Byte],
            vec![],
            |args, _| {
                assert_eq!(args[0].as_byte(), Some(5));
                assert_eq!(args[1].as_str(), Some("abc"));
                assert_eq!(args[2].as_byte(), Some(7));
                Ok(())
            },
        );
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        dispatcher
            .dispatch(&Message::method_call(
                addr("Ordered"),
                1,
                vec![
                    WireValue::Byte(5),
                    WireValue::U32(3),
                    WireValue::Str("abc".into()),
                    WireValue::Byte(7),
                ],
            ))
            .unwrap();

        assert_eq!(sink.sent()[0].kind(), MessageKind::MethodReturn);
    }

    #[test]
    fn test_swapped_declared_order_yields_wrong_association_not_failure() {
        // Same wire message, but the handler declares (str, byte, byte).
        // Buckets are per type, so extraction "succeeds" with the right
        // values in the wrong positions.  This documents the caller
        // contract: declared order must equal wire order.
        let handler = Handler::method(
            addr("Misdeclared"),
            vec![ArgType::Str, ArgType::Byte, ArgType::Byte],
            vec![],
            |args, _| {
                assert_eq!(args[0].as_str(), Some("abc"));
                // Position 1 is now the *first* wire byte, not the second.
                assert_eq!(args[1].as_byte(), Some(5));
                assert_eq!(args[2].as_byte(), Some(7));
                Ok(())
            },
        );
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        dispatcher
            .dispatch(&Message::method_call(
                addr("Misdeclared"),
                1,
                vec![
                    WireValue::Byte(5),
                    WireValue::U32(3),
                    WireValue::Str("abc".into()),
                    WireValue::Byte(7),
                ],
            ))
            .unwrap();

        assert_eq!(sink.sent()[0].kind(), MessageKind::MethodReturn);
    }

    // ── Async methods ─────────────────────────────────────────────────────────

    #[test]
    fn test_async_method_reply_held_open_until_commit() {
        // The handler appends an immediate field and parks the completer.
        let parked: Arc<Mutex<Option<AsyncReplyCompleter>>> = Arc::new(Mutex::new(None));
        let parked_clone = Arc::clone(&parked);
        let handler = Handler::async_method(
            addr("Record"),
            vec![],
            vec![ArgType::U32],
            move |_, completer| {
                completer.append_u32(1)?;
                *parked_clone.lock().unwrap() = Some(completer);
                Ok(())
            },
        );
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        // Act – dispatch; the reply must not have been sent yet.
        let outcome = dispatcher
            .dispatch(&Message::method_call(addr("Record"), 21, vec![]))
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Deferred);
        assert!(sink.sent().is_empty(), "reply is held open");

        // Complete later with a deferred field.
        let completer = parked.lock().unwrap().take().unwrap();
        completer.append_u32(2).unwrap();
        completer.commit().unwrap();

        let sent = sink.sent();
        assert_eq!(sent.len(), 1, "sent exactly once, after commit");
        assert_eq!(sent[0].serial(), 21);
        assert_eq!(sent[0].body(), &[WireValue::U32(1), WireValue::U32(2)]);
    }

    #[test]
    fn test_async_method_interleaved_dispatch_during_open_window() {
        let parked: Arc<Mutex<Option<AsyncReplyCompleter>>> = Arc::new(Mutex::new(None));
        let parked_clone = Arc::clone(&parked);
        let async_handler = Handler::async_method(
            addr("Record"),
            vec![],
            vec![ArgType::U32],
            move |_, completer| {
                completer.append_u32(100)?;
                *parked_clone.lock().unwrap() = Some(completer);
                Ok(())
            },
        );
        let sync_handler = Handler::method(addr("Ping"), vec![], vec![], |_, reply| {
            reply.append_bool(true)?;
            Ok(())
        });
        let (dispatcher, sink) = dispatcher_with(vec![async_handler, sync_handler]);

        // First call opens the async window.
        dispatcher
            .dispatch(&Message::method_call(addr("Record"), 31, vec![]))
            .unwrap();
        // A second, unrelated dispatch proceeds on the same connection.
        dispatcher
            .dispatch(&Message::method_call(addr("Ping"), 32, vec![]))
            .unwrap();

        // Now complete the first call.
        let completer = parked.lock().unwrap().take().unwrap();
        completer.append_u32(200).unwrap();
        completer.commit().unwrap();

        let sent = sink.sent();
        assert_eq!(sent.len(), 2);
        // The interleaved ping replied first; the async reply came last,
        // carrying both the immediate and the deferred field.
        assert_eq!(sent[0].serial(), 32);
        assert_eq!(sent[1].serial(), 31);
        assert_eq!(sent[1].body(), &[WireValue::U32(100), WireValue::U32(200)]);
    }

    #[test]
    fn test_async_handler_failure_via_fail_sends_single_error_reply() {
        let handler = Handler::async_method(
            addr("Record"),
            vec![],
            vec![ArgType::U32],
            |_, completer| {
                completer.append_u32(1)?;
                completer
                    .fail("device went away")
                    .map_err(|e| CallError::new(e.to_string()))?;
                Err(CallError::new("device went away"))
            },
        );
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        let outcome = dispatcher
            .dispatch(&Message::method_call(addr("Record"), 41, vec![]))
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), MessageKind::Error);
        assert_eq!(
            sent[0].body(),
            &[WireValue::Str("device went away".into())]
        );
    }

    #[test]
    fn test_async_handler_dropping_completer_still_answers_caller() {
        let handler = Handler::async_method(
            addr("Record"),
            vec![],
            vec![],
            |_, completer| {
                drop(completer);
                Ok(())
            },
        );
        let (dispatcher, sink) = dispatcher_with(vec![handler]);

        let outcome = dispatcher
            .dispatch(&Message::method_call(addr("Record"), 51, vec![]))
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), MessageKind::Error);
    }
}
