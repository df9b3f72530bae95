//! # gkeys-core
//!
//! Typed bus marshaling and dispatch for the GKeys daemon: the layer that
//! turns untyped bus messages into typed handler invocations and typed
//! results back into replies.
//!
//! This crate has zero dependencies on OS APIs, USB, or a real bus
//! connection.  It is used by the daemon and by tests alike.
//!
//! The pieces, leaves first:
//!
//! - **`message`** – The bus boundary: wire values, addresses, message kinds,
//!   the [`ReplySink`] seam the transport implements, and serial numbering.
//!
//! - **`marshal`** – Per-type staging buffers filled from one in-flight
//!   message, the reply builder with its "hosed message" contract, and the
//!   composite codecs (M-keys, macro events, sequences) assembled purely
//!   from primitive getters and appenders.
//!
//! - **`keys`** – The domain composites themselves: M-key identifiers,
//!   macro events, macro sequences.
//!
//! - **`registry`** – Bus addresses mapped to typed handlers; write-once at
//!   start-up, read-only at dispatch time.
//!
//! - **`dispatch`** – The per-message state machine: resolve, extract in
//!   declared order, invoke, reply.  Exactly one reply per method call,
//!   none per signal, on every code path.
//!
//! - **`completer`** – Deferred completion of asynchronous method replies.
//!
//! - **`introspect`** – Discovery documents derived from registry state.

pub mod completer;
pub mod dispatch;
pub mod error;
pub mod introspect;
pub mod keys;
pub mod marshal;
pub mod message;
pub mod registry;

pub use completer::AsyncReplyCompleter;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{CallError, DispatchError, MarshalError, RegistryError};
pub use keys::{MKey, MacroEvent, MacroEventKind, MacroSequence};
pub use marshal::{ReplyBuilder, ValueBuffers};
pub use message::{
    BusAddress, BusSelector, Message, MessageKind, ReplySink, SerialCounter, SinkError, WireType,
    WireValue,
};
pub use registry::{Arg, ArgType, CallRegistry, Handler, HandlerKind};
