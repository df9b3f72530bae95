//! Call registry: bus addresses mapped to typed handlers.
//!
//! A [`Handler`] replaces what would otherwise be a hierarchy of per-signature
//! classes with one value: a declared argument shape, an event kind, and a
//! tagged callback slot.  The dispatcher extracts arguments *for* the handler
//! (in declared order) and hands the typed values to the callback, so business
//! code never touches the staging buffers directly.
//!
//! The registry is populated once at daemon start-up and is effectively
//! immutable afterwards: single writer at registration time, many readers at
//! dispatch time, shared behind an `Arc` with no per-call locking.

use std::collections::HashMap;
use std::fmt;

use crate::completer::AsyncReplyCompleter;
use crate::error::{CallError, MarshalError, RegistryError};
use crate::keys::{MKey, MacroSequence};
use crate::marshal::codec;
use crate::marshal::{ReplyBuilder, ValueBuffers};
use crate::message::BusAddress;

// ── Argument shapes ───────────────────────────────────────────────────────────

/// Declared type of a single handler argument (inbound or outbound).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Bool,
    Byte,
    U16,
    U32,
    U64,
    /// Length-prefixed string argument.
    Str,
    StrArray,
    MKey,
    MKeyArray,
    /// Self-delimited macro event run; only meaningful as a trailing
    /// argument, since extraction drains the remaining event fields.
    MacroSequence,
}

impl ArgType {
    /// Type code emitted into discovery documents.
    pub fn type_code(&self) -> &'static str {
        match self {
            ArgType::Bool => "b",
            ArgType::Byte => "y",
            ArgType::U16 => "q",
            ArgType::U32 => "u",
            ArgType::U64 => "t",
            ArgType::Str => "s",
            ArgType::StrArray => "as",
            ArgType::MKey => "y",
            ArgType::MKeyArray => "ay",
            ArgType::MacroSequence => "a(yyq)",
        }
    }

    /// Extracts one argument of this type from the staging buffers.
    pub fn extract(self, bufs: &mut ValueBuffers) -> Result<Arg, MarshalError> {
        Ok(match self {
            ArgType::Bool => Arg::Bool(bufs.next_bool()?),
            ArgType::Byte => Arg::Byte(bufs.next_byte()?),
            ArgType::U16 => Arg::U16(bufs.next_u16()?),
            ArgType::U32 => Arg::U32(bufs.next_u32()?),
            ArgType::U64 => Arg::U64(bufs.next_u64()?),
            ArgType::Str => Arg::Str(codec::next_string_arg(bufs)?),
            ArgType::StrArray => Arg::StrArray(bufs.next_string_array()?),
            ArgType::MKey => Arg::MKey(codec::next_mkey(bufs)?),
            ArgType::MKeyArray => Arg::MKeyArray(codec::next_mkey_array(bufs)?),
            ArgType::MacroSequence => {
                Arg::MacroSequence(codec::next_macro_sequence(bufs, None)?)
            }
        })
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_code())
    }
}

/// One extracted argument value, tagged by its declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Bool(bool),
    Byte(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Str(String),
    StrArray(Vec<String>),
    MKey(MKey),
    MKeyArray(Vec<MKey>),
    MacroSequence(MacroSequence),
}

impl Arg {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Arg::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<u8> {
        match self {
            Arg::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Arg::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Arg::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Arg::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str_array(&self) -> Option<&[String]> {
        match self {
            Arg::StrArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_mkey(&self) -> Option<MKey> {
        match self {
            Arg::MKey(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_mkey_array(&self) -> Option<&[MKey]> {
        match self {
            Arg::MKeyArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_macro_sequence(&self) -> Option<&MacroSequence> {
        match self {
            Arg::MacroSequence(v) => Some(v),
            _ => None,
        }
    }
}

/// Extracts a full argument list in the handler's declared order.
///
/// The declared order is part of the handler's contract: it must match the
/// wire order of the call.  Extraction stops at the first failure; the
/// handler callback is never invoked with a partial list.
pub fn extract_args(
    bufs: &mut ValueBuffers,
    shape: &[ArgType],
) -> Result<Vec<Arg>, MarshalError> {
    shape.iter().map(|t| t.extract(bufs)).collect()
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// Dispatch kind of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Synchronous call: exactly one reply, sent before the next dispatch.
    Method,
    /// One-way notification: never replied to, success or failure.
    Signal,
    /// Call whose reply is held open and completed later through an
    /// [`AsyncReplyCompleter`].
    AsyncMethod,
}

/// Synchronous business callback: typed arguments in, reply fields out.
pub type SyncCallback =
    Box<dyn Fn(&[Arg], &mut ReplyBuilder) -> Result<(), CallError> + Send + Sync>;

/// Deferred business callback: receives the completer and may hold the reply
/// open past its own return.  Returning `Err` without having committed means
/// the dispatcher (or the completer's drop guard) answers with an error reply.
pub type DeferredCallback =
    Box<dyn Fn(&[Arg], AsyncReplyCompleter) -> Result<(), CallError> + Send + Sync>;

/// The tagged callback slot of a handler.
pub enum Callback {
    Sync(SyncCallback),
    Deferred(DeferredCallback),
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Sync(_) => f.write_str("Callback::Sync"),
            Callback::Deferred(_) => f.write_str("Callback::Deferred"),
        }
    }
}

/// A registered operation: identity, declared shape, kind, and callback.
///
/// Created at service start-up, immutable thereafter, destroyed by
/// [`CallRegistry::unregister_all`] at shutdown.
#[derive(Debug)]
pub struct Handler {
    address: BusAddress,
    args_in: Vec<ArgType>,
    args_out: Vec<ArgType>,
    kind: HandlerKind,
    introspectable: bool,
    callback: Callback,
}

impl Handler {
    /// A synchronous method handler.
    pub fn method<F>(
        address: BusAddress,
        args_in: Vec<ArgType>,
        args_out: Vec<ArgType>,
        callback: F,
    ) -> Self
    where
        F: Fn(&[Arg], &mut ReplyBuilder) -> Result<(), CallError> + Send + Sync + 'static,
    {
        Self {
            address,
            args_in,
            args_out,
            kind: HandlerKind::Method,
            introspectable: true,
            callback: Callback::Sync(Box::new(callback)),
        }
    }

    /// A signal handler: no reply, no outbound arguments.
    pub fn signal<F>(address: BusAddress, args_in: Vec<ArgType>, callback: F) -> Self
    where
        F: Fn(&[Arg], &mut ReplyBuilder) -> Result<(), CallError> + Send + Sync + 'static,
    {
        Self {
            address,
            args_in,
            args_out: Vec::new(),
            kind: HandlerKind::Signal,
            introspectable: true,
            callback: Callback::Sync(Box::new(callback)),
        }
    }

    /// An asynchronous method handler completed through the completer.
    pub fn async_method<F>(
        address: BusAddress,
        args_in: Vec<ArgType>,
        args_out: Vec<ArgType>,
        callback: F,
    ) -> Self
    where
        F: Fn(&[Arg], AsyncReplyCompleter) -> Result<(), CallError> + Send + Sync + 'static,
    {
        Self {
            address,
            args_in,
            args_out,
            kind: HandlerKind::AsyncMethod,
            introspectable: true,
            callback: Callback::Deferred(Box::new(callback)),
        }
    }

    /// Excludes this handler from discovery documents.
    pub fn hidden(mut self) -> Self {
        self.introspectable = false;
        self
    }

    pub fn address(&self) -> &BusAddress {
        &self.address
    }

    pub fn args_in(&self) -> &[ArgType] {
        &self.args_in
    }

    pub fn args_out(&self) -> &[ArgType] {
        &self.args_out
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    pub fn is_introspectable(&self) -> bool {
        self.introspectable
    }

    pub fn callback(&self) -> &Callback {
        &self.callback
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Lookup table from bus address to handler.
///
/// Handlers are owned by the registry itself; registration moves the handler
/// in, there is no per-handler ownership transfer afterwards.
#[derive(Debug, Default)]
pub struct CallRegistry {
    handlers: HashMap<BusAddress, Handler>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its address.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Duplicate`] if the address is already registered;
    /// the existing handler is left untouched.
    pub fn register(&mut self, handler: Handler) -> Result<(), RegistryError> {
        let address = handler.address.clone();
        if self.handlers.contains_key(&address) {
            return Err(RegistryError::Duplicate(address));
        }
        self.handlers.insert(address, handler);
        Ok(())
    }

    /// Exact-match lookup; no wildcard or prefix matching.
    pub fn lookup(&self, address: &BusAddress) -> Option<&Handler> {
        self.handlers.get(address)
    }

    /// Releases every handler.  Called once at process shutdown.
    pub fn unregister_all(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// All registered handlers, in no particular order.
    pub fn handlers(&self) -> impl Iterator<Item = &Handler> {
        self.handlers.values()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
