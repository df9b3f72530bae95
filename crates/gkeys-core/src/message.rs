//! Bus message boundary types.
//!
//! The core never touches the host bus wire format (framing, auth, routing
//! belong to the bus implementation).  What it sees is an ordered sequence of
//! typed fields plus address metadata and a correlation serial:
//!
//! ```text
//! Message = kind + address + serial + [field, field, ...]
//! ```
//!
//! Seven primitive field types exist on the wire; every domain composite
//! (M-key identifiers, macro sequences) is encoded purely in terms of these.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

// ── Wire primitive types ──────────────────────────────────────────────────────

/// A single typed field inside a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    Bool(bool),
    Byte(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Str(String),
    StrArray(Vec<String>),
}

/// The primitive type of a wire field, without its value.
///
/// Used for bucket classification during extraction and for the type codes
/// emitted into discovery documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Bool,
    Byte,
    U16,
    U32,
    U64,
    Str,
    StrArray,
}

impl WireValue {
    /// Returns the primitive type of this field.
    pub fn wire_type(&self) -> WireType {
        match self {
            WireValue::Bool(_) => WireType::Bool,
            WireValue::Byte(_) => WireType::Byte,
            WireValue::U16(_) => WireType::U16,
            WireValue::U32(_) => WireType::U32,
            WireValue::U64(_) => WireType::U64,
            WireValue::Str(_) => WireType::Str,
            WireValue::StrArray(_) => WireType::StrArray,
        }
    }
}

impl WireType {
    /// Single-character (or `as`) type code used in discovery documents.
    pub fn type_code(&self) -> &'static str {
        match self {
            WireType::Bool => "b",
            WireType::Byte => "y",
            WireType::U16 => "q",
            WireType::U32 => "u",
            WireType::U64 => "t",
            WireType::Str => "s",
            WireType::StrArray => "as",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Bool => "bool",
            WireType::Byte => "byte",
            WireType::U16 => "uint16",
            WireType::U32 => "uint32",
            WireType::U64 => "uint64",
            WireType::Str => "string",
            WireType::StrArray => "string-array",
        };
        f.write_str(name)
    }
}

// ── Addressing ────────────────────────────────────────────────────────────────

/// Which host bus an address lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusSelector {
    /// The system-wide bus (daemon services).
    System,
    /// The per-login-session bus.
    Session,
}

impl fmt::Display for BusSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusSelector::System => f.write_str("system"),
            BusSelector::Session => f.write_str("session"),
        }
    }
}

/// Full address of a callable member: bus, object path, interface, member.
///
/// This is the identity of a registered handler.  Lookup during dispatch is
/// exact-match only; there is no wildcard or prefix matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusAddress {
    pub selector: BusSelector,
    pub path: String,
    pub interface: String,
    pub member: String,
}

impl BusAddress {
    pub fn new(
        selector: BusSelector,
        path: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            selector,
            path: path.into(),
            interface: interface.into(),
            member: member.into(),
        }
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}.{}",
            self.selector, self.path, self.interface, self.member
        )
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// The call kind carried in a message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A call expecting exactly one reply (success or error).
    MethodCall,
    /// The success reply to a method call.
    MethodReturn,
    /// A one-way notification; never replied to.
    Signal,
    /// The error reply to a method call.
    Error,
}

/// One bus message: kind, target address, correlation serial, ordered body.
///
/// For calls and signals the serial is assigned by the sender; for replies it
/// is the serial of the call being answered.  Replies carry no address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    address: Option<BusAddress>,
    serial: u32,
    body: Vec<WireValue>,
}

impl Message {
    /// Builds a method call addressed to `address`.
    pub fn method_call(address: BusAddress, serial: u32, body: Vec<WireValue>) -> Self {
        Self {
            kind: MessageKind::MethodCall,
            address: Some(address),
            serial,
            body,
        }
    }

    /// Builds a one-way signal addressed to `address`.
    pub fn signal(address: BusAddress, serial: u32, body: Vec<WireValue>) -> Self {
        Self {
            kind: MessageKind::Signal,
            address: Some(address),
            serial,
            body,
        }
    }

    /// Builds the success reply to the call with serial `reply_serial`.
    pub fn method_return(reply_serial: u32, body: Vec<WireValue>) -> Self {
        Self {
            kind: MessageKind::MethodReturn,
            address: None,
            serial: reply_serial,
            body,
        }
    }

    /// Builds the error reply to the call with serial `reply_serial`.
    ///
    /// The error text travels as a single plain string field; it is a
    /// transport-level diagnostic, not a marshaled argument.
    pub fn error_reply(reply_serial: u32, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            address: None,
            serial: reply_serial,
            body: vec![WireValue::Str(text.into())],
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The target address; `None` for replies.
    pub fn address(&self) -> Option<&BusAddress> {
        self.address.as_ref()
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Ordered read cursor over the body fields, in wire order.
    pub fn fields(&self) -> impl Iterator<Item = &WireValue> {
        self.body.iter()
    }

    pub fn body(&self) -> &[WireValue] {
        &self.body
    }
}

// ── Reply sink ────────────────────────────────────────────────────────────────

/// Error raised when the bus transport refuses an outgoing message.
///
/// Every sink failure is fatal to the message being sent, never to the
/// process; the dispatcher converts it into an error reply where one is
/// still possible.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The transport rejected the message (resource exhaustion or the like).
    #[error("bus transport rejected message: {0}")]
    Rejected(String),
    /// The connection is gone; nothing further can be sent.
    #[error("bus connection closed")]
    Closed,
}

/// Outgoing half of a bus connection.
///
/// The dispatcher and async-reply completers send replies and signals
/// through this seam; the daemon's connection pump supplies the concrete
/// implementation.
pub trait ReplySink: Send + Sync {
    fn send(&self, message: Message) -> Result<(), SinkError>;
}

// ── Serial counter ────────────────────────────────────────────────────────────

/// Thread-safe, monotonically increasing counter for message serials.
///
/// Serials start at 1 (serial 0 is reserved as "no correlation") and wrap
/// around without panicking.
pub struct SerialCounter {
    inner: AtomicU32,
}

impl SerialCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(1),
        }
    }

    /// Returns the next serial and atomically advances the counter.
    ///
    /// `Ordering::Relaxed` suffices: serials only correlate replies to calls,
    /// they are not used for memory synchronisation.
    pub fn next(&self) -> u32 {
        loop {
            let serial = self.inner.fetch_add(1, Ordering::Relaxed);
            // Skip 0 on wrap-around.
            if serial != 0 {
                return serial;
            }
        }
    }
}

impl Default for SerialCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
