//! Error taxonomy for the marshaling and dispatch layer.
//!
//! Failure classes and where they surface:
//!
//! - [`MarshalError`] – argument extraction or reply construction failed.
//!   Converted to an error reply for methods, logged and dropped for signals.
//! - [`CallError`] – a domain failure raised by a business callback.  Caught
//!   at the dispatcher boundary; its text becomes the error reply.
//! - [`RegistryError`] – registration-time only; aborts daemon start-up.
//! - [`DispatchError`] – the per-message outcome the connection pump sees.
//!   Only a sink failure while sending the error reply itself is
//!   process-level fatal (the connection is presumed unusable).
//!
//! No failure in this layer is swallowed without at least a log record.

use thiserror::Error;

use crate::message::{BusAddress, SinkError, WireType};

// ── Marshaling ────────────────────────────────────────────────────────────────

/// Failure while extracting arguments from, or appending fields to, a message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarshalError {
    /// A typed getter was invoked with its bucket empty.  Indicates either a
    /// caller/handler argument mismatch or a malformed inbound message.
    #[error("missing argument: no {wanted} value left in this message")]
    MissingArgument { wanted: WireType },

    /// A composite decode ran out of inner fields partway through.  This is
    /// the semantic wrapper for an inner [`MarshalError::MissingArgument`]:
    /// one missing primitive surfaces as one decode error, not a raw
    /// underflow.
    #[error("argument reconstruction failed: truncated {what}")]
    Truncated { what: &'static str },

    /// An enum-encoded byte fell outside the valid ordinal range.
    #[error("{what} out of range: {value} (max {max})")]
    BadEnum {
        what: &'static str,
        value: u8,
        max: u8,
    },

    /// Wire data does not match the expected structure.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Appending to the outgoing message failed.  The message is hosed: no
    /// further field may be appended and the partial body must be abandoned.
    #[error("reply construction failed: {0}")]
    BuildFailure(String),
}

// ── Domain callbacks ──────────────────────────────────────────────────────────

/// A domain-level failure raised by a business callback.
///
/// The text is reused verbatim as the error-reply payload.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CallError(pub String);

impl CallError {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Conventional error for an argument that decoded but made no sense.
    pub fn invalid_args(detail: impl Into<String>) -> Self {
        Self(format!("invalid arguments: {}", detail.into()))
    }
}

impl From<MarshalError> for CallError {
    fn from(e: MarshalError) -> Self {
        Self(e.to_string())
    }
}

// ── Registration ──────────────────────────────────────────────────────────────

/// Registration-time failure; fatal at start-up.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A handler is already registered under this address.  The first
    /// registration is never silently overwritten.
    #[error("duplicate handler registration for {0}")]
    Duplicate(BusAddress),
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Per-message failure reported to the connection pump.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No registered handler matches the inbound address.  For method calls
    /// the transport layer answers the caller; signals are silently dropped
    /// before this error is ever constructed.
    #[error("no handler registered for {0}")]
    HandlerNotFound(BusAddress),

    /// The message is not a method call or signal (a stray reply, or a
    /// message without an address) and cannot be dispatched at all.
    #[error("message is not dispatchable: {0}")]
    Unroutable(&'static str),

    /// The error reply itself could not be sent; the connection is presumed
    /// unusable and the failure is surfaced to the process-level caller.
    #[error("failed to deliver error reply for serial {serial}: {source}")]
    ErrorReplyFailed {
        serial: u32,
        #[source]
        source: SinkError,
    },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::BusSelector;

    #[test]
    fn test_missing_argument_message_names_wanted_type() {
        let e = MarshalError::MissingArgument {
            wanted: WireType::U16,
        };
        assert_eq!(e.to_string(), "missing argument: no uint16 value left in this message");
    }

    #[test]
    fn test_call_error_wraps_marshal_error_text() {
        let inner = MarshalError::Truncated { what: "macro event" };
        let outer: CallError = inner.into();
        assert!(outer.0.contains("macro event"));
    }

    #[test]
    fn test_duplicate_registration_names_address() {
        let addr = BusAddress::new(BusSelector::System, "/p", "i.f", "M");
        let e = RegistryError::Duplicate(addr);
        assert!(e.to_string().contains("i.f.M"));
    }
}
