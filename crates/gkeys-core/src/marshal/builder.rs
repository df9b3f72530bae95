//! Outgoing message body construction.
//!
//! One [`ReplyBuilder`] exists per dispatch.  Appends go through it so that a
//! transport-side failure (resource exhaustion, here modeled as a field
//! capacity limit) marks the message **hosed**: every later append fails fast
//! and the partial body is abandoned rather than sent as a half-built frame.

use crate::error::MarshalError;
use crate::message::WireValue;

/// Accumulates the ordered fields of an outgoing reply or signal body.
#[derive(Debug)]
pub struct ReplyBuilder {
    fields: Vec<WireValue>,
    /// Maximum number of fields the transport will accept, if bounded.
    capacity: Option<usize>,
    /// Set on the first failed append; sticky for the builder's lifetime.
    hosed: bool,
}

impl ReplyBuilder {
    /// Builder for an unbounded transport.
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            capacity: None,
            hosed: false,
        }
    }

    /// Builder that refuses appends past `max_fields`, mimicking a transport
    /// that runs out of message space.
    pub fn with_capacity_limit(max_fields: usize) -> Self {
        Self {
            fields: Vec::new(),
            capacity: Some(max_fields),
            hosed: false,
        }
    }

    fn push(&mut self, value: WireValue) -> Result<(), MarshalError> {
        if self.hosed {
            return Err(MarshalError::BuildFailure(
                "message already hosed by an earlier append failure".into(),
            ));
        }
        if let Some(cap) = self.capacity {
            if self.fields.len() >= cap {
                self.hosed = true;
                return Err(MarshalError::BuildFailure(format!(
                    "transport refused field {} (capacity {cap})",
                    self.fields.len() + 1
                )));
            }
        }
        self.fields.push(value);
        Ok(())
    }

    // ── Primitive appends ─────────────────────────────────────────────────────

    pub fn append_bool(&mut self, v: bool) -> Result<(), MarshalError> {
        self.push(WireValue::Bool(v))
    }

    pub fn append_byte(&mut self, v: u8) -> Result<(), MarshalError> {
        self.push(WireValue::Byte(v))
    }

    pub fn append_u16(&mut self, v: u16) -> Result<(), MarshalError> {
        self.push(WireValue::U16(v))
    }

    pub fn append_u32(&mut self, v: u32) -> Result<(), MarshalError> {
        self.push(WireValue::U32(v))
    }

    pub fn append_u64(&mut self, v: u64) -> Result<(), MarshalError> {
        self.push(WireValue::U64(v))
    }

    pub fn append_raw_string(&mut self, v: impl Into<String>) -> Result<(), MarshalError> {
        self.push(WireValue::Str(v.into()))
    }

    pub fn append_string_array(&mut self, v: Vec<String>) -> Result<(), MarshalError> {
        self.push(WireValue::StrArray(v))
    }

    // ── State ─────────────────────────────────────────────────────────────────

    /// True once an append has failed; the body must be abandoned.
    pub fn is_hosed(&self) -> bool {
        self.hosed
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consumes the builder, yielding the finished body.
    ///
    /// Fails if the builder is hosed – a partially constructed body must
    /// never reach the transport.
    pub fn into_body(self) -> Result<Vec<WireValue>, MarshalError> {
        if self.hosed {
            return Err(MarshalError::BuildFailure(
                "abandoning partially built message".into(),
            ));
        }
        Ok(self.fields)
    }
}

impl Default for ReplyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_accumulate_in_order() {
        let mut b = ReplyBuilder::new();
        b.append_byte(1).unwrap();
        b.append_raw_string("x").unwrap();
        b.append_bool(false).unwrap();

        let body = b.into_body().unwrap();
        assert_eq!(
            body,
            vec![
                WireValue::Byte(1),
                WireValue::Str("x".into()),
                WireValue::Bool(false)
            ]
        );
    }

    #[test]
    fn test_append_past_capacity_hoses_builder() {
        // Arrange
        let mut b = ReplyBuilder::with_capacity_limit(1);
        b.append_u32(1).unwrap();

        // Act – this append exceeds the transport's capacity
        let err = b.append_u32(2).unwrap_err();

        // Assert
        assert!(matches!(err, MarshalError::BuildFailure(_)));
        assert!(b.is_hosed());
    }

    #[test]
    fn test_hosed_builder_fails_every_later_append() {
        let mut b = ReplyBuilder::with_capacity_limit(0);
        assert!(b.append_bool(true).is_err());

        // Even appends that would fit keep failing once hosed.
        assert!(matches!(
            b.append_byte(0),
            Err(MarshalError::BuildFailure(_))
        ));
    }

    #[test]
    fn test_hosed_builder_refuses_to_yield_partial_body() {
        let mut b = ReplyBuilder::with_capacity_limit(1);
        b.append_byte(9).unwrap();
        let _ = b.append_byte(10); // hoses

        assert!(matches!(
            b.into_body(),
            Err(MarshalError::BuildFailure(_))
        ));
    }
}
