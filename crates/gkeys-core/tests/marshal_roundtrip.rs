//! Integration tests exercising the public marshaling API end-to-end:
//! append values through a builder, carry them in a message, extract them
//! through dispatch-style staging buffers.

use gkeys_core::marshal::codec;
use gkeys_core::{
    BusAddress, BusSelector, MKey, MacroEvent, MacroEventKind, MacroSequence, MarshalError,
    Message, ReplyBuilder, ValueBuffers, WireType,
};

fn carry(builder: ReplyBuilder) -> ValueBuffers {
    let addr = BusAddress::new(
        BusSelector::System,
        "/com/gkeys/Keyboard",
        "com.gkeys.Test",
        "Carry",
    );
    let msg = Message::method_call(addr, 1, builder.into_body().expect("body must build"));
    let mut bufs = ValueBuffers::new();
    bufs.fill_from_message(&msg);
    bufs
}

#[test]
fn test_every_primitive_round_trips() {
    let mut b = ReplyBuilder::new();
    b.append_bool(true).unwrap();
    b.append_byte(0xFF).unwrap();
    b.append_u16(u16::MAX).unwrap();
    b.append_u32(u32::MAX).unwrap();
    b.append_u64(u64::MAX).unwrap();
    b.append_raw_string("höhe").unwrap();
    b.append_string_array(vec!["default".into(), "fps".into()])
        .unwrap();

    let mut bufs = carry(b);

    assert!(bufs.next_bool().unwrap());
    assert_eq!(bufs.next_byte().unwrap(), 0xFF);
    assert_eq!(bufs.next_u16().unwrap(), u16::MAX);
    assert_eq!(bufs.next_u32().unwrap(), u32::MAX);
    assert_eq!(bufs.next_u64().unwrap(), u64::MAX);
    assert_eq!(bufs.next_string().unwrap(), "höhe");
    assert_eq!(
        bufs.next_string_array().unwrap(),
        vec!["default".to_string(), "fps".to_string()]
    );
    assert!(bufs.is_empty());
}

#[test]
fn test_mkey_array_of_every_length_up_to_all_keys() {
    for n in 0..=MKey::ALL.len() {
        let keys: Vec<MKey> = MKey::ALL[..n].to_vec();
        let mut b = ReplyBuilder::new();
        codec::append_mkey_array(&mut b, &keys).unwrap();

        let mut bufs = carry(b);
        assert_eq!(codec::next_mkey_array(&mut bufs).unwrap(), keys);
        assert!(bufs.is_empty());
    }
}

#[test]
fn test_mkey_array_count_exceeding_supplied_ids_fails() {
    // Count byte says 2, only one id follows.
    let mut b = ReplyBuilder::new();
    b.append_byte(2).unwrap();
    b.append_byte(MKey::M1 as u8).unwrap();

    let mut bufs = carry(b);
    assert!(matches!(
        codec::next_mkey_array(&mut bufs).unwrap_err(),
        MarshalError::Truncated { .. }
    ));
}

#[test]
fn test_recorded_macro_survives_the_wire() {
    // A realistic recorded macro: shift-down, key taps, shift-up, trailing delay.
    let seq = MacroSequence::new(vec![
        MacroEvent::new(0xE1, MacroEventKind::KeyDown, 0),
        MacroEvent::new(0x04, MacroEventKind::KeyDown, 35),
        MacroEvent::new(0x04, MacroEventKind::KeyUp, 40),
        MacroEvent::new(0xE1, MacroEventKind::KeyUp, 12),
        MacroEvent::new(0x00, MacroEventKind::Delay, 1000),
    ]);

    let mut b = ReplyBuilder::new();
    codec::append_macro_sequence(&mut b, &seq).unwrap();
    let mut bufs = carry(b);

    let decoded = codec::next_macro_sequence(&mut bufs, None).unwrap();
    assert_eq!(decoded, seq);
}

#[test]
fn test_sequence_preceded_by_count_uses_fixed_size_decode() {
    // A count field travels ahead of the events; decode honours it and
    // leaves unrelated trailing fields alone.
    let seq = MacroSequence::new(vec![
        MacroEvent::new(0x1E, MacroEventKind::KeyDown, 5),
        MacroEvent::new(0x1E, MacroEventKind::KeyUp, 5),
    ]);
    let mut b = ReplyBuilder::new();
    b.append_byte(seq.len() as u8).unwrap();
    codec::append_macro_sequence(&mut b, &seq).unwrap();
    b.append_u16(0xBEEF).unwrap(); // unrelated trailing field

    let mut bufs = carry(b);
    let count = bufs.next_byte().unwrap() as usize;
    let decoded = codec::next_macro_sequence(&mut bufs, Some(count)).unwrap();

    assert_eq!(decoded, seq);
    assert_eq!(bufs.remaining(WireType::U16), 1, "trailing field untouched");
}

#[test]
fn test_enum_bytes_reject_values_past_their_maximum() {
    // M-key boundary.
    let mut b = ReplyBuilder::new();
    b.append_byte(MKey::MAX_ORDINAL).unwrap();
    let mut bufs = carry(b);
    assert!(codec::next_mkey(&mut bufs).is_ok());

    let mut b = ReplyBuilder::new();
    b.append_byte(MKey::MAX_ORDINAL + 1).unwrap();
    let mut bufs = carry(b);
    assert!(matches!(
        codec::next_mkey(&mut bufs).unwrap_err(),
        MarshalError::BadEnum { .. }
    ));

    // Macro event kind boundary.
    let mut b = ReplyBuilder::new();
    b.append_byte(0x04).unwrap();
    b.append_byte(MacroEventKind::MAX_ORDINAL + 1).unwrap();
    b.append_u16(0).unwrap();
    let mut bufs = carry(b);
    assert!(matches!(
        codec::next_macro_event(&mut bufs).unwrap_err(),
        MarshalError::BadEnum { .. }
    ));
}
