//! Application layer: the device-control services registered on the bus.
//!
//! Each service owns one interface and registers its handlers into the
//! shared [`gkeys_core::CallRegistry`] at start-up.  Services depend on the
//! [`device::KeyboardDevice`] trait, never on a concrete device, so the
//! infrastructure can swap in real hardware without touching this layer.
//!
//! - **`macro_service`**   – macro banks per M-key, including the
//!   asynchronous `StartRecording` path.
//! - **`mapping_service`** – per-key hardware mappings.
//! - **`profile_service`** – profile listing and switching, with the
//!   `ProfileChanged` broadcast.

pub mod device;
pub mod macro_service;
pub mod mapping_service;
pub mod profile_service;
