//! Infrastructure layer for the daemon.
//!
//! Contains the outward-facing adapters: the simulated keyboard device,
//! the in-process bus connection and its dispatch pump, and configuration
//! persistence.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `gkeys_core`, but MUST NOT be imported by the `application` layer.

pub mod config;
pub mod device;
pub mod loopback;
