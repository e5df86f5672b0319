//! Pocket Relay: a remote play server for handheld console emulation.
//!
//! This crate streams the video output of isolated, per-client emulator
//! sessions over WebSocket connections, accepts remote button input, and
//! persists battery-backed save data on request or automatically.
//!
//! # Modules
//!
//! - `relay`: Contains the session protocol, frame/save codecs, timers,
//!   access control and the HTTP/WebSocket dispatcher.

pub mod relay;
