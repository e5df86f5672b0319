//! Core relay server implementation.
//!
//! This module provides everything between an opaque emulation core and a
//! remote client: the binary message protocol, frame quantization, save
//! compression, the input debounce scheduler, autosave throttling and the
//! session lifecycle.
//!
//! # Architecture
//!
//! The relay implementation is organized into several key components:
//!
//! - **`protocol`**: Message records exchanged with clients and their BSON encoding
//! - **`server`**: HTTP routes, WebSocket upgrade and connection pumping
//! - **`access`**: Access policies, admission and the live session registry
//! - **`worker`**: Dedicated per-session thread driving timers and the session
//! - **`session`**: Per-client protocol state machine
//! - **`scheduler`**: Fixed-rate tick loop with debounced button holds
//! - **`autosave`**: Battery RAM write observer with a quiescence window
//! - **`encoding`**: Frame (16-color palette) and save (zlib + base64) codecs
//! - **`core`**: Emulation core capability interface and the reference core
//! - **`catalog`**: Startup-loaded program catalog
//! - **`config`**: Command line, environment and policy file configuration
//!
//! # Example Flow
//!
//! ```ignore
//! let catalog = Catalog::load_dir("roms", &PatternCoreFactory)?;
//! let gate = AccessGate::new(policies)?;
//! let state = AppState::new(catalog, gate, Arc::new(PatternCoreFactory));
//!
//! server::serve(addr, state).await?;
//! ```

pub mod access;
pub mod autosave;
pub mod catalog;
pub mod config;
pub mod core;
pub mod encoding;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod worker;
