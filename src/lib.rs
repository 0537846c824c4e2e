//! Serial Tools
//!
//! A serial terminal core: opens serial devices, configures the line,
//! drives the modem control lines, and moves text between the device and a
//! display on a background reader thread.
//!
//! ## Architecture (Hexagonal / Ports & Adapters)
//!
//! - `domain/` - Pure domain types, no I/O dependencies
//! - `ports/` - Trait definitions (interfaces) for serial devices and the display
//! - `terminal/` - The session: connections, reader thread, line-ending translation
//! - `adapters/` - Implementations of ports (serialport, loopback, channel sink, profiles)

// Core domain (pure, no I/O)
pub mod domain;
pub mod ports;

// Session logic
pub mod terminal;

// Adapters (external I/O)
pub mod adapters;

pub use domain::{LineConfig, TerminalError, TerminalResult, TerminalSettings};
pub use terminal::Terminal;
