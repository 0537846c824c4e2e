//! Port traits (interfaces)
//!
//! These traits define the boundaries between the terminal core and external I/O.
//! Adapters implement these traits to connect to real hardware or to test doubles.

pub mod display;
pub mod serial;

pub use display::*;
pub use serial::*;
