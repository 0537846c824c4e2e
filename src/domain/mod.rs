//! Core domain types
//!
//! Pure types with no I/O dependencies: line parameters, connection roles,
//! modem line state, settings profiles, and errors.

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
