//! Adapters: implementations of the port traits
//!
//! - `serial_port`: real devices via the `serialport` crate
//! - `loopback`: in-memory virtual ports for development and tests
//! - `channel_sink`: display sink feeding a crossbeam channel
//! - `profile_store`: JSON profile files on disk

pub mod channel_sink;
pub mod loopback;
pub mod profile_store;
pub mod serial_port;
