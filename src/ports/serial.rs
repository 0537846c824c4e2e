//! Serial port traits
//!
//! Split into two traits:
//! - `SerialFactory`: lists ports and opens configured devices
//! - `SerialDevice`: one open OS handle: byte I/O plus modem lines
//!
//! `read`/`write` return `std::io::Result` so callers can tell a read timeout
//! or an interrupted call apart from a dead device.

use std::io;

use crate::domain::{LineConfig, RawDescriptor, Role, SerialPortInfo, TerminalResult};

/// Opens serial devices. Shared between the terminal and whoever wires it up,
/// so it must be `Send + Sync`.
pub trait SerialFactory: Send + Sync {
    /// List serial ports currently present on the system
    fn list_ports(&self) -> TerminalResult<Vec<SerialPortInfo>>;

    /// Open `path` and apply `config` for the given role.
    ///
    /// Either returns a fully configured device or an error; a failed open
    /// never leaves a handle behind.
    fn open_port(
        &self,
        path: &str,
        config: &LineConfig,
        role: Role,
    ) -> TerminalResult<Box<dyn SerialDevice>>;
}

/// An open serial device handle.
/// Only requires `Send` (not `Sync`); each handle has a single owner.
pub trait SerialDevice: Send {
    /// Read available bytes, waiting at most the device timeout.
    /// `ErrorKind::TimedOut` means nothing arrived; `Ok(0)` means end of file.
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize>;

    /// Write some prefix of `data`, returning how much was accepted
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Wait until queued output has been handed to the device
    fn flush(&mut self) -> io::Result<()>;

    /// Duplicate the handle. Both handles refer to the same device and can
    /// be closed independently.
    fn try_clone(&self) -> TerminalResult<Box<dyn SerialDevice>>;

    /// Re-apply baud rate, data bits, parity, and stop bits
    fn apply_config(&mut self, config: &LineConfig) -> TerminalResult<()>;

    fn set_rts(&mut self, level: bool) -> TerminalResult<()>;

    fn set_dtr(&mut self, level: bool) -> TerminalResult<()>;

    fn read_cts(&mut self) -> TerminalResult<bool>;

    fn read_dsr(&mut self) -> TerminalResult<bool>;

    /// Raw OS handle, if the device has one
    fn descriptor(&self) -> Option<RawDescriptor>;
}
