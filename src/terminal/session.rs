//! Terminal: owns the input and output connections of one serial session.
//!
//! All methods take `&self` and may be called from any thread. Each role sits
//! behind its own lock, so a transmit in progress never blocks the reader and
//! closing one role never disturbs the other. No lock is held while the
//! display is notified or while the reader thread is joined.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::adapters::serial_port::SerialPortFactory;
use crate::domain::{
    LineConfig, ModemLines, RawDescriptor, Role, TerminalError, TerminalResult, TerminalSettings,
};
use crate::ports::{DisplaySink, SerialDevice, SerialFactory};

use super::{reader, write_failure_notice, Connection, InputConnection, Shared};

/// Consecutive write timeouts tolerated before the output is declared dead
pub const MAX_WRITE_STALLS: usize = 20;

/// A serial terminal session with up to one input and one output connection.
pub struct Terminal {
    factory: Arc<dyn SerialFactory>,
    shared: Arc<Shared>,
    /// Requested RTS/DTR and last observed CTS/DSR
    lines: Mutex<ModemLines>,
}

impl Terminal {
    pub fn new(factory: Arc<dyn SerialFactory>) -> Self {
        Self {
            factory,
            shared: Arc::new(Shared::new()),
            lines: Mutex::new(ModemLines::default()),
        }
    }

    /// A terminal that opens real serial ports
    pub fn with_serialport() -> Self {
        Self::new(Arc::new(SerialPortFactory))
    }

    pub fn factory(&self) -> &Arc<dyn SerialFactory> {
        &self.factory
    }

    /// Attach (or detach with `None`) the display. Only a weak reference is
    /// kept; dropping the sink elsewhere silently detaches it.
    pub fn set_display(&self, sink: Option<&Arc<dyn DisplaySink>>) {
        self.shared.set_display(sink.map(Arc::downgrade));
    }

    pub fn has_display(&self) -> bool {
        self.shared.has_display()
    }

    // ---------------------------------------------------------------------
    // Open
    // ---------------------------------------------------------------------

    /// Open one device for both input and output.
    ///
    /// Existing connections are closed first. On failure both roles are left
    /// closed and every handle opened along the way is released.
    pub fn open_connections(&self, port: &str, config: LineConfig) -> TerminalResult<()> {
        self.close_connections();

        let device = self
            .factory
            .open_port(port, &config, Role::Input)
            .inspect_err(|e| log::warn!("{e}"))?;
        let input_device = device.try_clone()?;

        self.adopt_flags(&config);
        self.start_input(port, config, input_device)?;
        *self.output() = Some(Connection::new(port, config, device));

        log::info!("Connected to {port} at {config}");
        self.apply_control_lines();
        Ok(())
    }

    /// Open (or reopen) only the input role.
    ///
    /// If the output is already open on the same port its handle is
    /// duplicated instead of opening the device a second time.
    pub fn open_input_connection(&self, port: &str, config: LineConfig) -> TerminalResult<()> {
        self.close_input_connection();

        let shared_handle = match self.output().as_ref() {
            Some(output) if output.path == port => Some(output.device.try_clone()?),
            _ => None,
        };
        let device = match shared_handle {
            Some(mut device) => {
                device.apply_config(&config).inspect_err(|e| log::warn!("{e}"))?;
                // One physical line: the output now runs at the same settings.
                if let Some(output) = self.output().as_mut().filter(|o| o.path == port) {
                    output.config = config;
                }
                device
            }
            None => self
                .factory
                .open_port(port, &config, Role::Input)
                .inspect_err(|e| log::warn!("{e}"))?,
        };

        self.adopt_flags(&config);
        self.start_input(port, config, device)?;

        log::info!("Input connected to {port} at {config}");
        self.apply_control_lines();
        Ok(())
    }

    /// Open (or reopen) only the output role.
    ///
    /// If the input is already open on the same port its handle is
    /// duplicated instead of opening the device a second time.
    pub fn open_output_connection(&self, port: &str, config: LineConfig) -> TerminalResult<()> {
        self.close_output_connection();

        let shared_handle = match self.shared.input().as_ref() {
            Some(input) if input.connection.path == port && input.reader.is_running() => {
                Some(input.connection.device.try_clone()?)
            }
            _ => None,
        };
        let device = match shared_handle {
            Some(mut device) => {
                device.apply_config(&config).inspect_err(|e| log::warn!("{e}"))?;
                if let Some(input) = self
                    .shared
                    .input()
                    .as_mut()
                    .filter(|input| input.connection.path == port)
                {
                    input.connection.config = config;
                }
                device
            }
            None => self
                .factory
                .open_port(port, &config, Role::Output)
                .inspect_err(|e| log::warn!("{e}"))?,
        };

        self.adopt_flags(&config);
        *self.output() = Some(Connection::new(port, config, device));

        log::info!("Output connected to {port} at {config}");
        self.apply_control_lines();
        Ok(())
    }

    /// Open the port(s) named by a settings profile and apply its control
    /// line state.
    pub fn apply_settings(&self, settings: &TerminalSettings) -> TerminalResult<()> {
        let port = settings
            .port
            .as_deref()
            .ok_or_else(|| TerminalError::Config("No serial port selected".to_string()))?;

        // Only remembered here: the open below closes whatever is connected
        // now and drives these levels onto the new device.
        {
            let mut lines = self.lines();
            lines.rts = settings.rts;
            lines.dtr = settings.dtr;
        }

        match settings.output_port.as_deref() {
            Some(output_port) if output_port != port => {
                self.close_connections();
                self.open_input_connection(port, settings.line)?;
                if let Err(e) = self.open_output_connection(output_port, settings.line) {
                    self.close_input_connection();
                    return Err(e);
                }
                Ok(())
            }
            _ => self.open_connections(port, settings.line),
        }
    }

    fn start_input(
        &self,
        port: &str,
        config: LineConfig,
        device: Box<dyn SerialDevice>,
    ) -> TerminalResult<()> {
        let reader_device = device.try_clone()?;
        // Hold the slot while spawning so a reader that fails immediately
        // still finds its own connection to detach.
        let displaced = {
            let mut slot = self.shared.input();
            let reader = reader::spawn(reader_device, port, Arc::clone(&self.shared))?;
            slot.replace(InputConnection {
                connection: Connection::new(port, config, device),
                reader,
            })
        };
        // A concurrent open got here first; its reader must not outlive it.
        if let Some(previous) = displaced {
            previous.reader.stop_and_join();
            log::info!("Closed input {} (replaced)", previous.connection.path);
        }
        Ok(())
    }

    fn adopt_flags(&self, config: &LineConfig) {
        self.shared.set_crlf(config.crlf);
        self.shared.set_raw(config.raw);
    }

    // ---------------------------------------------------------------------
    // Close
    // ---------------------------------------------------------------------

    /// Close both roles. Safe to call at any time, any number of times.
    pub fn close_connections(&self) {
        self.close_input_connection();
        self.close_output_connection();
    }

    /// Stop the reader, wait for it to exit, and release the input handle.
    pub fn close_input_connection(&self) {
        let input = self.shared.input().take();
        if let Some(input) = input {
            input.reader.stop_and_join();
            log::info!("Closed input {}", input.connection.path);
        }
        self.reset_status_if_closed();
    }

    pub fn close_output_connection(&self) {
        let output = self.output().take();
        if let Some(output) = output {
            log::info!("Closed output {}", output.path);
        }
        self.reset_status_if_closed();
    }

    fn reset_status_if_closed(&self) {
        if !self.connected() {
            let mut lines = self.lines();
            lines.cts = false;
            lines.dsr = false;
        }
    }

    // ---------------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------------

    /// True if either role is open
    pub fn connected(&self) -> bool {
        self.input_connected() || self.output_connected()
    }

    pub fn input_connected(&self) -> bool {
        self.shared
            .input()
            .as_ref()
            .is_some_and(|input| input.reader.is_running())
    }

    pub fn output_connected(&self) -> bool {
        self.output().is_some()
    }

    /// Raw OS handle of the input connection, `None` while closed
    pub fn input_file_descriptor(&self) -> Option<RawDescriptor> {
        self.shared
            .input()
            .as_ref()
            .filter(|input| input.reader.is_running())
            .and_then(|input| input.connection.descriptor)
    }

    /// Raw OS handle of the output connection, `None` while closed
    pub fn output_file_descriptor(&self) -> Option<RawDescriptor> {
        self.output().as_ref().and_then(|output| output.descriptor)
    }

    pub fn input_port(&self) -> Option<String> {
        self.shared
            .input()
            .as_ref()
            .filter(|input| input.reader.is_running())
            .map(|input| input.connection.path.clone())
    }

    pub fn output_port(&self) -> Option<String> {
        self.output().as_ref().map(|output| output.path.clone())
    }

    /// Line configuration of the output connection, else of the input
    pub fn line_config(&self) -> Option<LineConfig> {
        if let Some(output) = self.output().as_ref() {
            return Some(output.config);
        }
        self.shared
            .input()
            .as_ref()
            .filter(|input| input.reader.is_running())
            .map(|input| input.connection.config)
    }

    // ---------------------------------------------------------------------
    // Translation flags
    // ---------------------------------------------------------------------

    /// Expand outbound `\n` to `\r\n`. Takes effect on the next transmit.
    pub fn set_crlf_enable(&self, state: bool) {
        self.shared.set_crlf(state);
    }

    pub fn crlf_enabled(&self) -> bool {
        self.shared.crlf()
    }

    /// Deliver inbound bytes verbatim instead of cooked text.
    /// Takes effect on the next chunk the reader decodes.
    pub fn set_raw_enable(&self, state: bool) {
        self.shared.set_raw(state);
    }

    pub fn raw_enabled(&self) -> bool {
        self.shared.raw()
    }

    // ---------------------------------------------------------------------
    // Device attributes and modem lines
    // ---------------------------------------------------------------------

    /// Re-apply line parameters to every open role without closing.
    pub fn reconfigure(&self, config: LineConfig) -> TerminalResult<()> {
        self.adopt_flags(&config);
        let mut any_open = false;

        if let Some(output) = self.output().as_mut() {
            any_open = true;
            output.device.apply_config(&config).inspect_err(|e| log::warn!("{e}"))?;
            output.config = config;
        }
        if let Some(input) = self
            .shared
            .input()
            .as_mut()
            .filter(|input| input.reader.is_running())
        {
            any_open = true;
            input
                .connection
                .device
                .apply_config(&config)
                .inspect_err(|e| log::warn!("{e}"))?;
            input.connection.config = config;
        }

        if any_open {
            log::info!("Reconfigured to {config}");
            Ok(())
        } else {
            Err(TerminalError::NotConnected(Role::Output))
        }
    }

    /// Re-read CTS and DSR from the device into the cached line state.
    ///
    /// Reads through the output handle when open, else the input handle.
    /// A failure is returned but leaves the connection open.
    pub fn get_termios(&self) -> TerminalResult<ModemLines> {
        let status = self.output().as_mut().map(read_status);
        let status = status.or_else(|| {
            self.shared
                .input()
                .as_mut()
                .filter(|input| input.reader.is_running())
                .map(|input| read_status(&mut input.connection))
        });
        let Some(status) = status else {
            self.reset_status_if_closed();
            return Err(TerminalError::NotConnected(Role::Input));
        };

        match status {
            Ok((cts, dsr)) => {
                let mut lines = self.lines();
                lines.cts = cts;
                lines.dsr = dsr;
                Ok(*lines)
            }
            Err(e) => {
                log::warn!("Failed to read modem status: {e}");
                Err(e)
            }
        }
    }

    /// Assert or clear RTS. Remembered while closed and applied on open;
    /// a device that refuses is logged and otherwise ignored.
    pub fn set_rts(&self, state: bool) {
        self.lines().rts = state;
        self.for_each_device("RTS", |device| device.set_rts(state));
    }

    /// Assert or clear DTR. Same rules as [`Terminal::set_rts`].
    pub fn set_dtr(&self, state: bool) {
        self.lines().dtr = state;
        self.for_each_device("DTR", |device| device.set_dtr(state));
    }

    pub fn rts(&self) -> bool {
        self.lines().rts
    }

    pub fn dtr(&self) -> bool {
        self.lines().dtr
    }

    /// CTS as of the last [`Terminal::get_termios`]; false while closed
    pub fn cts(&self) -> bool {
        self.connected() && self.lines().cts
    }

    /// DSR as of the last [`Terminal::get_termios`]; false while closed
    pub fn dsr(&self) -> bool {
        self.connected() && self.lines().dsr
    }

    /// Drive the remembered RTS/DTR state onto whatever is open
    fn apply_control_lines(&self) {
        let lines = *self.lines();
        self.for_each_device("RTS", |device| device.set_rts(lines.rts));
        self.for_each_device("DTR", |device| device.set_dtr(lines.dtr));
    }

    fn for_each_device(
        &self,
        what: &str,
        mut apply: impl FnMut(&mut dyn SerialDevice) -> TerminalResult<()>,
    ) {
        if let Some(output) = self.output().as_mut() {
            if let Err(e) = apply(output.device.as_mut()) {
                log::warn!("Setting {what} on {} failed: {e}", output.path);
            }
        }
        if let Some(input) = self
            .shared
            .input()
            .as_mut()
            .filter(|input| input.reader.is_running())
        {
            if let Err(e) = apply(input.connection.device.as_mut()) {
                log::warn!("Setting {what} on {} failed: {e}", input.connection.path);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Transmit
    // ---------------------------------------------------------------------

    /// Encode `text` and write all of it to the output connection.
    ///
    /// The output lock is held for the whole write, so concurrent calls
    /// never interleave on the wire. If the device fails mid-write the output
    /// connection is closed, the display is told why, and the error is
    /// returned. Returns the number of bytes written.
    pub fn transmit_characters(&self, text: &str) -> TerminalResult<usize> {
        let mut output = self.output();
        let connection = output
            .as_mut()
            .ok_or(TerminalError::NotConnected(Role::Output))?;
        let bytes = connection.encoder.encode(text, self.crlf_enabled());
        if bytes.is_empty() {
            return Ok(0);
        }

        match write_all(connection.device.as_mut(), &bytes) {
            Ok(()) => {
                log::debug!("TX {}: {} bytes", connection.path, bytes.len());
                Ok(bytes.len())
            }
            Err(e) => {
                let port = connection.path.clone();
                let reason = e.to_string();
                *output = None;
                drop(output);
                self.reset_status_if_closed();

                log::error!("Write to {port} failed, output closed: {reason}");
                self.shared.notify(&write_failure_notice(&port, &reason));
                Err(TerminalError::WriteFailed { port, reason })
            }
        }
    }

    fn output(&self) -> MutexGuard<'_, Option<Connection>> {
        self.shared.output()
    }

    fn lines(&self) -> MutexGuard<'_, ModemLines> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.close_connections();
    }
}

fn read_status(connection: &mut Connection) -> TerminalResult<(bool, bool)> {
    let cts = connection.device.read_cts()?;
    let dsr = connection.device.read_dsr()?;
    Ok((cts, dsr))
}

/// Write every byte, looping over partial writes, then drain.
fn write_all(device: &mut dyn SerialDevice, mut data: &[u8]) -> io::Result<()> {
    let mut stalls = 0;
    while !data.is_empty() {
        match device.write(data) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "device accepted no bytes",
                ))
            }
            Ok(n) => {
                data = &data[n..];
                stalls = 0;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                stalls += 1;
                if stalls >= MAX_WRITE_STALLS {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
    device.flush()
}
