//! In-memory loopback serial devices for development and testing without hardware.
//!
//! A `LoopbackFactory` holds named virtual ports. Each port behaves like a
//! device with a loop-back plug fitted: bytes written come back on the read
//! side, RTS is wired to CTS, and DTR is wired to DSR. The `LoopbackPort`
//! handle lets a test play the far end: inject bytes, inspect the wire,
//! pull the plug.
//!
//! Every open and close is logged at INFO so a session can be traced
//! without a real adapter:
//!
//!   RUST_LOG=serial_tools_lib=info serial-term --loopback /dev/loop0

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::adapters::serial_port::READ_TIMEOUT;
use crate::domain::{
    LineConfig, RawDescriptor, Role, SerialPortInfo, TerminalError, TerminalResult,
};
use crate::ports::{SerialDevice, SerialFactory};

/// Fake descriptors start well above anything stdio uses
static NEXT_DESCRIPTOR: AtomicI64 = AtomicI64::new(1000);

#[derive(Default)]
struct WireState {
    /// Bytes waiting to be read
    pending: VecDeque<u8>,
    /// Every byte written to the device, in order
    written: Vec<u8>,
    config: Option<LineConfig>,
    rts: bool,
    dtr: bool,
    open_handles: usize,
    unplugged: bool,
    echo: bool,
    fail_writes: bool,
    /// One-shot outcomes consumed by the next writes, in order
    write_faults: VecDeque<WriteFault>,
    write_chunk_limit: Option<usize>,
    control_lines_unsupported: bool,
}

struct Wire {
    path: String,
    state: Mutex<WireState>,
    readable: Condvar,
}

impl Wire {
    fn lock(&self) -> MutexGuard<'_, WireState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scripted outcome for a single write call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// Fail with an error of this kind
    Error(io::ErrorKind),
    /// Accept no bytes (`Ok(0)`)
    AcceptNothing,
}

/// Factory of virtual serial ports.
pub struct LoopbackFactory {
    ports: Mutex<HashMap<String, Arc<Wire>>>,
    read_timeout: Duration,
}

impl LoopbackFactory {
    pub fn new() -> Self {
        Self {
            ports: Mutex::new(HashMap::new()),
            read_timeout: READ_TIMEOUT,
        }
    }

    /// Use a different per-read timeout for devices opened from now on
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Create (or replace) a virtual port at `path` with echo enabled
    pub fn add_port(&self, path: &str) -> LoopbackPort {
        let wire = Arc::new(Wire {
            path: path.to_string(),
            state: Mutex::new(WireState {
                echo: true,
                ..WireState::default()
            }),
            readable: Condvar::new(),
        });
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), Arc::clone(&wire));
        log::info!("[LOOPBACK] Added {path}");
        LoopbackPort { wire }
    }

    /// Control handle for an existing port
    pub fn port(&self, path: &str) -> Option<LoopbackPort> {
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|wire| LoopbackPort {
                wire: Arc::clone(wire),
            })
    }

    /// Forget a port, as if its adapter were removed from the system.
    /// Open handles see the removal on their next call.
    pub fn remove_port(&self, path: &str) {
        let removed = self
            .ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        if let Some(wire) = removed {
            LoopbackPort { wire }.unplug();
        }
    }
}

impl Default for LoopbackFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialFactory for LoopbackFactory {
    fn list_ports(&self) -> TerminalResult<Vec<SerialPortInfo>> {
        let mut ports: Vec<SerialPortInfo> = self
            .ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(|name| SerialPortInfo {
                name: name.clone(),
                port_type: "Loopback".to_string(),
            })
            .collect();
        ports.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ports)
    }

    fn open_port(
        &self,
        path: &str,
        config: &LineConfig,
        role: Role,
    ) -> TerminalResult<Box<dyn SerialDevice>> {
        let wire = self
            .ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| TerminalError::Open {
                port: path.to_string(),
                reason: "No such device".to_string(),
            })?;

        {
            let mut state = wire.lock();
            if state.unplugged {
                return Err(TerminalError::Open {
                    port: path.to_string(),
                    reason: "Device not configured".to_string(),
                });
            }
            if state.open_handles > 0 {
                return Err(TerminalError::Open {
                    port: path.to_string(),
                    reason: "Resource busy".to_string(),
                });
            }
            state.config = Some(*config);
            if role == Role::Input {
                state.pending.clear();
            }
        }

        log::info!("[LOOPBACK] Opened {path} for {role} at {config}");
        Ok(Box::new(LoopbackDevice::attach(wire, self.read_timeout)))
    }
}

/// Test-side handle on a virtual port: the far end of the cable.
#[derive(Clone)]
pub struct LoopbackPort {
    wire: Arc<Wire>,
}

impl LoopbackPort {
    /// Make bytes available to readers, as if the remote end sent them
    pub fn inject(&self, data: &[u8]) {
        self.wire.lock().pending.extend(data.iter().copied());
        self.wire.readable.notify_all();
    }

    /// Everything written to the device so far
    pub fn written(&self) -> Vec<u8> {
        self.wire.lock().written.clone()
    }

    pub fn clear_written(&self) {
        self.wire.lock().written.clear();
    }

    /// Simulate the adapter being yanked: every handle fails from now on
    pub fn unplug(&self) {
        self.wire.lock().unplugged = true;
        self.wire.readable.notify_all();
        log::info!("[LOOPBACK] Unplugged {}", self.wire.path);
    }

    /// Number of device handles currently open on this port
    pub fn open_handles(&self) -> usize {
        self.wire.lock().open_handles
    }

    /// Whether written bytes are looped back to the read side (default on)
    pub fn set_echo(&self, echo: bool) {
        self.wire.lock().echo = echo;
    }

    /// Make every write fail with an I/O error
    pub fn fail_writes(&self, fail: bool) {
        self.wire.lock().fail_writes = fail;
    }

    /// Script the next write calls. Each fault is used once; after the
    /// queue drains, writes behave normally again.
    pub fn queue_write_faults(&self, faults: impl IntoIterator<Item = WriteFault>) {
        self.wire.lock().write_faults.extend(faults);
    }

    /// Scripted faults not yet consumed
    pub fn pending_write_faults(&self) -> usize {
        self.wire.lock().write_faults.len()
    }

    /// Accept at most `limit` bytes per write call, forcing partial writes
    pub fn limit_write_chunk(&self, limit: Option<usize>) {
        self.wire.lock().write_chunk_limit = limit;
    }

    /// Make RTS/DTR/CTS/DSR calls fail, like a driver without modem lines
    pub fn set_control_lines_supported(&self, supported: bool) {
        self.wire.lock().control_lines_unsupported = !supported;
    }

    pub fn rts(&self) -> bool {
        self.wire.lock().rts
    }

    pub fn dtr(&self) -> bool {
        self.wire.lock().dtr
    }

    /// Line configuration last applied to the device
    pub fn config(&self) -> Option<LineConfig> {
        self.wire.lock().config
    }
}

/// One open handle on a virtual port.
pub struct LoopbackDevice {
    wire: Arc<Wire>,
    descriptor: RawDescriptor,
    read_timeout: Duration,
}

impl LoopbackDevice {
    fn attach(wire: Arc<Wire>, read_timeout: Duration) -> Self {
        wire.lock().open_handles += 1;
        Self {
            wire,
            descriptor: NEXT_DESCRIPTOR.fetch_add(1, Ordering::Relaxed),
            read_timeout,
        }
    }

    fn removed_error(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::BrokenPipe,
            format!("{} has been removed", self.wire.path),
        )
    }

    fn control_state(&self) -> TerminalResult<MutexGuard<'_, WireState>> {
        let state = self.wire.lock();
        if state.unplugged {
            return Err(TerminalError::Device(format!(
                "{} has been removed",
                self.wire.path
            )));
        }
        if state.control_lines_unsupported {
            return Err(TerminalError::Device(format!(
                "{}: modem control lines not supported",
                self.wire.path
            )));
        }
        Ok(state)
    }
}

impl SerialDevice for LoopbackDevice {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let deadline = Instant::now() + self.read_timeout;
        let mut state = self.wire.lock();
        loop {
            if state.unplugged {
                return Err(self.removed_error());
            }
            if !state.pending.is_empty() {
                let n = state.pending.len().min(buffer.len());
                for (slot, byte) in buffer.iter_mut().zip(state.pending.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
            }
            state = self
                .wire
                .readable
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.wire.lock();
        if state.unplugged {
            return Err(self.removed_error());
        }
        if state.fail_writes {
            return Err(io::Error::other("simulated write failure"));
        }
        match state.write_faults.pop_front() {
            Some(WriteFault::Error(kind)) => {
                return Err(io::Error::new(kind, "scripted write fault"));
            }
            Some(WriteFault::AcceptNothing) => return Ok(0),
            None => {}
        }
        let n = state.write_chunk_limit.map_or(data.len(), |limit| limit.min(data.len()));
        state.written.extend_from_slice(&data[..n]);
        if state.echo {
            state.pending.extend(data[..n].iter().copied());
            drop(state);
            self.wire.readable.notify_all();
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.wire.lock().unplugged {
            return Err(self.removed_error());
        }
        Ok(())
    }

    fn try_clone(&self) -> TerminalResult<Box<dyn SerialDevice>> {
        if self.wire.lock().unplugged {
            return Err(TerminalError::Open {
                port: self.wire.path.clone(),
                reason: "Device not configured".to_string(),
            });
        }
        Ok(Box::new(LoopbackDevice::attach(
            Arc::clone(&self.wire),
            self.read_timeout,
        )))
    }

    fn apply_config(&mut self, config: &LineConfig) -> TerminalResult<()> {
        let mut state = self.wire.lock();
        if state.unplugged {
            return Err(TerminalError::Configure {
                port: self.wire.path.clone(),
                reason: "Device not configured".to_string(),
            });
        }
        state.config = Some(*config);
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> TerminalResult<()> {
        self.control_state()?.rts = level;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> TerminalResult<()> {
        self.control_state()?.dtr = level;
        Ok(())
    }

    fn read_cts(&mut self) -> TerminalResult<bool> {
        Ok(self.control_state()?.rts)
    }

    fn read_dsr(&mut self) -> TerminalResult<bool> {
        Ok(self.control_state()?.dtr)
    }

    fn descriptor(&self) -> Option<RawDescriptor> {
        Some(self.descriptor)
    }
}

impl Drop for LoopbackDevice {
    fn drop(&mut self) {
        let mut state = self.wire.lock();
        state.open_handles = state.open_handles.saturating_sub(1);
        log::debug!("[LOOPBACK] Closed handle {} on {}", self.descriptor, self.wire.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(factory: &LoopbackFactory, path: &str) -> Box<dyn SerialDevice> {
        factory
            .open_port(path, &LineConfig::default(), Role::Input)
            .unwrap()
    }

    #[test]
    fn written_bytes_loop_back_to_reader() {
        let factory = LoopbackFactory::new();
        let port = factory.add_port("/dev/loop0");
        let mut device = open(&factory, "/dev/loop0");

        assert_eq!(device.write(b"ping").unwrap(), 4);
        let mut buf = [0u8; 16];
        let n = device.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(port.written(), b"ping");
    }

    #[test]
    fn read_times_out_when_idle() {
        let factory = LoopbackFactory::new().with_read_timeout(Duration::from_millis(5));
        factory.add_port("/dev/loop0");
        let mut device = open(&factory, "/dev/loop0");

        let mut buf = [0u8; 4];
        let err = device.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn unknown_path_fails_to_open() {
        let factory = LoopbackFactory::new();
        let result = factory.open_port("/dev/missing", &LineConfig::default(), Role::Output);
        assert!(matches!(result, Err(TerminalError::Open { .. })));
    }

    #[test]
    fn second_open_is_refused_while_busy() {
        let factory = LoopbackFactory::new();
        factory.add_port("/dev/loop0");
        let _first = open(&factory, "/dev/loop0");
        let second = factory.open_port("/dev/loop0", &LineConfig::default(), Role::Output);
        assert!(matches!(second, Err(TerminalError::Open { .. })));
    }

    #[test]
    fn handle_count_tracks_clones_and_drops() {
        let factory = LoopbackFactory::new();
        let port = factory.add_port("/dev/loop0");
        let device = open(&factory, "/dev/loop0");
        let clone = device.try_clone().unwrap();
        assert_eq!(port.open_handles(), 2);
        assert_ne!(device.descriptor(), clone.descriptor());
        drop(device);
        assert_eq!(port.open_handles(), 1);
        drop(clone);
        assert_eq!(port.open_handles(), 0);
    }

    #[test]
    fn unplug_breaks_pending_read() {
        let factory = LoopbackFactory::new();
        let port = factory.add_port("/dev/loop0");
        let mut device = open(&factory, "/dev/loop0");
        port.unplug();

        let mut buf = [0u8; 4];
        let err = device.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(device.write(b"x").is_err());
    }

    #[test]
    fn control_lines_are_looped_back() {
        let factory = LoopbackFactory::new();
        let port = factory.add_port("/dev/loop0");
        let mut device = open(&factory, "/dev/loop0");

        device.set_rts(true).unwrap();
        assert!(device.read_cts().unwrap());
        assert!(!device.read_dsr().unwrap());
        device.set_dtr(true).unwrap();
        assert!(device.read_dsr().unwrap());
        assert!(port.rts() && port.dtr());
    }

    #[test]
    fn scripted_faults_are_consumed_in_order() {
        let factory = LoopbackFactory::new();
        let port = factory.add_port("/dev/loop0");
        port.set_echo(false);
        port.queue_write_faults([
            WriteFault::Error(io::ErrorKind::Interrupted),
            WriteFault::AcceptNothing,
        ]);
        let mut device = open(&factory, "/dev/loop0");

        let err = device.write(b"at").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(device.write(b"at").unwrap(), 0);
        assert_eq!(device.write(b"at").unwrap(), 2);
        assert_eq!(port.pending_write_faults(), 0);
        assert_eq!(port.written(), b"at");
    }

    #[test]
    fn partial_writes_respect_chunk_limit() {
        let factory = LoopbackFactory::new();
        let port = factory.add_port("/dev/loop0");
        port.limit_write_chunk(Some(3));
        let mut device = open(&factory, "/dev/loop0");
        assert_eq!(device.write(b"abcdef").unwrap(), 3);
        assert_eq!(port.written(), b"abc");
    }
}
