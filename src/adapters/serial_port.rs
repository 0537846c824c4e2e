//! Serial port adapter using the `serialport` crate
//!
//! Implements `SerialFactory` and `SerialDevice` on top of the native port
//! types (`TTYPort` on Unix, `COMPort` on Windows) so the raw OS handle stays
//! reachable for callers that need it.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, FlowControl, SerialPort};

use crate::domain::{
    DataBits, LineConfig, Parity, RawDescriptor, Role, SerialPortInfo, StopBits,
    TerminalError, TerminalResult,
};
use crate::ports::{SerialDevice, SerialFactory};

#[cfg(unix)]
type NativePort = serialport::TTYPort;
#[cfg(windows)]
type NativePort = serialport::COMPort;

/// How long a single read may block. The reader thread checks its stop
/// flag between reads, so this bounds how long a close can wait.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Zero-sized factory for real serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortFactory;

impl SerialFactory for SerialPortFactory {
    fn list_ports(&self) -> TerminalResult<Vec<SerialPortInfo>> {
        let ports = serialport::available_ports()
            .map_err(|e| TerminalError::Device(format!("Failed to list ports: {e}")))?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let port_type = match &p.port_type {
                    serialport::SerialPortType::UsbPort(info) => {
                        format!("USB ({:04X}:{:04X})", info.vid, info.pid)
                    }
                    serialport::SerialPortType::PciPort => "PCI".to_string(),
                    serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                    serialport::SerialPortType::Unknown => "Native".to_string(),
                };
                SerialPortInfo {
                    name: p.port_name,
                    port_type,
                }
            })
            .collect())
    }

    fn open_port(
        &self,
        path: &str,
        config: &LineConfig,
        role: Role,
    ) -> TerminalResult<Box<dyn SerialDevice>> {
        Ok(Box::new(open_port(path, config, role)?))
    }
}

/// Open and configure a serial device.
///
/// Exclusive access, no flow control, and [`READ_TIMEOUT`] reads. For the
/// input role, bytes left in the driver from a previous session are
/// discarded so the display starts clean.
pub fn open_port(path: &str, config: &LineConfig, role: Role) -> TerminalResult<SerialPortConnection> {
    let port = serialport::new(path, config.baud.as_u32())
        .data_bits(to_data_bits(config.data_bits))
        .parity(to_parity(config.parity))
        .stop_bits(to_stop_bits(config.stop_bits))
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open_native()
        .map_err(|e| TerminalError::Open {
            port: path.to_string(),
            reason: e.to_string(),
        })?;

    let connection = SerialPortConnection {
        port,
        path: path.to_string(),
    };

    if role == Role::Input {
        // Dropping `connection` on this error path closes the descriptor.
        connection
            .port
            .clear(ClearBuffer::Input)
            .map_err(|e| TerminalError::Configure {
                port: path.to_string(),
                reason: e.to_string(),
            })?;
    }

    log::info!("Opened {path} for {role} at {config}");
    Ok(connection)
}

fn to_data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn to_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn to_stop_bits(stops: StopBits) -> serialport::StopBits {
    match stops {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

/// An open serial device wrapping a native `serialport` handle.
/// The descriptor is closed when this value is dropped.
pub struct SerialPortConnection {
    port: NativePort,
    path: String,
}

impl SerialPortConnection {
    fn configure_error(&self, e: serialport::Error) -> TerminalError {
        TerminalError::Configure {
            port: self.path.clone(),
            reason: e.to_string(),
        }
    }
}

impl SerialDevice for SerialPortConnection {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.port.read(buffer)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn try_clone(&self) -> TerminalResult<Box<dyn SerialDevice>> {
        let port = self.port.try_clone_native().map_err(|e| TerminalError::Open {
            port: self.path.clone(),
            reason: format!("Failed to duplicate handle: {e}"),
        })?;
        Ok(Box::new(SerialPortConnection {
            port,
            path: self.path.clone(),
        }))
    }

    fn apply_config(&mut self, config: &LineConfig) -> TerminalResult<()> {
        self.port
            .set_baud_rate(config.baud.as_u32())
            .map_err(|e| self.configure_error(e))?;
        self.port
            .set_data_bits(to_data_bits(config.data_bits))
            .map_err(|e| self.configure_error(e))?;
        self.port
            .set_parity(to_parity(config.parity))
            .map_err(|e| self.configure_error(e))?;
        self.port
            .set_stop_bits(to_stop_bits(config.stop_bits))
            .map_err(|e| self.configure_error(e))?;
        log::debug!("Reconfigured {} to {config}", self.path);
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> TerminalResult<()> {
        Ok(self.port.write_request_to_send(level)?)
    }

    fn set_dtr(&mut self, level: bool) -> TerminalResult<()> {
        Ok(self.port.write_data_terminal_ready(level)?)
    }

    fn read_cts(&mut self) -> TerminalResult<bool> {
        Ok(self.port.read_clear_to_send()?)
    }

    fn read_dsr(&mut self) -> TerminalResult<bool> {
        Ok(self.port.read_data_set_ready()?)
    }

    #[cfg(unix)]
    fn descriptor(&self) -> Option<RawDescriptor> {
        use std::os::unix::io::AsRawFd;
        Some(RawDescriptor::from(self.port.as_raw_fd()))
    }

    #[cfg(windows)]
    fn descriptor(&self) -> Option<RawDescriptor> {
        use std::os::windows::io::AsRawHandle;
        Some(self.port.as_raw_handle() as isize as RawDescriptor)
    }
}
