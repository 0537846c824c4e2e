//! Background reader for an input connection.
//!
//! The thread owns its own duplicated device handle. Each read waits at most
//! the device timeout, so setting the stop flag ends the loop within one
//! timeout and `stop_and_join` never hangs on a quiet line.
//!
//! If the device goes away (end of file, or any error other than a timeout
//! or an interrupted call), the thread releases its handle, detaches the
//! input connection (and an output on the same port) from the session, and
//! posts one disconnect notice.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::domain::{TerminalError, TerminalResult};
use crate::ports::SerialDevice;

use super::{disconnect_notice, DecodeMode, InboundDecoder, Shared};

/// Bytes requested per read call
const READ_CHUNK_SIZE: usize = 1024;

/// Handle on a running reader thread
pub(crate) struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    /// Still reading: not asked to stop and the device is still there
    pub(crate) fn is_running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn owns(&self, stop: &Arc<AtomicBool>) -> bool {
        Arc::ptr_eq(&self.stop, stop)
    }

    /// Signal the thread and wait for it to exit
    pub(crate) fn stop_and_join(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                // Dropped from inside the reader itself; it is already exiting.
                return;
            }
            if thread.join().is_err() {
                log::error!("Serial reader thread panicked");
            }
        }
    }
}

impl Drop for ReaderHandle {
    // A handle dropped without `stop_and_join` still ends its thread.
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Start reading `device` on a new thread, delivering text through `shared`.
pub(crate) fn spawn(
    device: Box<dyn SerialDevice>,
    path: &str,
    shared: Arc<Shared>,
) -> TerminalResult<ReaderHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread = {
        let stop = Arc::clone(&stop);
        let thread_path = path.to_string();
        thread::Builder::new()
            .name(format!("serial-reader:{path}"))
            .spawn(move || run_reader_thread(device, thread_path, shared, stop))
            .map_err(|e| TerminalError::Open {
                port: path.to_string(),
                reason: format!("Failed to start reader thread: {e}"),
            })?
    };

    Ok(ReaderHandle {
        stop,
        thread: Some(thread),
    })
}

/// The read loop, runs on its own thread.
fn run_reader_thread(
    mut device: Box<dyn SerialDevice>,
    path: String,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
) {
    log::debug!("Reader started on {path}");
    let mut decoder = InboundDecoder::new(DecodeMode::from_raw_flag(shared.raw()));
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    let failure = loop {
        if stop.load(Ordering::SeqCst) {
            break None;
        }
        match device.read(&mut chunk) {
            Ok(0) => break Some("end of file".to_string()),
            Ok(n) => {
                log::debug!("RX {path}: {n} bytes");
                decoder.set_mode(DecodeMode::from_raw_flag(shared.raw()));
                let text = decoder.decode(&chunk[..n]);
                if !text.is_empty() {
                    shared.notify(&text);
                }
            }
            Err(e) if is_transient(&e) => {}
            Err(e) => break Some(e.to_string()),
        }
    };

    // Release our handle before anything else so the device is free.
    drop(device);

    let Some(reason) = failure else {
        log::debug!("Reader on {path} stopped");
        return;
    };

    // A close racing with the failure wins; it owns the teardown.
    if stop.swap(true, Ordering::SeqCst) {
        log::debug!("Reader on {path} stopped during close ({reason})");
        return;
    }

    log::warn!("Serial device {path} lost: {reason}");

    let leftover = decoder.flush();
    if !leftover.is_empty() {
        shared.notify(&leftover);
    }

    let detached = {
        let mut slot = shared.input();
        if slot.as_ref().is_some_and(|input| input.reader.owns(&stop)) {
            slot.take()
        } else {
            None
        }
    };
    // Dropping closes the session's control handle; our own JoinHandle is
    // simply detached.
    if let Some(input) = detached {
        drop(input.connection);
        input.reader.stop_and_join();
    }

    // The same device serving as output is gone too.
    let output = {
        let mut slot = shared.output();
        if slot.as_ref().is_some_and(|output| output.path == path) {
            slot.take()
        } else {
            None
        }
    };
    if let Some(output) = output {
        drop(output);
        log::info!("Closed output {path} with its input");
    }

    shared.notify(&disconnect_notice(&path));
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
