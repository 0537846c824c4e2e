//! Serial terminal session.
//!
//! This module separates the concerns of a terminal session:
//! - `encode`: outbound text → wire bytes (CRLF translation)
//! - `decode`: inbound bytes → display text (raw / cooked, pure)
//! - `reader`: the background thread that reads the input connection
//! - `session`: `Terminal`, which owns the connections and orchestrates
//!
//! Input and output are separate connections. They may come from one device
//! (each role holding its own duplicated handle) or from two devices.

pub mod decode;
pub mod encode;
pub mod reader;
pub mod session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, Weak};

pub use decode::{DecodeMode, InboundDecoder};
pub use encode::OutboundEncoder;
pub use session::Terminal;

use crate::domain::{LineConfig, RawDescriptor};
use crate::ports::{DisplaySink, SerialDevice};
use reader::ReaderHandle;

/// Text sent to the display when the input device disappears
pub fn disconnect_notice(port: &str) -> String {
    format!("\n*** {port} disconnected ***\n")
}

/// Text sent to the display when a transmit fails and the output is closed
pub fn write_failure_notice(port: &str, reason: &str) -> String {
    format!("\n*** Write to {port} failed ({reason}); output closed ***\n")
}

/// One open device handle serving one role
pub(crate) struct Connection {
    pub(crate) path: String,
    pub(crate) config: LineConfig,
    pub(crate) device: Box<dyn SerialDevice>,
    pub(crate) descriptor: Option<RawDescriptor>,
    /// CRLF state carried between transmits; unused on the input side
    pub(crate) encoder: OutboundEncoder,
}

impl Connection {
    pub(crate) fn new(path: &str, config: LineConfig, device: Box<dyn SerialDevice>) -> Self {
        let descriptor = device.descriptor();
        Self {
            path: path.to_string(),
            config,
            device,
            descriptor,
            encoder: OutboundEncoder::new(),
        }
    }
}

/// An input connection and the reader thread draining it
pub(crate) struct InputConnection {
    pub(crate) connection: Connection,
    pub(crate) reader: ReaderHandle,
}

/// State shared between a `Terminal` and its reader thread
pub(crate) struct Shared {
    display: RwLock<Option<Weak<dyn DisplaySink>>>,
    raw: AtomicBool,
    crlf: AtomicBool,
    input: Mutex<Option<InputConnection>>,
    output: Mutex<Option<Connection>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            display: RwLock::new(None),
            raw: AtomicBool::new(false),
            crlf: AtomicBool::new(false),
            input: Mutex::new(None),
            output: Mutex::new(None),
        }
    }

    pub(crate) fn set_display(&self, sink: Option<Weak<dyn DisplaySink>>) {
        *self.display.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    pub(crate) fn has_display(&self) -> bool {
        self.display
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Best-effort delivery: an unset or dropped sink swallows the text.
    pub(crate) fn notify(&self, text: &str) {
        let sink = self
            .display
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);
        match sink {
            Some(sink) => sink.append_string_to_display(text),
            None => log::trace!("No display attached, dropped {} chars", text.len()),
        }
    }

    pub(crate) fn raw(&self) -> bool {
        self.raw.load(Ordering::SeqCst)
    }

    pub(crate) fn set_raw(&self, raw: bool) {
        self.raw.store(raw, Ordering::SeqCst);
    }

    pub(crate) fn crlf(&self) -> bool {
        self.crlf.load(Ordering::SeqCst)
    }

    pub(crate) fn set_crlf(&self, crlf: bool) {
        self.crlf.store(crlf, Ordering::SeqCst);
    }

    pub(crate) fn input(&self) -> MutexGuard<'_, Option<InputConnection>> {
        self.input.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn output(&self) -> MutexGuard<'_, Option<Connection>> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapters::channel_sink::ChannelSink;

    #[test]
    fn notify_without_display_is_silent() {
        let shared = Shared::new();
        assert!(!shared.has_display());
        shared.notify("nobody home");
    }

    #[test]
    fn notify_reaches_live_display_only() {
        let shared = Shared::new();
        let (sink, rx) = ChannelSink::new();
        let sink: Arc<dyn DisplaySink> = Arc::new(sink);
        shared.set_display(Some(Arc::downgrade(&sink)));
        assert!(shared.has_display());

        shared.notify("hello");
        assert_eq!(rx.try_recv().unwrap(), "hello");

        drop(sink);
        assert!(!shared.has_display());
        shared.notify("gone");
        assert!(rx.try_recv().is_err());
    }
}
