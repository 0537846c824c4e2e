//! Display sink that forwards text into a crossbeam channel.
//!
//! Lets a consumer on another thread pull display text at its own pace
//! (the CLI prints it; tests assert on it). Sending never blocks: the
//! channel is unbounded, and a dropped receiver just discards text.

use crossbeam_channel::{Receiver, Sender};

use crate::ports::DisplaySink;

pub struct ChannelSink {
    tx: Sender<String>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn new() -> (Self, Receiver<String>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelSink {
    fn append_string_to_display(&self, text: &str) {
        if self.tx.send(text.to_string()).is_err() {
            log::trace!("Display receiver gone, dropped {} chars", text.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_arrives_in_order() {
        let (sink, rx) = ChannelSink::new();
        sink.append_string_to_display("one");
        sink.append_string_to_display("two");
        assert_eq!(rx.try_recv().unwrap(), "one");
        assert_eq!(rx.try_recv().unwrap(), "two");
    }

    #[test]
    fn dropped_receiver_is_not_an_error() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.append_string_to_display("nobody listening");
    }
}
