//! Display sink port

/// Receives decoded text from the terminal.
///
/// Called from the reader thread for every decoded chunk and for
/// disconnect notices, and from the caller's thread for write failures.
/// Implementations should return quickly.
pub trait DisplaySink: Send + Sync {
    fn append_string_to_display(&self, text: &str);
}
