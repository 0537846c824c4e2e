//! Inbound wire bytes → display text
//!
//! Two policies:
//! - `Raw`: every byte becomes the char with the same code point
//!   (ISO-8859-1), so control characters and high bytes reach the display
//!   untouched.
//! - `Cooked`: UTF-8 text. Sequences split across reads are carried over,
//!   invalid bytes become U+FFFD, CR and CRLF both become a single `\n`,
//!   and C0 controls other than `\t` and `\n` are dropped, as is DEL.
//!   Everything from U+0080 up, C1 controls included, is kept.

/// How inbound bytes are turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Raw,
    Cooked,
}

impl DecodeMode {
    pub fn from_raw_flag(raw: bool) -> Self {
        if raw {
            DecodeMode::Raw
        } else {
            DecodeMode::Cooked
        }
    }
}

/// Stateful decoder; keep one per input connection so state carries
/// across read boundaries.
#[derive(Debug)]
pub struct InboundDecoder {
    mode: DecodeMode,
    /// Leading bytes of a UTF-8 sequence cut off at the end of the last read
    partial: Vec<u8>,
    /// Last char emitted came from a `\r`; a following `\n` is swallowed
    after_cr: bool,
}

impl InboundDecoder {
    pub fn new(mode: DecodeMode) -> Self {
        Self {
            mode,
            partial: Vec::new(),
            after_cr: false,
        }
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Switch policy. Bytes held back by the old policy are decoded by the
    /// new one on the next call, so nothing is lost.
    pub fn set_mode(&mut self, mode: DecodeMode) {
        if self.mode != mode {
            self.mode = mode;
            self.after_cr = false;
        }
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        match self.mode {
            DecodeMode::Raw => {
                let held = std::mem::take(&mut self.partial);
                held.iter().chain(bytes).map(|&b| char::from(b)).collect()
            }
            DecodeMode::Cooked => {
                let text = self.decode_utf8(bytes);
                self.filter(&text)
            }
        }
    }

    /// Emit whatever is still held back (an unfinished UTF-8 sequence
    /// shows as U+FFFD).
    pub fn flush(&mut self) -> String {
        self.after_cr = false;
        if self.partial.is_empty() {
            return String::new();
        }
        match self.mode {
            DecodeMode::Raw => std::mem::take(&mut self.partial)
                .into_iter()
                .map(char::from)
                .collect(),
            DecodeMode::Cooked => {
                self.partial.clear();
                char::REPLACEMENT_CHARACTER.to_string()
            }
        }
    }

    fn decode_utf8(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.partial);
        buf.extend_from_slice(bytes);

        let mut text = String::with_capacity(buf.len());
        let mut input: &[u8] = &buf;
        loop {
            match std::str::from_utf8(input) {
                Ok(s) => {
                    text.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(s) = std::str::from_utf8(valid) {
                        text.push_str(s);
                    }
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes
                            self.partial = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    fn filter(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            let after_cr = std::mem::replace(&mut self.after_cr, false);
            match c {
                '\r' => {
                    out.push('\n');
                    self.after_cr = true;
                }
                '\n' if after_cr => {}
                '\n' | '\t' => out.push(c),
                c if c < ' ' || c == '\u{7f}' => {}
                c => out.push(c),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cooked() -> InboundDecoder {
        InboundDecoder::new(DecodeMode::Cooked)
    }

    #[test]
    fn raw_mode_passes_every_byte() {
        let mut decoder = InboundDecoder::new(DecodeMode::Raw);
        let bytes: Vec<u8> = (0u8..=255).collect();
        let text = decoder.decode(&bytes);
        let back: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
        assert_eq!(back, bytes);
        assert_eq!(text.chars().count(), 256);
    }

    #[test]
    fn cooked_mode_normalises_line_endings() {
        let mut decoder = cooked();
        assert_eq!(decoder.decode(b"a\r\nb\rc\nd"), "a\nb\nc\nd");
    }

    #[test]
    fn crlf_split_across_reads_yields_one_newline() {
        let mut decoder = cooked();
        assert_eq!(decoder.decode(b"OK\r"), "OK\n");
        assert_eq!(decoder.decode(b"\nREADY"), "READY");
    }

    #[test]
    fn double_cr_yields_two_newlines() {
        let mut decoder = cooked();
        assert_eq!(decoder.decode(b"\r\r\n"), "\n\n");
    }

    #[test]
    fn cooked_mode_drops_control_characters() {
        let mut decoder = cooked();
        assert_eq!(decoder.decode(b"\x00A\x07B\x1b\x7fC\tD"), "ABC\tD");
    }

    #[test]
    fn cooked_mode_keeps_c1_and_latin_text() {
        let mut decoder = cooked();
        // U+0085 NEL and U+009B CSI, then "é"
        let text = decoder.decode("a\u{85}b\u{9b}é".as_bytes());
        assert_eq!(text, "a\u{85}b\u{9b}é");
    }

    #[test]
    fn utf8_sequence_split_across_reads() {
        let mut decoder = cooked();
        let degree = "°".as_bytes();
        assert_eq!(decoder.decode(&[b'2', b'5', degree[0]]), "25");
        assert_eq!(decoder.decode(&[degree[1], b'C']), "°C");
    }

    #[test]
    fn invalid_utf8_becomes_replacement_character() {
        let mut decoder = cooked();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn held_bytes_survive_switch_to_raw() {
        let mut decoder = cooked();
        assert_eq!(decoder.decode(&[b'x', 0xC2]), "x");
        decoder.set_mode(DecodeMode::Raw);
        assert_eq!(decoder.decode(b"y"), "\u{C2}y");
    }

    #[test]
    fn flush_reports_unfinished_sequence() {
        let mut decoder = cooked();
        decoder.decode(&[0xE2, 0x82]);
        assert_eq!(decoder.flush(), "\u{FFFD}");
        assert_eq!(decoder.flush(), "");
    }
}
