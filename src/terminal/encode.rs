//! Outbound text → wire bytes

/// Encodes outbound text as UTF-8, expanding bare `\n` to `\r\n` when CRLF
/// is on.
///
/// A `\n` already preceded by `\r` is left alone so CRLF input is not
/// turned into CR CR LF. The last byte sent is remembered, so a CR ending
/// one transmit and an LF starting the next still count as a pair. Keep one
/// encoder per output connection.
#[derive(Debug, Default)]
pub struct OutboundEncoder {
    last: Option<u8>,
}

impl OutboundEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, text: &str, crlf: bool) -> Vec<u8> {
        let bytes = text.as_bytes();
        let Some(&last) = bytes.last() else {
            return Vec::new();
        };

        let out = if crlf {
            let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 8);
            let mut prev = self.last;
            for &b in bytes {
                if b == b'\n' && prev != Some(b'\r') {
                    out.push(b'\r');
                }
                out.push(b);
                prev = Some(b);
            }
            out
        } else {
            bytes.to_vec()
        };
        self.last = Some(last);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_once(text: &str, crlf: bool) -> Vec<u8> {
        OutboundEncoder::new().encode(text, crlf)
    }

    #[test]
    fn newline_passes_through_without_crlf() {
        assert_eq!(encode_once("AT\n", false), b"AT\n");
    }

    #[test]
    fn bare_newline_expands_with_crlf() {
        assert_eq!(encode_once("AT\nATZ\n", true), b"AT\r\nATZ\r\n");
    }

    #[test]
    fn existing_crlf_is_not_doubled() {
        assert_eq!(encode_once("AT\r\n", true), b"AT\r\n");
    }

    #[test]
    fn lone_carriage_return_is_untouched() {
        assert_eq!(encode_once("a\rb", true), b"a\rb");
    }

    #[test]
    fn multibyte_text_is_utf8() {
        assert_eq!(encode_once("°C\n", true), "°C\r\n".as_bytes());
    }

    #[test]
    fn crlf_split_across_transmits_is_not_doubled() {
        let mut encoder = OutboundEncoder::new();
        assert_eq!(encoder.encode("ATZ\r", true), b"ATZ\r");
        assert_eq!(encoder.encode("\nATI\n", true), b"\nATI\r\n");
    }

    #[test]
    fn carriage_return_sent_with_crlf_off_still_pairs() {
        let mut encoder = OutboundEncoder::new();
        encoder.encode("+++\r", false);
        assert_eq!(encoder.encode("\n", true), b"\n");
    }

    #[test]
    fn empty_text_keeps_pending_carriage_return() {
        let mut encoder = OutboundEncoder::new();
        encoder.encode("x\r", true);
        assert!(encoder.encode("", true).is_empty());
        assert_eq!(encoder.encode("\n", true), b"\n");
    }
}
