//! Incremental UTF-8 decoding for pipe output.

/// Decodes one output pipe chunk by chunk.
///
/// A multi-byte character split across two reads is held back until its
/// remaining bytes arrive; whatever is left at EOF is decoded lossily.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Truncated sequence at the end; wait for the next read
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let keep = rest.len();
        let tail = self.pending.split_off(self.pending.len() - keep);
        self.pending = tail;
        text
    }

    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_carry_holds_split_character() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.decode(b"caf\xc3"), "caf");
        assert_eq!(carry.decode(b"\xa9 ok"), "\u{e9} ok");
        assert_eq!(carry.decode("\u{1f600}".as_bytes()), "\u{1f600}");
        assert_eq!(carry.decode(b"\xf0\x9f"), "");
        assert_eq!(carry.decode(b"\x98"), "");
        assert_eq!(carry.decode(b"\x80!"), "\u{1f600}!");
        assert_eq!(carry.finish(), "");
    }

    #[test]
    fn test_utf8_carry_flushes_truncated_tail_at_eof() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.decode(b"end\xe2\x82"), "end");
        assert_eq!(carry.finish(), "\u{fffd}");
        assert_eq!(carry.decode(b"\xffx"), "\u{fffd}x");
    }
}
