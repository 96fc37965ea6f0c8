//! Incremental decoding of a streamed reply body.

/// Streaming UTF-8 decoder.
///
/// A multi-byte character split across two chunks is held back until the
/// rest of it arrives, so the decoded text never shows a spurious
/// replacement character at a chunk boundary.
#[derive(Debug, Clone, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of the buffered bytes plus `chunk` as possible
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut buffered = std::mem::take(&mut self.pending);
        buffered.extend_from_slice(chunk);

        let mut out = String::with_capacity(buffered.len());
        let mut input = buffered.as_slice();

        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    input = &[];
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());

                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = input.to_vec();
        out
    }

    /// Flush at end of stream; a dangling partial character becomes U+FFFD
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    #[cfg(test)]
    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Accumulator for the text of the agent turn currently streaming
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    decoder: Utf8Decoder,
    /// Accumulated text buffer
    text_buffer: String,
    /// Number of body chunks seen so far
    chunks: usize,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk. Returns true when the visible text grew.
    pub fn push_chunk(&mut self, bytes: &[u8]) -> bool {
        self.chunks += 1;
        let delta = self.decoder.decode(bytes);
        self.push_delta(&delta)
    }

    /// Append already-decoded text
    pub fn push_delta(&mut self, delta: &str) -> bool {
        if delta.is_empty() {
            return false;
        }
        self.text_buffer.push_str(delta);
        true
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text_buffer
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// End of stream: flush the decoder and hand back the full text
    pub fn finalize(mut self) -> String {
        let tail = self.decoder.finish();
        self.text_buffer.push_str(&tail);
        self.text_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_chunks_in_order() {
        let mut state = StreamState::new();
        assert!(state.push_chunk(b"Hel"));
        assert_eq!(state.text(), "Hel");
        assert!(state.push_chunk(b"lo, "));
        assert_eq!(state.text(), "Hello, ");
        assert!(state.push_chunk(b"world"));
        assert_eq!(state.chunk_count(), 3);
        assert_eq!(state.finalize(), "Hello, world");
    }

    #[test]
    fn holds_back_split_multibyte_characters() {
        let bytes = "¡Copiado!".as_bytes();
        let mut decoder = Utf8Decoder::new();

        // '¡' is two bytes; cut between them
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert!(decoder.has_pending());
        assert_eq!(decoder.decode(&bytes[1..]), "¡Copiado!");
        assert!(!decoder.has_pending());
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn four_byte_character_across_three_chunks() {
        let bytes = "a🦀b".as_bytes();
        let mut state = StreamState::new();
        assert!(state.push_chunk(&bytes[..2]));
        assert_eq!(state.text(), "a");
        assert!(!state.push_chunk(&bytes[2..4]));
        assert_eq!(state.text(), "a");
        assert!(state.push_chunk(&bytes[4..]));
        assert_eq!(state.finalize(), "a🦀b");
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[b'o', 0xFF, b'k']), "o\u{FFFD}k");
    }

    #[test]
    fn dangling_partial_character_is_flushed_at_end() {
        let mut state = StreamState::new();
        state.push_chunk(&[b'x', 0xE2, 0x82]);
        assert_eq!(state.text(), "x");
        assert_eq!(state.finalize(), "x\u{FFFD}");
    }
}
