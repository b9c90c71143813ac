//! Streaming line buffer: preserves row boundaries across chunk reads so
//! `parse_line` never sees a row split mid-line.

#[derive(Debug, Default)]
pub struct StreamingLineBuffer {
    buffer: Vec<u8>,
}

impl StreamingLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return the prefix up to (and including) the
    /// last newline, if any. The trailing remainder stays buffered.
    pub fn add_chunk(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.buffer.extend_from_slice(chunk);

        match self.buffer.iter().rposition(|&b| b == b'\n') {
            None => Vec::new(),
            Some(last_newline) => {
                let complete = self.buffer[..=last_newline].to_vec();
                self.buffer.drain(..=last_newline);
                complete
            }
        }
    }

    /// Drain and return whatever remains buffered (the final,
    /// possibly-unterminated fragment at EOF).
    pub fn take_remaining(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_back_partial_trailing_line() {
        let mut buf = StreamingLineBuffer::new();
        let complete = buf.add_chunk(b"line one\nline tw");
        assert_eq!(complete, b"line one\n");
        assert_eq!(buf.take_remaining(), b"line tw");
    }

    #[test]
    fn emits_nothing_until_a_newline_arrives() {
        let mut buf = StreamingLineBuffer::new();
        assert_eq!(buf.add_chunk(b"no newline yet"), Vec::<u8>::new());
        let complete = buf.add_chunk(b" - now there is\n");
        assert_eq!(complete, b"no newline yet - now there is\n");
    }
}
