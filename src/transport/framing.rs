//! The bracket-counting tokenizer that turns a byte stream into a sequence of
//! whole JSON envelope documents.
//!
//! There is no length prefix: envelopes are detected purely by counting `{`
//! / `}` outside of JSON string literals, the way spec.md §4.B describes. A
//! single contiguous buffer is used (rather than a ring buffer) because each
//! complete envelope needs to be handed to the JSON parser as one contiguous
//! slice; see `other_examples/.../sse_parser.rs` for the same
//! accumulate-then-drain shape applied to a simpler, line-delimited framing.

use crate::error::LimeError;

/// Accumulates bytes from the socket and yields complete envelope slices.
pub struct FrameBuffer {
    buf: Vec<u8>,
    capacity: usize,
    /// Offset of the first byte not yet written by the socket reader.
    write_offset: usize,
    /// Offset of the first byte of the envelope currently being scanned.
    envelope_start: usize,
    /// Offset of the next byte to examine.
    scan_pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        FrameBuffer {
            buf: vec![0u8; capacity],
            capacity,
            write_offset: 0,
            envelope_start: 0,
            scan_pos: 0,
            depth: 0,
            in_string: false,
            escaped: false,
        }
    }

    /// The writable tail of the buffer, to be filled by the next socket read.
    /// Empty once the buffer is full of an envelope still in progress; call
    /// [`FrameBuffer::compact_or_overflow`] first to make room.
    pub fn write_slice(&mut self) -> &mut [u8] {
        &mut self.buf[self.write_offset..self.capacity]
    }

    /// Record that `n` bytes were just written into [`FrameBuffer::write_slice`].
    pub fn commit(&mut self, n: usize) {
        self.write_offset += n;
    }

    /// Make room in the buffer by discarding bytes already consumed by
    /// complete envelopes. Fails with [`LimeError::BufferOverflow`] if doing
    /// so frees no space, i.e. a single envelope exceeds `capacity`.
    pub fn compact_or_overflow(&mut self) -> Result<(), LimeError> {
        if self.write_offset >= self.capacity {
            if self.envelope_start > 0 {
                self.buf.copy_within(self.envelope_start..self.write_offset, 0);
                self.write_offset -= self.envelope_start;
                self.scan_pos -= self.envelope_start;
                self.envelope_start = 0;
            }
            if self.write_offset >= self.capacity {
                return Err(LimeError::BufferOverflow {
                    capacity: self.capacity,
                });
            }
        }
        Ok(())
    }

    /// Pull the next complete envelope out of the buffer, if one is fully
    /// present. Call repeatedly after each `commit` until it returns `None`.
    pub fn next_envelope(&mut self) -> Result<Option<Vec<u8>>, LimeError> {
        while self.scan_pos < self.write_offset {
            let b = self.buf[self.scan_pos];

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                self.scan_pos += 1;
                continue;
            }

            match b {
                b'"' => {
                    self.in_string = true;
                    self.scan_pos += 1;
                }
                b'{' => {
                    self.depth += 1;
                    self.scan_pos += 1;
                }
                b'}' => {
                    if self.depth == 0 {
                        return Err(LimeError::invalid_argument(
                            "unbalanced `}` received outside of any envelope",
                        ));
                    }
                    self.depth -= 1;
                    self.scan_pos += 1;
                    if self.depth == 0 {
                        let end = self.scan_pos;
                        let envelope = self.buf[self.envelope_start..end].to_vec();
                        self.envelope_start = end;
                        return Ok(Some(envelope));
                    }
                }
                b' ' | b'\t' | b'\r' | b'\n' if self.depth == 0 => {
                    self.scan_pos += 1;
                    self.envelope_start = self.scan_pos;
                }
                _ if self.depth == 0 => {
                    return Err(LimeError::invalid_argument(format!(
                        "unexpected byte {:#04x} between envelopes (only ASCII whitespace is permitted)",
                        b
                    )));
                }
                _ => {
                    self.scan_pos += 1;
                }
            }
        }
        Ok(None)
    }

    /// Offset up to which compaction would need to shift remaining bytes;
    /// exposed for tests that want to assert on buffer state.
    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.write_offset - self.envelope_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buffer: &mut FrameBuffer, chunk: &[u8]) -> Vec<Vec<u8>> {
        buffer.compact_or_overflow().unwrap();
        let dest = buffer.write_slice();
        let n = chunk.len().min(dest.len());
        dest[..n].copy_from_slice(&chunk[..n]);
        buffer.commit(n);
        assert_eq!(n, chunk.len(), "test chunk must fit in one write");

        let mut envelopes = Vec::new();
        while let Some(envelope) = buffer.next_envelope().unwrap() {
            envelopes.push(envelope);
        }
        envelopes
    }

    #[test]
    fn single_envelope_in_one_chunk() {
        let mut buffer = FrameBuffer::new(256);
        let envelopes = feed(&mut buffer, br#"{"event":"received"}"#);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0], br#"{"event":"received"}"#);
    }

    #[test]
    fn two_concatenated_envelopes() {
        let mut buffer = FrameBuffer::new(256);
        let envelopes = feed(&mut buffer, br#"{"event":"received"} {"event":"consumed"}"#);
        assert_eq!(envelopes.len(), 2);
    }

    #[test]
    fn envelope_split_across_many_chunks() {
        let mut buffer = FrameBuffer::new(256);
        let whole = br#"{"event":"received","metadata":{"k":"v"}}"#;
        let mut envelopes = Vec::new();
        for byte in whole {
            envelopes.extend(feed(&mut buffer, &[*byte]));
        }
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0], whole);
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let mut buffer = FrameBuffer::new(256);
        let whole = br#"{"content":"{ not a brace }"}"#;
        let envelopes = feed(&mut buffer, whole);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0], whole);
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        let mut buffer = FrameBuffer::new(256);
        let whole = br#"{"content":"a \" b { c"}"#;
        let envelopes = feed(&mut buffer, whole);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0], whole);
    }

    #[test]
    fn escaped_backslash_before_quote_still_ends_string() {
        let mut buffer = FrameBuffer::new(256);
        // content is: a \  then a closing quote: `"a \\"` i.e. two backslashes then quote.
        let whole = br#"{"content":"a \\"}"#;
        let envelopes = feed(&mut buffer, whole);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0], whole);
    }

    #[test]
    fn rejects_non_whitespace_between_envelopes() {
        let mut buffer = FrameBuffer::new(256);
        buffer.compact_or_overflow().unwrap();
        let dest = buffer.write_slice();
        let data = br#"{"event":"received"}x{"event":"consumed"}"#;
        dest[..data.len()].copy_from_slice(data);
        buffer.commit(data.len());
        // First envelope comes out fine.
        assert!(buffer.next_envelope().unwrap().is_some());
        // The stray `x` is rejected.
        assert!(buffer.next_envelope().is_err());
    }

    #[test]
    fn overflow_when_single_envelope_exceeds_capacity() {
        let mut buffer = FrameBuffer::new(16);
        buffer.compact_or_overflow().unwrap();
        let huge = vec![b'{'; 16];
        let dest = buffer.write_slice();
        dest.copy_from_slice(&huge);
        buffer.commit(16);
        assert!(buffer.next_envelope().unwrap().is_none());
        assert!(buffer.compact_or_overflow().is_err());
    }

    #[test]
    fn compaction_frees_space_for_trailing_partial_envelope() {
        let mut buffer = FrameBuffer::new(32);
        let first = br#"{"event":"received"}"#; // 21 bytes
        let envelopes = feed(&mut buffer, first);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(buffer.pending_len(), 0);
        // Now the whole buffer is free again after compaction kicks in on next write.
        buffer.compact_or_overflow().unwrap();
        assert_eq!(buffer.write_slice().len(), 32);
    }
}
