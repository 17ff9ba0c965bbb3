//! Accumulates received bytes and splits them on the line terminator.

use memchr::memchr;

/// Carriage return ends every line on the receive path.
pub const LINE_TERMINATOR: u8 = b'\r';

/// Longest partial line held while waiting for a terminator.
pub const MAX_PENDING: usize = 16 * 1024;

/// Byte accumulator that yields one terminated line at a time.
///
/// Bytes after a terminator stay buffered for the next call, so a chunk
/// carrying several lines is delivered line by line.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to contain no terminator.
    scanned: usize,
    limit: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            limit,
        }
    }

    /// Append received bytes and return how many were discarded.
    ///
    /// When the held bytes have no terminator and the new chunk would push
    /// them past the limit, the unterminated partial line is dropped.
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let mut dropped = 0;
        if self.pending.len() + bytes.len() > self.limit
            && memchr(LINE_TERMINATOR, &self.pending[self.scanned..]).is_none()
        {
            dropped = self.pending.len();
            self.clear();
        }
        self.pending.extend_from_slice(bytes);
        dropped
    }

    /// Remove and return the next complete line without its terminator.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        match memchr(LINE_TERMINATOR, &self.pending[self.scanned..]) {
            Some(offset) => {
                let end = self.scanned + offset;
                let mut line: Vec<u8> = self.pending.drain(..=end).collect();
                line.pop();
                self.scanned = 0;
                Some(line)
            }
            None => {
                self.scanned = self.pending.len();
                None
            }
        }
    }

    /// Drop any partial line.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.scanned = 0;
    }

    /// Bytes held that do not yet form a complete line.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_on_carriage_return() {
        let mut buf = LineBuffer::new();
        buf.extend(b"hello\rworld\r");
        assert_eq!(buf.next_line().as_deref(), Some(&b"hello"[..]));
        assert_eq!(buf.next_line().as_deref(), Some(&b"world"[..]));
        assert_eq!(buf.next_line(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn keeps_partial_line_across_chunks() {
        let mut buf = LineBuffer::new();
        buf.extend(b"hel");
        assert_eq!(buf.next_line(), None);
        buf.extend(b"lo\rne");
        assert_eq!(buf.next_line().as_deref(), Some(&b"hello"[..]));
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn line_feed_is_payload() {
        let mut buf = LineBuffer::new();
        buf.extend(b"a\nb\r");
        assert_eq!(buf.next_line().as_deref(), Some(&b"a\nb"[..]));
    }

    #[test]
    fn empty_line() {
        let mut buf = LineBuffer::new();
        buf.extend(b"\r");
        assert_eq!(buf.next_line(), Some(Vec::new()));
    }

    #[test]
    fn clear_discards_partial() {
        let mut buf = LineBuffer::new();
        buf.extend(b"stale");
        buf.next_line();
        buf.clear();
        buf.extend(b"fresh\r");
        assert_eq!(buf.next_line().as_deref(), Some(&b"fresh"[..]));
    }

    #[test]
    fn overlong_partial_line_is_dropped() {
        let mut buf = LineBuffer::with_limit(8);
        assert_eq!(buf.extend(b"abcdefg"), 0);
        assert_eq!(buf.extend(b"hij\r"), 7);
        assert_eq!(buf.next_line().as_deref(), Some(&b"hij"[..]));
    }

    #[test]
    fn complete_lines_survive_the_limit() {
        let mut buf = LineBuffer::with_limit(4);
        buf.extend(b"a\rbc");
        assert_eq!(buf.extend(b"de"), 0);
        assert_eq!(buf.next_line().as_deref(), Some(&b"a"[..]));
        assert_eq!(buf.len(), 4);
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_lines(
            lines in proptest::collection::vec("[a-zA-Z0-9 ]{0,12}", 0..8),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let mut wire = Vec::new();
            for line in &lines {
                wire.extend_from_slice(line.as_bytes());
                wire.push(LINE_TERMINATOR);
            }

            let mut offsets: Vec<usize> = cuts.iter().map(|c| c.index(wire.len() + 1)).collect();
            offsets.push(0);
            offsets.push(wire.len());
            offsets.sort_unstable();
            offsets.dedup();

            let mut buf = LineBuffer::new();
            let mut seen = Vec::new();
            for window in offsets.windows(2) {
                buf.extend(&wire[window[0]..window[1]]);
                while let Some(line) = buf.next_line() {
                    seen.push(String::from_utf8(line).unwrap());
                }
            }

            prop_assert_eq!(seen, lines);
            prop_assert!(buf.is_empty());
        }
    }
}
