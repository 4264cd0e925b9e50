use core::cmp::min;
use core::ops::Range;

/// Byte window over a borrowed scratch buffer that transport reads are
/// appended to and the parser consumes from the front of.
///
/// Holds `0 <= start <= end <= buf.len()`. Bytes in `[start, end)` have been
/// read from the transport but not yet consumed.
pub struct ReceiveWindow<'buf> {
    buf: &'buf mut [u8],
    start: usize,
    end: usize,
}

impl<'buf> ReceiveWindow<'buf> {
    pub fn new(buf: &'buf mut [u8]) -> Self {
        ReceiveWindow {
            buf,
            start: 0,
            end: 0,
        }
    }

    /// Creates a window whose `pending` bytes are already valid, e.g. bytes
    /// that arrived after the end of an AT command reply.
    pub fn with_pending(buf: &'buf mut [u8], pending: Range<usize>) -> Self {
        let end = min(pending.end, buf.len());
        let start = min(pending.start, end);

        ReceiveWindow { buf, start, end }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Unconsumed bytes.
    pub fn available(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Offsets of the unconsumed bytes, to carry them over into the next
    /// window with [`with_pending`](#method.with_pending).
    pub fn pending(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when no more transport bytes can be appended, even after
    /// compaction.
    pub fn is_full(&self) -> bool {
        self.len() == self.buf.len()
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.available().starts_with(prefix)
    }

    /// Marks `count` bytes at the front as consumed.
    pub fn consume(&mut self, count: usize) {
        self.start = min(self.start + count, self.end);
    }

    /// Moves the unconsumed tail to offset 0 so that the free space after it
    /// is as large as possible. An empty window is simply reset to `(0, 0)`.
    pub fn compact(&mut self) {
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        } else if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }

    /// Free space after the valid bytes, for the transport to read into.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.end..]
    }

    /// Records that the transport wrote `count` bytes into
    /// [`spare_mut`](#method.spare_mut).
    pub fn commit(&mut self, count: usize) {
        self.end = min(self.end + count, self.buf.len());
    }
}
