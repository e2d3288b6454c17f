use std::io::{self, Write};

const DEFAULT_CAPACITY: usize = 64;

/// Growable output buffer for encoding.
///
/// Bytes are written into a chunk of fixed capacity. When a write does not fit,
/// the chunk is sealed and a new one of at least double the capacity is started,
/// so earlier bytes are never moved while encoding. [`OutputBuffer::finish`]
/// copies everything into a single exactly-sized `Vec<u8>`.
///
/// A buffer can be reused across encode calls; the largest chunk is kept.
#[derive(Debug)]
pub struct OutputBuffer {
    sealed: Vec<Vec<u8>>,
    current: Vec<u8>,
    len: usize,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a buffer whose first chunk holds `capacity` bytes, rounded up to a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        OutputBuffer {
            sealed: Vec::new(),
            current: Vec::with_capacity(capacity.max(1).next_power_of_two()),
            len: 0,
        }
    }

    /// Total number of bytes written since the last [`finish`](Self::finish).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks currently holding data.
    pub fn chunk_count(&self) -> usize {
        self.sealed.len() + usize::from(!self.current.is_empty())
    }

    /// Capacity of the chunk currently being written.
    pub fn chunk_capacity(&self) -> usize {
        self.current.capacity()
    }

    /// Makes room for `additional` contiguous bytes in the current chunk.
    pub fn reserve(&mut self, additional: usize) {
        let capacity = self.current.capacity();
        if capacity - self.current.len() >= additional {
            return;
        }
        let next = capacity
            .saturating_mul(2)
            .max(additional.checked_next_power_of_two().unwrap_or(additional));
        let full = std::mem::replace(&mut self.current, Vec::with_capacity(next));
        if !full.is_empty() {
            self.sealed.push(full);
        }
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.current.extend_from_slice(bytes);
        self.len += bytes.len();
    }

    /// Concatenates all chunks into one exact-length result and resets the buffer.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in self.sealed.drain(..) {
            out.extend_from_slice(&chunk);
        }
        out.extend_from_slice(&self.current);
        self.clear();
        out
    }

    /// Drops everything written so far, keeping the current chunk's allocation.
    pub fn clear(&mut self) {
        self.sealed.clear();
        self.current.clear();
        self.len = 0;
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
