//! Chunking: split a blob into bounded, contiguous, in-order slices.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Maximum number of bytes per upload message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct ChunkSize(NonZeroUsize);

impl ChunkSize {
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        NonZeroUsize::new(bytes).map(Self)
    }

    /// Convert a size in MiB (possibly fractional) into bytes.
    pub fn from_mib(mib: f64) -> Option<Self> {
        if !mib.is_finite() || mib <= 0.0 {
            return None;
        }
        Self::from_bytes((mib * BYTES_PER_MIB) as usize)
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }

    /// Number of chunks a blob of `len` bytes is split into.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.get())
    }
}

impl TryFrom<usize> for ChunkSize {
    type Error = String;

    fn try_from(bytes: usize) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes).ok_or_else(|| "chunk size must be positive".to_string())
    }
}

impl From<ChunkSize> for usize {
    fn from(c: ChunkSize) -> usize {
        c.get()
    }
}

/// One slice of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Position of this chunk in the sequence, from 0.
    pub index: usize,
    /// Byte offset of `bytes[0]` within the blob.
    pub offset: usize,
    pub bytes: &'a [u8],
    /// True for the final chunk of the blob.
    pub is_last: bool,
}

impl Chunk<'_> {
    /// Offset one past the last byte of this chunk.
    pub fn end(&self) -> usize {
        self.offset + self.bytes.len()
    }
}

/// Iterator over the chunks of a blob, in ascending offset order.
pub struct Chunks<'a> {
    data: &'a [u8],
    size: usize,
    offset: usize,
    index: usize,
}

impl<'a> Chunks<'a> {
    pub fn new(data: &'a [u8], size: ChunkSize) -> Self {
        Self { data, size: size.get(), offset: 0, index: 0 }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        if self.offset >= self.data.len() {
            return None;
        }
        let end = (self.offset + self.size).min(self.data.len());
        let chunk = Chunk {
            index: self.index,
            offset: self.offset,
            bytes: &self.data[self.offset..end],
            is_last: end == self.data.len(),
        };
        self.offset = end;
        self.index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.data.len() - self.offset).div_ceil(self.size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

/// Split `data` into chunks of at most `size` bytes.
pub fn chunks(data: &[u8], size: ChunkSize) -> Chunks<'_> {
    Chunks::new(data, size)
}
