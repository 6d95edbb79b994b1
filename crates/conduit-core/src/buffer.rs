//! Byte ring buffer connecting two graph nodes.
//!
//! [`CircularBuffer`] is the plain data structure: storage, cursors and the
//! derived `avail`/`free` counts. It does no locking of its own. The
//! engine wraps every buffer in a [`SharedBuffer`](crate::SharedBuffer),
//! which brackets each cursor update and its notification in one critical
//! section.
//!
//! # Cursor rules
//!
//! Cursors are byte offsets in `[0, capacity)`. After every mutation the
//! derived counts are recomputed from the cursor pair rather than by
//! arithmetic on the previous counts:
//!
//! | relation | after produce | after consume |
//! |---|---|---|
//! | `r < w` | `w - r` | `w - r` |
//! | `r == w` | `capacity` (full) | `0` (empty) |
//! | `r > w` | `capacity - (r - w)` | `capacity - (r - w)` |
//!
//! Equal cursors are ambiguous, so the operation that ran last decides.
//!
//! # Overwrite
//!
//! Producing more than `free` bytes is not an error: the read cursor is
//! dragged to the new write cursor and the oldest unread bytes are lost.

use crate::error::BufferError;
use crate::format::StreamParams;

/// Largest buffer the heap will hand out by default.
pub const HEAP_BUFFER_SIZE: usize = 65_536;

/// Default storage alignment (one data-cache line).
pub const DEFAULT_ALIGNMENT: usize = 64;

/// Capability flags of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferCaps {
    /// Buffer is accessed from more than one core.
    pub shared: bool,
}

/// Region touched by one produce or consume call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    /// Offset of the first byte, relative to the buffer start.
    pub begin: usize,
    /// Bytes advanced.
    pub bytes: usize,
}

/// Fixed-capacity byte ring with read and write cursors.
pub struct CircularBuffer {
    storage: Vec<u8>,
    /// Offset of the aligned region inside `storage`.
    base: usize,
    capacity: usize,
    r_off: usize,
    w_off: usize,
    avail: usize,
    free: usize,
    alignment: usize,
    limit: usize,
    caps: BufferCaps,
    params: StreamParams,
}

impl CircularBuffer {
    /// Allocates a buffer limited to [`HEAP_BUFFER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidSize`] for a zero or oversized capacity,
    /// [`BufferError::InvalidAlignment`] when `alignment` is not a power of
    /// two, [`BufferError::Alloc`] when the allocator refuses the storage.
    pub fn allocate(capacity: usize, alignment: usize) -> Result<Self, BufferError> {
        Self::allocate_with_limit(capacity, alignment, HEAP_BUFFER_SIZE)
    }

    /// Allocates a buffer whose capacity may never exceed `limit`.
    pub fn allocate_with_limit(
        capacity: usize,
        alignment: usize,
        limit: usize,
    ) -> Result<Self, BufferError> {
        check_size(capacity, limit)?;
        if !alignment.is_power_of_two() {
            return Err(BufferError::InvalidAlignment(alignment));
        }
        let (storage, base) = alloc_storage(capacity, alignment)?;

        Ok(Self {
            storage,
            base,
            capacity,
            r_off: 0,
            w_off: 0,
            avail: 0,
            free: capacity,
            alignment,
            limit,
            caps: BufferCaps::default(),
            params: StreamParams::default(),
        })
    }

    /// Changes the capacity, discarding any buffered data.
    ///
    /// Growing allocates new storage; if that fails the buffer is left
    /// exactly as it was. Shrinking reuses the existing storage.
    pub fn resize(&mut self, capacity: usize) -> Result<(), BufferError> {
        check_size(capacity, self.limit)?;
        if capacity == self.capacity {
            return Ok(());
        }
        if capacity > self.capacity {
            let (storage, base) = alloc_storage(capacity, self.alignment)?;
            self.storage = storage;
            self.base = base;
        }
        self.capacity = capacity;
        self.init_cursors();
        Ok(())
    }

    /// Advances the write cursor by `bytes`.
    ///
    /// Returns the affected region, or `None` for a zero-byte call.
    pub fn produce(&mut self, bytes: usize) -> Option<Transaction> {
        if bytes == 0 {
            tracing::trace!("buffer produce of 0 bytes ignored");
            return None;
        }
        let begin = self.w_off;
        self.w_off = (self.w_off + bytes) % self.capacity;
        if bytes > self.free {
            self.r_off = self.w_off;
        }

        self.avail = match self.r_off.cmp(&self.w_off) {
            core::cmp::Ordering::Less => self.w_off - self.r_off,
            core::cmp::Ordering::Equal => self.capacity,
            core::cmp::Ordering::Greater => self.capacity - (self.r_off - self.w_off),
        };
        self.free = self.capacity - self.avail;

        tracing::trace!(bytes, avail = self.avail, free = self.free, "buffer produce");
        Some(Transaction { begin, bytes })
    }

    /// Advances the read cursor by `bytes`.
    ///
    /// Callers must never consume more than [`avail`](Self::avail); doing so
    /// breaks the cursor relationship and is caught only in debug builds.
    pub fn consume(&mut self, bytes: usize) -> Option<Transaction> {
        if bytes == 0 {
            tracing::trace!("buffer consume of 0 bytes ignored");
            return None;
        }
        debug_assert!(
            bytes <= self.avail,
            "consume of {bytes} bytes with only {} available",
            self.avail
        );
        let begin = self.r_off;
        self.r_off = (self.r_off + bytes) % self.capacity;

        self.avail = match self.r_off.cmp(&self.w_off) {
            core::cmp::Ordering::Less => self.w_off - self.r_off,
            core::cmp::Ordering::Equal => 0,
            core::cmp::Ordering::Greater => self.capacity - (self.r_off - self.w_off),
        };
        self.free = self.capacity - self.avail;

        tracing::trace!(bytes, avail = self.avail, free = self.free, "buffer consume");
        Some(Transaction { begin, bytes })
    }

    /// Copies up to `free` bytes of `data` into the ring at the write cursor.
    ///
    /// Does not advance the cursor; follow with [`produce`](Self::produce).
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let bytes = data.len().min(self.free);
        let first = bytes.min(self.capacity - self.w_off);
        let start = self.base + self.w_off;
        self.storage[start..start + first].copy_from_slice(&data[..first]);
        let rest = bytes - first;
        if rest > 0 {
            self.storage[self.base..self.base + rest].copy_from_slice(&data[first..bytes]);
        }
        bytes
    }

    /// Copies up to `avail` bytes from the read cursor into `out`.
    ///
    /// Does not advance the cursor; follow with [`consume`](Self::consume).
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let bytes = out.len().min(self.avail);
        let first = bytes.min(self.capacity - self.r_off);
        let start = self.base + self.r_off;
        out[..first].copy_from_slice(&self.storage[start..start + first]);
        let rest = bytes - first;
        if rest > 0 {
            out[first..bytes].copy_from_slice(&self.storage[self.base..self.base + rest]);
        }
        bytes
    }

    /// Rewinds both cursors to the start and clears the data.
    pub fn reset_pos(&mut self) {
        self.init_cursors();
        let region = self.base..self.base + self.capacity;
        self.storage[region].fill(0);
    }

    fn init_cursors(&mut self) {
        self.r_off = 0;
        self.w_off = 0;
        self.avail = 0;
        self.free = self.capacity;
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes ready to be read.
    pub fn avail(&self) -> usize {
        self.avail
    }

    /// Bytes ready to be written.
    pub fn free(&self) -> usize {
        self.free
    }

    /// Read cursor, relative to the buffer start.
    pub fn read_offset(&self) -> usize {
        self.r_off
    }

    /// Write cursor, relative to the buffer start.
    pub fn write_offset(&self) -> usize {
        self.w_off
    }

    /// Storage alignment requested at allocation.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Capability flags.
    pub fn caps(&self) -> BufferCaps {
        self.caps
    }

    /// Marks the buffer as accessed from more than one core.
    pub fn set_shared(&mut self, shared: bool) {
        self.caps.shared = shared;
    }

    /// Stream format metadata.
    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    /// Replaces the stream format metadata.
    pub fn set_params(&mut self, params: StreamParams) {
        self.params = params;
    }

    /// The buffer contents from the start of the region, ignoring cursors.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.base..self.base + self.capacity]
    }
}

impl core::fmt::Debug for CircularBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CircularBuffer")
            .field("capacity", &self.capacity)
            .field("r_off", &self.r_off)
            .field("w_off", &self.w_off)
            .field("avail", &self.avail)
            .field("free", &self.free)
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}

fn check_size(capacity: usize, limit: usize) -> Result<(), BufferError> {
    if capacity == 0 || capacity > limit {
        return Err(BufferError::InvalidSize {
            size: capacity,
            max: limit,
        });
    }
    Ok(())
}

/// Allocates `capacity` bytes plus alignment slack and returns the aligned start.
fn alloc_storage(capacity: usize, alignment: usize) -> Result<(Vec<u8>, usize), BufferError> {
    let bytes = capacity
        .checked_add(alignment - 1)
        .ok_or(BufferError::Alloc { bytes: capacity })?;
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(bytes)
        .map_err(|_| BufferError::Alloc { bytes })?;
    storage.resize(bytes, 0);
    let base = match storage.as_ptr().align_offset(alignment) {
        offset if offset < alignment => offset,
        _ => 0,
    };
    Ok((storage, base))
}
