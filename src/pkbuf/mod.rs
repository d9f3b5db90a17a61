//! Packet buffer with reserved headroom.
//!
//! ```text
//! |<-- headroom -->|<-- data (len) -->|<-- tailroom -->|
//! 0                data               data + len       capacity
//! ```
//!
//! Receivers reserve headroom on an empty buffer so that later protocol layers
//! can prepend their header in place. Every operation is bounds-checked and
//! leaves the buffer untouched when it fails.

pub mod pool;

pub use self::pool::PacketBufferPool;

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("headroom must be reserved before any payload is written ({len} bytes present)")]
    NotEmpty { len: usize },
    #[error("not enough headroom: requested {requested}, available {available}")]
    InsufficientHeadroom { requested: usize, available: usize },
    #[error("not enough tailroom: requested {requested}, available {available}")]
    InsufficientTailroom { requested: usize, available: usize },
    #[error("cannot trim to {requested} bytes, buffer holds {len}")]
    TrimBeyondLength { requested: usize, len: usize },
}

pub struct PacketBuffer {
    storage: Vec<u8>,
    /// Offset of the first payload byte, i.e. the headroom.
    data: usize,
    len: usize,
    /// Set by the first `put` or `push`; headroom is fixed from then on.
    written: bool,
    /// Pool the storage goes back to on drop.
    pool: Option<Arc<pool::Shared>>,
}

impl PacketBuffer {
    /// Standalone buffer, not backed by a pool.
    pub fn new(capacity: usize) -> Self {
        PacketBuffer {
            storage: vec![0u8; capacity],
            data: 0,
            len: 0,
            written: false,
            pool: None,
        }
    }

    pub(crate) fn pooled(storage: Vec<u8>, pool: Arc<pool::Shared>) -> Self {
        PacketBuffer {
            storage,
            data: 0,
            len: 0,
            written: false,
            pool: Some(pool),
        }
    }

    /// Standalone buffer holding a copy of `payload` behind `headroom` bytes.
    pub fn from_payload(headroom: usize, payload: &[u8]) -> Self {
        let mut buf = PacketBuffer::new(headroom + payload.len());
        buf.data = headroom;
        buf.len = payload.len();
        buf.written = true;
        buf.data_mut().copy_from_slice(payload);
        buf
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn headroom(&self) -> usize {
        self.data
    }

    #[inline]
    pub fn tailroom(&self) -> usize {
        self.capacity() - self.data - self.len
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reserve `len` bytes of headroom. Only valid until payload is first
    /// written, even if it has since been trimmed away.
    pub fn reserve(&mut self, len: usize) -> Result<(), BufferError> {
        if self.written {
            return Err(BufferError::NotEmpty { len: self.len });
        }
        if len > self.tailroom() {
            return Err(BufferError::InsufficientTailroom {
                requested: len,
                available: self.tailroom(),
            });
        }
        self.data += len;
        Ok(())
    }

    /// Extend the payload by `len` bytes at the tail and return the new window
    /// for writing.
    pub fn put(&mut self, len: usize) -> Result<&mut [u8], BufferError> {
        if len > self.tailroom() {
            return Err(BufferError::InsufficientTailroom {
                requested: len,
                available: self.tailroom(),
            });
        }
        let start = self.data + self.len;
        self.len += len;
        self.written = true;
        Ok(&mut self.storage[start..start + len])
    }

    /// Append a copy of `bytes` at the tail.
    pub fn put_data(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.put(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Shrink the payload to its first `len` bytes.
    pub fn trim(&mut self, len: usize) -> Result<(), BufferError> {
        if len > self.len {
            return Err(BufferError::TrimBeyondLength {
                requested: len,
                len: self.len,
            });
        }
        self.len = len;
        Ok(())
    }

    /// Consume `len` bytes of headroom to prepend a header in place.
    pub fn push(&mut self, len: usize) -> Result<&mut [u8], BufferError> {
        if len > self.data {
            return Err(BufferError::InsufficientHeadroom {
                requested: len,
                available: self.data,
            });
        }
        self.data -= len;
        self.len += len;
        self.written = true;
        Ok(&mut self.storage[self.data..self.data + len])
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.storage[self.data..self.data + self.len]
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.data..self.data + self.len]
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }
}

impl Drop for PacketBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.storage));
        }
    }
}

impl fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("len", &self.len)
            .field("headroom", &self.headroom())
            .field("tailroom", &self.tailroom())
            .field("capacity", &self.capacity())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}
