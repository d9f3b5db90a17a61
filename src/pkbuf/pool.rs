//! Fixed-size packet buffer pool.
//!
//! Storage is created lazily up to the pool's limit and recycled when a
//! [`PacketBuffer`] is dropped. The handle is cheap to clone and may be used
//! from any thread.

use super::PacketBuffer;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
pub struct PacketBufferPool {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    name: String,
    buffer_size: usize,
    limit: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    free: Vec<Vec<u8>>,
    created: usize,
    outstanding: usize,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn release(&self, storage: Vec<u8>) {
        let mut state = self.state();
        state.outstanding -= 1;
        state.free.push(storage);
    }
}

impl PacketBufferPool {
    /// Pool of at most `limit` buffers, each `buffer_size` bytes long.
    pub fn new(name: &str, buffer_size: usize, limit: usize) -> Self {
        PacketBufferPool {
            shared: Arc::new(Shared {
                name: name.to_string(),
                buffer_size,
                limit,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Take one empty buffer, or `None` when every buffer is in use.
    pub fn alloc(&self) -> Option<PacketBuffer> {
        let mut state = self.shared.state();
        let storage = match state.free.pop() {
            Some(storage) => storage,
            None if state.created < self.shared.limit => {
                state.created += 1;
                vec![0u8; self.shared.buffer_size]
            }
            None => return None,
        };
        state.outstanding += 1;
        drop(state);

        Some(PacketBuffer::pooled(storage, self.shared.clone()))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Capacity of every buffer handed out by this pool.
    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    pub fn limit(&self) -> usize {
        self.shared.limit
    }

    /// Buffers currently held by callers.
    pub fn outstanding(&self) -> usize {
        self.shared.state().outstanding
    }

    pub fn available(&self) -> usize {
        self.shared.limit - self.outstanding()
    }
}

impl fmt::Debug for PacketBufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBufferPool")
            .field("name", &self.shared.name)
            .field("buffer_size", &self.shared.buffer_size)
            .field("limit", &self.shared.limit)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
