//! Message handle buffer pool
//!
//! Scratch buffers of message-handle slots for the receive loop. A buffer is
//! borrowed for one drain round and returned to the pool on drop; any handle
//! still sitting in it at that point is released back to the transport.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::error::{SessionError, TransportError};
use crate::metrics::METRICS;
use crate::transport::{NetMessage, PollGroupHandle, Transport};

/// A scratch buffer borrowed from the pool
pub struct HandleBuffer<M: NetMessage> {
    slots: Vec<M>,
    capacity: usize,
    pool: Arc<PoolInner<M>>,
}

impl<M: NetMessage> HandleBuffer<M> {
    /// Number of handle slots this buffer was acquired for
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Handles currently held
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Ask the transport for up to `capacity` pending messages of `group`
    pub fn fill<T>(
        &mut self,
        transport: &T,
        group: PollGroupHandle,
    ) -> Result<usize, TransportError>
    where
        T: Transport<Message = M>,
    {
        debug_assert!(self.slots.is_empty());
        let received =
            transport.receive_messages_on_poll_group(group, &mut self.slots, self.capacity)?;
        // Stored back to front so take_next pops in transport order
        self.slots.reverse();
        Ok(received)
    }

    /// Take the next buffered handle in transport order
    pub fn take_next(&mut self) -> Option<M> {
        self.slots.pop()
    }

    /// Release every handle still buffered; returns how many there were
    pub fn release_remaining(&mut self) -> usize {
        let remaining = self.slots.len();
        for message in self.slots.drain(..) {
            message.release();
            METRICS.message_released();
        }
        remaining
    }
}

impl<M: NetMessage> Drop for HandleBuffer<M> {
    fn drop(&mut self) {
        let leftover = self.release_remaining();
        if leftover > 0 {
            trace!(leftover, "Released buffered message handles on drop");
        }
        let slots = std::mem::take(&mut self.slots);
        self.pool.return_buffer(slots);
    }
}

struct PoolInner<M> {
    buffers: ArrayQueue<Vec<M>>,
    slot_capacity: usize,
    allocated: AtomicUsize,
    in_use: AtomicUsize,
    misses: AtomicUsize,
}

impl<M> PoolInner<M> {
    fn return_buffer(&self, slots: Vec<M>) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        METRICS.buffer_released();
        self.stash(slots);
    }

    /// Park an idle buffer at its configured size, or free it if the pool is full
    fn stash(&self, mut slots: Vec<M>) {
        slots.shrink_to(self.slot_capacity);
        if self.buffers.push(slots).is_err() {
            self.allocated.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// Pool of reusable handle buffers
pub struct HandleBufferPool<M: NetMessage> {
    inner: Arc<PoolInner<M>>,
}

impl<M: NetMessage> HandleBufferPool<M> {
    /// Create a pool holding up to `max_buffers` idle buffers, each
    /// pre-allocated for `initial_capacity` handles
    pub fn new(max_buffers: usize, initial_capacity: usize) -> Self {
        let max_buffers = max_buffers.max(1);
        let inner = PoolInner {
            buffers: ArrayQueue::new(max_buffers),
            slot_capacity: initial_capacity,
            allocated: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        };

        for _ in 0..max_buffers {
            let _ = inner.buffers.push(Vec::with_capacity(initial_capacity));
            inner.allocated.fetch_add(1, Ordering::Relaxed);
        }

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Borrow a buffer with room for exactly `capacity` handles
    ///
    /// Falls back to a fresh allocation when the pool is empty. Fails with
    /// `BufferExhausted` if the memory cannot be reserved.
    pub fn acquire(&self, capacity: usize) -> Result<HandleBuffer<M>, SessionError> {
        let mut slots = match self.inner.buffers.pop() {
            Some(slots) => slots,
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                METRICS.buffer_miss();
                Vec::new()
            }
        };

        if let Err(e) = slots.try_reserve_exact(capacity) {
            trace!(capacity, error = %e, "Handle buffer reservation failed");
            self.inner.stash(slots);
            METRICS.buffer_exhausted();
            return Err(SessionError::BufferExhausted { capacity });
        }

        self.inner.in_use.fetch_add(1, Ordering::Relaxed);
        METRICS.buffer_acquired();
        Ok(HandleBuffer {
            slots,
            capacity,
            pool: self.inner.clone(),
        })
    }

    /// Get pool statistics
    pub fn stats(&self) -> HandleBufferPoolStats {
        HandleBufferPoolStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            idle: self.inner.buffers.len(),
            in_use: self.inner.in_use.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }
}

/// Handle buffer pool statistics
#[derive(Debug, Clone)]
pub struct HandleBufferPoolStats {
    pub allocated: usize,
    pub idle: usize,
    pub in_use: usize,
    pub misses: usize,
}
