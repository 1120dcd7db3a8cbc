//! Per-connection frame buffer: append at the tail, consume from the head.

use bytes::{Buf, BytesMut};

/// Initial capacity for a fresh connection's buffers. Grows on demand; there is
/// no fixed ceiling here, backpressure is enforced by the caller via intent
/// flags rather than by this type refusing writes.
const INITIAL_CAPACITY: usize = 8 * 1024;

/// A FIFO byte queue. `append` always grows the tail; `consume` always drops
/// from the head. `view` exposes the currently readable prefix without
/// copying it.
#[derive(Debug, Default)]
pub struct Buffer {
    inner: BytesMut,
}

impl Buffer {
    pub fn new() -> Self {
        Buffer {
            inner: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Appends `bytes` to the tail of the queue.
    pub fn append(&mut self, bytes: &[u8]) {
        self.inner.extend_from_slice(bytes);
    }

    /// Drops the first `n` bytes from the head of the queue.
    ///
    /// Panics if `n` exceeds `len()`, mirroring `BytesMut::advance`'s contract;
    /// callers never consume more than they have just parsed out of `view()`.
    pub fn consume(&mut self, n: usize) {
        self.inner.advance(n);
    }

    /// The currently readable prefix, in FIFO order.
    #[inline]
    pub fn view(&self) -> &[u8] {
        &self.inner
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
