// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pooled scratch buffers for trial decryption.
//!
//! The pool is bounded and falls back to a fresh allocation when empty, so
//! callers observe identical behavior with or without reuse.

use crossbeam_queue::ArrayQueue;
use std::{
    mem,
    ops::{Deref, DerefMut},
    sync::Arc,
};

pub struct Pool {
    buffers: ArrayQueue<Vec<u8>>,
    buffer_capacity: usize,
}

impl Pool {
    pub fn new(slots: usize, buffer_capacity: usize) -> Self {
        Self {
            buffers: ArrayQueue::new(slots.max(1)),
            buffer_capacity,
        }
    }

    pub fn acquire(self: &Arc<Self>) -> Scratch {
        let buf = self
            .buffers
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_capacity));
        debug_assert!(buf.is_empty());
        Scratch {
            pool: self.clone(),
            buf,
        }
    }
}

impl core::fmt::Debug for Pool {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("pooled", &self.buffers.len())
            .field("buffer_capacity", &self.buffer_capacity)
            .finish()
    }
}

/// An empty buffer borrowed from a [`Pool`]; returned (cleared) on drop.
pub struct Scratch {
    pool: Arc<Pool>,
    buf: Vec<u8>,
}

impl Deref for Scratch {
    type Target = Vec<u8>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for Scratch {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let mut buf = mem::take(&mut self.buf);
        buf.clear();
        // a full pool just drops the buffer
        let _ = self.pool.buffers.push(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_returned_buffers() {
        let pool = Arc::new(Pool::new(2, 64));

        let mut scratch = pool.acquire();
        scratch.extend_from_slice(&[1, 2, 3]);
        let ptr = scratch.as_ptr();
        drop(scratch);

        let scratch = pool.acquire();
        assert!(scratch.is_empty());
        assert_eq!(scratch.as_ptr(), ptr);
    }

    #[test]
    fn empty_pool_allocates() {
        let pool = Arc::new(Pool::new(1, 64));
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(a.capacity(), 64);
        assert_eq!(b.capacity(), 64);
    }
}
