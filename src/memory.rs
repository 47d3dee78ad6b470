//! Read access to the shared-memory regions published by the native services.
//!
//! A service owns the backing memory. Consumers only ever hold a [`LockHandle`] for the duration
//! of one read, through a [`ReadGuard`] that gives the handle back when it goes out of scope.

mod decoder;
mod layout;


pub use decoder::{DecodeError, DecodeOutcome, DecodedFrame, FieldValue, FrameDecoder};
pub use layout::{ElementType, Field, Layout, LayoutBuilder, LayoutError};

use log::warn;
use std::borrow::Cow;

/// Opaque token handed out by a service for one read lock.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockHandle(pub u64);

/// The contract of a native service's shared-memory region.
pub trait SharedMemory {
    /// Whether the service behind this region is currently bound.
    fn is_connected(&self) -> bool {
        true
    }

    /// Returns `None` when the service has nothing to hand out (disconnected, or a null region).
    fn read_lock(&self) -> Option<LockHandle>;

    fn unlock(&self, handle: LockHandle) -> bool;

    /// Size in bytes of the buffer pinned by `handle`.
    fn size(&self, handle: &LockHandle) -> usize;

    /// Copies `dst.len()` bytes starting at `offset`. Returns false if the range is out of bounds.
    fn read(&self, handle: &LockHandle, offset: usize, dst: &mut [u8]) -> bool;
}

/// A held read lock. The lock is released exactly once, when the guard is dropped.
pub struct ReadGuard<'a, M: SharedMemory + ?Sized> {
    memory: &'a M,
    handle: LockHandle,
}

impl<'a, M: SharedMemory + ?Sized> ReadGuard<'a, M> {
    /// Returns `None` without touching the lock if the service is down or hands out a null
    /// handle.
    pub fn acquire(memory: &'a M) -> Option<Self> {
        if !memory.is_connected() {
            return None;
        }
        let handle = memory.read_lock()?;
        Some(Self { memory, handle })
    }

    #[inline]
    pub fn handle(&self) -> LockHandle {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.memory.size(&self.handle)
    }

    #[inline]
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> bool {
        self.memory.read(&self.handle, offset, dst)
    }

    pub fn read_array<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let mut buf = [0; N];
        self.read(offset, &mut buf).then_some(buf)
    }

    pub fn read_i32(&self, offset: usize) -> Option<i32> {
        self.read_array(offset).map(i32::from_le_bytes)
    }

    pub fn read_f64(&self, offset: usize) -> Option<f64> {
        self.read_array(offset).map(f64::from_le_bytes)
    }
}

impl<M: SharedMemory + ?Sized> Drop for ReadGuard<'_, M> {
    fn drop(&mut self) {
        if !self.memory.unlock(self.handle) {
            warn!("service refused to unlock {:?}", self.handle);
        }
    }
}

/// A region backed by plain bytes, e.g. a captured dump of a service buffer.
/// Always connected; locking is a no-op.
#[derive(Clone, Debug, Default)]
pub struct SliceMemory<'a>(Cow<'a, [u8]>);

impl<'a> SliceMemory<'a> {
    pub fn new(bytes: impl Into<Cow<'a, [u8]>>) -> Self {
        Self(bytes.into())
    }
}

impl SharedMemory for SliceMemory<'_> {
    fn read_lock(&self) -> Option<LockHandle> {
        Some(LockHandle(0))
    }

    fn unlock(&self, _: LockHandle) -> bool {
        true
    }

    fn size(&self, _: &LockHandle) -> usize {
        self.0.len()
    }

    fn read(&self, _: &LockHandle, offset: usize, dst: &mut [u8]) -> bool {
        let Some(src) = offset
            .checked_add(dst.len())
            .and_then(|end| self.0.get(offset..end))
        else {
            return false;
        };
        dst.copy_from_slice(src);
        true
    }
}
