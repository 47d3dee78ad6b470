//! An in-process stand-in for a native service that publishes results through a
//! double-buffered shared-memory region.
//!
//! Readers take a lock handle that pins the buffer that was current at lock time, so a writer
//! publishing concurrently never tears what a reader sees. Lock and unlock calls are counted so
//! tests can check that every acquired handle is released exactly once.

use crossbeam_utils::atomic::AtomicCell;
use glam::Vec3;
use slotmap::{DefaultKey, Key, KeyData, SlotMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

struct Buffers {
    front: usize,
    data: [Vec<u8>; 2],
}

pub struct FakeMemory {
    connected: AtomicCell<bool>,
    null_handles: AtomicCell<bool>,
    buffers: Mutex<Buffers>,
    /// Outstanding read locks, mapped to the buffer index they pin.
    locks: Mutex<SlotMap<DefaultKey, usize>>,
    lock_calls: AtomicUsize,
    unlock_calls: AtomicUsize,
}

impl FakeMemory {
    /// Creates a connected region of `size` zeroed bytes.
    pub fn new(size: usize) -> Self {
        Self {
            connected: true.into(),
            null_handles: false.into(),
            buffers: Mutex::new(Buffers {
                front: 0,
                data: [vec![0; size], vec![0; size]],
            }),
            locks: Mutex::new(SlotMap::new()),
            lock_calls: AtomicUsize::new(0),
            unlock_calls: AtomicUsize::new(0),
        }
    }

    fn buffers(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn locks(&self) -> MutexGuard<'_, SlotMap<DefaultKey, usize>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load()
    }

    /// Makes `read_lock` hand out null handles while the service still reports connected.
    pub fn set_null_handles(&self, null: bool) {
        self.null_handles.store(null);
    }

    /// Copies the current contents into the back buffer, lets `f` edit it and flips it to the
    /// front.
    #[track_caller]
    pub fn publish(&self, f: impl FnOnce(&mut [u8])) {
        let mut buffers = self.buffers();
        let back = 1 - buffers.front;
        assert!(
            !self.locks().values().any(|idx| *idx == back),
            "writer would clobber a buffer that is still read-locked"
        );

        let front = buffers.front;
        let (first, second) = buffers.data.split_at_mut(1);
        let (src, dst) = if front == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        };
        dst.copy_from_slice(src);
        f(dst);
        buffers.front = back;
    }

    #[track_caller]
    pub fn write(&self, offset: usize, bytes: &[u8]) {
        self.publish(|buf| buf[offset..offset + bytes.len()].copy_from_slice(bytes));
    }

    pub fn write_i32s(&self, offset: usize, values: &[i32]) {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write(offset, &bytes);
    }

    pub fn write_f32s(&self, offset: usize, values: &[f32]) {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write(offset, &bytes);
    }

    pub fn write_f64(&self, offset: usize, value: f64) {
        self.write(offset, &value.to_le_bytes());
    }

    pub fn write_vec3s(&self, offset: usize, values: &[Vec3]) {
        let floats: Vec<f32> = values.iter().flat_map(|v| v.to_array()).collect();
        self.write_f32s(offset, &floats);
    }

    pub fn read_lock(&self) -> Option<u64> {
        self.lock_calls.fetch_add(1, Ordering::Relaxed);
        if !self.is_connected() || self.null_handles.load() {
            return None;
        }

        let front = self.buffers().front;
        let key = self.locks().insert(front);
        Some(key.data().as_ffi())
    }

    pub fn unlock(&self, handle: u64) -> bool {
        self.unlock_calls.fetch_add(1, Ordering::Relaxed);
        let key = DefaultKey::from(KeyData::from_ffi(handle));
        self.locks().remove(key).is_some()
    }

    fn pinned(&self, handle: u64) -> Option<usize> {
        let key = DefaultKey::from(KeyData::from_ffi(handle));
        self.locks().get(key).copied()
    }

    pub fn size(&self, handle: u64) -> usize {
        self.pinned(handle)
            .map(|idx| self.buffers().data[idx].len())
            .unwrap_or(0)
    }

    /// Copies bytes out of the buffer pinned by `handle`. Returns false for unknown handles and
    /// out of range reads.
    pub fn read(&self, handle: u64, offset: usize, dst: &mut [u8]) -> bool {
        let Some(idx) = self.pinned(handle) else {
            return false;
        };
        let buffers = self.buffers();
        match buffers.data[idx].get(offset..offset + dst.len()) {
            Some(src) => {
                dst.copy_from_slice(src);
                true
            }
            None => false,
        }
    }

    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::Relaxed)
    }

    pub fn unlock_calls(&self) -> usize {
        self.unlock_calls.load(Ordering::Relaxed)
    }

    pub fn outstanding_locks(&self) -> usize {
        self.locks().len()
    }
}
