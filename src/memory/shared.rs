//! Shared memory segments using Linux memfd.
//!
//! A segment is anonymous shared memory created via `memfd_create` and
//! mapped `MAP_SHARED`. Workers are spawned by forking, so every mapping
//! that exists at spawn time is visible in the worker at the same address;
//! no descriptor passing is needed. Being anonymous, a segment has nothing
//! to unlink: dropping the last handle unmaps the region and closes the
//! descriptor, and the kernel reclaims the memory.
//!
//! Segments are advisory storage. The engine guarantees their lifetime
//! (created before workers spawn, released when the supervisor scope ends);
//! synchronization of their contents between processes is the caller's
//! responsibility.

use crate::error::{Error, Result};
use rustix::fd::OwnedFd;
use rustix::mm::{MapFlags, ProtFlags};
use std::ptr::NonNull;
use std::sync::atomic::AtomicU32;

/// A named, memfd-backed shared memory segment.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::memory::SharedMemorySegment;
///
/// let segment = SharedMemorySegment::with_bytes("lookup-table", &table)?;
/// // after fork, the worker sees the same contents
/// assert_eq!(segment.as_slice(), &table[..]);
/// ```
pub struct SharedMemorySegment {
    #[allow(dead_code)]
    fd: OwnedFd,
    ptr: NonNull<u8>,
    len: usize,
    name: String,
}

// The mapping is shared between processes by design; references returned
// from the accessors only touch it through raw pointer reads and writes.
unsafe impl Send for SharedMemorySegment {}
unsafe impl Sync for SharedMemorySegment {}

impl SharedMemorySegment {
    /// Create a zero-filled segment.
    ///
    /// `name` identifies the segment in the registry and in
    /// `/proc/self/fd`; `size` must be greater than 0.
    pub fn new(name: &str, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Memory(format!(
                "segment '{name}' must have nonzero size"
            )));
        }

        let fd = rustix::fs::memfd_create(name, rustix::fs::MemfdFlags::CLOEXEC)?;
        rustix::fs::ftruncate(&fd, size as u64)?;

        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )?
        };
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::Memory("mmap returned null".into()))?;

        Ok(Self {
            fd,
            ptr,
            len: size,
            name: name.to_string(),
        })
    }

    /// Create a segment initialized with `bytes`.
    pub fn with_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        let segment = Self::new(name, bytes.len())?;
        segment.write_at(0, bytes)?;
        Ok(segment)
    }

    /// The segment's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the segment in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the segment is empty (it never is; see [`Self::new`]).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the segment contents.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Copy `bytes` into the segment at `offset`.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        if offset
            .checked_add(bytes.len())
            .map_or(true, |end| end > self.len)
        {
            return Err(Error::Memory(format!(
                "write of {} bytes at {offset} exceeds segment '{}' ({} bytes)",
                bytes.len(),
                self.name,
                self.len
            )));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.ptr.as_ptr().add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    /// Word `index` of the segment as an atomic, for cross-process flags.
    /// The mapping is page-aligned, so word `index` is naturally aligned.
    pub(crate) fn atomic_u32(&self, index: usize) -> &AtomicU32 {
        let offset = index * std::mem::size_of::<AtomicU32>();
        assert!(offset + std::mem::size_of::<AtomicU32>() <= self.len);
        unsafe { &*(self.ptr.as_ptr().add(offset) as *const AtomicU32) }
    }
}

impl Drop for SharedMemorySegment {
    fn drop(&mut self) {
        unsafe {
            let _ = rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

impl std::fmt::Debug for SharedMemorySegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemorySegment")
            .field("name", &self.name)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_read_back() {
        let segment = SharedMemorySegment::with_bytes("millrace-test-rw", b"hello").unwrap();
        assert_eq!(segment.name(), "millrace-test-rw");
        assert_eq!(segment.len(), 5);
        assert_eq!(segment.as_slice(), b"hello");
    }

    #[test]
    fn test_write_at_bounds() {
        let segment = SharedMemorySegment::new("millrace-test-bounds", 4).unwrap();
        segment.write_at(2, b"ab").unwrap();
        assert_eq!(&segment.as_slice()[2..], b"ab");
        assert!(segment.write_at(3, b"ab").is_err());
        assert!(segment.write_at(usize::MAX, b"a").is_err());
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(
            SharedMemorySegment::new("millrace-test-zero", 0),
            Err(Error::Memory(_))
        ));
    }

    #[test]
    fn test_atomic_view() {
        use std::sync::atomic::Ordering;

        let segment = SharedMemorySegment::new("millrace-test-atomic", 8).unwrap();
        segment.atomic_u32(1).store(7, Ordering::SeqCst);
        assert_eq!(segment.atomic_u32(1).load(Ordering::SeqCst), 7);
        assert_eq!(segment.atomic_u32(0).load(Ordering::SeqCst), 0);
    }
}
