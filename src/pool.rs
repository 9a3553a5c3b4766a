//! Binned Scratch-Buffer Pool
//!
//! Amortizes allocation cost for short-lived numeric staging buffers.
//! Capacities are classed by powers of 16 rather than powers of 2: the class
//! trades modest extra internal fragmentation for a bin-index computation
//! that is a single shift off a branchless log2 — this sits on
//! allocation-hot upload paths.
//!
//! The pool never fails: absent a reusable buffer it allocates fresh. Fresh
//! buffers are zero-filled; **recycled buffers come back dirty**. Callers
//! must pair [`BufferPool::alloc_typed`] with [`BufferPool::free_typed`] and
//! must not retain a view after release.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use bytemuck::Pod;

/// Capacity classes 16^1 ..= 16^7; bin 0 is unused (capacities start at 16).
const POOL_BINS: usize = 8;

/// Largest serviceable request, 16^7 bytes. Larger requests are a caller
/// contract violation.
pub const MAX_POOL_ALLOC: usize = 1 << 28;

// ─── Raw buffers ─────────────────────────────────────────────────────────────

/// A pooled scratch buffer with power-of-16 byte capacity.
///
/// Backed by 8-byte words so any `Pod` element type up to 8-byte alignment
/// can reinterpret it safely.
pub struct RawBuffer {
    words: Box<[u64]>,
}

impl RawBuffer {
    fn with_capacity(byte_capacity: usize) -> Self {
        debug_assert!(byte_capacity % 8 == 0);
        Self {
            words: vec![0u64; byte_capacity / 8].into_boxed_slice(),
        }
    }

    /// Byte capacity; always a power of 16.
    #[must_use]
    pub fn byte_capacity(&self) -> usize {
        self.words.len() * 8
    }

    /// The full buffer as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    /// The full buffer as mutable bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }
}

/// Rounds up to the next power of 16, minimum 16.
fn next_pow16(n: usize) -> usize {
    let mut capacity = 16;
    while capacity < n {
        capacity <<= 4;
    }
    capacity
}

/// Branchless integer log2 (undefined for 0, which no capacity is).
fn log2(mut v: u32) -> u32 {
    let mut r = u32::from(v > 0xffff) << 4;
    v >>= r;
    let mut shift = u32::from(v > 0xff) << 3;
    v >>= shift;
    r |= shift;
    shift = u32::from(v > 0xf) << 2;
    v >>= shift;
    r |= shift;
    shift = u32::from(v > 0x3) << 1;
    v >>= shift;
    r |= shift;
    r | (v >> 1)
}

/// Bin index for a power-of-16 capacity: log2(cap) / 4 in one shift.
fn bin_index(byte_capacity: usize) -> usize {
    (log2(byte_capacity as u32) >> 2) as usize
}

// ─── Typed views ─────────────────────────────────────────────────────────────

/// A typed staging view of exactly `len` elements over a pooled buffer.
///
/// Dereferences to `[T]` of the requested length regardless of the
/// underlying buffer's rounded-up capacity. Release it with
/// [`BufferPool::free_typed`].
pub struct TypedView<T: Pod> {
    raw: RawBuffer,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> Deref for TypedView<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &bytemuck::cast_slice(&self.raw.words)[..self.len]
    }
}

impl<T: Pod> DerefMut for TypedView<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut bytemuck::cast_slice_mut(&mut self.raw.words)[..self.len]
    }
}

// ─── Pool ────────────────────────────────────────────────────────────────────

/// Power-of-16 binned allocator for scratch numeric buffers.
pub struct BufferPool {
    bins: [Vec<RawBuffer>; POOL_BINS],
}

impl BufferPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bins: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Allocates a buffer with capacity = next power of 16 ≥ `byte_size`,
    /// reusing a binned buffer when one is free.
    ///
    /// # Panics
    ///
    /// Panics if `byte_size` exceeds [`MAX_POOL_ALLOC`].
    pub fn allocate(&mut self, byte_size: usize) -> RawBuffer {
        assert!(
            byte_size <= MAX_POOL_ALLOC,
            "scratch allocation of {byte_size} bytes exceeds pool maximum"
        );
        let capacity = next_pow16(byte_size);
        self.bins[bin_index(capacity)].pop().unwrap_or_else(|| {
            log::trace!("scratch pool grows: fresh {capacity}-byte buffer");
            RawBuffer::with_capacity(capacity)
        })
    }

    /// Returns a buffer to the bin for its actual capacity.
    pub fn free(&mut self, buffer: RawBuffer) {
        self.bins[bin_index(buffer.byte_capacity())].push(buffer);
    }

    /// Allocates a typed view of exactly `count` elements.
    pub fn alloc_typed<T: Pod>(&mut self, count: usize) -> TypedView<T> {
        let raw = self.allocate(count * size_of::<T>());
        TypedView {
            raw,
            len: count,
            _marker: PhantomData,
        }
    }

    /// Releases a typed view, returning the underlying buffer to its bin.
    pub fn free_typed<T: Pod>(&mut self, view: TypedView<T>) {
        self.free(view.raw);
    }

    /// Total buffers currently parked across all bins.
    #[must_use]
    pub fn free_buffer_count(&self) -> usize {
        self.bins.iter().map(Vec::len).sum()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Flatten staging ─────────────────────────────────────────────────────────
//
// Copies nested host data into one pooled typed view, the shape attribute
// uploads arrive in.

/// Extents `[nx, ny]` of a nested row structure.
///
/// `ny` is read off the first row; the structure is declared rectangular, so
/// the first row speaks for all of them. Empty input reports zero extents.
#[must_use]
pub fn shape2d<T, R: AsRef<[T]>>(rows: &[R]) -> [usize; 2] {
    let ny = rows.first().map_or(0, |row| row.as_ref().len());
    [rows.len(), ny]
}

/// Extents `[nx, ny, nz]` of a doubly nested structure, read off the first
/// plane and its first row.
#[must_use]
pub fn shape3d<T, R: AsRef<[T]>, P: AsRef<[R]>>(planes: &[P]) -> [usize; 3] {
    let [ny, nz] = planes.first().map_or([0, 0], |plane| shape2d(plane.as_ref()));
    [planes.len(), ny, nz]
}

/// Stages a flat slice into a pooled view of the same length.
pub fn flatten1d<T: Pod>(pool: &mut BufferPool, data: &[T]) -> TypedView<T> {
    let mut out = pool.alloc_typed(data.len());
    out.copy_from_slice(data);
    out
}

/// Stages `nx` rows of `ny` elements each, row-major.
///
/// # Panics
///
/// Panics if any row is shorter than `ny`.
pub fn flatten2d<T: Pod, R: AsRef<[T]>>(
    pool: &mut BufferPool,
    rows: &[R],
    ny: usize,
) -> TypedView<T> {
    let nx = rows.len();
    let mut out = pool.alloc_typed(nx * ny);
    for (i, row) in rows.iter().enumerate() {
        out[i * ny..(i + 1) * ny].copy_from_slice(&row.as_ref()[..ny]);
    }
    out
}

/// Stages an `nx × ny × nz` nested structure, row-major.
///
/// # Panics
///
/// Panics if any inner slice is shorter than its declared extent.
pub fn flatten3d<T: Pod, R: AsRef<[T]>, P: AsRef<[R]>>(
    pool: &mut BufferPool,
    planes: &[P],
    ny: usize,
    nz: usize,
) -> TypedView<T> {
    let nx = planes.len();
    let mut out = pool.alloc_typed(nx * ny * nz);
    let mut ptr = 0;
    for plane in planes {
        let rows = plane.as_ref();
        for row in &rows[..ny] {
            out[ptr..ptr + nz].copy_from_slice(&row.as_ref()[..nz]);
            ptr += nz;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log2_matches_naive() {
        for shift in 0..31u32 {
            let v = 1u32 << shift;
            assert_eq!(log2(v), shift);
            if v > 1 {
                assert_eq!(log2(v - 1), shift - 1);
            }
        }
    }

    #[test]
    fn pow16_classes() {
        assert_eq!(next_pow16(0), 16);
        assert_eq!(next_pow16(10), 16);
        assert_eq!(next_pow16(16), 16);
        assert_eq!(next_pow16(17), 256);
        assert_eq!(next_pow16(257), 4096);
        assert_eq!(bin_index(16), 1);
        assert_eq!(bin_index(256), 2);
        assert_eq!(bin_index(1 << 28), 7);
    }
}
