//! Scratch Buffer-Pool Tests
//!
//! Tests for:
//! - Power-of-16 capacity classes
//! - Typed views of exactly the requested length
//! - Free-list reuse per capacity class
//! - Shape extents and flatten staging helpers (1D/2D/3D)

use wisp::pool::{BufferPool, flatten1d, flatten2d, flatten3d, shape2d, shape3d};

fn is_pow16(v: usize) -> bool {
    let mut x = 16;
    while x < v {
        x <<= 4;
    }
    x == v
}

// ============================================================================
// Capacity classes
// ============================================================================

#[test]
fn capacities_round_up_to_powers_of_16() {
    let mut pool = BufferPool::new();

    let small = pool.allocate(10);
    assert!(small.byte_capacity() >= 16);
    assert!(is_pow16(small.byte_capacity()));

    let medium = pool.allocate(17);
    assert!(medium.byte_capacity() >= 256);
    assert!(is_pow16(medium.byte_capacity()));

    let exact = pool.allocate(256);
    assert_eq!(exact.byte_capacity(), 256);
}

#[test]
fn never_returns_a_smaller_buffer_than_requested() {
    let mut pool = BufferPool::new();
    for size in [0, 1, 15, 16, 17, 255, 256, 257, 4096, 4097] {
        let buffer = pool.allocate(size);
        assert!(buffer.byte_capacity() >= size, "size {size}");
        pool.free(buffer);
    }
}

#[test]
fn freed_buffers_are_reused_within_their_class() {
    let mut pool = BufferPool::new();
    let buffer = pool.allocate(100); // class 256
    pool.free(buffer);
    assert_eq!(pool.free_buffer_count(), 1);

    // Same class: drains the free list instead of allocating fresh.
    let _reused = pool.allocate(200);
    assert_eq!(pool.free_buffer_count(), 0);

    // Different class: free list for 256 is untouched.
    let big = pool.allocate(300);
    assert_eq!(big.byte_capacity(), 4096);
}

// ============================================================================
// Typed views
// ============================================================================

#[test]
fn typed_view_has_exactly_the_requested_length() {
    let mut pool = BufferPool::new();

    // 5 × 4 bytes rounds up to a 256-byte buffer; the view stays 5 long.
    let view = pool.alloc_typed::<f32>(5);
    assert_eq!(view.len(), 5);
    pool.free_typed(view);

    let view = pool.alloc_typed::<u16>(3);
    assert_eq!(view.len(), 3);
    pool.free_typed(view);
}

#[test]
fn typed_views_read_back_written_data() {
    let mut pool = BufferPool::new();
    let mut view = pool.alloc_typed::<u32>(4);
    view.copy_from_slice(&[10, 20, 30, 40]);
    assert_eq!(&view[..], &[10, 20, 30, 40]);
    assert_eq!(view.iter().sum::<u32>(), 100);
    pool.free_typed(view);
}

#[test]
fn free_typed_returns_the_underlying_buffer() {
    let mut pool = BufferPool::new();
    let view = pool.alloc_typed::<f32>(100); // 400 bytes → 4096 class
    pool.free_typed(view);
    assert_eq!(pool.free_buffer_count(), 1);

    let buffer = pool.allocate(4000);
    assert_eq!(pool.free_buffer_count(), 0);
    assert_eq!(buffer.byte_capacity(), 4096);
}

// ============================================================================
// Flatten staging
// ============================================================================

#[test]
fn flatten1d_copies_verbatim() {
    let mut pool = BufferPool::new();
    let view = flatten1d(&mut pool, &[1.0f32, 2.0, 3.0]);
    assert_eq!(&view[..], &[1.0, 2.0, 3.0]);
    pool.free_typed(view);
}

#[test]
fn flatten2d_is_row_major() {
    let mut pool = BufferPool::new();
    let rows = [[1u32, 2, 3], [4, 5, 6]];
    let view = flatten2d(&mut pool, &rows, 3);
    assert_eq!(&view[..], &[1, 2, 3, 4, 5, 6]);
    pool.free_typed(view);
}

#[test]
fn shape_reads_extents_from_first_element() {
    let rows = [[1u32, 2, 3], [4, 5, 6]];
    assert_eq!(shape2d(&rows), [2, 3]);

    let planes = [[[1u8, 2], [3, 4]], [[5, 6], [7, 8]], [[9, 10], [11, 12]]];
    assert_eq!(shape3d(&planes), [3, 2, 2]);

    let empty: [[u32; 4]; 0] = [];
    assert_eq!(shape2d(&empty), [0, 0]);
}

#[test]
fn shape_extents_drive_flatten() {
    let mut pool = BufferPool::new();
    let rows = [[1.5f32, 2.5], [3.5, 4.5], [5.5, 6.5]];
    let [nx, ny] = shape2d(&rows);
    let view = flatten2d(&mut pool, &rows, ny);
    assert_eq!(view.len(), nx * ny);
    assert_eq!(&view[..], &[1.5, 2.5, 3.5, 4.5, 5.5, 6.5]);
    pool.free_typed(view);
}

#[test]
fn flatten3d_is_row_major() {
    let mut pool = BufferPool::new();
    let planes = [[[1u8, 2], [3, 4]], [[5, 6], [7, 8]]];
    let view = flatten3d(&mut pool, &planes, 2, 2);
    assert_eq!(&view[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    pool.free_typed(view);
}
