//! Pooling allocator backing the engine's scratch and persistent buffers.
//!
//! Requests are bucketed by power-of-2 size; each bucket suballocates slots out of large
//! heap blocks and recycles them through an id free list, making take and return O(1).

use super::buffer::Buffer;
use std::alloc::{self, Layout};
use std::mem::size_of;
use std::ptr;

/// Byte alignment enforced for all block allocations within the pool. Blocks are big,
/// so a generous value costs nothing.
pub const BLOCK_ALIGNMENT: usize = 128;

/// Largest power-of-2 suballocation size supported by the pool, as an exponent.
pub const MAXIMUM_SPAN_SIZE_POWER: i32 = 30;

/// Shift used to pack the power index into a buffer id alongside the slot index.
const ID_POWER_SHIFT: i32 = 26;

/// Smallest exponent N with 2^N >= i.
#[inline(always)]
fn get_containing_power_of_2(i: i32) -> i32 {
    if i <= 1 {
        0
    } else {
        32 - ((i - 1) as u32).leading_zeros() as i32
    }
}

/// Reuses slot indices, preferring previously returned ids over fresh ones.
struct IdPool {
    next_index: i32,
    available_ids: Vec<i32>,
}

impl IdPool {
    fn new(initial_capacity: usize) -> Self {
        Self {
            next_index: 0,
            available_ids: Vec::with_capacity(initial_capacity),
        }
    }

    #[inline]
    fn take(&mut self) -> i32 {
        self.available_ids.pop().unwrap_or_else(|| {
            let id = self.next_index;
            self.next_index += 1;
            id
        })
    }

    #[inline]
    fn return_id(&mut self, id: i32) {
        self.available_ids.push(id);
    }

    fn clear(&mut self) {
        self.next_index = 0;
        self.available_ids.clear();
    }
}

/// Pool of suballocations of a single power-of-2 size.
struct PowerPool {
    blocks: Vec<*mut u8>,
    slots: IdPool,
    suballocations_per_block_shift: i32,
    suballocations_per_block_mask: i32,
    power: i32,
    suballocation_size: i32,
    block_size: i32,
    block_count: i32,

    #[cfg(debug_assertions)]
    outstanding_ids: std::collections::HashSet<i32>,
}

impl PowerPool {
    fn new(power: i32, minimum_block_size: i32, expected_pooled_count: usize) -> Self {
        let suballocation_size = 1 << power;
        let block_size = suballocation_size.max(minimum_block_size);
        let suballocations_per_block = block_size / suballocation_size;
        let suballocations_per_block_shift = get_containing_power_of_2(suballocations_per_block);
        Self {
            blocks: Vec::new(),
            slots: IdPool::new(expected_pooled_count),
            suballocations_per_block_shift,
            suballocations_per_block_mask: (1 << suballocations_per_block_shift) - 1,
            power,
            suballocation_size,
            block_size,
            block_count: 0,

            #[cfg(debug_assertions)]
            outstanding_ids: std::collections::HashSet::new(),
        }
    }

    unsafe fn allocate_block(&mut self, block_index: i32) {
        debug_assert!(
            self.blocks[block_index as usize].is_null(),
            "Block should not already be allocated."
        );
        let layout = Layout::from_size_align(self.block_size as usize, BLOCK_ALIGNMENT)
            .expect("Block layout must be valid.");
        let block = alloc::alloc(layout);
        if block.is_null() {
            alloc::handle_alloc_error(layout);
        }
        self.blocks[block_index as usize] = block;
        self.block_count = block_index + 1;
    }

    fn take(&mut self) -> Buffer<u8> {
        let slot = self.slots.take();
        let block_index = slot >> self.suballocations_per_block_shift;
        if block_index as usize >= self.blocks.len() {
            let new_size = ((block_index + 1) as u32).next_power_of_two() as usize;
            self.blocks.resize(new_size, ptr::null_mut());
        }
        if block_index >= self.block_count {
            unsafe {
                self.allocate_block(block_index);
            }
        }
        let index_in_block = slot & self.suballocations_per_block_mask;
        let ptr = unsafe {
            self.blocks[block_index as usize].add((index_in_block * self.suballocation_size) as usize)
        };
        let id = (self.power << ID_POWER_SHIFT) | slot;
        debug_assert!(id >= 0 && self.power >= 0 && self.power <= MAXIMUM_SPAN_SIZE_POWER);

        #[cfg(debug_assertions)]
        {
            debug_assert!(
                self.outstanding_ids.insert(slot),
                "Should not be able to request the same slot twice."
            );
        }

        Buffer::new(ptr, self.suballocation_size, id)
    }

    fn return_slot(&mut self, slot_index: i32) {
        #[cfg(debug_assertions)]
        {
            debug_assert!(
                self.outstanding_ids.remove(&slot_index),
                "This buffer id must have been taken from the pool previously."
            );
        }
        self.slots.return_id(slot_index);
    }

    fn clear(&mut self) {
        #[cfg(debug_assertions)]
        self.outstanding_ids.clear();

        let layout = Layout::from_size_align(self.block_size as usize, BLOCK_ALIGNMENT)
            .expect("Block layout must be valid.");
        for block in self.blocks.iter_mut().take(self.block_count as usize) {
            if !block.is_null() {
                unsafe {
                    alloc::dealloc(*block, layout);
                }
                *block = ptr::null_mut();
            }
        }
        self.slots.clear();
        self.block_count = 0;
    }
}

/// Pooling allocator handing out `Buffer` spans bucketed by power-of-2 size.
pub struct BufferPool {
    pools: Vec<PowerPool>,
}

impl BufferPool {
    /// Creates a new buffer pool.
    ///
    /// `minimum_block_allocation_size` is the smallest block pulled from the heap and must
    /// be a power of 2; pools whose single suballocation exceeds it size their blocks to
    /// hold one element. `expected_pooled_resource_count` preallocates slot bookkeeping,
    /// not blocks.
    pub fn new(minimum_block_allocation_size: i32, expected_pooled_resource_count: usize) -> Self {
        debug_assert!(
            minimum_block_allocation_size > 0
                && (minimum_block_allocation_size & (minimum_block_allocation_size - 1)) == 0,
            "Block allocation size must be a power of 2."
        );
        let mut pools = Vec::with_capacity(MAXIMUM_SPAN_SIZE_POWER as usize + 1);
        for power in 0..=MAXIMUM_SPAN_SIZE_POWER {
            pools.push(PowerPool::new(
                power,
                minimum_block_allocation_size,
                expected_pooled_resource_count,
            ));
        }
        Self { pools }
    }

    /// Takes a buffer whose capacity is at least the requested element count; the bucket
    /// rounding means it is often larger.
    #[inline(always)]
    pub fn take_at_least<T>(&mut self, count: i32) -> Buffer<T> {
        // Avoid returning a zero length span.
        let count = count.max(1);
        let power = get_containing_power_of_2(count * size_of::<T>() as i32);
        debug_assert!(power <= MAXIMUM_SPAN_SIZE_POWER, "Allocation exceeds the largest supported span.");
        self.pools[power as usize].take().cast()
    }

    /// Takes a typed buffer of exactly the requested length from the pool.
    #[inline(always)]
    pub fn take<T>(&mut self, count: i32) -> Buffer<T> {
        let mut buffer = self.take_at_least(count);
        buffer.set_length(count);
        buffer
    }

    /// Returns a buffer to the pool and clears the buffer reference.
    #[inline(always)]
    pub fn return_buffer<T>(&mut self, buffer: &mut Buffer<T>) {
        debug_assert!(buffer.allocated(), "Only buffers taken from the pool can be returned.");
        let power_index = buffer.id() >> ID_POWER_SHIFT;
        let slot_index = buffer.id() & ((1 << ID_POWER_SHIFT) - 1);
        self.pools[power_index as usize].return_slot(slot_index);
        *buffer = Buffer::default();
    }

    /// Computes the total number of bytes currently allocated from the native heap.
    pub fn get_total_allocated_byte_count(&self) -> u64 {
        self.pools
            .iter()
            .map(|pool| pool.block_count as u64 * pool.block_size as u64)
            .sum()
    }

    /// Asserts that no allocations are outstanding. Only debug builds track outstanding
    /// ids, so release builds check nothing.
    pub fn assert_empty(&self) {
        #[cfg(debug_assertions)]
        for (power, pool) in self.pools.iter().enumerate() {
            debug_assert!(
                pool.outstanding_ids.is_empty(),
                "Power pool {} contains {} outstanding allocations.",
                power,
                pool.outstanding_ids.len()
            );
        }
    }

    /// Returns all block memory to the heap. Any outstanding buffers are silently
    /// invalidated. The pool remains usable afterwards.
    pub fn clear(&mut self) {
        for pool in &mut self.pools {
            pool.clear();
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(131072, 16)
    }
}

unsafe impl Send for BufferPool {}

impl Drop for BufferPool {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_and_return_reuses_slots() {
        let mut pool = BufferPool::default();
        let mut a: Buffer<i32> = pool.take(32);
        assert_eq!(a.len(), 32);
        for i in 0..32 {
            a[i] = i * 3;
        }
        assert_eq!(a[31], 93);
        let id = a.id();
        pool.return_buffer(&mut a);
        assert!(!a.allocated());
        let mut b: Buffer<i32> = pool.take(32);
        assert_eq!(b.id(), id, "Returned slot should be handed out again.");
        pool.return_buffer(&mut b);
        pool.assert_empty();
        pool.clear();
    }

    #[test]
    fn take_at_least_rounds_up() {
        let mut pool = BufferPool::default();
        let mut buffer: Buffer<u8> = pool.take_at_least(100);
        assert!(buffer.len() >= 128);
        pool.return_buffer(&mut buffer);
        pool.clear();
    }
}
