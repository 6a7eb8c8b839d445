use crate::utilities::memory::buffer::Buffer;
use crate::utilities::memory::buffer_pool::BufferPool;

/// Basic hashing helpers.
pub struct HashHelper;

impl HashHelper {
    /// Spreads a hash across the table range. Keys like contiguous triangle indices hash
    /// to themselves, which would pile into neighboring table slots without this.
    #[inline(always)]
    pub fn rehash(hash: i32) -> i32 {
        const A: u32 = 6;
        const B: u32 = 13;
        const C: u32 = 25;

        let scrambled = (hash as u32).wrapping_mul(982451653u32);
        (scrambled.rotate_left(A) ^ scrambled.rotate_left(B) ^ scrambled.rotate_left(C)) as i32
    }
}

/// Defines hashing and equality for keys held by reference.
pub trait RefEqualityComparer<T> {
    fn hash(&self, item: &T) -> i32;
    fn equals(&self, a: &T, b: &T) -> bool;
}

/// Comparer for primitive keys that are their own hash.
#[derive(Clone, Copy, Default)]
pub struct PrimitiveComparer;

impl RefEqualityComparer<i32> for PrimitiveComparer {
    #[inline(always)]
    fn hash(&self, item: &i32) -> i32 {
        *item
    }

    #[inline(always)]
    fn equals(&self, a: &i32, b: &i32) -> bool {
        *a == *b
    }
}

/// Key-value container with constant time adds and lookups that keeps elements packed in
/// insertion order, so values can also be addressed by position.
///
/// Safety checks are minimal and capacity management is the caller's problem; in exchange
/// the backing spans are exposed directly. Probing is plain linear stepping, which stays
/// cheap as long as the table is sized generously relative to the element count.
#[repr(C)]
pub struct QuickDictionary<TKey: Copy, TValue: Copy, TEqualityComparer> {
    /// How many elements the dictionary holds.
    pub count: i32,

    /// Mask for use in performing fast modulo operations for hashes. Requires that the
    /// table span is a power of 2.
    pub table_mask: i32,

    /// Desired size of the table relative to the size of the key/value spans in terms of a
    /// power of 2.
    pub table_power_offset: i32,

    /// Backing memory of the dictionary's table. Slots containing 0 are unused; slots
    /// containing higher values are equal to one plus the index of an element in the spans.
    pub table: Buffer<i32>,

    /// Backing memory containing the keys of the dictionary in insertion order.
    /// Indices from 0 to count-1 hold actual data; everything else is undefined.
    pub keys: Buffer<TKey>,

    /// Backing memory containing the values of the dictionary in insertion order.
    pub values: Buffer<TValue>,

    /// Hashes keys and decides key equality.
    pub equality_comparer: TEqualityComparer,
}

impl<TKey: Copy, TValue: Copy, TEqualityComparer: RefEqualityComparer<TKey>>
    QuickDictionary<TKey, TValue, TEqualityComparer>
{
    /// Creates a new dictionary with at least the specified element capacity.
    pub fn with_capacity(
        initial_capacity: i32,
        table_power_offset: i32,
        pool: &mut BufferPool,
        equality_comparer: TEqualityComparer,
    ) -> Self {
        let keys: Buffer<TKey> = pool.take_at_least(initial_capacity);
        let values: Buffer<TValue> = pool.take_at_least(keys.len());
        // Byte capacities are powers of 2, so an i32 table span's length is one as well.
        let mut table: Buffer<i32> = pool.take_at_least(keys.len() << table_power_offset);
        table.clear(0, table.len());
        debug_assert!(
            (table.len() & (table.len() - 1)) == 0,
            "Dictionaries depend upon power of 2 table spans for efficient modulo operations."
        );
        Self {
            count: 0,
            table_mask: table.len() - 1,
            table_power_offset,
            table,
            keys,
            values,
            equality_comparer,
        }
    }

    /// Adds a pair to the dictionary without checking capacity or for key duplication.
    #[inline(always)]
    pub fn add_unsafely(&mut self, key: TKey, value: TValue) {
        debug_assert!(self.count < self.keys.len(), "Adding would exceed capacity.");
        let mut table_index =
            HashHelper::rehash(self.equality_comparer.hash(&key)) & self.table_mask;
        while *self.table.get(table_index) != 0 {
            debug_assert!(
                !self
                    .equality_comparer
                    .equals(self.keys.get(*self.table.get(table_index) - 1), &key),
                "Key must not already be present."
            );
            table_index = (table_index + 1) & self.table_mask;
        }
        *self.keys.get_mut(self.count) = key;
        *self.values.get_mut(self.count) = value;
        *self.table.get_mut(table_index) = self.count + 1;
        self.count += 1;
    }

    /// Finds the existing element slot for a key, or allocates a new one if the key is not
    /// present. Returns true if the key already existed. Assumes sufficient capacity; the
    /// newly allocated value slot, if any, is left undefined for the caller to fill.
    #[inline(always)]
    pub fn find_or_allocate_slot_unsafely(&mut self, key: &TKey, slot_index: &mut i32) -> bool {
        let mut table_index = HashHelper::rehash(self.equality_comparer.hash(key)) & self.table_mask;
        loop {
            let element_index = *self.table.get(table_index) - 1;
            if element_index < 0 {
                debug_assert!(self.count < self.keys.len(), "Allocating would exceed capacity.");
                *slot_index = self.count;
                *self.keys.get_mut(self.count) = *key;
                *self.table.get_mut(table_index) = self.count + 1;
                self.count += 1;
                return false;
            }
            if self.equality_comparer.equals(self.keys.get(element_index), key) {
                *slot_index = element_index;
                return true;
            }
            table_index = (table_index + 1) & self.table_mask;
        }
    }

    /// Ensures that the dictionary can hold the given number of elements, resizing the
    /// backing spans if necessary. Element indices are stable across the resize.
    pub fn ensure_capacity(&mut self, count: i32, pool: &mut BufferPool) {
        if count > self.keys.len() {
            self.resize(count, pool);
        }
    }

    fn resize(&mut self, new_size: i32, pool: &mut BufferPool) {
        let mut new_keys: Buffer<TKey> = pool.take_at_least(new_size);
        let mut new_values: Buffer<TValue> = pool.take_at_least(new_keys.len());
        let mut new_table: Buffer<i32> =
            pool.take_at_least(new_keys.len() << self.table_power_offset);
        new_table.clear(0, new_table.len());

        self.keys.copy_to(0, &mut new_keys, 0, self.count);
        self.values.copy_to(0, &mut new_values, 0, self.count);

        pool.return_buffer(&mut self.keys);
        pool.return_buffer(&mut self.values);
        pool.return_buffer(&mut self.table);
        self.keys = new_keys;
        self.values = new_values;
        self.table = new_table;
        self.table_mask = self.table.len() - 1;

        // Rebuild the probe table; element order is untouched.
        for i in 0..self.count {
            let mut table_index =
                HashHelper::rehash(self.equality_comparer.hash(self.keys.get(i))) & self.table_mask;
            while *self.table.get(table_index) != 0 {
                table_index = (table_index + 1) & self.table_mask;
            }
            *self.table.get_mut(table_index) = i + 1;
        }
    }

    /// Looks up the element index a key occupies, if the key is present.
    pub fn index_of(&self, key: &TKey) -> Option<i32> {
        let mut table_index = HashHelper::rehash(self.equality_comparer.hash(key)) & self.table_mask;
        loop {
            let element_index = *self.table.get(table_index) - 1;
            if element_index < 0 {
                return None;
            }
            if self.equality_comparer.equals(self.keys.get(element_index), key) {
                return Some(element_index);
            }
            table_index = (table_index + 1) & self.table_mask;
        }
    }

    /// Returns the backing memory to the pool.
    pub fn dispose(&mut self, pool: &mut BufferPool) {
        pool.return_buffer(&mut self.keys);
        pool.return_buffer(&mut self.values);
        pool.return_buffer(&mut self.table);
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_or_allocate_preserves_insertion_order() {
        let mut pool = BufferPool::default();
        let mut dictionary: QuickDictionary<i32, i32, PrimitiveComparer> =
            QuickDictionary::with_capacity(4, 2, &mut pool, PrimitiveComparer);
        dictionary.add_unsafely(7, 70);
        dictionary.add_unsafely(11, 110);

        let mut slot = -1;
        assert!(dictionary.find_or_allocate_slot_unsafely(&7, &mut slot));
        assert_eq!(slot, 0);
        assert!(dictionary.find_or_allocate_slot_unsafely(&11, &mut slot));
        assert_eq!(slot, 1);
        assert!(!dictionary.find_or_allocate_slot_unsafely(&42, &mut slot));
        assert_eq!(slot, 2);
        *dictionary.values.get_mut(slot) = 420;
        assert!(dictionary.find_or_allocate_slot_unsafely(&42, &mut slot));
        assert_eq!(*dictionary.values.get(2), 420);

        dictionary.dispose(&mut pool);
        pool.assert_empty();
        pool.clear();
    }

    #[test]
    fn resize_keeps_element_indices_stable() {
        let mut pool = BufferPool::default();
        let mut dictionary: QuickDictionary<i32, i32, PrimitiveComparer> =
            QuickDictionary::with_capacity(2, 2, &mut pool, PrimitiveComparer);
        for i in 0..64 {
            dictionary.ensure_capacity(dictionary.count + 1, &mut pool);
            dictionary.add_unsafely(i * 13, i);
        }
        for i in 0..64 {
            assert_eq!(dictionary.index_of(&(i * 13)), Some(i));
            assert_eq!(*dictionary.values.get(i), i);
        }
        dictionary.dispose(&mut pool);
        pool.assert_empty();
        pool.clear();
    }
}
