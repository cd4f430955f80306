//! A static perfect hash map over integer keys with worst case O(1) lookup.
//!
//! Keys are laid out on a `t x t` grid (`row = key / t`, `col = key % t`). Rows
//! are placed into one shared table, most occupied first, each at the smallest
//! displacement where none of its keys collides with an earlier row.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Index;

use num_traits::PrimInt;

use crate::error::PerfectHashError;

/// Maps a fixed set of integer keys to values. Keys that were not inserted map
/// to the sentinel given at construction.
///
/// # Examples
/// ```
/// use split_bvh::perfect_hash::PerfectHashMap;
///
/// let map = PerfectHashMap::new(1000u32, &[5, 100, 1000], &[1, 2, 3], -1).unwrap();
/// assert_eq!(map[100], 2);
/// assert_eq!(map[7], -1);
/// ```
#[derive(Debug, Clone)]
pub struct PerfectHashMap<K, V> {
    dim: usize,
    max_key: K,
    displacement: Vec<usize>,
    hash_table: Vec<V>,
    slot_keys: Vec<Option<K>>,
    sentinel: V,
    len: usize,
}

fn to_index<K: PrimInt + Debug>(key: K) -> Result<usize, PerfectHashError> {
    key.to_usize()
        .ok_or_else(|| PerfectHashError::KeyOutOfRange {
            key: format!("{:?}", key),
        })
}

/// Smallest power of two whose square exceeds `max_key`.
fn table_dim_for(max_key: usize) -> usize {
    let mut dim = 1usize;
    while dim.checked_mul(dim).map_or(false, |square| square <= max_key) {
        dim *= 2;
    }
    dim
}

impl<K, V> PerfectHashMap<K, V>
where
    K: PrimInt + Debug,
    V: Copy,
{
    /// Builds the map from parallel `keys` and `values`. Every key must lie in
    /// `0..=max_key`. A key given twice keeps its last value.
    pub fn new(max_key: K, keys: &[K], values: &[V], sentinel: V) -> Result<Self, PerfectHashError> {
        if keys.len() != values.len() {
            return Err(PerfectHashError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }

        let max_index = to_index(max_key)?;
        let dim = table_dim_for(max_index);

        let mut entries: BTreeMap<usize, (K, V)> = BTreeMap::new();
        for (&key, &value) in keys.iter().zip(values) {
            let index = to_index(key)?;
            if index > max_index {
                return Err(PerfectHashError::MaxKeyViolated {
                    key: index as u64,
                    max_key: max_index as u64,
                });
            }
            entries.insert(index, (key, value));
        }

        // Sparse rows: (column, key, value) in column order.
        let mut rows: BTreeMap<usize, Vec<(usize, K, V)>> = BTreeMap::new();
        for (&index, &(key, value)) in &entries {
            rows.entry(index / dim)
                .or_default()
                .push((index & (dim - 1), key, value));
        }
        let mut order: Vec<(usize, Vec<(usize, K, V)>)> = rows.into_iter().collect();
        order.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let mut displacement = vec![0; dim];
        let mut hash_table: Vec<V> = Vec::new();
        let mut slot_keys: Vec<Option<K>> = Vec::new();

        for (row, cells) in order {
            let offset = (0..)
                .find(|&offset| {
                    cells.iter().all(|&(col, _, _)| {
                        slot_keys
                            .get(offset + col)
                            .map_or(true, |slot| slot.is_none())
                    })
                })
                .unwrap_or(0);

            if hash_table.len() < offset + dim {
                hash_table.resize(offset + dim, sentinel);
                slot_keys.resize(offset + dim, None);
            }
            for (col, key, value) in cells {
                hash_table[offset + col] = value;
                slot_keys[offset + col] = Some(key);
            }
            displacement[row] = offset;
        }

        Ok(PerfectHashMap {
            dim,
            max_key,
            displacement,
            hash_table,
            slot_keys,
            sentinel,
            len: entries.len(),
        })
    }

    fn slot(&self, key: K) -> Option<usize> {
        if key > self.max_key {
            return None;
        }
        let index = key.to_usize()?;
        let slot = self.displacement[index / self.dim] + (index & (self.dim - 1));
        match self.slot_keys.get(slot) {
            Some(&Some(stored)) if stored == key => Some(slot),
            _ => None,
        }
    }

    /// Returns the value of `key`, or the sentinel if it was not inserted.
    pub fn get(&self, key: K) -> V {
        self.slot(key)
            .map_or(self.sentinel, |slot| self.hash_table[slot])
    }

    /// Returns true if `key` was inserted.
    pub fn contains_key(&self, key: K) -> bool {
        self.slot(key).is_some()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Side of the key grid.
    pub fn table_dim(&self) -> usize {
        self.dim
    }

    /// Displacement of every grid row into [`hash_table`].
    ///
    /// [`hash_table`]: struct.PerfectHashMap.html#method.hash_table
    pub fn displacement_table(&self) -> &[usize] {
        &self.displacement
    }

    /// The compressed table, holding the sentinel in unused slots.
    pub fn hash_table(&self) -> &[V] {
        &self.hash_table
    }

    pub fn sentinel(&self) -> V {
        self.sentinel
    }
}

impl<K, V> Index<K> for PerfectHashMap<K, V>
where
    K: PrimInt + Debug,
    V: Copy,
{
    type Output = V;

    fn index(&self, key: K) -> &V {
        match self.slot(key) {
            Some(slot) => &self.hash_table[slot],
            None => &self.sentinel,
        }
    }
}
