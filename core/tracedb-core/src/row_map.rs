//! `RowMap` — an ordered index set over `[0, N)`.
//!
//! A tagged union of three representations chosen so that common
//! operations stay close to linear in the size of their *output*: a
//! contiguous `Range` stays a `Range` when possible, filters produce
//! order-preserving masks (`Range`/`BitVector`), and sorts/joins produce
//! `Indices` (which may repeat or permute).

use crate::bitvector::BitVector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowMap {
    Range { start: u32, end: u32 },
    BitVector(BitVector),
    Indices(Vec<u32>),
}

impl Default for RowMap {
    fn default() -> Self {
        RowMap::Range { start: 0, end: 0 }
    }
}

impl RowMap {
    pub fn range(start: u32, end: u32) -> Self {
        RowMap::Range { start, end }
    }

    pub fn from_bitvector(bv: BitVector) -> Self {
        RowMap::BitVector(bv)
    }

    pub fn from_indices(idx: Vec<u32>) -> Self {
        RowMap::Indices(idx)
    }

    pub fn size(&self) -> usize {
        match self {
            RowMap::Range { start, end } => (end - start) as usize,
            RowMap::BitVector(bv) => bv.count_set_bits() as usize,
            RowMap::Indices(idx) => idx.len(),
        }
    }

    pub fn empty(&self) -> bool {
        self.size() == 0
    }

    /// Value of the `output_idx`-th element (0-indexed) of this set.
    pub fn get(&self, output_idx: u32) -> u32 {
        match self {
            RowMap::Range { start, .. } => start + output_idx,
            RowMap::BitVector(bv) => bv
                .index_of_nth_set(output_idx)
                .expect("output_idx out of range"),
            RowMap::Indices(idx) => idx[output_idx as usize],
        }
    }

    /// Inverse of [`get`](Self::get): the output position of storage index
    /// `i`, if `i` is a member of this set.
    pub fn index_of(&self, i: u32) -> Option<u32> {
        match self {
            RowMap::Range { start, end } => {
                if i >= *start && i < *end {
                    Some(i - start)
                } else {
                    None
                }
            }
            RowMap::BitVector(bv) => {
                if (i as usize) < bv.size() && bv.is_set(i as usize) {
                    Some(bv.rank(i as usize))
                } else {
                    None
                }
            }
            RowMap::Indices(idx) => idx.iter().position(|&v| v == i).map(|p| p as u32),
        }
    }

    /// Intersect in place with `other`, keeping relative order.
    pub fn intersect(&mut self, other: RowMap) {
        *self = match (&*self, &other) {
            (RowMap::Range { start: s1, end: e1 }, RowMap::Range { start: s2, end: e2 }) => {
                RowMap::Range {
                    start: (*s1).max(*s2),
                    end: (*e1).min(*e2).max((*s1).max(*s2)),
                }
            }
            _ => {
                let bv = self.as_bitvector_over(self.universe_hint(&other));
                let other_bv = other.as_bitvector_over(bv.size());
                let mut out = BitVector::new();
                for i in 0..bv.size() {
                    out.append(bv.is_set(i) && other_bv.is_set(i));
                }
                RowMap::BitVector(out)
            }
        };
    }

    /// Intersect with a single index: keep it if present, else become empty.
    pub fn intersect_exact(&mut self, i: u32) {
        if self.index_of(i).is_some() {
            *self = RowMap::Indices(vec![i]);
        } else {
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        *self = RowMap::Range { start: 0, end: 0 };
    }

    /// Composition: `self.select_rows(other)[k] == self.get(other.get(k))`.
    pub fn select_rows(&self, other: &RowMap) -> RowMap {
        if let (RowMap::Range { start: s1, .. }, RowMap::Range { start: s2, end: e2 }) =
            (self, other)
        {
            // Contiguous composition of two ranges stays a range.
            return RowMap::Range {
                start: s1 + s2,
                end: s1 + e2,
            };
        }
        let indices: Vec<u32> = other.iter().map(|o| self.get(o)).collect();
        RowMap::Indices(indices)
    }

    /// Drop elements for which `pred` returns `false`, applied positionally
    /// over the current elements (in order).
    pub fn remove_if(&mut self, mut pred: impl FnMut(u32) -> bool) {
        let kept: Vec<u32> = self.iter().filter(|&v| !pred(v)).collect();
        *self = RowMap::Indices(kept);
    }

    pub fn iter(&self) -> RowMapIter<'_> {
        RowMapIter { rm: self, pos: 0 }
    }

    /// Append `value` as the new last element. Used by `Table`'s row
    /// insertion, which grows an overlay by one storage index per insert.
    pub fn push(&mut self, value: u32) {
        match self {
            RowMap::Range { end, .. } if value == *end => {
                *end += 1;
            }
            RowMap::Range { start, end } => {
                let mut idx: Vec<u32> = (*start..*end).collect();
                idx.push(value);
                *self = RowMap::Indices(idx);
            }
            RowMap::BitVector(_) => {
                let mut idx: Vec<u32> = self.iter().collect();
                idx.push(value);
                *self = RowMap::Indices(idx);
            }
            RowMap::Indices(idx) => idx.push(value),
        }
    }

    /// Materialize as a `BitVector` over a universe of size `universe`.
    fn as_bitvector_over(&self, universe: usize) -> BitVector {
        match self {
            RowMap::BitVector(bv) => bv.clone(),
            RowMap::Range { start, end } => {
                let mut bv = BitVector::new();
                for i in 0..universe {
                    bv.append(i as u32 >= *start && (i as u32) < *end);
                }
                bv
            }
            RowMap::Indices(idx) => {
                let mut bv = BitVector::with_size(universe, false);
                for &i in idx {
                    if (i as usize) < universe {
                        bv.set(i as usize, true);
                    }
                }
                bv
            }
        }
    }

    fn universe_hint(&self, other: &RowMap) -> usize {
        let self_max = self.max_index_hint();
        let other_max = other.max_index_hint();
        self_max.max(other_max)
    }

    fn max_index_hint(&self) -> usize {
        match self {
            RowMap::Range { end, .. } => *end as usize,
            RowMap::BitVector(bv) => bv.size(),
            RowMap::Indices(idx) => idx.iter().copied().max().map_or(0, |m| m as usize + 1),
        }
    }
}

pub struct RowMapIter<'a> {
    rm: &'a RowMap,
    pos: u32,
}

impl Iterator for RowMapIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.pos as usize >= self.rm.size() {
            return None;
        }
        let v = self.rm.get(self.pos);
        self.pos += 1;
        Some(v)
    }
}
