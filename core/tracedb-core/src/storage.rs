//! Backing buffers for typed columns: [`ColumnStorage<T>`] (dense vs
//! nullable, dense-nullable vs sparse-nullable) and the type-erased
//! [`Storage`] enum that lets [`Column`](crate::column::Column) hold one of
//! several concrete element types without downcasting.

use crate::bitvector::BitVector;
use crate::string_pool::StringId;

/// Backing buffer for one typed, non-`Id` column.
#[derive(Debug, Clone)]
pub enum ColumnStorage<T> {
    /// Plain vector, one entry per row.
    NonNull(Vec<T>),
    /// Nullable, dense layout: `values.len() == presence.size()`; value at
    /// row `i` is live only if `presence.is_set(i)`. O(1) `set`.
    Dense { values: Vec<T>, presence: BitVector },
    /// Nullable, sparse layout: `values.len() == presence.count_set_bits()`;
    /// value at row `i` lives at `values[presence.rank(i)]`.
    Sparse { values: Vec<T>, presence: BitVector },
}

impl<T: Clone> ColumnStorage<T> {
    pub fn non_null() -> Self {
        ColumnStorage::NonNull(Vec::new())
    }

    pub fn nullable(dense: bool) -> Self {
        if dense {
            ColumnStorage::Dense {
                values: Vec::new(),
                presence: BitVector::new(),
            }
        } else {
            ColumnStorage::Sparse {
                values: Vec::new(),
                presence: BitVector::new(),
            }
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ColumnStorage::NonNull(v) => v.len(),
            ColumnStorage::Dense { presence, .. } => presence.size(),
            ColumnStorage::Sparse { presence, .. } => presence.size(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        !matches!(self, ColumnStorage::NonNull(_))
    }

    /// Read the value at storage index `i`.
    pub fn get(&self, i: usize) -> Option<T> {
        match self {
            ColumnStorage::NonNull(v) => Some(v[i].clone()),
            ColumnStorage::Dense { values, presence } => {
                presence.is_set(i).then(|| values[i].clone())
            }
            ColumnStorage::Sparse { values, presence } => presence
                .is_set(i)
                .then(|| values[presence.rank(i) as usize].clone()),
        }
    }

    /// Append a value (`None` only legal on a nullable storage).
    pub fn append(&mut self, value: Option<T>) {
        match self {
            ColumnStorage::NonNull(v) => v.push(value.expect("non-null storage requires a value")),
            ColumnStorage::Dense { values, presence } => {
                presence.append(value.is_some());
                // Dense storage must stay parallel to presence; pad with a
                // placeholder clone of the last value (or caller-provided
                // default) when absent. We require T: Default via a
                // dedicated path below for real use; see `append_dense`.
                if let Some(v) = value {
                    values.push(v);
                } else {
                    panic!(
                        "dense nullable storage requires Default for null padding; use append_dense"
                    );
                }
            }
            ColumnStorage::Sparse { values, presence } => {
                presence.append(value.is_some());
                if let Some(v) = value {
                    values.push(v);
                }
            }
        }
    }

    /// Set the value at `i`, expanding sparse storage if this transitions
    /// null → non-null (spec §4.3).
    pub fn set(&mut self, i: usize, value: Option<T>) {
        match self {
            ColumnStorage::NonNull(v) => {
                v[i] = value.expect("non-null storage requires a value");
            }
            ColumnStorage::Dense { values, presence } => {
                presence.set(i, value.is_some());
                if let Some(v) = value {
                    values[i] = v;
                }
            }
            ColumnStorage::Sparse { values, presence } => {
                let was_present = presence.is_set(i);
                presence.set(i, value.is_some());
                match (was_present, value) {
                    (true, Some(v)) => values[presence.rank(i) as usize] = v,
                    (true, None) => {
                        values.remove(presence.rank(i) as usize);
                    }
                    (false, Some(v)) => {
                        let pos = presence.rank(i) as usize;
                        values.insert(pos, v);
                    }
                    (false, None) => {}
                }
            }
        }
    }

    pub fn shrink_to_fit(&mut self) {
        match self {
            ColumnStorage::NonNull(v) => v.shrink_to_fit(),
            ColumnStorage::Dense { values, .. } => values.shrink_to_fit(),
            ColumnStorage::Sparse { values, .. } => values.shrink_to_fit(),
        }
    }
}

impl<T: Clone + Default> ColumnStorage<T> {
    /// Append to nullable storage, padding dense storage with `T::default()`
    /// when the value is absent.
    pub fn append_dense(&mut self, value: Option<T>) {
        match self {
            ColumnStorage::Dense { values, presence } => {
                presence.append(value.is_some());
                values.push(value.unwrap_or_default());
            }
            _ => self.append(value),
        }
    }
}

/// Type-erased storage, discriminated by [`ColumnType`](crate::value::ColumnType).
/// `Id` columns carry no storage (the value at row *i* is the row's own id).
#[derive(Debug, Clone)]
pub enum Storage {
    Int32(ColumnStorage<i32>),
    Uint32(ColumnStorage<u32>),
    Int64(ColumnStorage<i64>),
    Double(ColumnStorage<f64>),
    String(ColumnStorage<StringId>),
    Id,
}

impl Storage {
    pub fn size(&self) -> usize {
        match self {
            Storage::Int32(s) => s.size(),
            Storage::Uint32(s) => s.size(),
            Storage::Int64(s) => s.size(),
            Storage::Double(s) => s.size(),
            Storage::String(s) => s.size(),
            Storage::Id => 0,
        }
    }
}
