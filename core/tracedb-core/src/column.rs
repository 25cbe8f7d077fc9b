//! [`Column`]: value semantics over a [`Storage`] plus an overlay
//! ([`RowMap`]) and [`ColumnFlags`].
//!
//! Per the Design Notes, a `Column` never reaches back into its owning
//! `Table` — every operation that needs the overlay takes it as an
//! explicit argument, which is what lets columns be shared between a
//! parent table and its children without a back-pointer.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::bitvector::BitVector;
use crate::error::{DbxError, DbxResult};
use crate::row_map::RowMap;
use crate::storage::Storage;
use crate::string_pool::StringPool;
use crate::value::{ColumnFlags, ColumnType, Constraint, FilterOp, Order, SqlValue};

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub col_type: ColumnType,
    pub flags: ColumnFlags,
    pub storage: Arc<Storage>,
    /// Index into the owning table's `row_maps`; the overlay this column
    /// reads through.
    pub overlay_index: u32,
    /// Index of this column within its table's `columns`, used by
    /// constraint/order factories.
    pub index_in_table: u32,
}

/// Validates the flag/type combinations required by the data model:
/// `SetId` implies `Sorted & NonNull & Uint32`.
fn is_flags_and_type_valid(col_type: ColumnType, flags: ColumnFlags) -> bool {
    if flags.contains(ColumnFlags::SET_ID)
        && !(flags.contains(ColumnFlags::SORTED)
            && flags.contains(ColumnFlags::NON_NULL)
            && col_type == ColumnType::Uint32)
    {
        return false;
    }
    true
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        col_type: ColumnType,
        flags: ColumnFlags,
        storage: Arc<Storage>,
        overlay_index: u32,
        index_in_table: u32,
    ) -> DbxResult<Column> {
        if !is_flags_and_type_valid(col_type, flags) {
            return Err(DbxError::Schema(
                "SetId requires Sorted, NonNull and Uint32".to_string(),
            ));
        }
        Ok(Column {
            name: name.into(),
            col_type,
            flags,
            storage,
            overlay_index,
            index_in_table,
        })
    }

    pub fn is_id(&self) -> bool {
        self.col_type == ColumnType::Id
    }

    pub fn is_dummy(&self) -> bool {
        self.col_type == ColumnType::Dummy
    }

    /// A copy of this column rebound onto a different overlay/table
    /// position, dropping flags whose invariants no longer hold.
    ///
    /// `SetId` never survives rebinding: the "first occurrence at row v"
    /// property only holds relative to the original storage order. `Sorted`
    /// survives non-reordering rebinds (the caller passes `keep_sorted`).
    pub fn rebind(
        &self,
        new_overlay_index: u32,
        new_index_in_table: u32,
        keep_sorted: bool,
    ) -> Column {
        let mut flags = self.flags;
        flags.remove(ColumnFlags::SET_ID);
        if !keep_sorted {
            flags.remove(ColumnFlags::SORTED);
        }
        Column {
            name: self.name.clone(),
            col_type: self.col_type,
            flags,
            storage: Arc::clone(&self.storage),
            overlay_index: new_overlay_index,
            index_in_table: new_index_in_table,
        }
    }

    fn storage_value(&self, storage_idx: u32) -> SqlValue {
        match self.col_type {
            ColumnType::Id => SqlValue::Uint32(storage_idx),
            ColumnType::Dummy => panic!("read of a Dummy column"),
            ColumnType::Int32 => match &*self.storage {
                Storage::Int32(s) => s
                    .get(storage_idx as usize)
                    .map_or(SqlValue::Null, SqlValue::Int32),
                _ => unreachable!("storage/type mismatch"),
            },
            ColumnType::Uint32 => match &*self.storage {
                Storage::Uint32(s) => s
                    .get(storage_idx as usize)
                    .map_or(SqlValue::Null, SqlValue::Uint32),
                _ => unreachable!("storage/type mismatch"),
            },
            ColumnType::Int64 => match &*self.storage {
                Storage::Int64(s) => s
                    .get(storage_idx as usize)
                    .map_or(SqlValue::Null, SqlValue::Int64),
                _ => unreachable!("storage/type mismatch"),
            },
            ColumnType::Double => match &*self.storage {
                Storage::Double(s) => s
                    .get(storage_idx as usize)
                    .map_or(SqlValue::Null, SqlValue::Double),
                _ => unreachable!("storage/type mismatch"),
            },
            ColumnType::String => match &*self.storage {
                Storage::String(s) => s
                    .get(storage_idx as usize)
                    .map_or(SqlValue::Null, SqlValue::String),
                _ => unreachable!("storage/type mismatch"),
            },
        }
    }

    /// Read the value at table row `row_index`, through `overlay`.
    pub fn get(&self, overlay: &RowMap, row_index: u32) -> SqlValue {
        let storage_idx = overlay.get(row_index);
        self.storage_value(storage_idx)
    }

    pub fn iter<'a>(&'a self, overlay: &'a RowMap) -> ColumnIter<'a> {
        ColumnIter {
            col: self,
            overlay,
            pos: 0,
        }
    }

    /// Linear index lookup; for `Id` columns this is exact via the overlay.
    pub fn index_of(&self, overlay: &RowMap, value: &SqlValue) -> Option<u32> {
        if self.is_id() {
            let v = value.as_u32()?;
            return overlay.index_of(v);
        }
        (0..overlay.size() as u32).find(|&row| self.get(overlay, row) == *value)
    }

    /// First/last live value if `Sorted`, else a full scan.
    pub fn min(&self, overlay: &RowMap) -> SqlValue {
        if overlay.empty() {
            return SqlValue::Null;
        }
        if self.flags.contains(ColumnFlags::SORTED) {
            return self.get(overlay, 0);
        }
        (0..overlay.size() as u32)
            .map(|row| self.get(overlay, row))
            .filter(|v| !v.is_null())
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .unwrap_or(SqlValue::Null)
    }

    pub fn max(&self, overlay: &RowMap) -> SqlValue {
        if overlay.empty() {
            return SqlValue::Null;
        }
        if self.flags.contains(ColumnFlags::SORTED) {
            return self.get(overlay, overlay.size() as u32 - 1);
        }
        (0..overlay.size() as u32)
            .map(|row| self.get(overlay, row))
            .filter(|v| !v.is_null())
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .unwrap_or(SqlValue::Null)
    }

    /// Restrict `rm` to the rows (in `rm`'s own index space, i.e. table-row
    /// indices) satisfying `col[row] op value`. Never widens `rm`.
    pub fn filter_into(
        &self,
        overlay: &RowMap,
        op: FilterOp,
        value: &SqlValue,
        pool: &StringPool,
        rm: &mut RowMap,
    ) {
        if value.is_null() && !matches!(op, FilterOp::IsNull | FilterOp::IsNotNull) {
            rm.clear();
            return;
        }

        // 1. Id + Eq: exact row lookup.
        if self.is_id() && op == FilterOp::Eq {
            match self.index_of(overlay, value) {
                Some(row) => rm.intersect_exact(row),
                None => rm.clear(),
            }
            return;
        }

        // 2. SetId + Eq: exploit the contiguous-block invariant directly on
        // storage (SetId never survives a rebind onto a non-identity overlay).
        if self.flags.contains(ColumnFlags::SET_ID) && op == FilterOp::Eq {
            let Some(v) = value.as_u32() else {
                rm.clear();
                return;
            };
            let size = self.storage.size();
            if v as usize >= size {
                rm.clear();
                return;
            }
            let mut end = v as usize;
            while end < size && self.storage_value(end as u32) == SqlValue::Uint32(v) {
                end += 1;
            }
            debug!(column = %self.name, start = v, end, "SetId eq block");
            rm.intersect(RowMap::range(v, end as u32));
            return;
        }

        // 3. Sorted: binary search, handles Eq/Lt/Le/Gt/Ge. Ne intentionally
        // falls through to the slow path.
        if self.flags.contains(ColumnFlags::SORTED)
            && op != FilterOp::Ne
            && matches!(
                op,
                FilterOp::Eq | FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge
            )
        {
            if let Some((lo, hi)) = self.sorted_range(overlay, op, value) {
                rm.intersect(RowMap::range(lo, hi));
                return;
            }
        }

        // 4. Slow path: full scan.
        let bv = BitVector::from_predicate(overlay.size(), |row| {
            self.matches(overlay, row as u32, op, value, pool)
        });
        rm.intersect(RowMap::from_bitvector(bv));
    }

    /// Binary search over `overlay` assuming `Sorted`. Returns the half-open
    /// output-index range `[lo, hi)` satisfying the comparison, or `None` if
    /// `value`'s SQL type doesn't match the column's.
    fn sorted_range(&self, overlay: &RowMap, op: FilterOp, value: &SqlValue) -> Option<(u32, u32)> {
        if !self.type_matches(value) {
            return None;
        }
        let n = overlay.size() as u32;
        let cmp_at = |row: u32| -> Ordering {
            self.get(overlay, row)
                .partial_cmp(value)
                .unwrap_or(Ordering::Equal)
        };
        let lower_bound = |mut lo: u32, mut hi: u32| -> u32 {
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if cmp_at(mid) == Ordering::Less {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            lo
        };
        let upper_bound = |mut lo: u32, mut hi: u32| -> u32 {
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if cmp_at(mid) == Ordering::Greater {
                    hi = mid;
                } else {
                    lo = mid + 1;
                }
            }
            lo
        };
        Some(match op {
            FilterOp::Eq => (lower_bound(0, n), upper_bound(0, n)),
            FilterOp::Lt => (0, lower_bound(0, n)),
            FilterOp::Le => (0, upper_bound(0, n)),
            FilterOp::Gt => (upper_bound(0, n), n),
            FilterOp::Ge => (lower_bound(0, n), n),
            _ => unreachable!("caller filters to Eq/Lt/Le/Gt/Ge"),
        })
    }

    fn type_matches(&self, value: &SqlValue) -> bool {
        matches!(
            (self.col_type, value),
            (ColumnType::Int32, SqlValue::Int32(_))
                | (ColumnType::Uint32, SqlValue::Uint32(_))
                | (ColumnType::Int64, SqlValue::Int64(_))
                | (ColumnType::Double, SqlValue::Double(_))
                | (ColumnType::String, SqlValue::String(_))
                | (ColumnType::Id, SqlValue::Uint32(_))
        )
    }

    fn matches(
        &self,
        overlay: &RowMap,
        row: u32,
        op: FilterOp,
        value: &SqlValue,
        pool: &StringPool,
    ) -> bool {
        let v = self.get(overlay, row);
        match op {
            FilterOp::IsNull => v.is_null(),
            FilterOp::IsNotNull => !v.is_null(),
            FilterOp::Eq => v == *value,
            FilterOp::Ne => !v.is_null() && v != *value,
            FilterOp::Lt => matches!(v.partial_cmp(value), Some(Ordering::Less)),
            FilterOp::Le => matches!(v.partial_cmp(value), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Gt => matches!(v.partial_cmp(value), Some(Ordering::Greater)),
            FilterOp::Ge => matches!(
                v.partial_cmp(value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Glob | FilterOp::Regex => match (&v, value) {
                (SqlValue::String(id), SqlValue::String(pattern_id)) => {
                    let text = pool.get(*id);
                    let pattern = pool.get(*pattern_id);
                    if op == FilterOp::Glob {
                        glob_match(pattern, text)
                    } else {
                        regex_lite_match(pattern, text)
                    }
                }
                _ => false,
            },
        }
    }

    /// Stable-sort `out` (a permutation of row indices into `overlay`'s
    /// space) by this column's values.
    pub fn stable_sort(&self, overlay: &RowMap, desc: bool, out: &mut [u32]) {
        out.sort_by(|&a, &b| {
            let ord = self
                .get(overlay, a)
                .partial_cmp(&self.get(overlay, b))
                .unwrap_or(Ordering::Equal);
            if desc { ord.reverse() } else { ord }
        });
    }

    pub fn constraint(&self, op: FilterOp, value: SqlValue) -> Constraint {
        Constraint::new(self.index_in_table, op, value)
    }

    pub fn order(&self, desc: bool) -> Order {
        Order {
            column_index: self.index_in_table,
            desc,
        }
    }
}

pub struct ColumnIter<'a> {
    col: &'a Column,
    overlay: &'a RowMap,
    pos: u32,
}

impl Iterator for ColumnIter<'_> {
    type Item = SqlValue;

    fn next(&mut self) -> Option<SqlValue> {
        if self.pos as usize >= self.overlay.size() {
            return None;
        }
        let v = self.col.get(self.overlay, self.pos);
        self.pos += 1;
        Some(v)
    }
}

/// Minimal glob matcher supporting `*` and `?`, in the spirit of SQLite's
/// `GLOB` operator used by the upstream query layer this core backs.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            (Some(b'?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

/// `Regex` is left as a substring/literal fallback: the core has no regex
/// dependency, and the SQL front-end (out of scope) owns full semantics.
fn regex_lite_match(pattern: &str, text: &str) -> bool {
    text.contains(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ColumnStorage;

    fn uint32_column(values: Vec<u32>, flags: ColumnFlags) -> Column {
        let storage = Arc::new(Storage::Uint32(ColumnStorage::NonNull(values)));
        Column::new("col", ColumnType::Uint32, flags, storage, 0, 0).unwrap()
    }

    #[test]
    fn set_id_validity_enforced() {
        let storage = Arc::new(Storage::Uint32(ColumnStorage::NonNull(vec![])));
        let result = Column::new("bad", ColumnType::Int32, ColumnFlags::SET_ID, storage, 0, 0);
        assert!(result.is_err());
    }

    #[test]
    fn filter_set_id_eq() {
        // event (ts, arg_set_id) from spec S1.
        let col = uint32_column(
            vec![0, 0, 2, 3, 4, 4, 4, 4, 8],
            ColumnFlags::SET_ID | ColumnFlags::SORTED | ColumnFlags::NON_NULL,
        );
        let overlay = RowMap::range(0, 9);
        let pool = StringPool::new();

        let mut rm = RowMap::range(0, 9);
        col.filter_into(&overlay, FilterOp::Eq, &SqlValue::Uint32(1), &pool, &mut rm);
        assert_eq!(rm.size(), 0);

        let mut rm = RowMap::range(0, 9);
        col.filter_into(&overlay, FilterOp::Eq, &SqlValue::Uint32(4), &pool, &mut rm);
        assert_eq!(rm.iter().collect::<Vec<_>>(), vec![4, 5, 6, 7]);

        let mut rm = RowMap::range(0, 9);
        col.filter_into(&overlay, FilterOp::Eq, &SqlValue::Uint32(0), &pool, &mut rm);
        assert_eq!(rm.iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn filter_sorted_fast_path() {
        let values: Vec<u32> = (0..128).collect();
        let col = uint32_column(values, ColumnFlags::SORTED | ColumnFlags::NON_NULL);
        let overlay = RowMap::range(0, 128);
        let pool = StringPool::new();
        let mut rm = RowMap::range(0, 128);
        col.filter_into(
            &overlay,
            FilterOp::Ge,
            &SqlValue::Uint32(100),
            &pool,
            &mut rm,
        );
        assert_eq!(rm.size(), 28);
        assert_eq!(col.get(&overlay, rm.get(0)), SqlValue::Uint32(100));
    }

    #[test]
    fn stable_sort_preserves_ties() {
        let values = vec![0u32, 1, 2, 0, 1, 2, 0, 1, 2];
        let col = uint32_column(values, ColumnFlags::empty());
        let overlay = RowMap::range(0, 9);
        let mut out = vec![1u32, 7, 4, 0, 6, 3, 2, 5, 8];
        col.stable_sort(&overlay, false, &mut out);
        assert_eq!(out, vec![0, 6, 3, 1, 7, 4, 2, 5, 8]);
    }

    #[test]
    fn filter_into_never_widens() {
        let col = uint32_column(vec![1, 2, 3], ColumnFlags::empty());
        let overlay = RowMap::range(0, 3);
        let pool = StringPool::new();
        let mut rm = RowMap::range(0, 2);
        col.filter_into(&overlay, FilterOp::Ge, &SqlValue::Uint32(0), &pool, &mut rm);
        assert_eq!(rm.size(), 2);
    }

    #[test]
    fn null_filter_returns_empty_without_scanning() {
        let col = uint32_column(vec![1, 2, 3], ColumnFlags::empty());
        let overlay = RowMap::range(0, 3);
        let pool = StringPool::new();
        let mut rm = RowMap::range(0, 3);
        col.filter_into(&overlay, FilterOp::Eq, &SqlValue::Null, &pool, &mut rm);
        assert!(rm.empty());
    }
}
