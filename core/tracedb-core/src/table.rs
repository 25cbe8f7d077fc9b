//! [`Table`]: an ordered list of [`Column`]s sharing a vector of per-row
//! overlays, plus its `Filter`/`Sort`/`LookupJoin` algebra and the
//! parent/child extension operations.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::column::Column;
use crate::row_map::RowMap;
use crate::storage::Storage;
use crate::string_pool::StringPool;
use crate::value::{ColumnType, Constraint, Order, Schema, SchemaColumn};

/// `row_maps: Vec<overlay>`, `columns: Vec<Column>`, `row_count`, plus the
/// process-wide string pool every table shares.
#[derive(Clone)]
pub struct Table {
    string_pool: Rc<RefCell<StringPool>>,
    row_maps: Vec<RowMap>,
    columns: Vec<Column>,
    row_count: u32,
}

impl Table {
    /// A fresh root table with a single identity overlay and no columns.
    pub fn new(string_pool: Rc<RefCell<StringPool>>) -> Table {
        Table {
            string_pool,
            row_maps: vec![RowMap::range(0, 0)],
            columns: Vec::new(),
            row_count: 0,
        }
    }

    pub fn string_pool(&self) -> &Rc<RefCell<StringPool>> {
        &self.string_pool
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_maps(&self) -> &[RowMap] {
        &self.row_maps
    }

    pub fn overlay_for(&self, column_index: u32) -> &RowMap {
        &self.row_maps[self.columns[column_index as usize].overlay_index as usize]
    }

    pub fn find_column_by_name(&self, name: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|p| p as u32)
    }

    pub fn get_column(&self, index: u32) -> &Column {
        &self.columns[index as usize]
    }

    pub fn schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| SchemaColumn {
                    name: c.name.clone(),
                    sql_type: c.col_type,
                    is_id: c.is_id(),
                    is_sorted: c.flags.contains(crate::value::ColumnFlags::SORTED),
                    is_hidden: c.flags.contains(crate::value::ColumnFlags::HIDDEN),
                    is_set_id: c.flags.contains(crate::value::ColumnFlags::SET_ID),
                })
                .collect(),
        )
    }

    pub fn rows(&self) -> RowIter<'_> {
        RowIter {
            table: self,
            pos: 0,
        }
    }

    /// Register a new column introduced by this table, appended to
    /// `columns` with `overlay_index` pointing at `overlay`.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        col_type: ColumnType,
        flags: crate::value::ColumnFlags,
        storage: Arc<Storage>,
        overlay_index: u32,
    ) {
        let index_in_table = self.columns.len() as u32;
        let col = Column::new(
            name,
            col_type,
            flags,
            storage,
            overlay_index,
            index_in_table,
        )
        .expect("invalid flag/type combination");
        self.columns.push(col);
    }

    pub fn push_overlay(&mut self, rm: RowMap) -> u32 {
        self.row_maps.push(rm);
        (self.row_maps.len() - 1) as u32
    }

    /// Appends one row: pushes `parent_row` onto every overlay except this
    /// table's own identity overlay (the last one), then appends the next
    /// index onto the identity overlay. Returns the new row's table-local
    /// index. `parent_row` is `None` for a root table's own insert.
    pub fn begin_insert(&mut self, parent_row: Option<u32>) -> u32 {
        let own_overlay = self.row_maps.len() - 1;
        if let Some(parent_row) = parent_row {
            for rm in &mut self.row_maps[..own_overlay] {
                rm.push(parent_row);
            }
        }
        let own_idx = self.row_maps[own_overlay].size() as u32;
        self.row_maps[own_overlay].push(own_idx);
        self.row_count += 1;
        own_idx
    }

    pub fn storage_mut(&mut self, column_index: u32) -> &mut Arc<Storage> {
        &mut self.columns[column_index as usize].storage
    }

    /// Construct a table directly from its parts. Used by the view planner
    /// to assemble the final projected output table.
    pub(crate) fn from_parts(
        string_pool: Rc<RefCell<StringPool>>,
        row_maps: Vec<RowMap>,
        columns: Vec<Column>,
        row_count: u32,
    ) -> Table {
        Table {
            string_pool,
            row_maps,
            columns,
            row_count,
        }
    }

    /// Restrict every overlay to `rm` and rebind every column in place
    /// (positions unchanged; order preserved since `rm` only drops/permutes
    /// rows, it does not introduce a new overlay layout).
    pub fn select_rows(&self, rm: &RowMap) -> Table {
        self.apply_row_map(rm, true)
    }

    /// Build `rm = Range(0, row_count)`, restrict it by every constraint in
    /// order, then return a copy of this table with every overlay composed
    /// through `rm` and `row_count = rm.size()`.
    pub fn filter(&self, constraints: &[Constraint]) -> Table {
        let mut rm = RowMap::range(0, self.row_count);
        let pool = self.string_pool.borrow();
        for c in constraints {
            let col = &self.columns[c.column_index as usize];
            let overlay = &self.row_maps[col.overlay_index as usize];
            col.filter_into(overlay, c.op, &c.value, &pool, &mut rm);
        }
        drop(pool);
        debug!(from = self.row_count, to = rm.size(), "Table::filter");
        self.apply_row_map(&rm, true)
    }

    /// Stable-sort `0..row_count` by `orders` (first differing key wins),
    /// then return a copy of this table with every overlay reindexed
    /// through the resulting permutation. `SetId` (and, conservatively,
    /// `Sorted`) is dropped on every column: the result is only actually
    /// sorted by the requested keys, not by any original column order.
    pub fn sort(&self, orders: &[Order]) -> Table {
        let mut idx: Vec<u32> = (0..self.row_count).collect();
        idx.sort_by(|&a, &b| {
            for o in orders {
                let col = &self.columns[o.column_index as usize];
                let overlay = &self.row_maps[col.overlay_index as usize];
                let ord = col
                    .get(overlay, a)
                    .partial_cmp(&col.get(overlay, b))
                    .unwrap_or(std::cmp::Ordering::Equal);
                let ord = if o.desc { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        self.apply_row_map(&RowMap::from_indices(idx), false)
    }

    /// Compose every overlay through `rm` and rebind every column onto the
    /// new overlay indices (positions are preserved 1:1 across overlays).
    fn apply_row_map(&self, rm: &RowMap, keep_sorted: bool) -> Table {
        let row_maps: Vec<RowMap> = self.row_maps.iter().map(|o| o.select_rows(rm)).collect();
        let columns: Vec<Column> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| c.rebind(c.overlay_index, i as u32, keep_sorted))
            .collect();
        Table {
            string_pool: Rc::clone(&self.string_pool),
            row_maps,
            columns,
            row_count: rm.size() as u32,
        }
    }

    /// For every row `j` of `self`, look up
    /// `other.get_column(right_key).index_of(self.get_column(left_key).get(j))`
    /// (must succeed — `left_key` must be non-null, `right_key` must be an
    /// `Id` column). The result keeps all of `self`'s columns/overlays, then
    /// appends `other`'s overlays (composed through the join row-map) and
    /// columns (excluding `other`'s `"id"` column), rebound onto the
    /// appended overlays.
    pub fn lookup_join(&self, left_key: u32, other: &Table, right_key: u32) -> Table {
        let left_col = &self.columns[left_key as usize];
        let left_overlay = &self.row_maps[left_col.overlay_index as usize];
        let right_col = &other.columns[right_key as usize];
        let right_overlay = &other.row_maps[right_col.overlay_index as usize];
        assert!(right_col.is_id(), "LookupJoin requires an Id right key");

        let mut indices = Vec::with_capacity(self.row_count as usize);
        for j in 0..self.row_count {
            let v = left_col.get(left_overlay, j);
            let row = right_col
                .index_of(right_overlay, &v)
                .expect("LookupJoin requires a matching row in `other`");
            indices.push(row);
        }
        let rm_join = RowMap::from_indices(indices);

        let overlay_offset = self.row_maps.len() as u32;
        let mut row_maps = self.row_maps.clone();
        for o in &other.row_maps {
            row_maps.push(o.select_rows(&rm_join));
        }

        let mut columns = self.columns.clone();
        for c in &other.columns {
            if c.name == "id" {
                continue;
            }
            let index_in_table = columns.len() as u32;
            columns.push(Column {
                name: c.name.clone(),
                col_type: c.col_type,
                flags: {
                    let mut f = c.flags;
                    f.remove(crate::value::ColumnFlags::SET_ID);
                    f.remove(crate::value::ColumnFlags::SORTED);
                    f
                },
                storage: Arc::clone(&c.storage),
                overlay_index: overlay_offset + c.overlay_index,
                index_in_table,
            });
        }

        debug!(left = self.row_count, "Table::lookup_join");
        Table {
            string_pool: Rc::clone(&self.string_pool),
            row_maps,
            columns,
            row_count: self.row_count,
        }
    }

    /// Child table whose first columns are filtered views of `parent`'s
    /// columns (restricted to `row_numbers`), plus one new identity overlay
    /// for columns introduced by the child.
    pub fn select_and_extend_parent(parent: &Table, row_numbers: &RowMap) -> Table {
        let mut row_maps: Vec<RowMap> = parent
            .row_maps
            .iter()
            .map(|o| o.select_rows(row_numbers))
            .collect();
        row_maps.push(RowMap::range(0, row_numbers.size() as u32));

        let columns: Vec<Column> = parent
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| c.rebind(c.overlay_index, i as u32, false))
            .collect();

        Table {
            string_pool: Rc::clone(&parent.string_pool),
            row_maps,
            columns,
            row_count: row_numbers.size() as u32,
        }
    }

    /// No-filter case of [`select_and_extend_parent`](Self::select_and_extend_parent).
    pub fn extend_parent(parent: &Table) -> Table {
        Table::select_and_extend_parent(parent, &RowMap::range(0, parent.row_count))
    }

    /// Cheap value copy: overlays and columns are value types, storage is
    /// `Arc`-shared. Used by the view planner, which needs a working copy
    /// per tree node to filter/join independently of the source table.
    pub fn copy(&self) -> Table {
        self.clone()
    }
}

pub struct RowIter<'a> {
    table: &'a Table,
    pos: u32,
}

impl<'a> Iterator for RowIter<'a> {
    type Item = RowAccessor<'a>;

    fn next(&mut self) -> Option<RowAccessor<'a>> {
        if self.pos >= self.table.row_count {
            return None;
        }
        let row = RowAccessor {
            table: self.table,
            row: self.pos,
        };
        self.pos += 1;
        Some(row)
    }
}

/// A single row, addressable by column index.
pub struct RowAccessor<'a> {
    table: &'a Table,
    row: u32,
}

impl RowAccessor<'_> {
    pub fn get(&self, column_index: u32) -> crate::value::SqlValue {
        let col = &self.table.columns[column_index as usize];
        let overlay = &self.table.row_maps[col.overlay_index as usize];
        col.get(overlay, self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ColumnStorage;
    use crate::value::{ColumnFlags, FilterOp, SqlValue};

    fn event_table() -> Table {
        let pool = Rc::new(RefCell::new(StringPool::new()));
        let mut t = Table::new(pool);
        t.push_column(
            "id",
            ColumnType::Id,
            ColumnFlags::NON_NULL,
            Arc::new(Storage::Id),
            0,
        );
        let ts: Vec<i64> = (0..9).collect();
        t.push_column(
            "ts",
            ColumnType::Int64,
            ColumnFlags::SORTED | ColumnFlags::NON_NULL,
            Arc::new(Storage::Int64(ColumnStorage::NonNull(ts))),
            0,
        );
        let arg_set_id = vec![0u32, 0, 2, 3, 4, 4, 4, 4, 8];
        t.push_column(
            "arg_set_id",
            ColumnType::Uint32,
            ColumnFlags::SET_ID | ColumnFlags::SORTED | ColumnFlags::NON_NULL,
            Arc::new(Storage::Uint32(ColumnStorage::NonNull(arg_set_id))),
            0,
        );
        for _ in 0..9 {
            t.begin_insert(None);
        }
        t
    }

    #[test]
    fn filter_set_id_and_ts() {
        let t = event_table();
        let ts_idx = t.find_column_by_name("ts").unwrap();
        let arg_idx = t.find_column_by_name("arg_set_id").unwrap();
        let filtered = t.filter(&[
            Constraint::new(ts_idx, FilterOp::Ge, SqlValue::Int64(6)),
            Constraint::new(arg_idx, FilterOp::Eq, SqlValue::Uint32(4)),
        ]);
        assert_eq!(filtered.row_count(), 2);
        let values: Vec<_> = filtered.rows().map(|r| r.get(ts_idx)).collect();
        assert_eq!(values, vec![SqlValue::Int64(6), SqlValue::Int64(7)]);
    }

    #[test]
    fn sort_drops_set_id() {
        let t = event_table();
        let ts_idx = t.find_column_by_name("ts").unwrap();
        let arg_idx = t.find_column_by_name("arg_set_id").unwrap();
        let sorted = t.sort(&[Order::desc(ts_idx)]);
        assert!(
            !sorted
                .get_column(arg_idx)
                .flags
                .contains(ColumnFlags::SET_ID)
        );
    }

    #[test]
    fn round_trip_filter_all_sort_none() {
        let t = event_table();
        let filtered = t.filter(&[]);
        assert_eq!(filtered.row_count(), t.row_count());
        let ts_idx = t.find_column_by_name("ts").unwrap();
        for row in 0..t.row_count() {
            assert_eq!(
                t.get_column(ts_idx).get(t.overlay_for(ts_idx), row),
                filtered
                    .get_column(ts_idx)
                    .get(filtered.overlay_for(ts_idx), row)
            );
        }
    }

    #[test]
    fn lookup_join_row_count_and_values() {
        let pool = Rc::new(RefCell::new(StringPool::new()));
        let mut thread = Table::new(Rc::clone(&pool));
        thread.push_column(
            "id",
            ColumnType::Id,
            ColumnFlags::NON_NULL,
            Arc::new(Storage::Id),
            0,
        );
        let names: Vec<u32> = vec![0, 1];
        thread.push_column(
            "utid",
            ColumnType::Uint32,
            ColumnFlags::NON_NULL,
            Arc::new(Storage::Uint32(ColumnStorage::NonNull(names))),
            0,
        );
        thread.begin_insert(None);
        thread.begin_insert(None);

        let mut slice = Table::new(pool);
        slice.push_column(
            "id",
            ColumnType::Id,
            ColumnFlags::NON_NULL,
            Arc::new(Storage::Id),
            0,
        );
        let utid: Vec<u32> = vec![1, 0, 1];
        slice.push_column(
            "utid",
            ColumnType::Uint32,
            ColumnFlags::NON_NULL,
            Arc::new(Storage::Uint32(ColumnStorage::NonNull(utid))),
            0,
        );
        slice.begin_insert(None);
        slice.begin_insert(None);
        slice.begin_insert(None);

        let slice_utid = slice.find_column_by_name("utid").unwrap();
        let thread_id = thread.find_column_by_name("id").unwrap();
        let joined = slice.lookup_join(slice_utid, &thread, thread_id);
        assert_eq!(joined.row_count(), 3);
        assert!(joined.find_column_by_name("id").is_some());
        // thread's own "id" column is dropped, but slice's id survives.
        assert_eq!(
            joined.columns().iter().filter(|c| c.name == "id").count(),
            1
        );
    }

    #[test]
    fn select_and_extend_parent_filters_then_extends() {
        let t = event_table();
        let ts_idx = t.find_column_by_name("ts").unwrap();
        let even_rows = RowMap::from_indices(vec![0, 2, 4, 6, 8]);
        let child = Table::select_and_extend_parent(&t, &even_rows);
        assert_eq!(child.row_count(), 5);
        let values: Vec<_> = child.rows().map(|r| r.get(ts_idx)).collect();
        assert_eq!(
            values,
            vec![
                SqlValue::Int64(0),
                SqlValue::Int64(2),
                SqlValue::Int64(4),
                SqlValue::Int64(6),
                SqlValue::Int64(8)
            ]
        );
    }
}
