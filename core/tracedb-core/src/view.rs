//! The view planner: a tree of tables joined by id, queried as a single
//! projected [`Table`].
//!
//! The source this is ported from assigns `kTypeCheckSerialized` and
//! `kIdAlwaysPresent` the same bit (`1 << 0`) — almost certainly a bug, since
//! the two flags guard unrelated decisions (serialized-column type checking
//! vs. "this join never drops a parent row"). [`JoinFlags`] gives them
//! distinct bits.

use std::rc::Rc;
use std::sync::Arc;

use ahash::AHashMap;
use bitflags::bitflags;
use smallvec::SmallVec;
use tracing::debug;

use crate::bitvector::BitVector;
use crate::column::Column;
use crate::error::{DbxError, DbxResult};
use crate::row_map::RowMap;
use crate::storage::Storage;
use crate::table::Table;
use crate::value::{ColumnFlags, ColumnType, Constraint, Order, Schema, SchemaColumn};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct JoinFlags: u32 {
        /// Every parent row is guaranteed to find a match in the child, so
        /// the planner may skip materializing the child entirely when
        /// nothing downstream references it.
        const ID_ALWAYS_PRESENT = 1 << 0;
        /// The join column's storage type must be checked against the
        /// parent's at construction time (left distinct from
        /// `ID_ALWAYS_PRESENT`, unlike upstream).
        const TYPE_CHECK_SERIALIZED = 1 << 1;
    }
}

/// One edge of a view's join declaration: `table JOIN ... AS alias ON
/// alias.col = prev_alias.prev_col`.
pub struct JoinTableSpec {
    pub table: Table,
    pub alias: String,
    pub col: String,
    pub prev_alias: String,
    pub prev_col: String,
    pub flags: JoinFlags,
}

/// One output column of a view: `name` in the projected schema, sourced from
/// `source_alias.source_col`.
pub struct OutputColumnSpec {
    pub name: String,
    pub source_alias: String,
    pub source_col: String,
}

/// One node of the view's join tree.
struct TableNode {
    table: Table,
    join_col_idx: Option<u32>,
    parent_join_col_idx: Option<u32>,
    flags: JoinFlags,
    children: SmallVec<[usize; 4]>,
}

/// A declarative join tree over tables, queried by constraints / orders / a
/// projected-columns bitvector. Constructed once from a fixed schema
/// description; `query` is a pure function of the current table contents.
pub struct View {
    nodes: Vec<TableNode>,
    source_col_by_output_idx: Vec<(usize, u32)>,
    schema: Schema,
}

struct NodeState {
    cs: Vec<Constraint>,
    is_used: bool,
    removes_parent_rows: bool,
    output: Table,
    parent_join_rm: RowMap,
}

impl View {
    pub fn create(
        root_table: Table,
        root_alias: impl Into<String>,
        joins: Vec<JoinTableSpec>,
        output_cols: Vec<OutputColumnSpec>,
    ) -> DbxResult<View> {
        let root_alias = root_alias.into();
        let mut alias_to_node: AHashMap<String, usize> = AHashMap::default();
        let mut nodes = vec![TableNode {
            table: root_table,
            join_col_idx: None,
            parent_join_col_idx: None,
            flags: JoinFlags::empty(),
            children: SmallVec::new(),
        }];
        alias_to_node.insert(root_alias, 0);

        for join in joins {
            if alias_to_node.contains_key(&join.alias) {
                return Err(DbxError::ViewConstruction(format!(
                    "duplicate alias '{}'",
                    join.alias
                )));
            }
            let &prev_idx = alias_to_node.get(&join.prev_alias).ok_or_else(|| {
                DbxError::ViewConstruction(format!("unknown alias '{}'", join.prev_alias))
            })?;
            let col_idx = join.table.find_column_by_name(&join.col).ok_or_else(|| {
                DbxError::ViewConstruction(format!(
                    "join column '{}' not found on alias '{}'",
                    join.col, join.alias
                ))
            })?;
            let prev_col_idx = nodes[prev_idx]
                .table
                .find_column_by_name(&join.prev_col)
                .ok_or_else(|| {
                    DbxError::ViewConstruction(format!(
                        "join column '{}' not found on alias '{}'",
                        join.prev_col, join.prev_alias
                    ))
                })?;
            let child_col = join.table.get_column(col_idx);
            let parent_col = nodes[prev_idx].table.get_column(prev_col_idx);
            if child_col.is_dummy() || parent_col.is_dummy() {
                return Err(DbxError::ViewConstruction(
                    "join column may not be a Dummy column".to_string(),
                ));
            }
            if child_col.flags.contains(ColumnFlags::HIDDEN)
                || parent_col.flags.contains(ColumnFlags::HIDDEN)
            {
                return Err(DbxError::ViewConstruction(
                    "join column may not be hidden".to_string(),
                ));
            }
            // An `Id` column's values are `Uint32` (the row's own index), so
            // it may be joined against a `Uint32` foreign key on the parent.
            let child_value_type = if child_col.is_id() {
                ColumnType::Uint32
            } else {
                child_col.col_type
            };
            let parent_value_type = if parent_col.is_id() {
                ColumnType::Uint32
            } else {
                parent_col.col_type
            };
            if child_value_type != parent_value_type {
                return Err(DbxError::ViewConstruction(format!(
                    "join column type mismatch: '{}'.{:?} vs '{}'.{:?}",
                    join.alias, child_col.col_type, join.prev_alias, parent_col.col_type
                )));
            }

            let node_idx = nodes.len();
            nodes.push(TableNode {
                table: join.table,
                join_col_idx: Some(col_idx),
                parent_join_col_idx: Some(prev_col_idx),
                flags: join.flags,
                children: SmallVec::new(),
            });
            nodes[prev_idx].children.push(node_idx);
            alias_to_node.insert(join.alias, node_idx);
        }

        let mut schema_columns = Vec::with_capacity(output_cols.len());
        let mut source_col_by_output_idx = Vec::with_capacity(output_cols.len());
        let mut seen_names: AHashMap<String, ()> = AHashMap::default();
        for out in &output_cols {
            if seen_names.insert(out.name.clone(), ()).is_some() {
                return Err(DbxError::ViewConstruction(format!(
                    "duplicate output column name '{}'",
                    out.name
                )));
            }
            let &node_idx = alias_to_node.get(&out.source_alias).ok_or_else(|| {
                DbxError::ViewConstruction(format!("unknown alias '{}'", out.source_alias))
            })?;
            let col_idx = nodes[node_idx]
                .table
                .find_column_by_name(&out.source_col)
                .ok_or_else(|| {
                    DbxError::ViewConstruction(format!(
                        "output column '{}' not found on alias '{}'",
                        out.source_col, out.source_alias
                    ))
                })?;
            let src = nodes[node_idx].table.get_column(col_idx);
            schema_columns.push(SchemaColumn {
                name: out.name.clone(),
                sql_type: src.col_type,
                is_id: src.is_id(),
                is_sorted: node_idx == 0 && src.flags.contains(ColumnFlags::SORTED),
                is_hidden: src.flags.contains(ColumnFlags::HIDDEN),
                is_set_id: node_idx == 0 && src.flags.contains(ColumnFlags::SET_ID),
            });
            source_col_by_output_idx.push((node_idx, col_idx));
        }

        debug!(
            nodes = nodes.len(),
            outputs = schema_columns.len(),
            "View::create"
        );
        Ok(View {
            nodes,
            source_col_by_output_idx,
            schema: Schema::new(schema_columns),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get_column_count(&self) -> u32 {
        self.schema.columns.len() as u32
    }

    pub fn estimate_row_count(&self) -> u32 {
        self.nodes
            .iter()
            .map(|n| n.table.row_count())
            .max()
            .unwrap_or(0)
    }

    pub fn query(
        &self,
        constraints: &[Constraint],
        orders: &[Order],
        cols_used: &BitVector,
    ) -> Table {
        let mut states: Vec<NodeState> = self
            .nodes
            .iter()
            .map(|n| NodeState {
                cs: Vec::new(),
                is_used: false,
                removes_parent_rows: false,
                output: n.table.copy(),
                parent_join_rm: RowMap::default(),
            })
            .collect();

        for c in constraints {
            let (node_idx, col_idx) = self.source_col_by_output_idx[c.column_index as usize];
            states[node_idx]
                .cs
                .push(Constraint::new(col_idx, c.op, c.value.clone()));
        }
        for (ordinal, _) in cols_used.iterate_set_bits() {
            let (node_idx, _) = self.source_col_by_output_idx[ordinal as usize];
            states[node_idx].is_used = true;
        }
        for idx in 1..self.nodes.len() {
            let flags = self.nodes[idx].flags;
            states[idx].removes_parent_rows =
                !states[idx].cs.is_empty() || !flags.contains(JoinFlags::ID_ALWAYS_PRESENT);
        }
        self.propagate_up(0, &mut states);

        self.filter_and_join_recursive(0, &mut states);

        let root_row_count = states[0].output.row_count();
        self.apply_row_map_recursive(0, RowMap::range(0, root_row_count), &mut states);

        let result = self.build_table(&states, cols_used);
        debug!(rows = result.row_count(), "View::query");
        result.sort(orders)
    }

    fn propagate_up(&self, idx: usize, states: &mut [NodeState]) {
        let children = self.nodes[idx].children.clone();
        for child in children {
            self.propagate_up(child, states);
            if states[child].is_used || states[child].removes_parent_rows {
                states[idx].is_used = true;
                states[idx].removes_parent_rows = true;
            }
        }
    }

    /// Filters `idx`'s own output, then for each child that participates,
    /// recurses and narrows `idx`'s surviving row set to those with a match
    /// in the child, recording a join row-map back into the child.
    ///
    /// A child's `parent_join_rm` is recorded at the point it is processed,
    /// i.e. against `idx`'s row set as narrowed by every *earlier* sibling
    /// but not yet by any later one. Once every child has run, every
    /// recorded `parent_join_rm` is re-trimmed down to the final surviving
    /// row set so it stays aligned with it — without this, a second
    /// filtering sibling would silently invalidate the first one's join map.
    fn filter_and_join_recursive(&self, idx: usize, states: &mut [NodeState]) {
        let cs = std::mem::take(&mut states[idx].cs);
        states[idx].output = states[idx].output.filter(&cs);

        let mut left_rows: Vec<u32> = (0..states[idx].output.row_count()).collect();
        let mut per_child: Vec<(usize, Vec<u32>, Vec<u32>)> = Vec::new();

        for child in self.nodes[idx].children.clone() {
            if left_rows.is_empty() {
                break;
            }
            if !states[child].is_used && !states[child].removes_parent_rows {
                continue;
            }
            self.filter_and_join_recursive(child, states);

            let parent_col_idx = self.nodes[child].parent_join_col_idx.unwrap();
            let join_col_idx = self.nodes[child].join_col_idx.unwrap();
            let parent_overlay = states[idx].output.overlay_for(parent_col_idx).clone();
            let parent_col: Column = states[idx].output.get_column(parent_col_idx).clone();
            let child_overlay = states[child].output.overlay_for(join_col_idx).clone();
            let child_col: Column = states[child].output.get_column(join_col_idx).clone();

            let mut kept_parent = Vec::with_capacity(left_rows.len());
            let mut kept_child = Vec::with_capacity(left_rows.len());
            for &row in &left_rows {
                let v = parent_col.get(&parent_overlay, row);
                if let Some(child_row) = child_col.index_of(&child_overlay, &v) {
                    kept_parent.push(row);
                    kept_child.push(child_row);
                }
            }
            left_rows = kept_parent.clone();
            per_child.push((child, kept_parent, kept_child));
        }

        let final_set: std::collections::HashSet<u32> = left_rows.iter().copied().collect();
        for (child, parent_rows, child_rows) in per_child {
            let trimmed: Vec<u32> = parent_rows
                .iter()
                .zip(child_rows.iter())
                .filter(|(p, _)| final_set.contains(p))
                .map(|(_, c)| *c)
                .collect();
            states[child].parent_join_rm = RowMap::from_indices(trimmed);
        }

        states[idx].output = states[idx]
            .output
            .select_rows(&RowMap::from_indices(left_rows));
    }

    fn apply_row_map_recursive(&self, idx: usize, rm: RowMap, states: &mut [NodeState]) {
        for child in self.nodes[idx].children.clone() {
            if !states[child].is_used && !states[child].removes_parent_rows {
                continue;
            }
            let child_rm = states[child].parent_join_rm.select_rows(&rm);
            self.apply_row_map_recursive(child, child_rm, states);
        }
        states[idx].output = states[idx].output.select_rows(&rm);
    }

    fn build_table(&self, states: &[NodeState], cols_used: &BitVector) -> Table {
        let string_pool = Rc::clone(states[0].output.string_pool());
        let mut out_row_maps: Vec<RowMap> = Vec::new();
        let mut cache: AHashMap<(usize, u32), u32> = AHashMap::default();
        let mut out_columns: Vec<Column> = Vec::with_capacity(self.schema.columns.len());

        for (i, sc) in self.schema.columns.iter().enumerate() {
            if !cols_used.is_set(i) {
                out_columns.push(
                    Column::new(
                        sc.name.clone(),
                        ColumnType::Dummy,
                        ColumnFlags::empty(),
                        Arc::new(Storage::Id),
                        0,
                        i as u32,
                    )
                    .expect("Dummy column is always a valid flag/type combination"),
                );
                continue;
            }
            let (node_idx, col_idx) = self.source_col_by_output_idx[i];
            let node_output = &states[node_idx].output;
            let src = node_output.get_column(col_idx);
            let key = (node_idx, src.overlay_index);
            let new_overlay_idx = *cache.entry(key).or_insert_with(|| {
                out_row_maps.push(node_output.row_maps()[src.overlay_index as usize].clone());
                (out_row_maps.len() - 1) as u32
            });
            let mut flags = src.flags;
            if node_idx != 0 {
                flags.remove(ColumnFlags::SET_ID);
                flags.remove(ColumnFlags::SORTED);
            }
            out_columns.push(
                Column::new(
                    sc.name.clone(),
                    src.col_type,
                    flags,
                    Arc::clone(&src.storage),
                    new_overlay_idx,
                    i as u32,
                )
                .expect("rebound from an already-valid source column"),
            );
        }

        let row_count = states[0].output.row_count();
        Table::from_parts(string_pool, out_row_maps, out_columns, row_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ColumnStorage;
    use crate::string_pool::StringPool;
    use crate::value::SqlValue;
    use std::cell::RefCell;

    fn slice_thread_tables() -> (Table, Table) {
        let pool = Rc::new(RefCell::new(StringPool::new()));

        let mut thread = Table::new(Rc::clone(&pool));
        thread.push_column(
            "id",
            ColumnType::Id,
            ColumnFlags::NON_NULL,
            Arc::new(Storage::Id),
            0,
        );
        let names = {
            let mut p = pool.borrow_mut();
            vec![p.intern("main"), p.intern("worker")]
        };
        thread.push_column(
            "name",
            ColumnType::String,
            ColumnFlags::NON_NULL,
            Arc::new(Storage::String(ColumnStorage::NonNull(names))),
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
        let ts: Vec<i64> = vec![10, 20, 30];
        slice.push_column(
            "ts",
            ColumnType::Int64,
            ColumnFlags::SORTED | ColumnFlags::NON_NULL,
            Arc::new(Storage::Int64(ColumnStorage::NonNull(ts))),
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

        (slice, thread)
    }

    fn slice_thread_view(id_always_present: bool) -> View {
        let (slice, thread) = slice_thread_tables();
        let flags = if id_always_present {
            JoinFlags::ID_ALWAYS_PRESENT
        } else {
            JoinFlags::empty()
        };
        View::create(
            slice,
            "slice",
            vec![JoinTableSpec {
                table: thread,
                alias: "thread".to_string(),
                col: "id".to_string(),
                prev_alias: "slice".to_string(),
                prev_col: "utid".to_string(),
                flags,
            }],
            vec![
                OutputColumnSpec {
                    name: "ts".to_string(),
                    source_alias: "slice".to_string(),
                    source_col: "ts".to_string(),
                },
                OutputColumnSpec {
                    name: "name".to_string(),
                    source_alias: "thread".to_string(),
                    source_col: "name".to_string(),
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn unknown_alias_rejected() {
        let (slice, thread) = slice_thread_tables();
        let result = View::create(
            slice,
            "slice",
            vec![JoinTableSpec {
                table: thread,
                alias: "thread".to_string(),
                col: "id".to_string(),
                prev_alias: "nope".to_string(),
                prev_col: "utid".to_string(),
                flags: JoinFlags::ID_ALWAYS_PRESENT,
            }],
            vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn join_unknown_column_rejected() {
        let (slice, thread) = slice_thread_tables();
        let result = View::create(
            slice,
            "slice",
            vec![JoinTableSpec {
                table: thread,
                alias: "thread".to_string(),
                col: "missing".to_string(),
                prev_alias: "slice".to_string(),
                prev_col: "utid".to_string(),
                flags: JoinFlags::ID_ALWAYS_PRESENT,
            }],
            vec![],
        );
        assert!(result.is_err());
    }

    /// S5: projection pruning skips materializing the unused child and
    /// emits a Dummy `name` column.
    #[test]
    fn s5_projection_pruning_skips_unused_child() {
        let view = slice_thread_view(true);
        let mut cols_used = BitVector::new();
        cols_used.append(true); // ts
        cols_used.append(false); // name

        let result = view.query(&[], &[], &cols_used);
        assert_eq!(result.row_count(), 3);
        let name_idx = result.find_column_by_name("name").unwrap();
        assert!(result.get_column(name_idx).is_dummy());
        let ts_idx = result.find_column_by_name("ts").unwrap();
        assert_eq!(
            result.rows().map(|r| r.get(ts_idx)).collect::<Vec<_>>(),
            vec![
                SqlValue::Int64(10),
                SqlValue::Int64(20),
                SqlValue::Int64(30)
            ]
        );
    }

    /// S6: a constraint on the joined table removes parent rows whose join
    /// key has no surviving match.
    #[test]
    fn s6_correlated_constraint_filters_through_join() {
        let view = slice_thread_view(true);
        let mut cols_used = BitVector::new();
        cols_used.append(true);
        cols_used.append(true);

        let name_output_idx = view.schema().find("name").unwrap();
        let main_id = view.nodes[0]
            .table
            .string_pool()
            .borrow_mut()
            .intern("main");
        let constraints = [Constraint::eq(name_output_idx, SqlValue::String(main_id))];
        let result = view.query(&constraints, &[], &cols_used);
        // utid 1 -> "worker" excluded, only utid 0 ("main") rows survive: row 1.
        assert_eq!(result.row_count(), 1);
        let ts_idx = result.find_column_by_name("ts").unwrap();
        assert_eq!(
            result.rows().next().unwrap().get(ts_idx),
            SqlValue::Int64(20)
        );
    }

    #[test]
    fn estimate_row_count_is_max_over_nodes() {
        let view = slice_thread_view(true);
        assert_eq!(view.estimate_row_count(), 3);
    }
}
