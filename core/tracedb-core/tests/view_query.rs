//! Integration tests exercising `define_table!`-generated tables through
//! `Table::filter`/`Sort` (S1) and the `View` planner (S5, S6).

use std::cell::RefCell;
use std::rc::Rc;

use tracedb_core::bitvector::BitVector;
use tracedb_core::define_table;
use tracedb_core::string_pool::StringPool;
use tracedb_core::value::{Constraint, FilterOp, Order, SqlValue};
use tracedb_core::view::{JoinFlags, JoinTableSpec, OutputColumnSpec, View};

define_table! {
    Event {
        ts: Int64 [sorted, non_null],
        arg_set_id: Uint32 [set_id, sorted, non_null],
    }
}

define_table! {
    Thread {
        name: String [non_null],
    }
}

define_table! {
    Slice {
        ts: Int64 [sorted, non_null],
        utid: Uint32 [non_null],
    }
}

#[test]
fn s1_set_id_filtering_through_generated_table() {
    let pool = Rc::new(RefCell::new(StringPool::new()));
    let mut event = Event::new(pool);
    for (ts, arg_set_id) in [
        (0i64, 0u32),
        (1, 0),
        (2, 2),
        (3, 3),
        (4, 4),
        (5, 4),
        (6, 4),
        (7, 4),
        (8, 8),
    ] {
        event.insert(EventRow { ts, arg_set_id });
    }
    let table = event.into_table();
    let ts_idx = table.find_column_by_name("ts").unwrap();
    let arg_idx = table.find_column_by_name("arg_set_id").unwrap();

    let none = table.filter(&[Constraint::eq(arg_idx, SqlValue::Uint32(1))]);
    assert_eq!(none.row_count(), 0);

    let four = table.filter(&[Constraint::eq(arg_idx, SqlValue::Uint32(4))]);
    assert_eq!(
        four.rows().map(|r| r.get(ts_idx)).collect::<Vec<_>>(),
        vec![
            SqlValue::Int64(4),
            SqlValue::Int64(5),
            SqlValue::Int64(6),
            SqlValue::Int64(7)
        ]
    );

    let zero = table.filter(&[Constraint::eq(arg_idx, SqlValue::Uint32(0))]);
    assert_eq!(
        zero.rows().map(|r| r.get(ts_idx)).collect::<Vec<_>>(),
        vec![SqlValue::Int64(0), SqlValue::Int64(1)]
    );

    let combined = table.filter(&[
        Constraint::new(ts_idx, FilterOp::Ge, SqlValue::Int64(6)),
        Constraint::eq(arg_idx, SqlValue::Uint32(4)),
    ]);
    assert_eq!(combined.row_count(), 2);

    let sorted = table.sort(&[Order::desc(ts_idx)]);
    assert!(
        !sorted
            .get_column(arg_idx)
            .flags
            .contains(tracedb_core::value::ColumnFlags::SET_ID)
    );
}

fn slice_thread_view(pool: Rc<RefCell<StringPool>>) -> (View, tracedb_core::string_pool::StringId) {
    let main_id = pool.borrow_mut().intern("main");
    let worker_id = pool.borrow_mut().intern("worker");

    let mut thread = Thread::new(Rc::clone(&pool));
    thread.insert(ThreadRow { name: main_id });
    thread.insert(ThreadRow { name: worker_id });

    let mut slice = Slice::new(pool);
    slice.insert(SliceRow { ts: 10, utid: 1 });
    slice.insert(SliceRow { ts: 20, utid: 0 });
    slice.insert(SliceRow { ts: 30, utid: 1 });

    let view = View::create(
        slice.into_table(),
        "slice",
        vec![JoinTableSpec {
            table: thread.into_table(),
            alias: "thread".to_string(),
            col: "id".to_string(),
            prev_alias: "slice".to_string(),
            prev_col: "utid".to_string(),
            flags: JoinFlags::ID_ALWAYS_PRESENT,
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
    .unwrap();
    (view, main_id)
}

#[test]
fn s5_view_projection_pruning_skips_unused_child() {
    let pool = Rc::new(RefCell::new(StringPool::new()));
    let (view, _) = slice_thread_view(pool);

    let mut cols_used = BitVector::new();
    cols_used.append(true); // ts
    cols_used.append(false); // name

    let result = view.query(&[], &[], &cols_used);
    assert_eq!(result.row_count(), 3);
    let name_idx = result.find_column_by_name("name").unwrap();
    assert!(result.get_column(name_idx).is_dummy());
}

#[test]
fn s6_view_correlated_constraint_filters_through_join() {
    let pool = Rc::new(RefCell::new(StringPool::new()));
    let (view, main_id) = slice_thread_view(pool);

    let mut cols_used = BitVector::new();
    cols_used.append(true);
    cols_used.append(true);

    let name_output_idx = view.schema().find("name").unwrap();
    let constraints = [Constraint::eq(name_output_idx, SqlValue::String(main_id))];
    let result = view.query(&constraints, &[], &cols_used);

    // utid 1 ("worker") is excluded; only the utid 0 ("main") row survives.
    assert_eq!(result.row_count(), 1);
    let ts_idx = result.find_column_by_name("ts").unwrap();
    assert_eq!(
        result.rows().next().unwrap().get(ts_idx),
        SqlValue::Int64(20)
    );
}
