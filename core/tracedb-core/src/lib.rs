//! # tracedb-core — columnar in-memory relational engine
//!
//! The storage, filtering, sorting, indexing, and multi-table view
//! composition layer that powers SQL-like queries over large trace tables
//! (slices, counters, sched events, argument bags, flow events, stack
//! frames, etc.). This crate is the engine only: the SQL front-end, trace
//! ingestion, and CLI surfaces are named but undefined external
//! collaborators.
//!
//! ## Module map
//! - [`string_pool`] — string interning ([`string_pool::StringPool`]).
//! - [`bitvector`] — packed boolean vectors ([`bitvector::BitVector`]).
//! - [`row_map`] — the index-set abstraction threading filters/sorts/joins
//!   through columns ([`row_map::RowMap`]).
//! - [`storage`] — typed column backing buffers ([`storage::ColumnStorage`],
//!   [`storage::Storage`]).
//! - [`column`] — value semantics over storage + overlay + flags
//!   ([`column::Column`]).
//! - [`typed_column`] — zero-cost typed accessors
//!   ([`typed_column::TypedColumn`], [`typed_column::IdColumn`]).
//! - [`table`] — the `Filter`/`Sort`/`LookupJoin` algebra ([`table::Table`]).
//! - [`view`] — the join-tree query planner ([`view::View`]).
//!
//! Concrete table types are generated by `tracedb_derive::define_table!`.

pub mod bitvector;
pub mod column;
pub mod error;
pub mod logging;
pub mod row_map;
pub mod storage;
pub mod string_pool;
pub mod table;
pub mod typed_column;
pub mod value;
pub mod view;

pub use error::{DbxError, DbxResult};
pub use table::Table;
pub use view::View;

/// Re-exported so generated table modules can write `tracedb_core::define_table!`.
pub use tracedb_derive::define_table;
