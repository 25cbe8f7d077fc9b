//! Zero-cost typed accessors over [`Column`]: [`TypedColumn<T>`] checks the
//! column's declared [`ColumnType`] once at construction and then exposes
//! typed `get`/`append`/`set` without going through [`SqlValue`] on every
//! access; [`IdColumn`] is the special case for `Id` columns, which carry
//! no storage at all (row index *is* the value).

use std::marker::PhantomData;
use std::sync::Arc;

use crate::column::Column;
use crate::error::{DbxError, DbxResult};
use crate::row_map::RowMap;
use crate::storage::{ColumnStorage, Storage};
use crate::string_pool::StringId;
use crate::value::ColumnType;

/// A Rust type that can back a typed column.
pub trait ColumnElement: Sized + Clone {
    const COLUMN_TYPE: ColumnType;

    fn storage(storage: &Storage) -> &ColumnStorage<Self>;
    fn storage_mut(storage: &mut Storage) -> &mut ColumnStorage<Self>;
}

impl ColumnElement for i32 {
    const COLUMN_TYPE: ColumnType = ColumnType::Int32;
    fn storage(storage: &Storage) -> &ColumnStorage<Self> {
        match storage {
            Storage::Int32(s) => s,
            _ => unreachable!("type checked at TypedColumn construction"),
        }
    }
    fn storage_mut(storage: &mut Storage) -> &mut ColumnStorage<Self> {
        match storage {
            Storage::Int32(s) => s,
            _ => unreachable!("type checked at TypedColumn construction"),
        }
    }
}

impl ColumnElement for u32 {
    const COLUMN_TYPE: ColumnType = ColumnType::Uint32;
    fn storage(storage: &Storage) -> &ColumnStorage<Self> {
        match storage {
            Storage::Uint32(s) => s,
            _ => unreachable!("type checked at TypedColumn construction"),
        }
    }
    fn storage_mut(storage: &mut Storage) -> &mut ColumnStorage<Self> {
        match storage {
            Storage::Uint32(s) => s,
            _ => unreachable!("type checked at TypedColumn construction"),
        }
    }
}

impl ColumnElement for i64 {
    const COLUMN_TYPE: ColumnType = ColumnType::Int64;
    fn storage(storage: &Storage) -> &ColumnStorage<Self> {
        match storage {
            Storage::Int64(s) => s,
            _ => unreachable!("type checked at TypedColumn construction"),
        }
    }
    fn storage_mut(storage: &mut Storage) -> &mut ColumnStorage<Self> {
        match storage {
            Storage::Int64(s) => s,
            _ => unreachable!("type checked at TypedColumn construction"),
        }
    }
}

impl ColumnElement for f64 {
    const COLUMN_TYPE: ColumnType = ColumnType::Double;
    fn storage(storage: &Storage) -> &ColumnStorage<Self> {
        match storage {
            Storage::Double(s) => s,
            _ => unreachable!("type checked at TypedColumn construction"),
        }
    }
    fn storage_mut(storage: &mut Storage) -> &mut ColumnStorage<Self> {
        match storage {
            Storage::Double(s) => s,
            _ => unreachable!("type checked at TypedColumn construction"),
        }
    }
}

impl ColumnElement for StringId {
    const COLUMN_TYPE: ColumnType = ColumnType::String;
    fn storage(storage: &Storage) -> &ColumnStorage<Self> {
        match storage {
            Storage::String(s) => s,
            _ => unreachable!("type checked at TypedColumn construction"),
        }
    }
    fn storage_mut(storage: &mut Storage) -> &mut ColumnStorage<Self> {
        match storage {
            Storage::String(s) => s,
            _ => unreachable!("type checked at TypedColumn construction"),
        }
    }
}

/// Typed read accessor over a non-`Id`, non-`Dummy` column. Construction
/// checks `column.col_type == T::COLUMN_TYPE` once; every `get` afterwards
/// is a direct storage read.
pub struct TypedColumn<'a, T> {
    column: &'a Column,
    _marker: PhantomData<T>,
}

impl<'a, T: ColumnElement> TypedColumn<'a, T> {
    pub fn new(column: &'a Column) -> DbxResult<Self> {
        if column.col_type != T::COLUMN_TYPE {
            return Err(DbxError::TypeMismatch {
                expected: format!("{:?}", T::COLUMN_TYPE),
                actual: format!("{:?}", column.col_type),
            });
        }
        Ok(TypedColumn {
            column,
            _marker: PhantomData,
        })
    }

    pub fn get(&self, overlay: &RowMap, row: u32) -> Option<T> {
        let storage_idx = overlay.get(row);
        T::storage(&self.column.storage).get(storage_idx as usize)
    }
}

/// Mutable typed accessor for appending/setting into storage this table
/// owns exclusively (an `Arc` with refcount 1 — any other refcount means
/// the storage is shared with a parent and must not be mutated here).
pub struct TypedColumnMut<'a, T> {
    storage: &'a mut Arc<Storage>,
    _marker: PhantomData<T>,
}

impl<'a, T: ColumnElement> TypedColumnMut<'a, T> {
    pub fn new(storage: &'a mut Arc<Storage>) -> DbxResult<Self> {
        let col_type = match &**storage {
            Storage::Int32(_) => ColumnType::Int32,
            Storage::Uint32(_) => ColumnType::Uint32,
            Storage::Int64(_) => ColumnType::Int64,
            Storage::Double(_) => ColumnType::Double,
            Storage::String(_) => ColumnType::String,
            Storage::Id => ColumnType::Id,
        };
        if col_type != T::COLUMN_TYPE {
            return Err(DbxError::TypeMismatch {
                expected: format!("{:?}", T::COLUMN_TYPE),
                actual: format!("{:?}", col_type),
            });
        }
        Ok(TypedColumnMut {
            storage,
            _marker: PhantomData,
        })
    }

    pub fn append(&mut self, value: Option<T>) {
        let storage = Arc::get_mut(self.storage)
            .expect("storage mutation requires sole ownership (not shared with a parent)");
        T::storage_mut(storage).append(value);
    }

    pub fn set(&mut self, row: usize, value: Option<T>) {
        let storage = Arc::get_mut(self.storage)
            .expect("storage mutation requires sole ownership (not shared with a parent)");
        T::storage_mut(storage).set(row, value);
    }
}

/// `Id` columns carry no storage: the value at row *i* is the row's own id
/// (i.e. `overlay.get(i)`), so this accessor is a zero-sized wrapper.
pub struct IdColumn<'a> {
    overlay_index: u32,
    _column: &'a Column,
}

impl<'a> IdColumn<'a> {
    pub fn new(column: &'a Column) -> DbxResult<Self> {
        if column.col_type != ColumnType::Id {
            return Err(DbxError::TypeMismatch {
                expected: "Id".to_string(),
                actual: format!("{:?}", column.col_type),
            });
        }
        Ok(IdColumn {
            overlay_index: column.overlay_index,
            _column: column,
        })
    }

    pub fn overlay_index(&self) -> u32 {
        self.overlay_index
    }

    pub fn get(&self, overlay: &RowMap, row: u32) -> u32 {
        overlay.get(row)
    }

    pub fn row_of(&self, overlay: &RowMap, id: u32) -> Option<u32> {
        overlay.index_of(id)
    }
}
