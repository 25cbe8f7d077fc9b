//! Shared value and schema types: [`SqlValue`], [`ColumnType`],
//! [`ColumnFlags`], [`Constraint`]/[`FilterOp`], [`Order`], [`Schema`].

use bitflags::bitflags;

use crate::string_pool::StringId;

/// Declared type of a column. `Id` columns carry no storage (the value at
/// row *i* is the row's own id); `Dummy` columns are placeholders that fail
/// any access — see spec invariant 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int32,
    Uint32,
    Int64,
    Double,
    String,
    Id,
    Dummy,
}

bitflags! {
    /// Per-column property bits. `Dense` only has meaning on nullable
    /// columns; `SetId` implies `Sorted & NonNull` and `type == Uint32`
    /// (enforced in [`Column::new`](crate::column::Column::new)).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColumnFlags: u32 {
        const SORTED  = 1 << 0;
        const NON_NULL = 1 << 1;
        const DENSE   = 1 << 2;
        const HIDDEN  = 1 << 3;
        const SET_ID  = 1 << 4;
    }
}

impl Default for ColumnFlags {
    fn default() -> Self {
        ColumnFlags::empty()
    }
}

/// A value read out of a column, independent of its storage representation.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Double(f64),
    String(StringId),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Int32(_) => "Int32",
            SqlValue::Uint32(_) => "Uint32",
            SqlValue::Int64(_) => "Int64",
            SqlValue::Double(_) => "Double",
            SqlValue::String(_) => "String",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int32(v) => Some(*v as f64),
            SqlValue::Uint32(v) => Some(*v as f64),
            SqlValue::Int64(v) => Some(*v as f64),
            SqlValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            SqlValue::Uint32(v) => Some(*v),
            SqlValue::Int32(v) if *v >= 0 => Some(*v as u32),
            SqlValue::Int64(v) if *v >= 0 => Some(*v as u32),
            _ => None,
        }
    }
}

impl PartialOrd for SqlValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => Some(std::cmp::Ordering::Equal),
            (SqlValue::Null, _) => Some(std::cmp::Ordering::Less),
            (_, SqlValue::Null) => Some(std::cmp::Ordering::Greater),
            (SqlValue::String(a), SqlValue::String(b)) => a.partial_cmp(b),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }
}

/// Comparison/predicate operators usable in a [`Constraint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
    Glob,
    Regex,
}

/// `column_index op value`, applied by [`Column::filter_into`](crate::column::Column::filter_into).
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub column_index: u32,
    pub op: FilterOp,
    pub value: SqlValue,
}

impl Constraint {
    pub fn new(column_index: u32, op: FilterOp, value: SqlValue) -> Self {
        Constraint {
            column_index,
            op,
            value,
        }
    }

    pub fn eq(column_index: u32, value: SqlValue) -> Self {
        Constraint::new(column_index, FilterOp::Eq, value)
    }
}

/// A single sort key: `column_index`, descending or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column_index: u32,
    pub desc: bool,
}

impl Order {
    pub fn asc(column_index: u32) -> Self {
        Order {
            column_index,
            desc: false,
        }
    }

    pub fn desc(column_index: u32) -> Self {
        Order {
            column_index,
            desc: true,
        }
    }
}

/// Public shape of a single column, as exposed by `Table::schema()`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaColumn {
    pub name: String,
    pub sql_type: ColumnType,
    pub is_id: bool,
    pub is_sorted: bool,
    pub is_hidden: bool,
    pub is_set_id: bool,
}

/// Ordered list of [`SchemaColumn`]s describing a table or view's public shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub columns: Vec<SchemaColumn>,
}

impl Schema {
    pub fn new(columns: Vec<SchemaColumn>) -> Self {
        Schema { columns }
    }

    pub fn find(&self, name: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|p| p as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_validity_set_id_implies_sorted_nonnull() {
        let f = ColumnFlags::SET_ID;
        assert!(!f.contains(ColumnFlags::SORTED));
        // validity is enforced by Column::new, not by the bitset itself.
    }

    #[test]
    fn sql_value_ordering_nulls_first() {
        assert!(SqlValue::Null < SqlValue::Int32(0));
        assert!(SqlValue::Int32(1) < SqlValue::Int32(2));
    }

    #[test]
    fn schema_find() {
        let schema = Schema::new(vec![SchemaColumn {
            name: "ts".to_string(),
            sql_type: ColumnType::Int64,
            is_id: false,
            is_sorted: true,
            is_hidden: false,
            is_set_id: false,
        }]);
        assert_eq!(schema.find("ts"), Some(0));
        assert_eq!(schema.find("missing"), None);
    }
}
