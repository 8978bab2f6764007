//! Owned column values
//!
//! `SqlValue` is the currency between entities, filters and raw statements and
//! the store driver. Values are always sent as bound parameters, never spliced
//! into SQL text.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, query::Query, sqlite::SqliteArguments};

/// A single owned column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Whether this value is SQL `NULL`
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Append this value to a query builder as a bound parameter
    pub(crate) fn push_bind(self, builder: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Self::Null => builder.push_bind(None::<i64>),
            Self::Integer(v) => builder.push_bind(v),
            Self::Real(v) => builder.push_bind(v),
            Self::Text(v) => builder.push_bind(v),
            Self::Bool(v) => builder.push_bind(v),
            Self::Timestamp(v) => builder.push_bind(v),
            Self::Date(v) => builder.push_bind(v),
            Self::Blob(v) => builder.push_bind(v),
        };
    }

    /// Bind this value to the next positional parameter of a prepared query
    pub(crate) fn bind_to<'q>(
        self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            Self::Null => query.bind(None::<i64>),
            Self::Integer(v) => query.bind(v),
            Self::Real(v) => query.bind(v),
            Self::Text(v) => query.bind(v),
            Self::Bool(v) => query.bind(v),
            Self::Timestamp(v) => query.bind(v),
            Self::Date(v) => query.bind(v),
            Self::Blob(v) => query.bind(v),
        }
    }
}

macro_rules! from_value {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for SqlValue {
            fn from(v: $ty) -> Self {
                SqlValue::$variant(v.into())
            }
        }
    };
}

from_value!(i64, Integer);
from_value!(i32, Integer);
from_value!(u32, Integer);
from_value!(f64, Real);
from_value!(String, Text);
from_value!(&str, Text);
from_value!(bool, Bool);
from_value!(DateTime<Utc>, Timestamp);
from_value!(NaiveDate, Date);
from_value!(Vec<u8>, Blob);

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_to_null() {
        assert_eq!(SqlValue::from(None::<String>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(7_i64)), SqlValue::Integer(7));
        assert!(SqlValue::from(None::<i64>).is_null());
    }

    #[test]
    fn push_bind_emits_a_placeholder() {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        SqlValue::from("plate").push_bind(&mut builder);
        assert_eq!(builder.sql(), "SELECT ?");
    }
}
