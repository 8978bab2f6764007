//! Query building for repositories
//!
//! Predicates, orderings and projections are plain values that render into a
//! `sqlx::QueryBuilder`, so filtering always happens in the store. Column names
//! are validated and quoted; values are always bound parameters.

use sqlx::{QueryBuilder, Sqlite};

use crate::entities::Entity;
use crate::error::{DataError, Result};
use crate::storage::SqlValue;

/// Condition operator for query building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    /// Equal (=)
    Equal,
    /// Not equal (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal (<=)
    LessThanOrEqual,
    /// Like (LIKE)
    Like,
    /// Is null (IS NULL)
    IsNull,
    /// Is not null (IS NOT NULL)
    IsNotNull,
}

impl ConditionOperator {
    /// Get the SQL representation of the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Like => "LIKE",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

/// Logical operator for combining conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    /// AND
    And,
    /// OR
    Or,
}

impl LogicalOperator {
    /// Get the SQL representation of the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Order direction for sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

impl OrderDirection {
    /// Get the SQL representation of the direction
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Aggregation function for projections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// COUNT
    Count,
    /// SUM
    Sum,
    /// AVG
    Avg,
    /// MIN
    Min,
    /// MAX
    Max,
    /// GROUP_CONCAT
    GroupConcat,
}

impl AggregateFunction {
    /// Get the SQL representation of the aggregation function
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::GroupConcat => "GROUP_CONCAT",
        }
    }
}

/// A store-side predicate over one entity's columns
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Condition {
        column: String,
        op: ConditionOperator,
        value: SqlValue,
    },
    In {
        column: String,
        values: Vec<SqlValue>,
    },
    Group {
        op: LogicalOperator,
        filters: Vec<Filter>,
    },
    Not(Box<Filter>),
}

impl Filter {
    fn condition(column: impl Into<String>, op: ConditionOperator, value: SqlValue) -> Self {
        Self::Condition {
            column: column.into(),
            op,
            value,
        }
    }

    /// Matches every row
    pub fn all() -> Self {
        Self::Group {
            op: LogicalOperator::And,
            filters: Vec::new(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::condition(column, ConditionOperator::Equal, value.into())
    }

    pub fn ne(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::condition(column, ConditionOperator::NotEqual, value.into())
    }

    pub fn gt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::condition(column, ConditionOperator::GreaterThan, value.into())
    }

    pub fn gte(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::condition(column, ConditionOperator::GreaterThanOrEqual, value.into())
    }

    pub fn lt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::condition(column, ConditionOperator::LessThan, value.into())
    }

    pub fn lte(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::condition(column, ConditionOperator::LessThanOrEqual, value.into())
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::condition(column, ConditionOperator::Like, SqlValue::Text(pattern.into()))
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::condition(column, ConditionOperator::IsNull, SqlValue::Null)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::condition(column, ConditionOperator::IsNotNull, SqlValue::Null)
    }

    /// Column value is one of `values`; an empty list matches nothing
    pub fn is_in<V: Into<SqlValue>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        self.combine(LogicalOperator::And, other)
    }

    pub fn or(self, other: Filter) -> Self {
        self.combine(LogicalOperator::Or, other)
    }

    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    fn combine(self, op: LogicalOperator, other: Filter) -> Self {
        match self {
            Self::Group { op: current, mut filters } if current == op => {
                filters.push(other);
                Self::Group { op, filters }
            }
            first => Self::Group {
                op,
                filters: vec![first, other],
            },
        }
    }

    /// Render this filter into `builder`
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Sqlite>) -> Result<()> {
        match self {
            Self::Condition { column, op, value } => {
                let column = quote_ident(column)?;
                match op {
                    ConditionOperator::IsNull | ConditionOperator::IsNotNull => {
                        builder.push(format!("{column} {}", op.as_sql()));
                    }
                    _ => {
                        builder.push(format!("{column} {} ", op.as_sql()));
                        value.clone().push_bind(builder);
                    }
                }
            }
            Self::In { column, values } => {
                if values.is_empty() {
                    builder.push("1 = 0");
                    return Ok(());
                }
                builder.push(format!("{} IN (", quote_ident(column)?));
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        builder.push(", ");
                    }
                    value.clone().push_bind(builder);
                }
                builder.push(")");
            }
            Self::Group { op, filters } => {
                if filters.is_empty() {
                    // identity of the operator: AND of nothing is true, OR of nothing is false
                    builder.push(match op {
                        LogicalOperator::And => "1 = 1",
                        LogicalOperator::Or => "1 = 0",
                    });
                    return Ok(());
                }
                builder.push("(");
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        builder.push(format!(" {} ", op.as_sql()));
                    }
                    filter.push_sql(builder)?;
                }
                builder.push(")");
            }
            Self::Not(inner) => {
                builder.push("NOT (");
                inner.push_sql(builder)?;
                builder.push(")");
            }
        }
        Ok(())
    }
}

/// One ORDER BY term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProjectionItem {
    Column { column: String, alias: Option<String> },
    Aggregate { function: AggregateFunction, column: Option<String>, alias: String },
}

/// The result shape of a lightweight `select`: plain columns, optionally
/// aliased, or aggregates over the matching rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    items: Vec<ProjectionItem>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project the given columns under their own names
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: columns
                .into_iter()
                .map(|c| ProjectionItem::Column {
                    column: c.into(),
                    alias: None,
                })
                .collect(),
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.items.push(ProjectionItem::Column {
            column: column.into(),
            alias: None,
        });
        self
    }

    pub fn column_as(mut self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.items.push(ProjectionItem::Column {
            column: column.into(),
            alias: Some(alias.into()),
        });
        self
    }

    /// `function(column) AS alias`; a `None` column means `*` (only useful with COUNT)
    pub fn aggregate(mut self, function: AggregateFunction, column: Option<&str>, alias: impl Into<String>) -> Self {
        self.items.push(ProjectionItem::Aggregate {
            function,
            column: column.map(str::to_string),
            alias: alias.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn to_sql(&self) -> Result<String> {
        if self.items.is_empty() {
            return Err(DataError::argument("a projection needs at least one column"));
        }
        let parts = self
            .items
            .iter()
            .map(|item| match item {
                ProjectionItem::Column { column, alias: None } => quote_ident(column),
                ProjectionItem::Column { column, alias: Some(alias) } => {
                    Ok(format!("{} AS {}", quote_ident(column)?, quote_ident(alias)?))
                }
                ProjectionItem::Aggregate { function, column, alias } => {
                    let target = match column {
                        Some(column) => quote_ident(column)?,
                        None => "*".to_string(),
                    };
                    Ok(format!("{}({target}) AS {}", function.as_sql(), quote_ident(alias)?))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(", "))
    }
}

/// Validate a column or table name and quote it for SQLite
pub fn quote_ident(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(DataError::argument(format!("invalid identifier: {name:?}")));
    }
    Ok(format!("\"{name}\""))
}

/// SELECT builder over one entity table, tracking which clauses were added
pub struct EntityQueryBuilder<'a> {
    /// The underlying SQLx query builder
    builder: QueryBuilder<'a, Sqlite>,
    /// Whether a WHERE clause has been added
    has_where: bool,
    /// Whether an ORDER BY clause has been added
    has_order_by: bool,
    closing: Option<&'static str>,
}

impl<'a> EntityQueryBuilder<'a> {
    /// `SELECT <all entity columns> FROM <table>`
    pub fn select_entity<T: Entity>() -> Result<Self> {
        let columns = T::select_columns()
            .into_iter()
            .map(quote_ident)
            .collect::<Result<Vec<_>>>()?;
        Self::from_head(format!("SELECT {} FROM {}", columns.join(", "), quote_ident(T::TABLE)?))
    }

    /// `SELECT <projection> FROM <table>`
    pub fn select_projection<T: Entity>(projection: &Projection) -> Result<Self> {
        Self::from_head(format!("SELECT {} FROM {}", projection.to_sql()?, quote_ident(T::TABLE)?))
    }

    /// `SELECT COUNT(*) FROM <table>`
    pub fn count<T: Entity>() -> Result<Self> {
        Self::from_head(format!("SELECT COUNT(*) FROM {}", quote_ident(T::TABLE)?))
    }

    /// `SELECT EXISTS(SELECT 1 FROM <table> ...)`, closed by [`Self::finish`]
    pub fn exists<T: Entity>() -> Result<Self> {
        let mut builder = Self::from_head(format!("SELECT EXISTS(SELECT 1 FROM {}", quote_ident(T::TABLE)?))?;
        builder.closing = Some(")");
        Ok(builder)
    }

    fn from_head(head: String) -> Result<Self> {
        Ok(Self {
            builder: QueryBuilder::new(head),
            has_where: false,
            has_order_by: false,
            closing: None,
        })
    }

    /// Add a filter; several calls are combined with AND
    pub fn filter(&mut self, filter: Option<&Filter>) -> Result<&mut Self> {
        let Some(filter) = filter else {
            return Ok(self);
        };
        if !self.has_where {
            self.builder.push(" WHERE ");
            self.has_where = true;
        } else {
            self.builder.push(format!(" {} ", LogicalOperator::And.as_sql()));
        }
        filter.push_sql(&mut self.builder)?;
        Ok(self)
    }

    /// Add ORDER BY terms, in order
    pub fn order_by(&mut self, order: &[OrderBy]) -> Result<&mut Self> {
        for term in order {
            if !self.has_order_by {
                self.builder.push(" ORDER BY ");
                self.has_order_by = true;
            } else {
                self.builder.push(", ");
            }
            self.builder
                .push(format!("{} {}", quote_ident(&term.column)?, term.direction.as_sql()));
        }
        Ok(self)
    }

    /// Add LIMIT and, when non-zero, OFFSET
    pub fn limit(&mut self, limit: i64, offset: i64) -> &mut Self {
        self.builder.push(" LIMIT ");
        self.builder.push_bind(limit);
        if offset > 0 {
            self.builder.push(" OFFSET ");
            self.builder.push_bind(offset);
        }
        self
    }

    /// Finish the statement and hand back the SQLx builder
    pub fn finish(mut self) -> QueryBuilder<'a, Sqlite> {
        if let Some(closing) = self.closing {
            self.builder.push(closing);
        }
        self.builder
    }

    /// SQL text built so far
    pub fn sql(&self) -> &str {
        self.builder.sql()
    }

    /// Get a mutable reference to the underlying SQLx query builder
    pub fn builder_mut(&mut self) -> &mut QueryBuilder<'a, Sqlite> {
        &mut self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Truck;

    #[test]
    fn select_lists_key_columns_and_version() {
        let builder = EntityQueryBuilder::select_entity::<Truck>().unwrap();
        assert_eq!(
            builder.sql(),
            "SELECT \"id\", \"plate_number\", \"model\", \"capacity_kg\", \"active\", \"row_version\" FROM \"trucks\""
        );
    }

    #[test]
    fn nested_filters_render_with_parentheses() {
        let filter = Filter::eq("active", true)
            .and(Filter::gte("capacity_kg", 10_000_i64).or(Filter::like("model", "Volvo%")))
            .and(Filter::is_not_null("model"));
        let mut builder = EntityQueryBuilder::select_entity::<Truck>().unwrap();
        builder.filter(Some(&filter)).unwrap();

        let sql = builder.sql();
        assert!(sql.contains(" WHERE (\"active\" = "));
        assert!(sql.contains(" AND (\"capacity_kg\" >= "));
        assert!(sql.contains(" OR \"model\" LIKE "));
        assert!(sql.ends_with(" AND \"model\" IS NOT NULL)"));
    }

    #[test]
    fn empty_in_matches_nothing() {
        let mut builder = EntityQueryBuilder::count::<Truck>().unwrap();
        builder.filter(Some(&Filter::is_in("id", Vec::<i64>::new()))).unwrap();
        assert_eq!(builder.sql(), "SELECT COUNT(*) FROM \"trucks\" WHERE 1 = 0");
    }

    #[test]
    fn exists_wraps_the_filtered_select() {
        let mut builder = EntityQueryBuilder::exists::<Truck>().unwrap();
        builder.filter(Some(&Filter::is_null("model"))).unwrap();
        let builder = builder.finish();
        assert_eq!(
            builder.sql(),
            "SELECT EXISTS(SELECT 1 FROM \"trucks\" WHERE \"model\" IS NULL)"
        );
    }

    #[test]
    fn order_and_limit_follow_the_filter() {
        let mut builder = EntityQueryBuilder::select_entity::<Truck>().unwrap();
        builder.filter(Some(&Filter::eq("active", true))).unwrap();
        builder.order_by(&[OrderBy::desc("capacity_kg"), OrderBy::asc("id")]).unwrap();
        builder.limit(10, 20);
        let sql = builder.sql();
        assert!(sql.contains("ORDER BY \"capacity_kg\" DESC, \"id\" ASC LIMIT "));
        assert!(sql.contains(" OFFSET "));
    }

    #[test]
    fn injected_column_names_are_rejected() {
        let mut builder = EntityQueryBuilder::select_entity::<Truck>().unwrap();
        let err = builder
            .filter(Some(&Filter::eq("id; DROP TABLE trucks", 1_i64)))
            .err()
            .unwrap();
        assert!(matches!(err, DataError::Argument(_)));
        assert!(quote_ident("").is_err());
        assert!(quote_ident("9lives").is_err());
        assert_eq!(quote_ident("plate_number").unwrap(), "\"plate_number\"");
    }

    #[test]
    fn projection_renders_aliases_and_aggregates() {
        let projection = Projection::new()
            .column("id")
            .column_as("plate_number", "plate")
            .aggregate(AggregateFunction::Sum, Some("capacity_kg"), "total");
        let builder = EntityQueryBuilder::select_projection::<Truck>(&projection).unwrap();
        assert_eq!(
            builder.sql(),
            "SELECT \"id\", \"plate_number\" AS \"plate\", SUM(\"capacity_kg\") AS \"total\" FROM \"trucks\""
        );
        assert!(EntityQueryBuilder::select_projection::<Truck>(&Projection::new()).is_err());
    }
}
