use serde_json::Value;

use crate::BackendError;

/// Specifies the direction for ordering query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Operators accepted in a [`FilterCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    pub fn parse(raw: &str) -> Result<Self, BackendError> {
        let op = match raw.trim().to_ascii_uppercase().as_str() {
            "=" => Self::Eq,
            "!=" | "<>" => Self::NotEq,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "IS NULL" => Self::IsNull,
            "IS NOT NULL" => Self::IsNotNull,
            _ => return Err(BackendError::InvalidOperator(raw.to_string())),
        };
        Ok(op)
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Whether the operator compares against a bound value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// Represents a single filter condition for a database query.
#[derive(Debug, Clone)]
pub struct FilterCondition {
    pub column: String,
    pub operator: &'static str,
    /// Holds the value for the condition's placeholder, if any.
    pub value: Option<Value>,
}

/// Represents the complete criteria for a filtered query.
///
/// Backends interpret these components: the Postgres backend turns them into
/// SQL, the in-memory backend evaluates them against stored rows.
#[derive(Debug, Clone, Default)]
pub struct QueryCriteria {
    pub columns: Option<Vec<String>>,
    pub conditions: Vec<FilterCondition>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Vec<(String, OrderDirection)>,
}

impl QueryCriteria {
    /// Creates a new, empty `QueryCriteria` builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the returned fields. Without this every column is returned.
    pub fn select_columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Adds a filter condition that may or may not have a value.
    pub fn add_filter(
        mut self,
        column: &str,
        operator: &'static str,
        value: Option<Value>,
    ) -> Self {
        self.conditions.push(FilterCondition {
            column: column.to_string(),
            operator,
            value,
        });
        self
    }

    /// A convenience method for `add_filter` that requires a value.
    pub fn add_valued_filter(
        self,
        column: &str,
        operator: &'static str,
        value: impl Into<Value>,
    ) -> Self {
        self.add_filter(column, operator, Some(value.into()))
    }

    /// Sets the LIMIT for the query.
    pub fn limit(mut self, limit_val: i64) -> Self {
        self.limit = Some(limit_val);
        self
    }

    /// Sets the OFFSET for the query.
    pub fn offset(mut self, offset_val: i64) -> Self {
        self.offset = Some(offset_val);
        self
    }

    /// Adds an ORDER BY clause.
    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }
}
