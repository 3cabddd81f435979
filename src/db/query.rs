//! Query builders.
//!
//! Builders are plain values: every method consumes the builder and returns the
//! next state, so a partially built query can be cloned and extended without
//! affecting the original. `to_sql()` renders the final statement text together
//! with its positional arguments.
//!
//! Identifiers (tables, columns) are validated against a strict pattern and are
//! never bound as arguments. Everything else goes through placeholders.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors raised while rendering a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("query has no target table")]
    MissingTable,
    #[error("select requires at least one column")]
    NoColumns,
    #[error("insert requires at least one value")]
    NoValues,
    #[error("update requires at least one assignment")]
    NoAssignments,
    #[error("insert has {columns} columns but {values} values")]
    ColumnValueMismatch { columns: usize, values: usize },
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

/// A bound query argument.
///
/// Only the types the catalog columns use are representable, so every
/// argument binds with a concrete, non-null type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i32),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

/// Rendered statement text plus arguments in placeholder order.
pub type Rendered = (String, Vec<Value>);

/// Shared rendering entry point for all builders.
pub trait ToSql {
    fn to_sql(&self) -> Result<Rendered, BuildError>;
}

/// Entry point for every builder. Arguments always render as `$1`, `$2`, ...
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementBuilder;

impl StatementBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn select<I, S>(&self, columns: I) -> SelectBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SelectBuilder {
            columns: columns.into_iter().map(Into::into).collect(),
            from: None,
            filters: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn insert(&self, table: impl Into<String>) -> InsertBuilder {
        InsertBuilder {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn update(&self, table: impl Into<String>) -> UpdateBuilder {
        UpdateBuilder {
            table: table.into(),
            assignments: Vec::new(),
            filters: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn delete(&self, table: impl Into<String>) -> DeleteBuilder {
        DeleteBuilder {
            table: table.into(),
            filters: Vec::new(),
        }
    }
}

/// Equality filter, `column = <arg>`.
#[derive(Debug, Clone, PartialEq)]
struct Filter {
    column: String,
    value: Value,
}

#[derive(Debug, Clone, PartialEq)]
enum Assignment {
    Bind(String, Value),
    CurrentTimestamp(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectBuilder {
    columns: Vec<String>,
    from: Option<String>,
    filters: Vec<Filter>,
    order_by: Vec<(String, Order)>,
}

impl SelectBuilder {
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from = Some(table.into());
        self
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }
}

impl ToSql for SelectBuilder {
    fn to_sql(&self) -> Result<Rendered, BuildError> {
        let table = self.from.as_deref().ok_or(BuildError::MissingTable)?;
        if self.columns.is_empty() {
            return Err(BuildError::NoColumns);
        }
        let mut args = Args::default();

        let mut sql = format!(
            "SELECT {} FROM {}",
            identifier_list(&self.columns)?,
            qualified(table)?
        );
        sql.push_str(&render_filters(&self.filters, &mut args)?);

        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|(column, order)| {
                    let direction = match order {
                        Order::Asc => "ASC",
                        Order::Desc => "DESC",
                    };
                    Ok(format!("{} {}", identifier(column)?, direction))
                })
                .collect::<Result<Vec<_>, BuildError>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        Ok((sql, args.into_values()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    values: Vec<Value>,
    returning: Vec<String>,
}

impl InsertBuilder {
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning.extend(columns.into_iter().map(Into::into));
        self
    }
}

impl ToSql for InsertBuilder {
    fn to_sql(&self) -> Result<Rendered, BuildError> {
        if self.table.is_empty() {
            return Err(BuildError::MissingTable);
        }
        if self.values.is_empty() {
            return Err(BuildError::NoValues);
        }
        if self.columns.len() != self.values.len() {
            return Err(BuildError::ColumnValueMismatch {
                columns: self.columns.len(),
                values: self.values.len(),
            });
        }
        let mut args = Args::default();
        let placeholders = self
            .values
            .iter()
            .map(|v| args.push(v.clone()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified(&self.table)?,
            identifier_list(&self.columns)?,
            placeholders
        );
        sql.push_str(&render_returning(&self.returning)?);

        Ok((sql, args.into_values()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBuilder {
    table: String,
    assignments: Vec<Assignment>,
    filters: Vec<Filter>,
    returning: Vec<String>,
}

impl UpdateBuilder {
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments
            .push(Assignment::Bind(column.into(), value.into()));
        self
    }

    /// Assign `CURRENT_TIMESTAMP` to `column` without binding an argument.
    pub fn set_current_timestamp(mut self, column: impl Into<String>) -> Self {
        self.assignments
            .push(Assignment::CurrentTimestamp(column.into()));
        self
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning.extend(columns.into_iter().map(Into::into));
        self
    }
}

impl ToSql for UpdateBuilder {
    fn to_sql(&self) -> Result<Rendered, BuildError> {
        if self.table.is_empty() {
            return Err(BuildError::MissingTable);
        }
        if self.assignments.is_empty() {
            return Err(BuildError::NoAssignments);
        }
        let mut args = Args::default();
        let assignments = self
            .assignments
            .iter()
            .map(|assignment| match assignment {
                Assignment::Bind(column, value) => {
                    Ok(format!("{} = {}", identifier(column)?, args.push(value.clone())))
                }
                Assignment::CurrentTimestamp(column) => {
                    Ok(format!("{} = CURRENT_TIMESTAMP", identifier(column)?))
                }
            })
            .collect::<Result<Vec<_>, BuildError>>()?;

        let mut sql = format!(
            "UPDATE {} SET {}",
            qualified(&self.table)?,
            assignments.join(", ")
        );
        sql.push_str(&render_filters(&self.filters, &mut args)?);
        sql.push_str(&render_returning(&self.returning)?);

        Ok((sql, args.into_values()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteBuilder {
    table: String,
    filters: Vec<Filter>,
}

impl DeleteBuilder {
    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            value: value.into(),
        });
        self
    }
}

impl ToSql for DeleteBuilder {
    fn to_sql(&self) -> Result<Rendered, BuildError> {
        if self.table.is_empty() {
            return Err(BuildError::MissingTable);
        }
        let mut args = Args::default();
        let mut sql = format!("DELETE FROM {}", qualified(&self.table)?);
        sql.push_str(&render_filters(&self.filters, &mut args)?);

        Ok((sql, args.into_values()))
    }
}

/// Argument accumulator that hands out placeholders in binding order.
#[derive(Default)]
struct Args {
    values: Vec<Value>,
}

impl Args {
    fn push(&mut self, value: Value) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    fn into_values(self) -> Vec<Value> {
        self.values
    }
}

fn render_filters(filters: &[Filter], args: &mut Args) -> Result<String, BuildError> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let terms = filters
        .iter()
        .map(|f| Ok(format!("{} = {}", identifier(&f.column)?, args.push(f.value.clone()))))
        .collect::<Result<Vec<_>, BuildError>>()?;
    Ok(format!(" WHERE {}", terms.join(" AND ")))
}

fn render_returning(columns: &[String]) -> Result<String, BuildError> {
    if columns.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(" RETURNING {}", identifier_list(columns)?))
}

fn identifier_list(columns: &[String]) -> Result<String, BuildError> {
    Ok(columns
        .iter()
        .map(|c| identifier(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", "))
}

/// `schema.table` or a bare `table`.
fn qualified(name: &str) -> Result<&str, BuildError> {
    let mut parts = name.split('.');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(table), None, None) => is_identifier(table),
        (Some(schema), Some(table), None) => is_identifier(schema) && is_identifier(table),
        _ => false,
    };
    if valid {
        Ok(name)
    } else {
        Err(BuildError::InvalidIdentifier(name.to_string()))
    }
}

fn identifier(name: &str) -> Result<&str, BuildError> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(BuildError::InvalidIdentifier(name.to_string()))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
