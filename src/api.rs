//! The blocking relational client API the tracing wrappers are written
//! against.
//!
//! Vendors implement these traits for their connectors; the `Tracing*`
//! types implement them again by delegation, so a traced object can be used
//! anywhere the plain one was.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::SqlError;

/// Connect properties handed to a [`Driver`], e.g. `user` and `password`.
pub type Properties = BTreeMap<String, String>;

/// A single column value or statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Forward-only cursor over query results. Columns are 1-based.
pub trait ResultSet: Send {
    /// Advance to the next row; `false` once exhausted.
    fn next(&mut self) -> Result<bool, SqlError>;

    fn column_count(&self) -> usize;

    fn get(&self, column: usize) -> Result<Value, SqlError>;

    fn get_string(&self, column: usize) -> Result<Option<String>, SqlError> {
        Ok(match self.get(column)? {
            Value::Null => None,
            Value::Text(v) => Some(v),
            other => Some(other.to_string()),
        })
    }

    fn get_i64(&self, column: usize) -> Result<Option<i64>, SqlError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(v)),
            Value::Bool(v) => Ok(Some(i64::from(v))),
            Value::Text(v) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| SqlError::new(format!("column {column} is not an integer")).with_source(e)),
            other => Err(SqlError::new(format!("column {column} is not an integer: {other}"))),
        }
    }

    fn close(&mut self) -> Result<(), SqlError> {
        Ok(())
    }
}

/// Plain SQL statement.
pub trait Statement: Send {
    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn ResultSet>, SqlError>;

    /// Returns the affected row count.
    fn execute_update(&mut self, sql: &str) -> Result<u64, SqlError>;

    /// Returns `true` when the statement produced a result set, available
    /// through [`result_set`](Self::result_set).
    fn execute(&mut self, sql: &str) -> Result<bool, SqlError>;

    fn add_batch(&mut self, sql: &str) -> Result<(), SqlError>;

    fn clear_batch(&mut self) -> Result<(), SqlError>;

    /// Runs every batched command; one update count per command.
    fn execute_batch(&mut self) -> Result<Vec<u64>, SqlError>;

    fn result_set(&mut self) -> Result<Option<Box<dyn ResultSet>>, SqlError>;

    fn update_count(&self) -> Option<u64>;

    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), SqlError>;

    fn close(&mut self) -> Result<(), SqlError>;

    fn is_closed(&self) -> bool;
}

/// Statement with its SQL fixed at preparation time. Parameters are
/// 1-based.
pub trait PreparedStatement: Send {
    fn set_param(&mut self, index: usize, value: Value) -> Result<(), SqlError>;

    fn clear_params(&mut self) -> Result<(), SqlError>;

    fn execute_query(&mut self) -> Result<Box<dyn ResultSet>, SqlError>;

    fn execute_update(&mut self) -> Result<u64, SqlError>;

    fn execute(&mut self) -> Result<bool, SqlError>;

    /// Queue the current parameter set.
    fn add_batch(&mut self) -> Result<(), SqlError>;

    /// Queue an extra SQL command alongside the parameter sets.
    fn add_batch_sql(&mut self, sql: &str) -> Result<(), SqlError>;

    fn clear_batch(&mut self) -> Result<(), SqlError>;

    fn execute_batch(&mut self) -> Result<Vec<u64>, SqlError>;

    fn result_set(&mut self) -> Result<Option<Box<dyn ResultSet>>, SqlError>;

    fn close(&mut self) -> Result<(), SqlError>;

    fn is_closed(&self) -> bool;
}

/// An open session with a database.
pub trait Connection: Send {
    fn create_statement(&mut self) -> Result<Box<dyn Statement>, SqlError>;

    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn PreparedStatement>, SqlError>;

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlError>;

    fn auto_commit(&self) -> Result<bool, SqlError>;

    fn commit(&mut self) -> Result<(), SqlError>;

    fn rollback(&mut self) -> Result<(), SqlError>;

    fn close(&mut self) -> Result<(), SqlError>;

    fn is_closed(&self) -> bool;
}

/// Factory for connections to one preconfigured database.
pub trait DataSource: Send + Sync {
    fn get_connection(&self) -> Result<Box<dyn Connection>, SqlError>;

    fn get_connection_with(&self, user: &str, password: &str) -> Result<Box<dyn Connection>, SqlError>;
}

/// A connector that opens connections for the URLs it accepts.
pub trait Driver: Send + Sync {
    fn accepts_url(&self, url: &str) -> bool;

    /// `Ok(None)` means the URL is not for this driver.
    fn connect(&self, url: &str, info: &Properties) -> Result<Option<Box<dyn Connection>>, SqlError>;

    /// Tracing drivers are skipped when resolving the real driver for a URL.
    fn is_tracing_driver(&self) -> bool {
        false
    }
}
