//! Traced connection, statement and prepared statement wrappers.
//!
//! Only query, update, execute and batch calls open spans; everything else
//! is forwarded to the wrapped object as is.

use std::sync::Arc;
use std::time::Duration;

use crate::api::{Connection, PreparedStatement, ResultSet, Statement, Value};
use crate::connection_info::ConnectionInfo;
use crate::error::SqlError;
use crate::span::{Operation, TraceContext};

/// A connection whose statements are traced.
///
/// Returned by [`TracingDriver`](crate::TracingDriver) and
/// [`TracingDataSource`](crate::TracingDataSource); it can also wrap any
/// existing connection directly.
pub struct TracingConnection {
    inner: Box<dyn Connection>,
    ctx: TraceContext,
}

impl TracingConnection {
    pub fn new(inner: Box<dyn Connection>, ctx: TraceContext) -> Self {
        Self { inner, ctx }
    }

    pub fn context(&self) -> &TraceContext {
        &self.ctx
    }

    pub fn connection_info(&self) -> &Arc<ConnectionInfo> {
        self.ctx.connection_info()
    }

    /// Consume the wrapper and return the inner connection.
    pub fn into_inner(self) -> Box<dyn Connection> {
        self.inner
    }
}

impl std::fmt::Debug for TracingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingConnection")
            .field("connection_info", self.ctx.connection_info())
            .finish_non_exhaustive()
    }
}

impl Connection for TracingConnection {
    fn create_statement(&mut self) -> Result<Box<dyn Statement>, SqlError> {
        let statement = self.inner.create_statement()?;
        Ok(Box::new(TracingStatement::new(statement, self.ctx.clone())))
    }

    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn PreparedStatement>, SqlError> {
        let statement = self.inner.prepare_statement(sql)?;
        Ok(Box::new(TracingPreparedStatement::new(statement, sql, self.ctx.clone())))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlError> {
        self.inner.set_auto_commit(auto_commit)
    }

    fn auto_commit(&self) -> Result<bool, SqlError> {
        self.inner.auto_commit()
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), SqlError> {
        self.inner.rollback()
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Batched commands as seen by the tracing layer.
///
/// Mirrors what has been handed to the wrapped statement so the batch span
/// can carry the full SQL.
#[derive(Debug, Default, Clone)]
struct BatchBuffer {
    commands: Vec<String>,
}

impl BatchBuffer {
    fn push(&mut self, sql: &str) {
        self.commands.push(sql.to_string());
    }

    fn clear(&mut self) {
        self.commands.clear();
    }

    /// `base` followed by every queued command, in insertion order.
    fn sql(&self, base: Option<&str>) -> String {
        let mut sql = String::from(base.unwrap_or_default());
        for command in &self.commands {
            sql.push_str(command);
        }
        sql
    }
}

/// A traced plain statement.
pub struct TracingStatement {
    inner: Box<dyn Statement>,
    ctx: TraceContext,
    batch: BatchBuffer,
}

impl TracingStatement {
    pub fn new(inner: Box<dyn Statement>, ctx: TraceContext) -> Self {
        Self {
            inner,
            ctx,
            batch: BatchBuffer::default(),
        }
    }

    /// SQL the next batch span would be tagged with.
    pub fn batch_sql(&self) -> String {
        self.batch.sql(None)
    }
}

impl Statement for TracingStatement {
    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn ResultSet>, SqlError> {
        let inner = &mut self.inner;
        self.ctx.call(Operation::Query, Some(sql), || inner.execute_query(sql))
    }

    fn execute_update(&mut self, sql: &str) -> Result<u64, SqlError> {
        let inner = &mut self.inner;
        self.ctx.call(Operation::Update, Some(sql), || inner.execute_update(sql))
    }

    fn execute(&mut self, sql: &str) -> Result<bool, SqlError> {
        let inner = &mut self.inner;
        self.ctx.call(Operation::Execute, Some(sql), || inner.execute(sql))
    }

    fn add_batch(&mut self, sql: &str) -> Result<(), SqlError> {
        self.inner.add_batch(sql)?;
        self.batch.push(sql);
        Ok(())
    }

    fn clear_batch(&mut self) -> Result<(), SqlError> {
        self.inner.clear_batch()?;
        self.batch.clear();
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, SqlError> {
        let sql = self.batch.sql(None);
        let inner = &mut self.inner;
        let result = self.ctx.call(Operation::Batch, Some(&sql), || inner.execute_batch());
        self.batch.clear();
        result
    }

    fn result_set(&mut self) -> Result<Option<Box<dyn ResultSet>>, SqlError> {
        self.inner.result_set()
    }

    fn update_count(&self) -> Option<u64> {
        self.inner.update_count()
    }

    fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), SqlError> {
        self.inner.set_query_timeout(timeout)
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// A traced prepared statement. Spans carry the prepared SQL.
pub struct TracingPreparedStatement {
    inner: Box<dyn PreparedStatement>,
    query: String,
    ctx: TraceContext,
    batch: BatchBuffer,
}

impl TracingPreparedStatement {
    pub fn new(inner: Box<dyn PreparedStatement>, query: impl Into<String>, ctx: TraceContext) -> Self {
        Self {
            inner,
            query: query.into(),
            ctx,
            batch: BatchBuffer::default(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// SQL the next batch span would be tagged with.
    pub fn batch_sql(&self) -> String {
        self.batch.sql(Some(&self.query))
    }
}

impl PreparedStatement for TracingPreparedStatement {
    fn set_param(&mut self, index: usize, value: Value) -> Result<(), SqlError> {
        self.inner.set_param(index, value)
    }

    fn clear_params(&mut self) -> Result<(), SqlError> {
        self.inner.clear_params()
    }

    fn execute_query(&mut self) -> Result<Box<dyn ResultSet>, SqlError> {
        let inner = &mut self.inner;
        self.ctx.call(Operation::Query, Some(&self.query), || inner.execute_query())
    }

    fn execute_update(&mut self) -> Result<u64, SqlError> {
        let inner = &mut self.inner;
        self.ctx.call(Operation::Update, Some(&self.query), || inner.execute_update())
    }

    fn execute(&mut self) -> Result<bool, SqlError> {
        let inner = &mut self.inner;
        self.ctx.call(Operation::Execute, Some(&self.query), || inner.execute())
    }

    fn add_batch(&mut self) -> Result<(), SqlError> {
        self.inner.add_batch()
    }

    fn add_batch_sql(&mut self, sql: &str) -> Result<(), SqlError> {
        self.inner.add_batch_sql(sql)?;
        self.batch.push(sql);
        Ok(())
    }

    fn clear_batch(&mut self) -> Result<(), SqlError> {
        self.inner.clear_batch()?;
        self.batch.clear();
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, SqlError> {
        let sql = self.batch.sql(Some(&self.query));
        let inner = &mut self.inner;
        let result = self.ctx.call(Operation::Batch, Some(&sql), || inner.execute_batch());
        self.batch.clear();
        result
    }

    fn result_set(&mut self) -> Result<Option<Box<dyn ResultSet>>, SqlError> {
        self.inner.result_set()
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
