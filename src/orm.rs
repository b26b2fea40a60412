//! Traced SeaORM connection.
//!
//! Same span rules as the blocking wrappers, driven through
//! [`TraceContext::call_async`] so the span is entered whenever the query
//! future is polled.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    AccessMode, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr,
    ExecResult, IsolationLevel, QueryResult, Statement, StreamTrait, TransactionError,
    TransactionTrait,
};

use crate::connection_info::ConnectionInfo;
use crate::span::{Operation, TraceContext};

/// A traced wrapper around SeaORM's `DatabaseConnection`.
///
/// Implements `ConnectionTrait`, `StreamTrait` and `TransactionTrait`, so it
/// can be passed wherever a `DatabaseConnection` is expected. Statements run
/// through `execute` become `Update` spans, `execute_unprepared` becomes
/// `Execute`, and queries and streams become `Query`. Transactions are
/// delegated untraced; statements issued on the returned
/// `DatabaseTransaction` are not wrapped.
///
/// # Example
///
/// ```rust,ignore
/// use sea_orm::Database;
/// use db_driver_tracing::TracedConnection;
///
/// let db = Database::connect("postgres://localhost/mydb").await?;
/// let traced = TracedConnection::from(db);
///
/// let users = Users::find().all(&traced).await?;
/// ```
#[derive(Debug)]
pub struct TracedConnection {
    inner: DatabaseConnection,
    ctx: TraceContext,
}

impl TracedConnection {
    /// Wrap `connection` using the given trace context.
    pub fn new(connection: DatabaseConnection, ctx: TraceContext) -> Self {
        Self {
            inner: connection,
            ctx,
        }
    }

    /// Wrap `connection` with the global tracer and policy. Spans carry only
    /// the backend's `db.type`.
    pub fn wrap(connection: DatabaseConnection) -> Self {
        let info = backend_info(connection.get_database_backend());
        Self::new(connection, TraceContext::new(info))
    }

    /// Get a reference to the underlying `DatabaseConnection`.
    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    pub fn context(&self) -> &TraceContext {
        &self.ctx
    }

    /// Consume the wrapper and return the inner `DatabaseConnection`.
    pub fn into_inner(self) -> DatabaseConnection {
        self.inner
    }
}

fn backend_info(backend: DbBackend) -> Arc<ConnectionInfo> {
    let db_type = match backend {
        DbBackend::Postgres => "postgresql",
        DbBackend::MySql => "mysql",
        DbBackend::Sqlite => "sqlite",
    };
    Arc::new(ConnectionInfo::builder(db_type).build())
}

impl From<DatabaseConnection> for TracedConnection {
    fn from(connection: DatabaseConnection) -> Self {
        Self::wrap(connection)
    }
}

impl AsRef<DatabaseConnection> for TracedConnection {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.inner
    }
}

#[async_trait]
impl ConnectionTrait for TracedConnection {
    fn get_database_backend(&self) -> DbBackend {
        self.inner.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        let sql = stmt.sql.clone();
        self.ctx
            .call_async(Operation::Update, Some(&sql), self.inner.execute(stmt))
            .await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        self.ctx
            .call_async(Operation::Execute, Some(sql), self.inner.execute_unprepared(sql))
            .await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        let sql = stmt.sql.clone();
        self.ctx
            .call_async(Operation::Query, Some(&sql), self.inner.query_one(stmt))
            .await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        let sql = stmt.sql.clone();
        self.ctx
            .call_async(Operation::Query, Some(&sql), self.inner.query_all(stmt))
            .await
    }

    fn support_returning(&self) -> bool {
        self.inner.support_returning()
    }

    fn is_mock_connection(&self) -> bool {
        self.inner.is_mock_connection()
    }
}

#[async_trait]
impl StreamTrait for TracedConnection {
    type Stream<'a> = <DatabaseConnection as StreamTrait>::Stream<'a>;

    /// Only opening the stream is timed; rows pulled afterwards are not.
    fn stream<'a>(
        &'a self,
        stmt: Statement,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Stream<'a>, DbErr>> + 'a + Send>> {
        Box::pin(async move {
            let sql = stmt.sql.clone();
            self.ctx
                .call_async(Operation::Query, Some(&sql), self.inner.stream(stmt))
                .await
        })
    }
}

#[async_trait]
impl TransactionTrait for TracedConnection {
    async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        self.inner.begin().await
    }

    async fn begin_with_config(
        &self,
        isolation_level: Option<IsolationLevel>,
        access_mode: Option<AccessMode>,
    ) -> Result<DatabaseTransaction, DbErr> {
        self.inner.begin_with_config(isolation_level, access_mode).await
    }

    async fn transaction<F, T, E>(&self, callback: F) -> Result<T, TransactionError<E>>
    where
        F: for<'c> FnOnce(
                &'c DatabaseTransaction,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>
            + Send,
        T: Send,
        E: std::fmt::Display + std::fmt::Debug + Send,
    {
        self.inner.transaction(callback).await
    }

    async fn transaction_with_config<F, T, E>(
        &self,
        callback: F,
        isolation_level: Option<IsolationLevel>,
        access_mode: Option<AccessMode>,
    ) -> Result<T, TransactionError<E>>
    where
        F: for<'c> FnOnce(
                &'c DatabaseTransaction,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>
            + Send,
        T: Send,
        E: std::fmt::Display + std::fmt::Debug + Send,
    {
        self.inner
            .transaction_with_config(callback, isolation_level, access_mode)
            .await
    }
}

/// Extension trait for easy wrapping of database connections.
pub trait TracingExt {
    /// Wrap this connection with the global tracer and policy.
    fn with_tracing(self) -> TracedConnection;

    /// Wrap this connection with an explicit trace context.
    fn with_trace_context(self, ctx: TraceContext) -> TracedConnection;
}

impl TracingExt for DatabaseConnection {
    fn with_tracing(self) -> TracedConnection {
        TracedConnection::wrap(self)
    }

    fn with_trace_context(self, ctx: TraceContext) -> TracedConnection {
        TracedConnection::new(self, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_info() {
        assert_eq!(backend_info(DbBackend::Postgres).db_type(), "postgresql");
        assert_eq!(backend_info(DbBackend::MySql).db_type(), "mysql");
        let sqlite = backend_info(DbBackend::Sqlite);
        assert_eq!(sqlite.db_type(), "sqlite");
        assert_eq!(sqlite.db_peer(), None);
        assert!(!sqlite.is_unknown());
    }
}
