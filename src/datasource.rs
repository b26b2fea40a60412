//! Traced data source.

use std::collections::HashSet;
use std::sync::Arc;

use crate::api::{Connection, DataSource};
use crate::connection::TracingConnection;
use crate::connection_info::ConnectionInfo;
use crate::error::SqlError;
use crate::span::{Operation, TraceContext, Tracer};

/// Wraps a [`DataSource`] so that acquiring a connection is traced and the
/// returned connection traces its statements.
///
/// A data source has no URL to parse, so the target description is fixed at
/// construction ([`ConnectionInfo::unknown`] unless given).
#[derive(Debug)]
pub struct TracingDataSource<D> {
    inner: D,
    ctx: TraceContext,
}

impl<D: DataSource> TracingDataSource<D> {
    pub fn new(tracer: Tracer, inner: D) -> Self {
        Self::from_context(inner, TraceContext::new(ConnectionInfo::unknown()).with_tracer(tracer))
    }

    pub fn with_options(
        tracer: Tracer,
        inner: D,
        connection_info: Arc<ConnectionInfo>,
        with_active_span_only: bool,
        ignored_statements: HashSet<String>,
    ) -> Self {
        let ctx = TraceContext::new(connection_info)
            .with_tracer(tracer)
            .with_active_span_only(with_active_span_only)
            .with_ignored_statements(ignored_statements);
        Self::from_context(inner, ctx)
    }

    pub fn from_context(inner: D, ctx: TraceContext) -> Self {
        Self { inner, ctx }
    }

    pub fn context(&self) -> &TraceContext {
        &self.ctx
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    fn traced(&self, connection: Box<dyn Connection>) -> Box<dyn Connection> {
        Box::new(TracingConnection::new(connection, self.ctx.clone()))
    }
}

impl<D: DataSource> DataSource for TracingDataSource<D> {
    fn get_connection(&self) -> Result<Box<dyn Connection>, SqlError> {
        let connection = self
            .ctx
            .call(Operation::AcquireConnection, None, || self.inner.get_connection())?;
        Ok(self.traced(connection))
    }

    fn get_connection_with(&self, user: &str, password: &str) -> Result<Box<dyn Connection>, SqlError> {
        let connection = self.ctx.call(Operation::AcquireConnection, None, || {
            self.inner.get_connection_with(user, password)
        })?;
        Ok(self.traced(connection))
    }
}
