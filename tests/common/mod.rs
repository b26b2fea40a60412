//! Shared test harness: a span-capturing layer and an in-memory database.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use db_driver_tracing::{
    Connection, DataSource, Driver, PreparedStatement, Properties, ResultSet, SqlError, Statement, Tracer, Value,
};
use tracing::field::{Field, Visit};
use tracing::{span, Dispatch, Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// How long statements containing `SLEEP` block.
pub const SLEEP: Duration = Duration::from_millis(30);

pub type Fields = BTreeMap<String, String>;

/// A span as seen once it has closed.
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub id: u64,
    pub parent_id: Option<u64>,
    /// Id of the root span of the tree this span belongs to.
    pub trace_id: u64,
    pub name: String,
    pub tags: Fields,
    /// Events emitted with this span as parent.
    pub logs: Vec<Fields>,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

struct FieldVisitor<'a>(&'a mut Fields);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

struct SpanData {
    parent_id: Option<u64>,
    trace_id: u64,
    fields: Fields,
    logs: Vec<Fields>,
}

/// Layer that keeps every closed span.
#[derive(Clone, Default)]
pub struct SpanRecorder {
    finished: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl SpanRecorder {
    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        self.finished.lock().unwrap().clone()
    }

    pub fn single(&self) -> FinishedSpan {
        let spans = self.finished_spans();
        assert_eq!(spans.len(), 1, "expected exactly one span, got {spans:#?}");
        spans.into_iter().next().unwrap()
    }

    /// Finished spans that were not opened by the test itself.
    pub fn db_spans(&self) -> Vec<FinishedSpan> {
        self.finished_spans()
            .into_iter()
            .filter(|s| s.tag("component") == Some("db-driver-tracing"))
            .collect()
    }
}

impl<S> Layer<S> for SpanRecorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = Fields::new();
        attrs.record(&mut FieldVisitor(&mut fields));

        let parent_id = span.parent().map(|p| p.id().into_u64());
        let trace_id = span
            .scope()
            .from_root()
            .next()
            .map(|root| root.id().into_u64())
            .unwrap_or_else(|| id.into_u64());

        span.extensions_mut().insert(SpanData {
            parent_id,
            trace_id,
            fields,
            logs: Vec::new(),
        });
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        if let Some(data) = span.extensions_mut().get_mut::<SpanData>() {
            values.record(&mut FieldVisitor(&mut data.fields));
        };
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.event_span(event) else {
            return;
        };
        let mut fields = Fields::new();
        event.record(&mut FieldVisitor(&mut fields));
        if let Some(data) = span.extensions_mut().get_mut::<SpanData>() {
            data.logs.push(fields);
        };
    }

    fn on_close(&self, id: span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };
        let Some(data) = span.extensions_mut().remove::<SpanData>() else {
            return;
        };
        let name = data
            .fields
            .get("otel.name")
            .cloned()
            .unwrap_or_else(|| span.metadata().name().to_string());

        self.finished.lock().unwrap().push(FinishedSpan {
            id: id.into_u64(),
            parent_id: data.parent_id,
            trace_id: data.trace_id,
            name,
            tags: data.fields,
            logs: data.logs,
        });
    }
}

/// A tracer reporting into a fresh recorder.
pub fn recording_tracer() -> (Tracer, SpanRecorder) {
    let recorder = SpanRecorder::default();
    let subscriber = tracing_subscriber::registry().with(recorder.clone());
    (Tracer::new(Dispatch::new(subscriber)), recorder)
}

/// Every statement the fake database saw, in order.
#[derive(Clone, Default)]
pub struct StatementLog(Arc<Mutex<Vec<String>>>);

impl StatementLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Runs `sql`: statements containing `FAIL` error out, statements
    /// containing `SLEEP` block for [`SLEEP`], statements containing
    /// `PANIC` panic.
    fn run(&self, sql: &str) -> Result<(), SqlError> {
        self.0.lock().unwrap().push(sql.to_string());
        if sql.contains("PANIC") {
            panic!("driver bug");
        }
        if sql.contains("SLEEP") {
            thread::sleep(SLEEP);
        }
        if sql.contains("FAIL") {
            return Err(SqlError::new(format!("syntax error near FAIL in {sql}"))
                .with_sql_state("42000")
                .with_vendor_code(1064));
        }
        Ok(())
    }
}

pub struct FakeResultSet {
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl FakeResultSet {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self { rows, position: None }
    }
}

impl ResultSet for FakeResultSet {
    fn next(&mut self) -> Result<bool, SqlError> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next);
        Ok(next < self.rows.len())
    }

    fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    fn get(&self, column: usize) -> Result<Value, SqlError> {
        self.position
            .and_then(|row| self.rows.get(row))
            .and_then(|row| row.get(column.checked_sub(1)?))
            .cloned()
            .ok_or_else(|| SqlError::new(format!("no value at column {column}")))
    }
}

fn one_row() -> Box<dyn ResultSet> {
    Box::new(FakeResultSet::new(vec![vec![Value::Int(1), Value::from("one")]]))
}

pub struct FakeStatement {
    log: StatementLog,
    batch: Vec<String>,
    update_count: Option<u64>,
    closed: bool,
}

impl Statement for FakeStatement {
    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn ResultSet>, SqlError> {
        self.log.run(sql)?;
        Ok(one_row())
    }

    fn execute_update(&mut self, sql: &str) -> Result<u64, SqlError> {
        self.log.run(sql)?;
        self.update_count = Some(1);
        Ok(1)
    }

    fn execute(&mut self, sql: &str) -> Result<bool, SqlError> {
        self.log.run(sql)?;
        Ok(sql.trim_start().to_uppercase().starts_with("SELECT"))
    }

    fn add_batch(&mut self, sql: &str) -> Result<(), SqlError> {
        self.batch.push(sql.to_string());
        Ok(())
    }

    fn clear_batch(&mut self) -> Result<(), SqlError> {
        self.batch.clear();
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, SqlError> {
        let batch = std::mem::take(&mut self.batch);
        batch.iter().map(|sql| self.log.run(sql).map(|()| 1)).collect()
    }

    fn result_set(&mut self) -> Result<Option<Box<dyn ResultSet>>, SqlError> {
        Ok(Some(one_row()))
    }

    fn update_count(&self) -> Option<u64> {
        self.update_count
    }

    fn set_query_timeout(&mut self, _timeout: Duration) -> Result<(), SqlError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

pub struct FakePreparedStatement {
    log: StatementLog,
    sql: String,
    params: BTreeMap<usize, Value>,
    batch: Vec<String>,
    closed: bool,
}

impl FakePreparedStatement {
    fn bound(&self) -> String {
        let params: Vec<String> = self.params.values().map(ToString::to_string).collect();
        format!("{} [{}]", self.sql, params.join(", "))
    }
}

impl PreparedStatement for FakePreparedStatement {
    fn set_param(&mut self, index: usize, value: Value) -> Result<(), SqlError> {
        if index == 0 {
            return Err(SqlError::new("parameter indexes start at 1"));
        }
        self.params.insert(index, value);
        Ok(())
    }

    fn clear_params(&mut self) -> Result<(), SqlError> {
        self.params.clear();
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn ResultSet>, SqlError> {
        self.log.run(&self.bound())?;
        Ok(one_row())
    }

    fn execute_update(&mut self) -> Result<u64, SqlError> {
        self.log.run(&self.bound())?;
        Ok(1)
    }

    fn execute(&mut self) -> Result<bool, SqlError> {
        self.log.run(&self.bound())?;
        Ok(false)
    }

    fn add_batch(&mut self) -> Result<(), SqlError> {
        let bound = self.bound();
        self.batch.push(bound);
        Ok(())
    }

    fn add_batch_sql(&mut self, sql: &str) -> Result<(), SqlError> {
        self.batch.push(sql.to_string());
        Ok(())
    }

    fn clear_batch(&mut self) -> Result<(), SqlError> {
        self.batch.clear();
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, SqlError> {
        let batch = std::mem::take(&mut self.batch);
        batch.iter().map(|sql| self.log.run(sql).map(|()| 1)).collect()
    }

    fn result_set(&mut self) -> Result<Option<Box<dyn ResultSet>>, SqlError> {
        Ok(None)
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

pub struct FakeConnection {
    log: StatementLog,
    auto_commit: bool,
    closed: bool,
}

impl FakeConnection {
    pub fn new(log: StatementLog) -> Self {
        Self {
            log,
            auto_commit: true,
            closed: false,
        }
    }
}

impl Connection for FakeConnection {
    fn create_statement(&mut self) -> Result<Box<dyn Statement>, SqlError> {
        Ok(Box::new(FakeStatement {
            log: self.log.clone(),
            batch: Vec::new(),
            update_count: None,
            closed: false,
        }))
    }

    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn PreparedStatement>, SqlError> {
        Ok(Box::new(FakePreparedStatement {
            log: self.log.clone(),
            sql: sql.to_string(),
            params: BTreeMap::new(),
            batch: Vec::new(),
            closed: false,
        }))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlError> {
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn auto_commit(&self) -> Result<bool, SqlError> {
        Ok(self.auto_commit)
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        self.log.run("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), SqlError> {
        self.log.run("ROLLBACK")
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Driver accepting URLs with a fixed prefix. A `password` property of
/// `wrong` is refused.
pub struct FakeDriver {
    prefixes: HashSet<&'static str>,
    pub log: StatementLog,
}

impl FakeDriver {
    pub fn new(prefixes: &[&'static str]) -> Self {
        Self {
            prefixes: prefixes.iter().copied().collect(),
            log: StatementLog::default(),
        }
    }
}

impl Driver for FakeDriver {
    fn accepts_url(&self, url: &str) -> bool {
        self.prefixes.iter().any(|p| url.starts_with(p))
    }

    fn connect(&self, url: &str, info: &Properties) -> Result<Option<Box<dyn Connection>>, SqlError> {
        if !self.accepts_url(url) {
            return Ok(None);
        }
        if info.get("password").map(String::as_str) == Some("wrong") {
            return Err(SqlError::new("access denied").with_sql_state("28000"));
        }
        self.log.run(&format!("CONNECT {url}"))?;
        Ok(Some(Box::new(FakeConnection::new(self.log.clone()))))
    }
}

/// Data source handing out fake connections; `fail` makes it refuse.
#[derive(Default)]
pub struct FakeDataSource {
    pub log: StatementLog,
    pub fail: bool,
}

impl DataSource for FakeDataSource {
    fn get_connection(&self) -> Result<Box<dyn Connection>, SqlError> {
        if self.fail {
            return Err(SqlError::new("connection refused").with_sql_state("08001"));
        }
        Ok(Box::new(FakeConnection::new(self.log.clone())))
    }

    fn get_connection_with(&self, user: &str, _password: &str) -> Result<Box<dyn Connection>, SqlError> {
        if self.fail {
            return Err(SqlError::new(format!("connection refused for {user}")).with_sql_state("08001"));
        }
        Ok(Box::new(FakeConnection::new(self.log.clone())))
    }
}
