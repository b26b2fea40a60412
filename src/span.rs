//! Span construction, decoration and completion for traced database calls.
//!
//! Every traced call goes through [`TraceContext::call`] (or its async twin):
//!
//! 1. decide whether the call is traced at all (master switch,
//!    active-span-only, ignored statements) before any span is allocated;
//! 2. open a client span under the current span and tag it from the
//!    connection's [`ConnectionInfo`];
//! 3. run the wrapped call with the span entered;
//! 4. tag errors and latency, leave the span, then close it.
//!
//! Step 4 runs from a drop guard, so it happens exactly once whether the call
//! returns `Ok`, returns `Err` or unwinds.
//!
//! The current span is tracked per thread by the `tracing` dispatcher. Spans
//! opened on another thread do not become parents automatically.

use std::borrow::Cow;
use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::instrument::WithSubscriber;
use tracing::span::EnteredSpan;
use tracing::{field, Dispatch, Instrument, Span};

use crate::config::{TracingConfig, TracingPolicy};
use crate::connection_info::ConnectionInfo;

/// Value of the `component` tag on every span.
pub const COMPONENT_NAME: &str = "db-driver-tracing";

/// Category of a traced call; becomes the span's operation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    AcquireConnection,
    Query,
    Update,
    Execute,
    Batch,
    Custom(Cow<'static, str>),
}

impl Operation {
    pub fn name(&self) -> &str {
        match self {
            Operation::AcquireConnection => "AcquireConnection",
            Operation::Query => "Query",
            Operation::Update => "Update",
            Operation::Execute => "Execute",
            Operation::Batch => "Batch",
            Operation::Custom(name) => name.as_ref(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The dispatcher spans are reported to.
///
/// `Tracer::global()` follows whatever dispatcher is current for the calling
/// thread, which is the process-wide default unless a scoped one is set.
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    dispatch: Option<Dispatch>,
}

impl Tracer {
    pub fn global() -> Self {
        Self { dispatch: None }
    }

    /// Report to `dispatch` regardless of the thread's current dispatcher.
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// A tracer that drops everything.
    pub fn noop() -> Self {
        Self::new(Dispatch::none())
    }

    pub fn is_global(&self) -> bool {
        self.dispatch.is_none()
    }

    /// Run `f` with this tracer as the current dispatcher.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    /// Whether a span is currently entered on this thread.
    pub fn has_active_span(&self) -> bool {
        self.in_scope(|| !Span::current().is_none())
    }
}

impl From<Dispatch> for Tracer {
    fn from(dispatch: Dispatch) -> Self {
        Self::new(dispatch)
    }
}

macro_rules! db_span {
    ($name:literal) => {
        tracing::info_span!(
            target: "db_driver_tracing",
            $name,
            otel.name = field::Empty,
            span.kind = "client",
            component = COMPONENT_NAME,
            db.statement = field::Empty,
            "db.type" = field::Empty,
            db.instance = field::Empty,
            db.user = field::Empty,
            peer.address = field::Empty,
            peer.service = field::Empty,
            db.duration_ms = field::Empty,
            error = field::Empty,
            slow = field::Empty,
            sampling.priority = field::Empty,
            otel.status_code = field::Empty,
        )
    };
}

/// Everything a traced call needs besides its SQL: the tracer, the live
/// policy and the connection it runs on.
#[derive(Debug, Clone)]
pub struct TraceContext {
    tracer: Tracer,
    policy: TracingPolicy,
    connection_info: Arc<ConnectionInfo>,
    with_active_span_only: bool,
    ignored_statements: Arc<HashSet<String>>,
}

impl TraceContext {
    /// Context using the global tracer and the global policy.
    pub fn new(connection_info: Arc<ConnectionInfo>) -> Self {
        Self {
            tracer: Tracer::global(),
            policy: TracingPolicy::global(),
            connection_info,
            with_active_span_only: false,
            ignored_statements: Arc::new(HashSet::new()),
        }
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_policy(mut self, policy: TracingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Per-connection active-span-only flag, combined with the policy's.
    pub fn with_active_span_only(mut self, enabled: bool) -> Self {
        self.with_active_span_only = enabled;
        self
    }

    /// Per-connection ignored statements, in addition to the policy's.
    pub fn with_ignored_statements(mut self, statements: impl IntoIterator<Item = String>) -> Self {
        let mut ignored = HashSet::clone(&self.ignored_statements);
        ignored.extend(statements);
        self.ignored_statements = Arc::new(ignored);
        self
    }

    /// Same settings, different connection target.
    pub fn for_connection(&self, connection_info: Arc<ConnectionInfo>) -> Self {
        Self {
            connection_info,
            ..self.clone()
        }
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn policy(&self) -> &TracingPolicy {
        &self.policy
    }

    pub fn connection_info(&self) -> &Arc<ConnectionInfo> {
        &self.connection_info
    }

    pub fn is_active_span_only(&self) -> bool {
        self.with_active_span_only
    }

    pub fn ignored_statements(&self) -> &HashSet<String> {
        &self.ignored_statements
    }

    /// Run `f` inside a span for `operation`.
    ///
    /// The result of `f` is returned untouched; an `Err` only adds tags.
    pub fn call<T, E, F>(&self, operation: Operation, sql: Option<&str>, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: fmt::Display,
    {
        self.tracer.in_scope(|| {
            let active = self.start(operation, sql);
            let result = f();
            if let Err(err) = &result {
                active.record_error(err);
            }
            active.finish();
            result
        })
    }

    /// Async form of [`call`](Self::call). The span is entered each time the
    /// future is polled.
    pub async fn call_async<T, E, F>(&self, operation: Operation, sql: Option<&str>, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let Some((span, config)) = self.tracer.in_scope(|| self.open(&operation, sql)) else {
            return fut.await;
        };

        let mut pending = PendingSpan {
            span: span.clone(),
            started: Instant::now(),
            config,
            tracer: self.tracer.clone(),
            failed: None,
        };
        let result = match &self.tracer.dispatch {
            Some(dispatch) => fut.instrument(span).with_subscriber(dispatch.clone()).await,
            None => fut.instrument(span).await,
        };

        if let Err(err) = &result {
            self.tracer.in_scope(|| on_error(&pending.span, error_kind::<E>(), err));
        }
        pending.failed = Some(result.is_err());
        result
    }

    /// Open and enter a span for `operation` on the current thread.
    ///
    /// Must run with the context's tracer current (see [`Tracer::in_scope`]);
    /// [`call`](Self::call) takes care of that.
    pub fn start(&self, operation: Operation, sql: Option<&str>) -> ActiveSpan {
        match self.open(&operation, sql) {
            Some((span, config)) => ActiveSpan {
                armed: Some(Armed {
                    entered: span.entered(),
                    started: Instant::now(),
                    config,
                    tracer: self.tracer.clone(),
                    failed: Cell::new(false),
                }),
            },
            None => ActiveSpan::suppressed(),
        }
    }

    fn open(&self, operation: &Operation, sql: Option<&str>) -> Option<(Span, Arc<TracingConfig>)> {
        let config = self.policy.snapshot();
        if !self.should_trace(&config, sql) {
            return None;
        }
        let span = build_span(operation);
        decorate(&span, operation, sql, &self.connection_info);
        Some((span, config))
    }

    fn should_trace(&self, config: &TracingConfig, sql: Option<&str>) -> bool {
        if !config.trace_enabled {
            return false;
        }
        if (config.with_active_span_only || self.with_active_span_only) && Span::current().is_none() {
            return false;
        }
        match sql {
            Some(sql) => !(config.ignored_statements.contains(sql) || self.ignored_statements.contains(sql)),
            None => true,
        }
    }
}

fn build_span(operation: &Operation) -> Span {
    match operation {
        Operation::AcquireConnection => db_span!("AcquireConnection"),
        Operation::Query => db_span!("Query"),
        Operation::Update => db_span!("Update"),
        Operation::Execute => db_span!("Execute"),
        Operation::Batch => db_span!("Batch"),
        Operation::Custom(_) => db_span!("Custom"),
    }
}

fn decorate(span: &Span, operation: &Operation, sql: Option<&str>, info: &ConnectionInfo) {
    record_non_blank(span, "otel.name", Some(operation.name()));
    record_non_blank(span, "db.statement", sql);
    record_non_blank(span, "db.type", Some(info.db_type()));
    record_non_blank(span, "db.instance", info.db_instance());
    record_non_blank(span, "db.user", info.db_user());
    record_non_blank(span, "peer.address", info.db_peer());
    record_non_blank(span, "peer.service", info.peer_service());
}

// Blank tag values are skipped entirely; some exporters choke on them.
fn record_non_blank(span: &Span, field: &'static str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        span.record(field, value);
    }
}

fn on_error(span: &Span, kind: &str, error: &dyn fmt::Display) {
    span.record("error", true);
    tracing::error!(
        target: "db_driver_tracing",
        parent: span,
        event = "error",
        error.kind = kind,
        error.object = %error,
        "Database call failed"
    );
}

fn error_kind<E: ?Sized>() -> &'static str {
    let name = std::any::type_name::<E>();
    name.rsplit("::").next().unwrap_or(name)
}

fn complete(span: &Span, started: Instant, config: &TracingConfig, failed: bool) {
    let elapsed = started.elapsed();
    span.record("db.duration_ms", elapsed.as_millis() as u64);
    span.record("otel.status_code", if failed { "ERROR" } else { "OK" });

    let fast = config.exclude_fast_query_threshold;
    let slow = config.slow_query_threshold;
    if !fast.is_zero() && elapsed < fast {
        span.record("sampling.priority", 0_u64);
    } else if !slow.is_zero() && elapsed > slow {
        span.record("slow", true);
        tracing::warn!(
            target: "db_driver_tracing",
            parent: span,
            duration_ms = elapsed.as_millis() as u64,
            threshold_ms = slow.as_millis() as u64,
            "Slow query detected"
        );
    }
}

struct Armed {
    entered: EnteredSpan,
    started: Instant,
    config: Arc<TracingConfig>,
    tracer: Tracer,
    failed: Cell<bool>,
}

/// An entered span owned by one traced call.
///
/// Dropping it (or calling [`finish`](Self::finish)) records latency tags,
/// leaves the span and then closes it. A suppressed call holds no span and
/// every method is a no-op.
#[must_use = "the span finishes as soon as this guard is dropped"]
pub struct ActiveSpan {
    armed: Option<Armed>,
}

impl ActiveSpan {
    fn suppressed() -> Self {
        Self { armed: None }
    }

    /// Whether a real span backs this guard.
    pub fn is_recording(&self) -> bool {
        self.armed.is_some()
    }

    pub fn span(&self) -> Option<&Span> {
        self.armed.as_ref().map(|armed| &*armed.entered)
    }

    /// Tag the span as failed and attach an error event.
    pub fn record_error<E: fmt::Display + ?Sized>(&self, error: &E) {
        if let Some(armed) = &self.armed {
            armed.failed.set(true);
            armed
                .tracer
                .in_scope(|| on_error(&armed.entered, error_kind::<E>(), &error));
        }
    }

    pub fn finish(self) {
        drop(self);
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        let Some(armed) = self.armed.take() else {
            return;
        };
        if std::thread::panicking() && !armed.failed.get() {
            armed.failed.set(true);
            armed
                .tracer
                .in_scope(|| on_error(&armed.entered, "panic", &"panicked while the span was active"));
        }

        let span = armed.entered.exit();
        armed
            .tracer
            .in_scope(|| complete(&span, armed.started, &armed.config, armed.failed.get()));
        drop(span);
    }
}

/// Span of an async call. Completed on drop, which also covers a future
/// that is cancelled or unwinds before it resolves.
struct PendingSpan {
    span: Span,
    started: Instant,
    config: Arc<TracingConfig>,
    tracer: Tracer,
    /// Set once the wrapped future has resolved.
    failed: Option<bool>,
}

impl Drop for PendingSpan {
    fn drop(&mut self) {
        self.tracer.in_scope(|| {
            let failed = match self.failed {
                Some(failed) => failed,
                None if std::thread::panicking() => {
                    on_error(&self.span, "panic", &"panicked while the span was active");
                    true
                }
                None => {
                    on_error(&self.span, "cancelled", &"dropped before completion");
                    true
                }
            };
            complete(&self.span, self.started, &self.config, failed);
        });
    }
}

impl fmt::Debug for ActiveSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSpan")
            .field("recording", &self.is_recording())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::AcquireConnection.name(), "AcquireConnection");
        assert_eq!(Operation::Batch.to_string(), "Batch");
        assert_eq!(Operation::Custom("SlowQuery".into()).name(), "SlowQuery");
    }

    #[test]
    fn test_disabled_policy_passes_result_through() {
        let policy = TracingPolicy::new(TracingConfig::default().with_trace_enabled(false));
        let ctx = TraceContext::new(ConnectionInfo::unknown())
            .with_tracer(Tracer::noop())
            .with_policy(policy);

        let ok: Result<u64, String> = ctx.call(Operation::Update, Some("DELETE FROM t"), || Ok(3));
        assert_eq!(ok, Ok(3));

        let err: Result<u64, String> = ctx.call(Operation::Update, None, || Err("boom".to_string()));
        assert_eq!(err, Err("boom".to_string()));
    }

    #[test]
    fn test_suppressed_guard_is_inert() {
        let policy = TracingPolicy::new(TracingConfig::default().with_trace_enabled(false));
        let ctx = TraceContext::new(ConnectionInfo::unknown()).with_policy(policy);
        let active = ctx.start(Operation::Query, Some("SELECT 1"));
        assert!(!active.is_recording());
        assert!(active.span().is_none());
        active.record_error(&"ignored");
        active.finish();
    }

    #[test]
    fn test_noop_tracer_has_no_active_span() {
        assert!(!Tracer::noop().has_active_span());
    }

    #[test]
    fn test_ignored_statements_accumulate() {
        let ctx = TraceContext::new(ConnectionInfo::unknown())
            .with_ignored_statements(vec!["SELECT 1".to_string()])
            .with_ignored_statements(vec!["SELECT 2".to_string()]);
        assert_eq!(ctx.ignored_statements().len(), 2);
    }
}
