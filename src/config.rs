//! Configuration for tracing behavior.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Policy deciding which database calls get spans and how they are tagged.
///
/// # Example
///
/// ```rust
/// use db_driver_tracing::TracingConfig;
/// use std::time::Duration;
///
/// let config = TracingConfig::default()
///     .with_ignored_statement("SELECT 1")
///     .with_slow_query_threshold(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Master switch. When off no spans are created at all.
    /// Default: `true`
    pub trace_enabled: bool,

    /// Only trace calls made while another span is active.
    /// Default: `false`
    pub with_active_span_only: bool,

    /// Statements that are never traced (exact match on the SQL text).
    pub ignored_statements: HashSet<String>,

    /// Calls slower than this are tagged `slow = true`.
    /// Default: zero (disabled)
    pub slow_query_threshold: Duration,

    /// Calls faster than this are tagged with sampling priority 0 so that
    /// samplers can drop them.
    /// Default: zero (disabled)
    pub exclude_fast_query_threshold: Duration,

    /// Let the tracing driver accept every `jdbc:` URL, not only
    /// `jdbc:tracing:` ones.
    /// Default: `false`
    pub interceptor_mode: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            trace_enabled: true,
            with_active_span_only: false,
            ignored_statements: HashSet::new(),
            slow_query_threshold: Duration::ZERO,
            exclude_fast_query_threshold: Duration::ZERO,
            interceptor_mode: false,
        }
    }
}

impl TracingConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_enabled(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    /// Suppress spans for calls made outside of any active span.
    pub fn with_active_span_only(mut self, enabled: bool) -> Self {
        self.with_active_span_only = enabled;
        self
    }

    /// Never trace this exact SQL text.
    pub fn with_ignored_statement(mut self, sql: impl Into<String>) -> Self {
        self.ignored_statements.insert(sql.into());
        self
    }

    /// Set the threshold above which calls are tagged as slow.
    ///
    /// `Duration::ZERO` disables the check.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Set the threshold below which calls get a low sampling priority.
    ///
    /// `Duration::ZERO` disables the check.
    pub fn with_exclude_fast_query_threshold(mut self, threshold: Duration) -> Self {
        self.exclude_fast_query_threshold = threshold;
        self
    }

    pub fn with_interceptor_mode(mut self, enabled: bool) -> Self {
        self.interceptor_mode = enabled;
        self
    }

    /// Create a development-friendly configuration that flags anything
    /// slower than 100ms.
    pub fn development() -> Self {
        Self {
            slow_query_threshold: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Create a production configuration: slow calls above one second, calls
    /// under a millisecond deprioritized for sampling.
    pub fn production() -> Self {
        Self {
            slow_query_threshold: Duration::from_secs(1),
            exclude_fast_query_threshold: Duration::from_millis(1),
            ..Self::default()
        }
    }
}

static GLOBAL_POLICY: Lazy<TracingPolicy> = Lazy::new(TracingPolicy::default);

/// Live, shared handle on a [`TracingConfig`].
///
/// Components read one [`snapshot`](Self::snapshot) per traced call, so a
/// concurrent update never yields a half-old, half-new tag set on a span.
/// Updates are last-writer-wins.
#[derive(Debug, Clone, Default)]
pub struct TracingPolicy {
    inner: Arc<RwLock<Arc<TracingConfig>>>,
}

impl TracingPolicy {
    /// A policy handle not shared with anybody else.
    pub fn new(config: TracingConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// The process-wide policy used when no explicit one is supplied.
    pub fn global() -> Self {
        GLOBAL_POLICY.clone()
    }

    /// Current configuration.
    pub fn snapshot(&self) -> Arc<TracingConfig> {
        self.inner.read().clone()
    }

    pub fn replace(&self, config: TracingConfig) {
        *self.inner.write() = Arc::new(config);
    }

    /// Apply `f` to a copy of the current configuration and publish it.
    pub fn update(&self, f: impl FnOnce(&mut TracingConfig)) {
        let mut guard = self.inner.write();
        let mut config = (**guard).clone();
        f(&mut config);
        *guard = Arc::new(config);
    }

    pub fn set_trace_enabled(&self, enabled: bool) {
        self.update(|c| c.trace_enabled = enabled);
    }

    pub fn set_interceptor_mode(&self, enabled: bool) {
        self.update(|c| c.interceptor_mode = enabled);
    }

    pub fn set_slow_query_threshold(&self, threshold: Duration) {
        self.update(|c| c.slow_query_threshold = threshold);
    }

    pub fn set_exclude_fast_query_threshold(&self, threshold: Duration) {
        self.update(|c| c.exclude_fast_query_threshold = threshold);
    }
}

impl From<TracingConfig> for TracingPolicy {
    fn from(config: TracingConfig) -> Self {
        Self::new(config)
    }
}
