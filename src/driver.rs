//! Tracing driver.
//!
//! Accepts `jdbc:tracing:<vendor>:...` URLs (and, in interceptor mode, any
//! `jdbc:` URL), strips the tracing annotations, hands the real URL to the
//! first underlying driver that accepts it and wraps the connection it
//! returns.
//!
//! Two control tokens may be embedded in the URL:
//!
//! - `traceWithActiveSpanOnly=true` only traces calls made under an active
//!   span (`=false` is accepted and stripped too);
//! - `ignoreForTracing="SELECT 1"` never traces that exact statement. It may
//!   repeat, and `\"` escapes a quote inside the statement.
//!
//! Tokens may follow `;` or sit in the `?`/`&` query string.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

use crate::api::{Connection, Driver, Properties};
use crate::config::TracingPolicy;
use crate::connection::TracingConnection;
use crate::error::SqlError;
use crate::parser;
use crate::span::{Operation, TraceContext, Tracer};

pub const TRACING_URL_PREFIX: &str = "jdbc:tracing:";
const JDBC_URL_PREFIX: &str = "jdbc:";
const USER_PROPERTY: &str = "user";

static WITH_ACTIVE_SPAN_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"traceWithActiveSpanOnly=(true|false)[;&]?").unwrap());

static IGNORE_FOR_TRACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"ignoreForTracing="((?:\\"|[^"])*)"[;&]?"#).unwrap());

// Separators left adjacent once a token is cut out of the middle of a query.
static SEPARATOR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"([?&;])[&;]+").unwrap());

static GLOBAL_DRIVERS: Lazy<Arc<DriverList>> = Lazy::new(|| Arc::new(DriverList::new()));

/// A tracing URL split into the real URL and its control tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracingUrl {
    /// URL to hand to the underlying driver.
    pub url: String,
    pub with_active_span_only: bool,
    pub ignored_statements: Vec<String>,
}

impl TracingUrl {
    pub fn parse(url: &str) -> Self {
        let url = match url.strip_prefix(TRACING_URL_PREFIX) {
            Some(rest) => format!("{JDBC_URL_PREFIX}{rest}"),
            None => url.to_string(),
        };

        let active_span_token = WITH_ACTIVE_SPAN_ONLY
            .captures_iter(&url)
            .last()
            .map(|caps| &caps[1] == "true");
        let ignored_statements: Vec<String> = IGNORE_FOR_TRACING
            .captures_iter(&url)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().replace(r#"\""#, "\""))
            .collect();

        if active_span_token.is_none() && ignored_statements.is_empty() {
            return Self {
                url,
                ..Self::default()
            };
        }

        let cleaned = WITH_ACTIVE_SPAN_ONLY.replace_all(&url, "");
        let cleaned = IGNORE_FOR_TRACING.replace_all(&cleaned, "");
        let cleaned = SEPARATOR_RUN.replace_all(&cleaned, "$1");
        Self {
            url: cleaned.trim_end_matches(&['?', '&', ';'][..]).to_string(),
            with_active_span_only: active_span_token.unwrap_or(false),
            ignored_statements,
        }
    }
}

/// Finds the real driver for a de-annotated URL.
pub trait DriverResolver: Send + Sync {
    fn resolve(&self, url: &str) -> Option<Arc<dyn Driver>>;
}

impl<F> DriverResolver for F
where
    F: Fn(&str) -> Option<Arc<dyn Driver>> + Send + Sync,
{
    fn resolve(&self, url: &str) -> Option<Arc<dyn Driver>> {
        self(url)
    }
}

/// Ordered list of candidate drivers; the first one accepting a URL wins.
#[derive(Default)]
pub struct DriverList {
    drivers: RwLock<Vec<Arc<dyn Driver>>>,
}

impl DriverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide list used by [`TracingDriver::default`].
    pub fn global() -> Arc<DriverList> {
        Arc::clone(&GLOBAL_DRIVERS)
    }

    pub fn register(&self, driver: Arc<dyn Driver>) {
        self.drivers.write().push(driver);
    }

    /// Remove `driver` (compared by identity). Returns whether it was listed.
    pub fn deregister(&self, driver: &Arc<dyn Driver>) -> bool {
        let mut drivers = self.drivers.write();
        let before = drivers.len();
        drivers.retain(|d| !Arc::ptr_eq(d, driver));
        drivers.len() != before
    }

    pub fn len(&self) -> usize {
        self.drivers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.read().is_empty()
    }
}

impl DriverResolver for DriverList {
    fn resolve(&self, url: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .read()
            .iter()
            .find(|driver| !driver.is_tracing_driver() && driver.accepts_url(url))
            .cloned()
    }
}

impl fmt::Debug for DriverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverList").field("len", &self.len()).finish()
    }
}

/// Driver that traces connection acquisition and every statement run on
/// the connections it opens.
pub struct TracingDriver {
    resolver: Arc<dyn DriverResolver>,
    tracer: RwLock<Tracer>,
    policy: TracingPolicy,
}

impl TracingDriver {
    pub fn new(resolver: Arc<dyn DriverResolver>) -> Self {
        Self {
            resolver,
            tracer: RwLock::new(Tracer::global()),
            policy: TracingPolicy::global(),
        }
    }

    pub fn with_policy(mut self, policy: TracingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tracer(self, tracer: Tracer) -> Self {
        self.set_tracer(tracer);
        self
    }

    /// Replace the tracer used for connections opened from now on.
    pub fn set_tracer(&self, tracer: Tracer) {
        *self.tracer.write() = tracer;
    }

    pub fn tracer(&self) -> Tracer {
        self.tracer.read().clone()
    }

    pub fn policy(&self) -> &TracingPolicy {
        &self.policy
    }
}

impl Default for TracingDriver {
    fn default() -> Self {
        Self::new(DriverList::global())
    }
}

impl Driver for TracingDriver {
    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with(TRACING_URL_PREFIX)
            || (self.policy.snapshot().interceptor_mode && url.starts_with(JDBC_URL_PREFIX))
    }

    fn connect(&self, url: &str, info: &Properties) -> Result<Option<Box<dyn Connection>>, SqlError> {
        if !self.accepts_url(url) {
            return Ok(None);
        }

        let TracingUrl {
            url: real_url,
            with_active_span_only,
            ignored_statements,
        } = TracingUrl::parse(url);

        let Some(driver) = self.resolver.resolve(&real_url) else {
            tracing::debug!(url = %real_url, "No underlying driver accepts URL");
            return Err(SqlError::no_suitable_driver(&real_url));
        };

        let mut connection_info = parser::parse(&real_url);
        if let Some(user) = info.get(USER_PROPERTY).filter(|u| !u.is_empty()) {
            connection_info = Arc::new(connection_info.with_user(user.as_str()));
        }
        tracing::debug!(url = %real_url, db = %connection_info, "Resolved underlying driver");

        let ctx = TraceContext::new(connection_info)
            .with_tracer(self.tracer())
            .with_policy(self.policy.clone())
            .with_active_span_only(with_active_span_only)
            .with_ignored_statements(ignored_statements);

        let connection = ctx.call(Operation::AcquireConnection, None, || driver.connect(&real_url, info))?;
        Ok(connection.map(|c| Box::new(TracingConnection::new(c, ctx)) as Box<dyn Connection>))
    }

    fn is_tracing_driver(&self) -> bool {
        true
    }
}

impl fmt::Debug for TracingDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingDriver")
            .field("tracer", &*self.tracer.read())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
