//! Connection URL parsing.
//!
//! A [`ParserRegistry`] maps URL prefixes to vendor parsers. Prefixes are
//! tried in registration order, so a specific driver variant registered
//! before a generic one wins even when the generic prefix also matches.
//!
//! The process-wide registry used by the tracing driver is reachable through
//! the free functions [`parse`], [`is_registered`], [`register_parser`] and
//! [`register_parser_if_absent`].

mod h2;
mod host_list;
mod matcher;
mod oracle;
mod sqlserver;

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::connection_info::ConnectionInfo;
use crate::error::RegistrationError;

pub use h2::H2UrlParser;
pub use host_list::HostListUrlParser;
pub use matcher::MatcherUrlParser;
pub use oracle::OracleUrlParser;
pub use sqlserver::SqlServerUrlParser;

pub const MYSQL_URL_PREFIX: &str = "jdbc:mysql";
pub const ORACLE_URL_PREFIX: &str = "jdbc:oracle";
pub const H2_URL_PREFIX: &str = "jdbc:h2";
pub const POSTGRESQL_URL_PREFIX: &str = "jdbc:postgresql";
pub const MARIADB_URL_PREFIX: &str = "jdbc:mariadb";
pub const SQLSERVER_URL_PREFIX: &str = "jdbc:sqlserver";
pub const DB2_URL_PREFIX: &str = "jdbc:db2";
pub const AS400_URL_PREFIX: &str = "jdbc:as400";

/// Decomposes one family of connection URL grammar.
///
/// Implementations are pure functions of their input. Returning `None`
/// makes the registry fall back to [`ConnectionInfo::unknown`]; a parser
/// must never panic on malformed input.
pub trait ConnectionUrlParser: Send + Sync {
    fn parse(&self, url: &str) -> Option<ConnectionInfo>;
}

impl<F> ConnectionUrlParser for F
where
    F: Fn(&str) -> Option<ConnectionInfo> + Send + Sync,
{
    fn parse(&self, url: &str) -> Option<ConnectionInfo> {
        self(url)
    }
}

type Entry = (String, Arc<dyn ConnectionUrlParser>);

/// Ordered prefix to parser mapping.
///
/// Lookups take a read lock only long enough to pick the parser, so
/// concurrent parsing never observes a half-applied registration.
pub struct ParserRegistry {
    parsers: RwLock<Vec<Entry>>,
}

impl ParserRegistry {
    /// A registry with no parsers.
    pub fn empty() -> Self {
        Self {
            parsers: RwLock::new(Vec::new()),
        }
    }

    /// A registry holding the built-in vendor parsers in their documented
    /// order: mysql, oracle, h2, postgresql, mariadb, sqlserver, db2, as400.
    pub fn with_defaults() -> Self {
        let defaults = vec![
            entry(MYSQL_URL_PREFIX, HostListUrlParser::mysql()),
            entry(ORACLE_URL_PREFIX, OracleUrlParser),
            entry(H2_URL_PREFIX, H2UrlParser),
            entry(POSTGRESQL_URL_PREFIX, HostListUrlParser::postgresql()),
            entry(MARIADB_URL_PREFIX, HostListUrlParser::mariadb()),
            entry(SQLSERVER_URL_PREFIX, SqlServerUrlParser),
            entry(DB2_URL_PREFIX, MatcherUrlParser::db2()),
            entry(AS400_URL_PREFIX, MatcherUrlParser::as400()),
        ];
        Self {
            parsers: RwLock::new(defaults),
        }
    }

    /// Parse `url` with the first parser whose prefix matches.
    ///
    /// The URL is lower-cased before matching and parsing. Unrecognized URLs
    /// yield the shared unknown descriptor.
    pub fn parse(&self, url: &str) -> Arc<ConnectionInfo> {
        let lower = url.to_lowercase();
        let parser = {
            let parsers = self.parsers.read();
            parsers
                .iter()
                .find(|(prefix, _)| lower.starts_with(prefix.as_str()))
                .map(|(_, parser)| Arc::clone(parser))
        };

        match parser.and_then(|p| p.parse(&lower)) {
            Some(info) => Arc::new(info),
            None => ConnectionInfo::unknown(),
        }
    }

    /// Case-insensitive check for a registered prefix.
    pub fn is_registered(&self, prefix: &str) -> bool {
        let prefix = prefix.to_lowercase();
        self.parsers.read().iter().any(|(p, _)| *p == prefix)
    }

    /// Append a parser; fails if the prefix is taken.
    pub fn register(
        &self,
        prefix: &str,
        parser: impl ConnectionUrlParser + 'static,
    ) -> Result<(), RegistrationError> {
        let prefix = normalize_prefix(prefix)?;
        let mut parsers = self.parsers.write();
        if parsers.iter().any(|(p, _)| *p == prefix) {
            return Err(RegistrationError::AlreadyRegistered { prefix });
        }
        tracing::debug!(prefix = %prefix, "registered connection url parser");
        parsers.push(entry(&prefix, parser));
        Ok(())
    }

    /// Append a parser unless the prefix is taken. Returns whether it was added.
    pub fn register_if_absent(
        &self,
        prefix: &str,
        parser: impl ConnectionUrlParser + 'static,
    ) -> bool {
        match self.register(prefix, parser) {
            Ok(()) => true,
            Err(RegistrationError::AlreadyRegistered { .. }) => false,
            Err(err) => {
                tracing::debug!(error = %err, "ignored connection url parser registration");
                false
            }
        }
    }

    /// Registered prefixes in lookup order.
    pub fn prefixes(&self) -> Vec<String> {
        self.parsers.read().iter().map(|(p, _)| p.clone()).collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("prefixes", &self.prefixes())
            .finish()
    }
}

fn entry(prefix: &str, parser: impl ConnectionUrlParser + 'static) -> Entry {
    (prefix.to_string(), Arc::new(parser))
}

fn normalize_prefix(prefix: &str) -> Result<String, RegistrationError> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(RegistrationError::EmptyPrefix);
    }
    Ok(prefix.to_lowercase())
}

static GLOBAL_REGISTRY: Lazy<ParserRegistry> = Lazy::new(ParserRegistry::with_defaults);

/// The process-wide registry.
pub fn global_registry() -> &'static ParserRegistry {
    &GLOBAL_REGISTRY
}

/// Parse `url` with the process-wide registry.
pub fn parse(url: &str) -> Arc<ConnectionInfo> {
    GLOBAL_REGISTRY.parse(url)
}

pub fn is_registered(prefix: &str) -> bool {
    GLOBAL_REGISTRY.is_registered(prefix)
}

pub fn register_parser(
    prefix: &str,
    parser: impl ConnectionUrlParser + 'static,
) -> Result<(), RegistrationError> {
    GLOBAL_REGISTRY.register(prefix, parser)
}

pub fn register_parser_if_absent(prefix: &str, parser: impl ConnectionUrlParser + 'static) -> bool {
    GLOBAL_REGISTRY.register_if_absent(prefix, parser)
}

/// Split a `host[:port]` token, substituting `default_port` when the port
/// is missing or not a number.
pub(crate) fn split_host_port(token: &str, default_port: i32) -> (&str, i32) {
    match token.rsplit_once(':') {
        // A colon inside `[...]` belongs to an IPv6 literal.
        Some((host, port)) if !host.is_empty() && !port.contains(']') => match port.trim().parse::<i32>() {
            Ok(port) => (host, port),
            Err(_) => (host, default_port),
        },
        _ => (token, default_port),
    }
}

/// Index of the first of `delimiters` at or after `from`.
pub(crate) fn find_any(url: &str, from: usize, delimiters: &[char]) -> Option<usize> {
    url.get(from..)?.find(delimiters).map(|i| i + from)
}
