//! Parsers driven by a single anchored regular expression.
//!
//! The pattern must define a `host` group and may define `port` and
//! `instance` groups.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ConnectionUrlParser;
use crate::connection_info::ConnectionInfo;

static DB2_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^jdbc:db2://(?P<host>[^:/;]+)(?::(?P<port>\d+))?/(?P<instance>[^:;?/]+)(?:[:;?](?P<options>.*))?$").unwrap()
});

static AS400_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^jdbc:as400://(?P<host>[^/;]+)(?:/(?P<instance>[^/;]*))?/?(?:;(?P<options>.*))?$").unwrap()
});

#[derive(Debug, Clone)]
pub struct MatcherUrlParser {
    pattern: Regex,
    db_type: String,
    default_port: Option<i32>,
}

impl MatcherUrlParser {
    /// `default_port` is appended to hosts matched without a `port` group;
    /// `None` reports the bare host as the peer.
    pub fn new(pattern: Regex, db_type: impl Into<String>, default_port: Option<i32>) -> Self {
        Self {
            pattern,
            db_type: db_type.into(),
            default_port,
        }
    }

    /// `jdbc:db2://host[:port]/database[:options]`
    pub fn db2() -> Self {
        Self::new(DB2_PATTERN.clone(), "db2", Some(50000))
    }

    /// `jdbc:as400://host[.domain][/instance][/][;option=value...]`
    pub fn as400() -> Self {
        Self::new(AS400_PATTERN.clone(), "as400", None)
    }
}

impl ConnectionUrlParser for MatcherUrlParser {
    fn parse(&self, url: &str) -> Option<ConnectionInfo> {
        let mut builder = ConnectionInfo::builder(self.db_type.as_str());
        let Some(caps) = self.pattern.captures(url) else {
            return Some(builder.build());
        };
        let Some(host) = caps.name("host").map(|m| m.as_str()) else {
            return Some(builder.build());
        };

        let port = caps
            .name("port")
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .or(self.default_port);
        builder = match port {
            Some(port) => builder.host_port(host, port),
            None => builder.peer(host),
        };

        if let Some(instance) = caps.name("instance").filter(|m| !m.as_str().is_empty()) {
            builder = builder.instance(instance.as_str());
        }
        Some(builder.build())
    }
}
