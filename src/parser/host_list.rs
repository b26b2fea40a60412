//! Parser for `scheme://host[:port][,host[:port]...][/database][?query]` URLs.

use super::{find_any, split_host_port, ConnectionUrlParser};
use crate::connection_info::ConnectionInfo;

/// Shared grammar of MySQL, MariaDB and PostgreSQL style URLs.
///
/// Hosts without a port get the vendor default. Multi-host authorities
/// (replication, load balancing) become a comma separated peer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostListUrlParser {
    db_type: &'static str,
    default_port: i32,
}

impl HostListUrlParser {
    pub const fn new(db_type: &'static str, default_port: i32) -> Self {
        Self {
            db_type,
            default_port,
        }
    }

    pub const fn mysql() -> Self {
        Self::new("mysql", 3306)
    }

    pub const fn mariadb() -> Self {
        Self::new("mariadb", 3306)
    }

    pub const fn postgresql() -> Self {
        Self::new("postgresql", 5432)
    }

    fn peer_list(&self, hosts: &[&str]) -> String {
        hosts
            .iter()
            .map(|host| {
                if host.contains(':') {
                    host.to_string()
                } else {
                    format!("{}:{}", host, self.default_port)
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl ConnectionUrlParser for HostListUrlParser {
    fn parse(&self, url: &str) -> Option<ConnectionInfo> {
        let builder = ConnectionInfo::builder(self.db_type);
        let Some(marker) = url.find("//") else {
            return Some(builder.build());
        };

        let start = marker + 2;
        let end = find_any(url, start, &['/', '?']).unwrap_or(url.len());
        let hosts: Vec<&str> = url[start..end]
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .collect();

        let builder = match hosts.as_slice() {
            [] => builder,
            [single] => {
                let (host, port) = split_host_port(single, self.default_port);
                builder.host_port(host, port)
            }
            many => builder.peer(self.peer_list(many)),
        };

        Some(builder.instance(database_name(url, end)).build())
    }
}

/// Path segment following the authority, up to the query string.
fn database_name(url: &str, authority_end: usize) -> &str {
    if !url[authority_end..].starts_with('/') {
        return "";
    }
    let start = authority_end + 1;
    let end = find_any(url, start, &['?']).unwrap_or(url.len());
    &url[start..end]
}
