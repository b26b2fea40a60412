//! H2 URLs: embedded (`file:`, implicit path), in-memory (`mem:`) and
//! server mode (`tcp://` / `ssl://`).

use super::{find_any, split_host_port, ConnectionUrlParser};
use crate::connection_info::ConnectionInfo;

const DB_TYPE: &str = "h2";
const SCHEME: &str = "jdbc:h2:";
const DEFAULT_PORT: i32 = 8084;
const LOCALHOST: &str = "localhost";
/// Port reported for databases that have no network peer.
const NO_PORT: i32 = -1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct H2UrlParser;

impl ConnectionUrlParser for H2UrlParser {
    fn parse(&self, url: &str) -> Option<ConnectionInfo> {
        let builder = ConnectionInfo::builder(DB_TYPE);
        let Some(rest) = strip_prefix_ignore_case(url, SCHEME) else {
            return Some(builder.build());
        };

        let is_server = ["tcp:", "ssl:"]
            .iter()
            .any(|mode| strip_prefix_ignore_case(rest, mode).is_some());
        if !is_server {
            let path = ["file:", "mem:"]
                .iter()
                .find_map(|mode| strip_prefix_ignore_case(rest, mode))
                .unwrap_or(rest);
            let name = path.split(';').next().unwrap_or(path);
            return Some(builder.host_port(LOCALHOST, NO_PORT).instance(name).build());
        }

        let Some(marker) = rest.find("//") else {
            return Some(builder.build());
        };
        let start = marker + 2;
        let end = find_any(rest, start, &['/', ';']).unwrap_or(rest.len());
        let (host, port) = split_host_port(&rest[start..end], DEFAULT_PORT);
        let path = rest[end..].split(';').next().unwrap_or("");
        let name = path.rsplit('/').next().unwrap_or(path);

        Some(builder.host_port(host, port).instance(name).build())
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> ConnectionInfo {
        H2UrlParser.parse(url).unwrap()
    }

    #[test]
    fn test_embedded_file() {
        let info = parse("jdbc:h2:file:/data/sample");
        assert_eq!(info.db_type(), "h2");
        assert_eq!(info.db_instance(), Some("/data/sample"));
        assert_eq!(info.db_peer(), Some("localhost:-1"));
        assert_eq!(info.db_port(), Some(-1));
    }

    #[test]
    fn test_embedded_file_on_windows() {
        let info = parse("jdbc:h2:file:c:/data/sample");
        assert_eq!(info.db_instance(), Some("c:/data/sample"));
        assert_eq!(info.db_peer(), Some("localhost:-1"));
    }

    #[test]
    fn test_memory_mode() {
        let info = parse("jdbc:h2:mem:test_mem");
        assert_eq!(info.db_instance(), Some("test_mem"));
        assert_eq!(info.db_peer(), Some("localhost:-1"));
    }

    #[test]
    fn test_implicit_embedded_with_options() {
        let info = parse("jdbc:h2:~/test;MODE=MySQL;DB_CLOSE_DELAY=-1");
        assert_eq!(info.db_instance(), Some("~/test"));
        assert_eq!(info.db_peer(), Some("localhost:-1"));
    }

    #[test]
    fn test_server_mode() {
        let info = parse("jdbc:h2:tcp://localhost:8084/~/sample");
        assert_eq!(info.db_instance(), Some("sample"));
        assert_eq!(info.db_peer(), Some("localhost:8084"));
    }

    #[test]
    fn test_server_mode_default_port() {
        let info = parse("jdbc:h2:ssl://dbhost/data/orders;CIPHER=AES");
        assert_eq!(info.db_instance(), Some("orders"));
        assert_eq!(info.db_peer(), Some("dbhost:8084"));
    }
}
