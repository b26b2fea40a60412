//! SQL Server URLs: `jdbc:sqlserver://[host][\instanceName][:port][;key=value...]`.

use super::ConnectionUrlParser;
use crate::connection_info::ConnectionInfo;

const DB_TYPE: &str = "sqlserver";
const DEFAULT_PORT: i32 = 1433;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlServerUrlParser;

impl ConnectionUrlParser for SqlServerUrlParser {
    fn parse(&self, url: &str) -> Option<ConnectionInfo> {
        let builder = ConnectionInfo::builder(DB_TYPE);
        let Some(marker) = url.find("://") else {
            return Some(builder.build());
        };

        let (authority, options) = match url[marker + 3..].split_once(';') {
            Some((authority, options)) => (authority, options),
            None => (&url[marker + 3..], ""),
        };

        let mut server = "";
        let mut port = DEFAULT_PORT;
        let mut database = None;
        for (key, value) in properties(options) {
            if key.eq_ignore_ascii_case("servername") {
                server = value;
            } else if key.eq_ignore_ascii_case("portnumber") {
                port = value.parse().unwrap_or(port);
            } else if key.eq_ignore_ascii_case("databasename") {
                database = Some(value);
            }
        }

        if !authority.is_empty() {
            server = authority;
        }
        if let Some((host, explicit)) = server.split_once(':') {
            port = explicit.trim().parse().unwrap_or(port);
            server = host;
        }
        if let Some((host, _named_instance)) = server.split_once('\\') {
            server = host;
        }

        let mut builder = builder;
        if !server.is_empty() {
            builder = builder.host_port(server, port);
        }
        if let Some(database) = database.filter(|d| !d.is_empty()) {
            builder = builder.instance(database);
        }
        Some(builder.build())
    }
}

fn properties(options: &str) -> impl Iterator<Item = (&str, &str)> + '_ {
    options
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> ConnectionInfo {
        SqlServerUrlParser.parse(url).unwrap()
    }

    #[test]
    fn test_named_instance_with_port() {
        let info = parse(r"jdbc:sqlserver://localhost\instanceName:1435");
        assert_eq!(info.db_type(), "sqlserver");
        assert_eq!(info.db_peer(), Some("localhost:1435"));
        assert_eq!(info.db_instance(), None);
    }

    #[test]
    fn test_default_port() {
        let info = parse("jdbc:sqlserver://localhost;integratedSecurity=true;");
        assert_eq!(info.db_peer(), Some("localhost:1433"));
        assert_eq!(info.db_instance(), None);
    }

    #[test]
    fn test_database_name_property() {
        let cases = [
            "jdbc:sqlserver://localhost;databaseName=AdventureWorks;integratedSecurity=true;",
            "jdbc:sqlserver://localhost:1433;databaseName=AdventureWorks;integratedSecurity=true;",
            "jdbc:sqlserver://localhost;databaseName=AdventureWorks;integratedSecurity=true;applicationName=MyApp;",
        ];
        for url in cases {
            let info = parse(url);
            assert_eq!(info.db_peer(), Some("localhost:1433"), "{url}");
            assert_eq!(info.db_instance(), Some("AdventureWorks"), "{url}");
        }
    }

    #[test]
    fn test_server_from_properties() {
        let info = parse("jdbc:sqlserver://;serverName=reports;portNumber=1500;databaseName=sales");
        assert_eq!(info.db_peer(), Some("reports:1500"));
        assert_eq!(info.db_instance(), Some("sales"));
        assert_eq!(info.peer_service(), Some("sales[sqlserver(reports:1500)]"));
    }
}
