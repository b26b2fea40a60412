//! Oracle thin/oci URLs.
//!
//! Three shapes are understood:
//!
//! - easy connect: `@[//]host[:port]/service[:server][/instance]`
//! - legacy colon: `@host[:port]:sid`, `@host:port`, `@host`
//! - TNS descriptor: `@(DESCRIPTION=(ADDRESS=(HOST=..)(PORT=..))...(SERVICE_NAME=..))`

use once_cell::sync::Lazy;
use regex::Regex;

use super::{split_host_port, ConnectionUrlParser};
use crate::connection_info::{ConnectionInfo, ConnectionInfoBuilder};

const DB_TYPE: &str = "oracle";
const DEFAULT_PORT: i32 = 1521;

static TNS_DESCRIPTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)DESCRIPTION").unwrap());

static TNS_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*ADDRESS\s*=((?:\s*\([^()]*\))*)\s*\)").unwrap());

static TNS_ADDRESS_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*(HOST|PORT)\s*=\s*([^()]*?)\s*\)").unwrap());

static TNS_SERVICE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*SERVICE_NAME\s*=\s*([^()]*?)\s*\)").unwrap());

static TNS_SID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(\s*SID\s*=\s*([^()]*?)\s*\)").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OracleUrlParser;

impl ConnectionUrlParser for OracleUrlParser {
    fn parse(&self, url: &str) -> Option<ConnectionInfo> {
        let builder = ConnectionInfo::builder(DB_TYPE);
        let info = if TNS_DESCRIPTION.is_match(url) {
            tns_descriptor(url, builder)
        } else {
            easy_connect(url, builder)
        };
        Some(info)
    }
}

fn tns_descriptor(url: &str, builder: ConnectionInfoBuilder) -> ConnectionInfo {
    let peers: Vec<String> = TNS_ADDRESS
        .captures_iter(url)
        .filter_map(|caps| caps.get(1))
        .filter_map(|group| address_peer(group.as_str()))
        .collect();

    let mut builder = builder;
    if !peers.is_empty() {
        builder = builder.peer(peers.join(","));
    }

    let service = TNS_SERVICE_NAME
        .captures(url)
        .or_else(|| TNS_SID.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());
    if let Some(service) = service {
        builder = builder.instance(service);
    }

    builder.build()
}

/// `host:port` from the HOST and PORT entries of a single ADDRESS group.
fn address_peer(group: &str) -> Option<String> {
    let mut host = None;
    let mut port = None;
    for caps in TNS_ADDRESS_PART.captures_iter(group) {
        let value = caps.get(2).map_or("", |m| m.as_str());
        if caps[1].eq_ignore_ascii_case("host") {
            host.get_or_insert(value);
        } else {
            port.get_or_insert(value);
        }
    }
    let port = port.and_then(|p| p.parse::<i32>().ok()).unwrap_or(DEFAULT_PORT);
    host.map(|host| format!("{host}:{port}"))
}

fn easy_connect(url: &str, builder: ConnectionInfoBuilder) -> ConnectionInfo {
    let Some(at) = url.rfind('@') else {
        return builder.build();
    };
    let rest = &url[at + 1..];
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let rest = rest.split('?').next().unwrap_or(rest).trim();
    if rest.is_empty() {
        return builder.build();
    }

    if let Some((authority, path)) = rest.split_once('/') {
        let (host, port) = split_host_port(authority, DEFAULT_PORT);
        let service = path.split(&[':', '/'][..]).next().unwrap_or(path);
        return builder.host_port(host, port).instance(service).build();
    }

    let parts: Vec<&str> = rest.split(':').collect();
    match parts.as_slice() {
        [host, second] => match second.parse::<i32>() {
            Ok(port) => builder.host_port(host, port).instance(*host),
            Err(_) => builder.host_port(host, DEFAULT_PORT).instance(*second),
        },
        [host, second, .., sid] => {
            let port = second.parse().unwrap_or(DEFAULT_PORT);
            builder.host_port(host, port).instance(*sid)
        }
        _ => builder.host_port(rest, DEFAULT_PORT).instance(rest),
    }
    .build()
}
