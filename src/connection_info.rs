//! Normalized description of a database connection target.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Type reported for targets no parser could make sense of.
pub const UNKNOWN_DB_TYPE: &str = "unknown";

static UNKNOWN: Lazy<Arc<ConnectionInfo>> = Lazy::new(|| {
    Arc::new(ConnectionInfo {
        db_type: UNKNOWN_DB_TYPE.to_string(),
        db_user: None,
        db_instance: None,
        db_peer: None,
        db_port: None,
        peer_service: None,
    })
});

/// Parsed, immutable description of a database target.
///
/// Built once per connection attempt and shared through an `Arc` by every
/// span derived from that connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    db_type: String,
    db_user: Option<String>,
    db_instance: Option<String>,
    db_peer: Option<String>,
    db_port: Option<i32>,
    peer_service: Option<String>,
}

impl ConnectionInfo {
    /// Start building a descriptor for the given vendor.
    pub fn builder(db_type: impl Into<String>) -> ConnectionInfoBuilder {
        ConnectionInfoBuilder {
            db_type: db_type.into(),
            db_user: None,
            db_instance: None,
            db_peer: None,
            db_port: None,
        }
    }

    /// The shared "could not parse" descriptor.
    ///
    /// Every call returns the same allocation, so `Arc::ptr_eq` can be used
    /// to tell it apart from a descriptor that merely has the same fields.
    pub fn unknown() -> Arc<ConnectionInfo> {
        Arc::clone(&UNKNOWN)
    }

    /// Whether this is the shared unknown descriptor.
    pub fn is_unknown(&self) -> bool {
        std::ptr::eq(self, Arc::as_ptr(&UNKNOWN))
    }

    pub fn db_type(&self) -> &str {
        &self.db_type
    }

    pub fn db_user(&self) -> Option<&str> {
        self.db_user.as_deref()
    }

    pub fn db_instance(&self) -> Option<&str> {
        self.db_instance.as_deref()
    }

    /// `host:port`, or a comma separated list of them for clustered targets.
    pub fn db_peer(&self) -> Option<&str> {
        self.db_peer.as_deref()
    }

    /// Port of a single-host target.
    pub fn db_port(&self) -> Option<i32> {
        self.db_port
    }

    /// `instance[type(peer)]`, or `type(peer)` when there is no instance.
    pub fn peer_service(&self) -> Option<&str> {
        self.peer_service.as_deref()
    }

    /// Copy of this descriptor reporting the given user.
    pub fn with_user(&self, user: impl Into<String>) -> ConnectionInfo {
        ConnectionInfoBuilder {
            db_type: self.db_type.clone(),
            db_user: Some(user.into()),
            db_instance: self.db_instance.clone(),
            db_peer: self.db_peer.clone(),
            db_port: self.db_port,
        }
        .build()
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.peer_service {
            Some(service) => f.write_str(service),
            None => f.write_str(&self.db_type),
        }
    }
}

/// Builder for [`ConnectionInfo`].
#[derive(Debug, Clone)]
pub struct ConnectionInfoBuilder {
    db_type: String,
    db_user: Option<String>,
    db_instance: Option<String>,
    db_peer: Option<String>,
    db_port: Option<i32>,
}

impl ConnectionInfoBuilder {
    /// Single host target; the peer becomes `host:port`.
    pub fn host_port(mut self, host: &str, port: i32) -> Self {
        self.db_peer = Some(format!("{host}:{port}"));
        self.db_port = Some(port);
        self
    }

    /// Preformatted peer, e.g. a comma joined host list.
    pub fn peer(mut self, peer: impl Into<String>) -> Self {
        self.db_peer = Some(peer.into());
        self
    }

    pub fn port(mut self, port: i32) -> Self {
        self.db_port = Some(port);
        self
    }

    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.db_instance = Some(instance.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.db_user = Some(user.into());
        self
    }

    pub fn build(self) -> ConnectionInfo {
        let peer_service = self.db_peer.as_deref().map(|peer| {
            match self.db_instance.as_deref().filter(|i| !i.is_empty()) {
                Some(instance) => format!("{}[{}({})]", instance, self.db_type, peer),
                None => format!("{}({})", self.db_type, peer),
            }
        });

        ConnectionInfo {
            db_type: self.db_type,
            db_user: self.db_user,
            db_instance: self.db_instance,
            db_peer: self.db_peer,
            db_port: self.db_port,
            peer_service,
        }
    }
}
