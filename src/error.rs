//! Error types.

use std::error::Error as StdError;

/// Error raised by the wrapped database client API.
///
/// Drivers, connections and statements all report failures with this type.
/// The tracing wrappers hand these values back to the caller exactly as the
/// underlying implementation produced them.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SqlError {
    message: String,
    sql_state: Option<String>,
    vendor_code: i32,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl SqlError {
    /// Create an error with a message and no SQLSTATE.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            vendor_code: 0,
            source: None,
        }
    }

    /// Attach a five-character SQLSTATE code.
    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    /// Attach the vendor specific error code.
    pub fn with_vendor_code(mut self, code: i32) -> Self {
        self.vendor_code = code;
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// No registered driver accepted the URL.
    pub fn no_suitable_driver(url: &str) -> Self {
        Self::new(format!("Unable to find a driver that accepts {url}")).with_sql_state("08001")
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }

    pub fn vendor_code(&self) -> i32 {
        self.vendor_code
    }
}

/// Error returned when registering a connection URL parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("{prefix} is already registered")]
    AlreadyRegistered { prefix: String },

    #[error("url prefix can not be empty")]
    EmptyPrefix,
}
