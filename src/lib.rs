//! # db-driver-tracing
//!
//! Span instrumentation for relational database clients.
//!
//! Every connection acquisition, query, update, generic execute and batch run
//! through the wrappers in this crate produces one `tracing` span, nested
//! under whatever span is current, tagged with what is known about the
//! database target. Targets are described by parsing the connection URL with
//! a registry of vendor parsers (MySQL, MariaDB, PostgreSQL, Oracle, H2,
//! SQL Server, DB2, AS/400, plus any registered at runtime).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use db_driver_tracing::prelude::*;
//!
//! let drivers = Arc::new(DriverList::new());
//! drivers.register(Arc::new(MyVendorDriver::default()));
//!
//! let driver = TracingDriver::new(drivers);
//! let mut conn = driver
//!     .connect("jdbc:tracing:postgresql://db:5432/app", &Properties::new())?
//!     .expect("url accepted");
//!
//! // One "Query" span, tagged db.type=postgresql, peer.address=db:5432, ...
//! let rows = conn.create_statement()?.execute_query("SELECT * FROM users")?;
//! ```
//!
//! SeaORM connections are covered by [`TracedConnection`] (feature
//! `sea-orm`, on by default):
//!
//! ```rust,ignore
//! let traced = Database::connect("postgres://localhost/mydb").await?.with_tracing();
//! let users = Users::find().all(&traced).await?;
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! use db_driver_tracing::{TracingConfig, TracingPolicy};
//!
//! TracingPolicy::global().replace(
//!     TracingConfig::default()
//!         .with_ignored_statement("SELECT 1")
//!         .with_slow_query_threshold(Duration::from_millis(100)),
//! );
//! ```
//!
//! Connection URLs may also carry `traceWithActiveSpanOnly=true` and
//! `ignoreForTracing="..."` tokens, see [`TracingDriver`].
//!
//! ## Span Attributes
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `otel.name` | Operation: `AcquireConnection`, `Query`, `Update`, `Execute`, `Batch` or a custom name |
//! | `span.kind` | Always "client" |
//! | `component` | Always "db-driver-tracing" |
//! | `db.statement` | SQL text; for batches, every batched command concatenated |
//! | `db.type` | Vendor, e.g. "mysql", "oracle" |
//! | `db.instance` | Database, schema or service name |
//! | `db.user` | Connecting user (when known) |
//! | `peer.address` | `host:port`, or a comma separated list for clusters |
//! | `peer.service` | `instance[type(peer)]` |
//! | `db.duration_ms` | Call duration |
//! | `error` | `true` when the call failed |
//! | `slow` | `true` when above the slow query threshold |
//! | `sampling.priority` | `0` when below the fast query threshold |
//! | `otel.status_code` | "OK" or "ERROR" |
//!
//! Tags with no value are left unset rather than recorded empty.

mod api;
mod config;
mod connection;
mod connection_info;
mod datasource;
mod driver;
mod error;
#[cfg(feature = "sea-orm")]
mod orm;
pub mod parser;
mod span;

pub use api::{Connection, DataSource, Driver, PreparedStatement, Properties, ResultSet, Statement, Value};
pub use config::{TracingConfig, TracingPolicy};
pub use connection::{TracingConnection, TracingPreparedStatement, TracingStatement};
pub use connection_info::{ConnectionInfo, ConnectionInfoBuilder, UNKNOWN_DB_TYPE};
pub use datasource::TracingDataSource;
pub use driver::{DriverList, DriverResolver, TracingDriver, TracingUrl, TRACING_URL_PREFIX};
pub use error::{RegistrationError, SqlError};
#[cfg(feature = "sea-orm")]
pub use orm::{TracedConnection, TracingExt};
pub use parser::{ConnectionUrlParser, ParserRegistry};
pub use span::{ActiveSpan, Operation, TraceContext, Tracer, COMPONENT_NAME};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Connection, DataSource, Driver, DriverList, PreparedStatement, Properties, ResultSet, Statement,
        TraceContext, Tracer, TracingConfig, TracingDataSource, TracingDriver, TracingPolicy, Value,
    };
    #[cfg(feature = "sea-orm")]
    pub use crate::{TracedConnection, TracingExt};
}
