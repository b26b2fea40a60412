//! Basic example showing how to use db-driver-tracing.
//!
//! Run with: cargo run --example basic

use db_driver_tracing::prelude::*;
use db_driver_tracing::{parser, TraceContext};
use sea_orm::{ConnectionTrait, DatabaseBackend, MockDatabase, MockExecResult};
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,db_driver_tracing=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // What the spans will say about each target
    for url in [
        "jdbc:mysql://primary:3306,replica:3307/orders",
        "jdbc:oracle:thin:@(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST=ora1)(PORT=1521))(CONNECT_DATA=(SERVICE_NAME=sales)))",
        "jdbc:sqlserver://mssql;databaseName=reports",
        "jdbc:h2:mem:scratch",
    ] {
        let info = parser::parse(url);
        tracing::info!(%url, db_type = info.db_type(), peer = ?info.db_peer(), instance = ?info.db_instance(), "parsed");
    }

    TracingPolicy::global().replace(TracingConfig::development().with_ignored_statement("SELECT 1"));

    // Any DatabaseConnection works; a mock keeps the example self-contained
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "jdbc:postgresql://localhost:5432/test".into());
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
        ])
        .into_connection();

    // Option 1: Simple wrapping; spans only know the backend
    // let traced_db = db.with_tracing();

    // Option 2: Describe the target from its connection URL
    let traced_db = db.with_trace_context(TraceContext::new(parser::parse(&database_url)));

    let request = tracing::info_span!("request", http.route = "/orders");
    async {
        traced_db.execute_unprepared("SELECT 1").await?;
        traced_db.execute_unprepared("UPDATE orders SET paid = true").await?;
        Ok::<_, sea_orm::DbErr>(())
    }
    .instrument(request)
    .await?;

    tracing::info!("Done; one Execute span was recorded under the request span");

    Ok(())
}
