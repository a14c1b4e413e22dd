//! Schema versioning for the libSQL backend.
//!
//! Each applied migration leaves a row in `_migrations`. On open, every
//! migration newer than the recorded schema version is applied in its own
//! transaction together with its bookkeeping row.

use libsql::Connection;
use tracing::{debug, info};

use crate::error::DatabaseError;

pub(crate) struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Ordered by version; append only.
const SCHEMA: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS daily_summaries (
            date TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            date TEXT NOT NULL,
            text TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_kind_created
            ON documents(kind, created_at);

        CREATE TABLE IF NOT EXISTS image_analyses (
            stem TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reports (
            date TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            generated_at TEXT NOT NULL
        );
    "#,
}];

/// Bring the schema up to date.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    apply(conn, SCHEMA).await
}

pub(crate) async fn apply(conn: &Connection, migrations: &[Migration]) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("bookkeeping table: {e}")))?;

    let current = schema_version(conn).await?;
    let pending: Vec<&Migration> = migrations.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        debug!(version = current, "Schema up to date");
        return Ok(());
    }

    for migration in pending {
        info!(version = migration.version, name = migration.name, "Applying migration");
        let batch = format!(
            "BEGIN;\n{}\nINSERT INTO _migrations (version, name, applied_at) \
             VALUES ({}, '{}', datetime('now'));\nCOMMIT;",
            migration.sql, migration.version, migration.name
        );
        if let Err(e) = conn.execute_batch(&batch).await {
            // Leave the connection usable if the batch stopped mid-transaction.
            let _ = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::Migration(format!(
                "V{} {}: {e}",
                migration.version, migration.name
            )));
        }
    }
    Ok(())
}

/// Highest recorded version; 0 on a fresh database.
pub(crate) async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT IFNULL(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("schema_version: {e}")))?;
    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("schema_version: {e}")))?
    else {
        return Ok(0);
    };
    row.get::<i64>(0)
        .map_err(|e| DatabaseError::Migration(format!("schema_version: {e}")))
}
