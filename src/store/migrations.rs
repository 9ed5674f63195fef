//! Schema migrations for the conversation store.
//!
//! Applied versions are recorded in `_migrations`; only newer steps run.

use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version. Append only.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL,
                user_id TEXT,
                author TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq);
        "#,
    },
    Migration {
        version: 2,
        name: "message_model",
        sql: r#"
            ALTER TABLE messages ADD COLUMN model TEXT;
        "#,
    },
];

/// Bring the schema up to the latest version.
///
/// Each pending step and its `_migrations` row commit together, so a failed
/// step leaves the recorded version at the last one that fully applied.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("_migrations table: {e}")))?;

    let applied = schema_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        tracing::debug!(version = applied, "Schema up to date");
        return Ok(());
    }

    for migration in pending {
        apply(conn, migration).await?;
    }
    Ok(())
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: libsql::Error| {
        DatabaseError::Migration(format!("V{} {}: {e}", migration.version, migration.name))
    };

    let tx = conn.transaction().await.map_err(failed)?;
    let applied = async {
        tx.execute_batch(migration.sql).await?;
        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
    }
    .await;
    if let Err(e) = applied {
        let _ = tx.rollback().await;
        return Err(failed(e));
    }
    tx.commit().await.map_err(failed)?;

    tracing::info!(version = migration.version, name = migration.name, "Applied migration");
    Ok(())
}

async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Migration(format!("schema version: {e}"));
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(read)?;
    match rows.next().await.map_err(read)? {
        Some(row) => row.get::<i64>(0).map_err(read),
        None => Ok(0),
    }
}
