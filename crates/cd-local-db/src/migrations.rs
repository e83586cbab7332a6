//! Database migration management.

use rusqlite::{params, Connection};

/// Database migration manager.
pub struct MigrationManager;

impl MigrationManager {
    /// Apply all pending migrations to the database.
    pub fn migrate(conn: &Connection) -> crate::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        let current_version = Self::current_version(conn)?.unwrap_or(0);

        if current_version < 1 {
            Self::apply_migration_1(conn)?;
        }

        Ok(())
    }

    /// Version 1: scoped key/value table for drafts and version lists
    fn apply_migration_1(conn: &Connection) -> crate::Result<()> {
        tracing::info!("applying local state migration 1");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                scope TEXT NOT NULL,
                k TEXT NOT NULL,
                v TEXT,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
                PRIMARY KEY (scope, k)
            );

            INSERT OR REPLACE INTO schema_migrations (version) VALUES (1);
            "#,
        )
        .map_err(|e| crate::Error::migration(format!("migration 1 failed: {e}")))?;

        Ok(())
    }

    /// Get the current schema version.
    pub fn current_version(conn: &Connection) -> crate::Result<Option<u32>> {
        let mut stmt = conn.prepare("SELECT MAX(version) FROM schema_migrations")?;
        let version: Option<u32> = stmt.query_row(params![], |row| row.get(0))?;
        Ok(version)
    }
}
