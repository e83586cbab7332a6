//! Scoped key/value operations.

use rusqlite::{params, OptionalExtension};

/// Key/value operations on a borrowed connection.
pub struct KvStore<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> KvStore<'a> {
    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn set(&self, scope: &str, key: &str, value: Option<&str>) -> crate::Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO kv (scope, k, v, updated_at)
            VALUES (?, ?, ?, strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            "#,
            params![scope, key, value],
        )?;
        Ok(())
    }

    pub fn get(&self, scope: &str, key: &str) -> crate::Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT v FROM kv WHERE scope = ? AND k = ?",
                params![scope, key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    /// Remove a key; returns whether it existed.
    pub fn delete(&self, scope: &str, key: &str) -> crate::Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM kv WHERE scope = ? AND k = ?", params![scope, key])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn test_set_get_delete() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            let kv = KvStore::new(conn);
            assert_eq!(kv.get("drafts", "a")?, None);

            kv.set("drafts", "a", Some("one"))?;
            kv.set("drafts", "a", Some("two"))?;
            assert_eq!(kv.get("drafts", "a")?.as_deref(), Some("two"));

            assert!(kv.delete("drafts", "a")?);
            assert!(!kv.delete("drafts", "a")?);
            assert_eq!(kv.get("drafts", "a")?, None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_scopes_are_isolated() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            let kv = KvStore::new(conn);
            kv.set("drafts", "a", Some("draft"))?;
            kv.set("other", "a", Some("other"))?;
            assert_eq!(kv.get("drafts", "a")?.as_deref(), Some("draft"));
            assert_eq!(kv.get("other", "a")?.as_deref(), Some("other"));
            Ok(())
        })
        .unwrap();
    }
}
