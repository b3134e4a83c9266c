//! Namespaced key-value configuration.
//!
//! Values are stored as JSON text so that strings, numbers and structured
//! values round-trip through the `config` command unchanged.

use rusqlite::{OptionalExtension, params};
use serde_json::Value;

use super::{Database, StoreError};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv
    ( namespace TEXT NOT NULL
    , key TEXT NOT NULL
    , value TEXT NOT NULL
    , PRIMARY KEY (namespace, key)
    );
";

#[derive(Debug, Clone)]
pub struct KvStore {
    db: Database,
}

impl KvStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Every namespace with at least one key, sorted.
    pub fn namespaces(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare("SELECT DISTINCT namespace FROM kv ORDER BY namespace")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE namespace = ?1 ORDER BY key")?;
        let rows = stmt.query_map([namespace], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// The stored JSON text, as written.
    pub fn get_raw(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.db.connect()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.get_raw(namespace, key)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Reads a value as text: strings as-is, numbers and booleans formatted.
    pub fn get_string(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(namespace, key)?.and_then(|value| match value {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }))
    }

    /// Stores `value`, or deletes the key when `value` is `None`.
    pub fn set(&self, namespace: &str, key: &str, value: Option<&Value>) -> Result<(), StoreError> {
        let encoded = value.map(serde_json::to_string).transpose()?;
        self.db.write(|conn| {
            match encoded {
                Some(encoded) => conn.execute(
                    "INSERT INTO kv (namespace, key, value) VALUES (?1, ?2, ?3)
                     ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value",
                    params![namespace, key, encoded],
                )?,
                None => conn.execute(
                    "DELETE FROM kv WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                )?,
            };
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    use super::*;

    fn store() -> (TempDir, KvStore) {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("kv.db"));
        db.initialize(&[SCHEMA]).unwrap();
        (dir, KvStore::new(db))
    }

    #[test]
    fn set_get_and_delete() {
        let (_dir, kv) = store();

        kv.set("modmail", "channel", Some(&json!("1234"))).unwrap();
        kv.set("modmail", "limits", Some(&json!({"max": 3}))).unwrap();

        assert_eq!(kv.get("modmail", "channel").unwrap(), Some(json!("1234")));
        assert_eq!(kv.get_raw("modmail", "limits").unwrap().unwrap(), r#"{"max":3}"#);

        kv.set("modmail", "channel", None).unwrap();
        assert_eq!(kv.get("modmail", "channel").unwrap(), None);
    }

    #[test]
    fn overwrite_replaces_value() {
        let (_dir, kv) = store();
        kv.set("a", "k", Some(&json!(1))).unwrap();
        kv.set("a", "k", Some(&json!(2))).unwrap();
        assert_eq!(kv.get("a", "k").unwrap(), Some(json!(2)));
        assert_eq!(kv.keys("a").unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn lists_namespaces_and_keys_sorted() {
        let (_dir, kv) = store();
        kv.set("zeta", "b", Some(&json!(true))).unwrap();
        kv.set("alpha", "y", Some(&json!(null))).unwrap();
        kv.set("alpha", "x", Some(&json!("v"))).unwrap();

        assert_eq!(kv.namespaces().unwrap(), vec!["alpha", "zeta"]);
        assert_eq!(kv.keys("alpha").unwrap(), vec!["x", "y"]);
        assert!(kv.keys("missing").unwrap().is_empty());
    }

    #[test]
    fn get_string_formats_scalars() {
        let (_dir, kv) = store();
        kv.set("m", "id", Some(&json!(42))).unwrap();
        kv.set("m", "name", Some(&json!("staff"))).unwrap();
        kv.set("m", "list", Some(&json!([1]))).unwrap();

        assert_eq!(kv.get_string("m", "id").unwrap().as_deref(), Some("42"));
        assert_eq!(kv.get_string("m", "name").unwrap().as_deref(), Some("staff"));
        assert_eq!(kv.get_string("m", "list").unwrap(), None);
        assert_eq!(kv.get_string("m", "absent").unwrap(), None);
    }
}
