use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use bastion_core::blocking::offload_result;
use bastion_core::platform::{MessageId, MessageRef};
use bastion_core::store::{Database, StoreError};
use rusqlite::params;

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS modmails
    ( dm_channel_id INTEGER NOT NULL
    , dm_message_id INTEGER NOT NULL
    , staff_message_id INTEGER PRIMARY KEY
    );
";

/// Maps each relayed copy in the staff channel to the direct message it came
/// from. Rows are written to the database before the in-memory map.
#[derive(Clone)]
pub(crate) struct RelayIndex {
    db: Database,
    entries: Arc<RwLock<HashMap<MessageId, MessageRef>>>,
}

impl RelayIndex {
    pub(crate) async fn load(db: Database) -> Result<Self> {
        let index = Self {
            db,
            entries: Arc::default(),
        };
        let count = index.reload().await?;
        tracing::info!(count, "relay index loaded");
        Ok(index)
    }

    /// Rebuilds the map from the database. Returns the number of entries.
    pub(crate) async fn reload(&self) -> Result<usize> {
        let db = self.db.clone();
        let rows = offload_result(move || read_all(&db))
            .await
            .context("Failed to read relay index")?;
        let count = rows.len();
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = rows;
        Ok(count)
    }

    pub(crate) fn lookup(&self, staff_message_id: MessageId) -> Option<MessageRef> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&staff_message_id)
            .copied()
    }

    pub(crate) async fn record(&self, source: MessageRef, copy: MessageId) -> Result<()> {
        let db = self.db.clone();
        offload_result(move || {
            db.write(|conn| {
                conn.execute(
                    "INSERT INTO modmails (dm_channel_id, dm_message_id, staff_message_id)
                     VALUES (?1, ?2, ?3)",
                    params![
                        source.channel_id as i64,
                        source.message_id as i64,
                        copy as i64
                    ],
                )?;
                Ok(())
            })
        })
        .await
        .context("Failed to record relayed message")?;

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(copy, source);
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn read_all(db: &Database) -> Result<HashMap<MessageId, MessageRef>, StoreError> {
    let conn = db.connect()?;
    let mut stmt =
        conn.prepare("SELECT dm_channel_id, dm_message_id, staff_message_id FROM modmails")?;
    let rows = stmt.query_map([], |row| {
        let channel: i64 = row.get(0)?;
        let message: i64 = row.get(1)?;
        let staff: i64 = row.get(2)?;
        Ok((
            staff as MessageId,
            MessageRef::new(channel as u64, message as u64),
        ))
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

#[cfg(test)]
mod tests {
    use tempfile::{TempDir, tempdir};

    use super::*;

    fn database() -> (TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("relay.db"));
        db.initialize(&[SCHEMA]).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn record_then_lookup() {
        let (_dir, db) = database();
        let index = RelayIndex::load(db).await.unwrap();
        assert_eq!(index.len(), 0);

        let source = MessageRef::new(70, 700);
        index.record(source, 5001).await.unwrap();
        index.record(source, 5002).await.unwrap();

        assert_eq!(index.lookup(5001), Some(source));
        assert_eq!(index.lookup(5002), Some(source));
        assert_eq!(index.lookup(700), None);
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn entries_survive_a_restart() {
        let (_dir, db) = database();
        let first = RelayIndex::load(db.clone()).await.unwrap();
        first
            .record(MessageRef::new(1_234_567_890_123, 42), 987_654_321_098)
            .await
            .unwrap();

        let second = RelayIndex::load(db).await.unwrap();
        assert_eq!(
            second.lookup(987_654_321_098),
            Some(MessageRef::new(1_234_567_890_123, 42))
        );
    }

    #[tokio::test]
    async fn reload_picks_up_rows_written_elsewhere() {
        let (_dir, db) = database();
        let index = RelayIndex::load(db.clone()).await.unwrap();
        db.connect()
            .unwrap()
            .execute(
                "INSERT INTO modmails VALUES (1, 2, 3)",
                [],
            )
            .unwrap();

        assert_eq!(index.lookup(3), None);
        assert_eq!(index.reload().await.unwrap(), 1);
        assert_eq!(index.lookup(3), Some(MessageRef::new(1, 2)));
    }

    #[tokio::test]
    async fn duplicate_copy_is_rejected_and_not_indexed_twice() {
        let (_dir, db) = database();
        let index = RelayIndex::load(db).await.unwrap();
        index.record(MessageRef::new(1, 2), 3).await.unwrap();
        assert!(index.record(MessageRef::new(9, 9), 3).await.is_err());
        assert_eq!(index.lookup(3), Some(MessageRef::new(1, 2)));
    }
}
