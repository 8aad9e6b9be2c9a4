//! SQLite-backed [`RecordStore`].

use rusqlite::OptionalExtension;

use super::{Database, db_err};
use crate::engine::{EngineError, EngineRecord, EngineResult, RecordStore};

/// Durable record store for [`crate::engine::LocalEngine`].
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    db: Database,
}

impl SqliteRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn to_json(record: &EngineRecord) -> EngineResult<String> {
    serde_json::to_string(record)
        .map_err(|e| EngineError::Store(format!("failed to encode record {}: {}", record.id, e)))
}

fn from_json(json: &str) -> EngineResult<EngineRecord> {
    serde_json::from_str(json)
        .map_err(|e| EngineError::Store(format!("failed to decode record: {}", e)))
}

impl RecordStore for SqliteRecordStore {
    fn insert(&mut self, record: &EngineRecord) -> EngineResult<()> {
        let json = to_json(record)?;
        let conn = self.db.conn();
        db_err!(conn.execute(
            "INSERT INTO records (id, name, state, record) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![record.id, record.name, record.state.as_str(), json],
        ))?;
        Ok(())
    }

    fn get(&self, id: &str) -> EngineResult<Option<EngineRecord>> {
        let conn = self.db.conn();
        let json: Option<String> = db_err!(
            conn.query_row(
                "SELECT record FROM records WHERE id = ?1",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .optional()
        )?;
        json.as_deref().map(from_json).transpose()
    }

    fn update(&mut self, record: &EngineRecord) -> EngineResult<()> {
        let json = to_json(record)?;
        let conn = self.db.conn();
        let changed = db_err!(conn.execute(
            "UPDATE records SET name = ?2, state = ?3, record = ?4 WHERE id = ?1",
            rusqlite::params![record.id, record.name, record.state.as_str(), json],
        ))?;
        if changed == 0 {
            return Err(EngineError::NotFound(record.id.clone()));
        }
        Ok(())
    }

    fn delete(&mut self, id: &str) -> EngineResult<bool> {
        let conn = self.db.conn();
        let changed = db_err!(conn.execute(
            "DELETE FROM records WHERE id = ?1",
            rusqlite::params![id]
        ))?;
        Ok(changed > 0)
    }

    fn find_by_name(&self, name: &str) -> EngineResult<Option<EngineRecord>> {
        let conn = self.db.conn();
        let json: Option<String> = db_err!(
            conn.query_row(
                "SELECT record FROM records WHERE name = ?1 ORDER BY seq ASC LIMIT 1",
                rusqlite::params![name],
                |row| row.get(0),
            )
            .optional()
        )?;
        json.as_deref().map(from_json).transpose()
    }

    fn list(&self) -> EngineResult<Vec<EngineRecord>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare("SELECT record FROM records ORDER BY seq ASC"))?;
        let rows = db_err!(stmt.query_map([], |row| row.get::<_, String>(0)))?;

        let mut records = Vec::new();
        for row in rows {
            let json = db_err!(row)?;
            records.push(from_json(&json)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineState;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(id: &str) -> EngineRecord {
        EngineRecord {
            id: id.into(),
            name: format!("name-{}", id),
            state: EngineState::Created,
            image: "busybox".into(),
            image_id: String::new(),
            labels: [("k".to_string(), "v".to_string())].into_iter().collect(),
            created_at: Some(Utc::now()),
            started_at: None,
            finished_at: None,
            exit_code: 0,
            error: String::new(),
            oom_killed: false,
            mounts: Vec::new(),
        }
    }

    #[test]
    fn test_insert_get_update_delete() {
        let mut store = SqliteRecordStore::new(Database::open_in_memory().unwrap());
        let mut r = record("a");
        store.insert(&r).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(r.clone()));

        r.state = EngineState::Running;
        r.started_at = Some(Utc::now());
        store.update(&r).unwrap();
        assert_eq!(store.get("a").unwrap().unwrap().state, EngineState::Running);

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_find_by_name() {
        let mut store = SqliteRecordStore::new(Database::open_in_memory().unwrap());
        store.insert(&record("a")).unwrap();
        store.insert(&record("b")).unwrap();

        assert_eq!(store.find_by_name("name-b").unwrap().unwrap().id, "b");
        assert_eq!(store.find_by_name("name-zzz").unwrap(), None);

        store.delete("b").unwrap();
        assert_eq!(store.find_by_name("name-b").unwrap(), None);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let mut store = SqliteRecordStore::new(Database::open_in_memory().unwrap());
        assert_eq!(
            store.update(&record("ghost")).unwrap_err(),
            EngineError::NotFound("ghost".into())
        );
    }

    #[test]
    fn test_list_in_insertion_order_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.db");

        {
            let mut store = SqliteRecordStore::new(Database::open(&path).unwrap());
            for id in ["z", "a", "m"] {
                store.insert(&record(id)).unwrap();
            }
        }

        let store = SqliteRecordStore::new(Database::open(&path).unwrap());
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }
}
