use chrono::Utc;
use rusqlite::{Connection, Row};
use tplan_models::cache_schema::{format_timestamp, CacheRow, CACHE_TABLE_DDL};

use crate::error::CacheError;

const SELECT_COLUMNS: &str =
    "SELECT key, symbol, timeframe, value_json, source, refreshed_at, expires_at FROM indicator_cache";

/// SQLite tier of the shared cache.
///
/// File databases are opened read-write in WAL mode so the refresher daemon
/// and the CLI can use the same file concurrently.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the cache database. Creates the schema if missing.
    pub fn open(path: &str) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Get a single row by key. Returns None if not found or past retention.
    pub fn get(&self, key: &str) -> Result<Option<CacheRow>, CacheError> {
        let now = format_timestamp(Utc::now());
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE key = ?1 AND expires_at > ?2"
        ))?;

        match stmt.query_row(rusqlite::params![key, now], map_row) {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CacheError::Sqlite(e)),
        }
    }

    /// All live rows for a symbol, ordered by key.
    pub fn get_by_symbol(&self, symbol: &str) -> Result<Vec<CacheRow>, CacheError> {
        let now = format_timestamp(Utc::now());
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE symbol = ?1 AND expires_at > ?2 ORDER BY key"
        ))?;

        let rows = stmt
            .query_map(rusqlite::params![symbol, now], map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Insert or replace a row.
    pub fn upsert(&self, row: &CacheRow) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO indicator_cache \
             (key, symbol, timeframe, value_json, source, refreshed_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                row.key,
                row.symbol,
                row.timeframe,
                row.value_json,
                row.source,
                row.refreshed_at,
                row.expires_at,
            ],
        )?;
        Ok(())
    }

    /// Delete a row. Returns whether a row existed.
    pub fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let deleted = self.conn.execute(
            "DELETE FROM indicator_cache WHERE key = ?1",
            rusqlite::params![key],
        )?;
        Ok(deleted > 0)
    }

    /// Delete all rows past retention. Returns the number of rows deleted.
    pub fn expire_stale(&self) -> Result<usize, CacheError> {
        let now = format_timestamp(Utc::now());
        let deleted = self.conn.execute(
            "DELETE FROM indicator_cache WHERE expires_at <= ?1",
            rusqlite::params![now],
        )?;
        Ok(deleted)
    }

    /// Count all rows, including those past retention.
    pub fn count(&self) -> Result<usize, CacheError> {
        let count: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM indicator_cache", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CacheRow> {
    Ok(CacheRow {
        key: row.get(0)?,
        symbol: row.get(1)?,
        timeframe: row.get(2)?,
        value_json: row.get(3)?,
        source: row.get(4)?,
        refreshed_at: row.get(5)?,
        expires_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_row(key: &str, symbol: &str, ttl_seconds: i64) -> CacheRow {
        let now = Utc::now();
        CacheRow {
            key: key.to_string(),
            symbol: symbol.to_string(),
            timeframe: "M5".to_string(),
            value_json: r#"{"value": 42.5}"#.to_string(),
            source: "test".to_string(),
            refreshed_at: format_timestamp(now),
            expires_at: format_timestamp(now + Duration::seconds(ttl_seconds)),
        }
    }

    #[test]
    fn get_existing_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = make_row("indicator:XAUUSD:M5", "XAUUSD", 300);
        store.upsert(&row).unwrap();

        let result = store.get("indicator:XAUUSD:M5").unwrap();
        assert_eq!(result, Some(row));
    }

    #[test]
    fn get_missing_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn get_expired_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&make_row("indicator:XAUUSD:M5", "XAUUSD", -10))
            .unwrap();

        assert!(store.get("indicator:XAUUSD:M5").unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_existing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut row = make_row("indicator:XAUUSD:M5", "XAUUSD", 300);
        store.upsert(&row).unwrap();

        row.value_json = r#"{"value": 99.9}"#.to_string();
        store.upsert(&row).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let stored = store.get("indicator:XAUUSD:M5").unwrap().unwrap();
        assert_eq!(stored.value_json, r#"{"value": 99.9}"#);
    }

    #[test]
    fn get_by_symbol() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&make_row("indicator:XAUUSD:M5", "XAUUSD", 300))
            .unwrap();
        store
            .upsert(&make_row("indicator:XAUUSD:M1", "XAUUSD", 300))
            .unwrap();
        store
            .upsert(&make_row("indicator:BTCUSD:M5", "BTCUSD", 300))
            .unwrap();

        let rows = store.get_by_symbol("XAUUSD").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "indicator:XAUUSD:M1");
    }

    #[test]
    fn delete_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&make_row("indicator:XAUUSD:M5", "XAUUSD", 300))
            .unwrap();

        assert!(store.delete("indicator:XAUUSD:M5").unwrap());
        assert!(!store.delete("indicator:XAUUSD:M5").unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn expire_stale() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&make_row("indicator:XAUUSD:M1", "XAUUSD", 300))
            .unwrap();
        store
            .upsert(&make_row("indicator:XAUUSD:M5", "XAUUSD", -10))
            .unwrap();
        store
            .upsert(&make_row("indicator:XAUUSD:M15", "XAUUSD", -10))
            .unwrap();
        assert_eq!(store.count().unwrap(), 3);

        assert_eq!(store.expire_stale().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn wal_mode_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        let mode: String = store
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
