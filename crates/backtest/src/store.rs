//! Ledger persistence.
//!
//! [`JsonStore`] writes one pretty JSON file per record list plus the run
//! summary. [`SqliteStore`] writes one row per record with its kind tag and
//! JSON payload. Saving again replaces the previous run in both backends.

use std::fs;
use std::path::{Path, PathBuf};

use replay_core::config::{OutputConfig, StoreKind};
use replay_core::time::format_date_time;
use replay_core::{Error, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::info;

use crate::analyzer::LedgerRecords;
use crate::metrics::RunSummary;

/// File name of the SQLite ledger inside the output directory.
pub const SQLITE_FILE_NAME: &str = "ledger.db";

/// Kind tag for balance snapshots in the SQLite ledger.
const ASSET_INFO_KIND: &str = "asset_info";

/// Durable storage for a finished run.
pub trait LedgerStore {
    /// Persist the ledger and summary of one run.
    fn save(&self, records: &LedgerRecords, summary: &RunSummary) -> Result<()>;
}

/// Resolve the configured store.
pub fn open_store(config: &OutputConfig) -> Box<dyn LedgerStore> {
    match config.store {
        StoreKind::Json => Box::new(JsonStore::new(&config.dir)),
        StoreKind::Sqlite => Box::new(SqliteStore::new(
            Path::new(&config.dir).join(SQLITE_FILE_NAME),
        )),
    }
}

/// One JSON file per list in a directory.
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Store writing into `dir`, created on save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let body = serde_json::to_string_pretty(value)?;
        fs::write(&path, body)
            .map_err(|e| Error::storage(format!("write {}: {e}", path.display())))
    }
}

impl LedgerStore for JsonStore {
    fn save(&self, records: &LedgerRecords, summary: &RunSummary) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::storage(format!("create {}: {e}", self.dir.display())))?;

        self.write("trading_info.json", &records.trading_info)?;
        self.write("request.json", &records.requests)?;
        self.write("result.json", &records.results)?;
        self.write("asset_info.json", &records.asset_info)?;
        self.write("score.json", &records.scores)?;
        self.write("summary.json", summary)?;

        info!(dir = %self.dir.display(), "ledger saved as json");
        Ok(())
    }
}

/// SQLite ledger file holding the most recently saved run.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Store writing the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn sqlite_error(e: rusqlite::Error) -> Error {
    Error::storage(format!("sqlite: {e}"))
}

fn ensure_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS records (
             id        INTEGER PRIMARY KEY,
             kind      TEXT NOT NULL,
             date_time TEXT,
             payload   TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS summary (
             id      INTEGER PRIMARY KEY,
             payload TEXT NOT NULL
         );",
    )
    .map_err(sqlite_error)
}

impl LedgerStore for SqliteStore {
    fn save(&self, records: &LedgerRecords, summary: &RunSummary) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::storage(format!("create {}: {e}", parent.display())))?;
        }

        let mut conn = Connection::open(&self.path).map_err(sqlite_error)?;
        ensure_tables(&conn)?;

        let tx = conn.transaction().map_err(sqlite_error)?;
        // A ledger file holds one run, like the JSON files it mirrors.
        tx.execute_batch("DELETE FROM records; DELETE FROM summary;")
            .map_err(sqlite_error)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO records (kind, date_time, payload) VALUES (?1, ?2, ?3)")
                .map_err(sqlite_error)?;
            let mut insert = |kind: &str, date_time: Option<String>, payload: String| {
                stmt.execute(params![kind, date_time, payload])
                    .map(|_| ())
                    .map_err(sqlite_error)
            };

            for tick in &records.trading_info {
                insert(
                    tick.kind.as_str(),
                    Some(format_date_time(&tick.record.date_time)),
                    serde_json::to_string(tick)?,
                )?;
            }
            for request in &records.requests {
                insert(
                    request.kind.as_str(),
                    Some(format_date_time(&request.record.date_time)),
                    serde_json::to_string(request)?,
                )?;
            }
            for result in &records.results {
                insert(
                    result.kind.as_str(),
                    Some(format_date_time(&result.record.date_time)),
                    serde_json::to_string(result)?,
                )?;
            }
            for snapshot in &records.asset_info {
                insert(
                    ASSET_INFO_KIND,
                    snapshot.date_time.as_ref().map(format_date_time),
                    serde_json::to_string(snapshot)?,
                )?;
            }
            for score in &records.scores {
                insert(
                    score.kind.as_str(),
                    score.record.date_time.as_ref().map(format_date_time),
                    serde_json::to_string(score)?,
                )?;
            }
        }
        tx.execute(
            "INSERT INTO summary (payload) VALUES (?1)",
            params![serde_json::to_string(summary)?],
        )
        .map_err(sqlite_error)?;
        tx.commit().map_err(sqlite_error)?;

        info!(path = %self.path.display(), "ledger saved to sqlite");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::time::parse_date_time;
    use replay_core::{Candle, RecordKind, Tagged};

    fn make_records() -> LedgerRecords {
        let candle = Candle {
            symbol: "KRW-BTC".to_string(),
            date_time: parse_date_time("2022-11-18T12:15:00").unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            acc_price: 0.0,
            acc_volume: 0.0,
        };
        LedgerRecords {
            trading_info: vec![
                Tagged::new(RecordKind::Tick, candle.clone()),
                Tagged::new(RecordKind::Tick, candle),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_json_store_writes_every_list() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let store = JsonStore::new(&out);

        store.save(&make_records(), &RunSummary::default()).unwrap();

        for name in [
            "trading_info.json",
            "request.json",
            "result.json",
            "asset_info.json",
            "score.json",
            "summary.json",
        ] {
            assert!(out.join(name).exists(), "{name} missing");
        }
        let body = fs::read_to_string(out.join("trading_info.json")).unwrap();
        let ticks: Vec<Tagged<Candle>> = serde_json::from_str(&body).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].kind, RecordKind::Tick);
    }

    #[test]
    fn test_sqlite_store_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SQLITE_FILE_NAME);
        let store = SqliteStore::new(&path);

        store.save(&make_records(), &RunSummary::default()).unwrap();

        let conn = Connection::open(&path).unwrap();
        let ticks: i64 = conn
            .query_row("SELECT COUNT(*) FROM records WHERE kind = 'tick'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(ticks, 2);
        let summaries: i64 = conn
            .query_row("SELECT COUNT(*) FROM summary", [], |row| row.get(0))
            .unwrap();
        assert_eq!(summaries, 1);
    }

    #[test]
    fn test_sqlite_store_second_save_replaces_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SQLITE_FILE_NAME);
        let store = SqliteStore::new(&path);

        store.save(&make_records(), &RunSummary::default()).unwrap();
        let mut second = make_records();
        second.trading_info.truncate(1);
        store.save(&second, &RunSummary::default()).unwrap();

        let conn = Connection::open(&path).unwrap();
        let records: i64 = conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .unwrap();
        let summaries: i64 = conn
            .query_row("SELECT COUNT(*) FROM summary", [], |row| row.get(0))
            .unwrap();
        assert_eq!(records, 1);
        assert_eq!(summaries, 1);
    }

    #[test]
    fn test_open_store_selects_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig {
            dir: dir.path().to_string_lossy().into_owned(),
            store: StoreKind::Sqlite,
        };

        open_store(&config)
            .save(&make_records(), &RunSummary::default())
            .unwrap();
        assert!(dir.path().join(SQLITE_FILE_NAME).exists());
    }
}
