//! Database operations: schema, open, known-path query, ordered batch insert.

mod connection;
mod inserter;

pub use connection::{SqliteStore, load_known_paths, open_db, open_db_in_memory};
pub use inserter::insert_records;

use anyhow::Result;

use crate::FileRecord;

/// Storage the pipeline reads known paths from and writes new records to.
pub trait FileStore {
    /// Every stored row as `(relative_path, file)`.
    fn known_paths(&self) -> Result<Vec<(String, String)>>;

    /// Insert `records` in the given order, calling `on_row(record, index)` after each row.
    /// Returns the number of rows written.
    fn insert_files(
        &mut self,
        records: &[FileRecord],
        on_row: &mut dyn FnMut(&FileRecord, usize),
    ) -> Result<usize>;
}

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

pub(crate) const INSERT_FILE_SQL: &str =
    "INSERT INTO files (relative_path, file, date_time, fields) VALUES (?1, ?2, ?3, ?4)";

/// One row per file. `fields` is a JSON object of data label → value.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    relative_path TEXT NOT NULL,
    file TEXT NOT NULL,
    date_time TEXT NOT NULL,
    fields TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_files_path ON files(relative_path, file);
"#;
