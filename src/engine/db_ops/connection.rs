//! Open the image-set database and read what it already holds.

use anyhow::{Context, Result};
use chrono::DateTime;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;

use crate::FileRecord;

use super::{FileStore, SCHEMA, WAL_PRAGMAS, insert_records};

/// Enable WAL and apply schema to an open connection (idempotent).
fn apply_wal_and_schema(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .context("enable WAL")?;
    conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
    conn.execute_batch(SCHEMA).context("create schema")?;
    Ok(())
}

/// Open or create the image-set DB and ensure schema + WAL.
pub fn open_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).context("open database")?;
    apply_wal_and_schema(&conn)?;
    Ok(conn)
}

/// In-memory DB with the same schema (no WAL).
pub fn open_db_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory database")?;
    conn.execute_batch(SCHEMA).context("create schema")?;
    Ok(conn)
}

/// All `(relative_path, file)` pairs in one query.
pub fn load_known_paths(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT relative_path, file FROM files")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// [`FileStore`] backed by SQLite.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_db(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
        })
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }

    /// Stored records in insertion order.
    pub fn load_records(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT relative_path, file, date_time, fields FROM files ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (relative_path, file, date_time, fields) = row?;
            let date_time = DateTime::parse_from_rfc3339(&date_time)
                .with_context(|| format!("bad date_time for {relative_path}/{file}"))?;
            let fields: BTreeMap<String, String> =
                serde_json::from_str(&fields).context("decode fields")?;
            let mut record = FileRecord::new(relative_path, file, date_time);
            record.requires_insert = false;
            record.fields = fields;
            out.push(record);
        }
        Ok(out)
    }
}

impl FileStore for SqliteStore {
    fn known_paths(&self) -> Result<Vec<(String, String)>> {
        load_known_paths(&self.conn)
    }

    fn insert_files(
        &mut self,
        records: &[FileRecord],
        on_row: &mut dyn FnMut(&FileRecord, usize),
    ) -> Result<usize> {
        insert_records(&mut self.conn, records, on_row)
    }
}
