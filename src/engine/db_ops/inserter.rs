//! Ordered batch insert of loaded records.

use anyhow::{Context, Result};
use rusqlite::{Connection, Statement};

use crate::FileRecord;
use crate::utils::config::DB_INSERT_BATCH_SIZE;

use super::INSERT_FILE_SQL;

fn execute_insert_record(stmt: &mut Statement<'_>, r: &FileRecord) -> Result<()> {
    let fields = serde_json::to_string(&r.fields).context("encode fields")?;
    stmt.execute((
        r.relative_path.as_str(),
        r.file.as_str(),
        r.date_time.to_rfc3339(),
        fields,
    ))
    .context("insert file")?;
    Ok(())
}

/// Insert one chunk in a single transaction. `offset` is the index of the chunk's first record.
fn flush_batch(
    conn: &mut Connection,
    batch: &[FileRecord],
    offset: usize,
    on_row: &mut dyn FnMut(&FileRecord, usize),
) -> Result<usize> {
    let tx = conn.transaction().context("begin transaction")?;
    let mut stmt = tx.prepare(INSERT_FILE_SQL).context("prepare insert")?;
    for (i, r) in batch.iter().enumerate() {
        execute_insert_record(&mut stmt, r)?;
        on_row(r, offset + i);
    }
    drop(stmt);
    tx.commit().context("commit transaction")?;
    Ok(batch.len())
}

/// Insert `records` in order, in transactions of [`DB_INSERT_BATCH_SIZE`].
pub fn insert_records(
    conn: &mut Connection,
    records: &[FileRecord],
    on_row: &mut dyn FnMut(&FileRecord, usize),
) -> Result<usize> {
    let mut written = 0_usize;
    for chunk in records.chunks(DB_INSERT_BATCH_SIZE) {
        written += flush_batch(conn, chunk, written, on_row)?;
    }
    Ok(written)
}
