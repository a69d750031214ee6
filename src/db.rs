use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::batch::{BatchParams, BatchResult, FailedRoll};
use crate::classify::AnalysisBuckets;
use crate::models::{BulkResultEntry, FullExportRow};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS batches (
            id           INTEGER PRIMARY KEY,
            circular_no  TEXT NOT NULL,
            college_code TEXT NOT NULL,
            branch_code  TEXT NOT NULL,
            semester     TEXT NOT NULL,
            roll_from    INTEGER NOT NULL,
            roll_to      INTEGER NOT NULL,
            pass_all     INTEGER NOT NULL,
            fail_1       INTEGER NOT NULL,
            fail_2       INTEGER NOT NULL,
            fail_3       INTEGER NOT NULL,
            fail_4_plus  INTEGER NOT NULL,
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entries (
            batch_id    INTEGER NOT NULL REFERENCES batches(id),
            seq         INTEGER NOT NULL,
            roll        TEXT NOT NULL,
            name        TEXT NOT NULL,
            total       TEXT NOT NULL,
            result      TEXT NOT NULL,
            fail_count  INTEGER,
            error       TEXT,
            PRIMARY KEY (batch_id, seq)
        );

        -- Full export lines, separators included (all columns empty)
        CREATE TABLE IF NOT EXISTS export_rows (
            batch_id    INTEGER NOT NULL REFERENCES batches(id),
            seq         INTEGER NOT NULL,
            roll        TEXT NOT NULL,
            subject     TEXT NOT NULL,
            external    TEXT NOT NULL,
            internal    TEXT NOT NULL,
            total       TEXT NOT NULL,
            grade       TEXT NOT NULL,
            status      TEXT NOT NULL,
            PRIMARY KEY (batch_id, seq)
        );
        ",
    )?;
    Ok(())
}

/// Store a finished batch in one transaction; returns its id.
/// Readers see either the previous batch or this one, never a partial write.
pub fn save_batch(conn: &Connection, batch: &BatchResult) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let p = &batch.params;
    let b = &batch.buckets;
    tx.execute(
        "INSERT INTO batches
         (circular_no, college_code, branch_code, semester, roll_from, roll_to,
          pass_all, fail_1, fail_2, fail_3, fail_4_plus, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            p.circular_no, p.college_code, p.branch_code, p.semester, p.roll_from, p.roll_to,
            b.pass_all, b.fail_1, b.fail_2, b.fail_3, b.fail_4_plus,
            batch.created_at.to_rfc3339(),
        ],
    )?;
    let batch_id = tx.last_insert_rowid();

    {
        let mut e_stmt = tx.prepare(
            "INSERT INTO entries (batch_id, seq, roll, name, total, result, fail_count, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for (seq, e) in batch.entries.iter().enumerate() {
            let error = batch
                .failed
                .iter()
                .find(|f| f.index == seq)
                .map(|f| f.error.as_str());
            e_stmt.execute(rusqlite::params![
                batch_id, seq, e.roll, e.name, e.total, e.result, e.fail_count, error,
            ])?;
        }

        let mut r_stmt = tx.prepare(
            "INSERT INTO export_rows
             (batch_id, seq, roll, subject, external, internal, total, grade, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for (seq, r) in batch.full_rows.iter().enumerate() {
            r_stmt.execute(rusqlite::params![
                batch_id, seq, r.roll, r.subject, r.external, r.internal, r.total, r.grade,
                r.status,
            ])?;
        }
    }
    tx.commit()?;
    Ok(batch_id)
}

pub struct StoredBatch {
    pub id: i64,
    pub batch: BatchResult,
}

pub fn latest_batch_id(conn: &Connection) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT MAX(id) FROM batches", [], |r| r.get::<_, Option<i64>>(0))?;
    Ok(id)
}

/// The most recently completed batch, if any.
pub fn load_latest(conn: &Connection) -> Result<Option<StoredBatch>> {
    match latest_batch_id(conn)? {
        Some(id) => load_batch(conn, id),
        None => Ok(None),
    }
}

pub fn load_batch(conn: &Connection, id: i64) -> Result<Option<StoredBatch>> {
    let header = conn
        .query_row(
            "SELECT circular_no, college_code, branch_code, semester, roll_from, roll_to,
                    pass_all, fail_1, fail_2, fail_3, fail_4_plus, created_at
             FROM batches WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    BatchParams {
                        circular_no: row.get(0)?,
                        college_code: row.get(1)?,
                        branch_code: row.get(2)?,
                        semester: row.get(3)?,
                        roll_from: row.get(4)?,
                        roll_to: row.get(5)?,
                    },
                    AnalysisBuckets {
                        pass_all: row.get(6)?,
                        fail_1: row.get(7)?,
                        fail_2: row.get(8)?,
                        fail_3: row.get(9)?,
                        fail_4_plus: row.get(10)?,
                    },
                    row.get::<_, String>(11)?,
                ))
            },
        )
        .optional()?;
    let Some((params, buckets, created_at)) = header else {
        return Ok(None);
    };
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .with_context(|| format!("Bad timestamp on batch {}", id))?
        .with_timezone(&Utc);

    let mut entries = Vec::new();
    let mut failed = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT seq, roll, name, total, result, fail_count, error
             FROM entries WHERE batch_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok((
                row.get::<_, usize>(0)?,
                BulkResultEntry {
                    roll: row.get(1)?,
                    name: row.get(2)?,
                    total: row.get(3)?,
                    result: row.get(4)?,
                    fail_count: row.get(5)?,
                },
                row.get::<_, Option<String>>(6)?,
            ))
        })?;
        for row in rows {
            let (seq, entry, error) = row?;
            if let Some(error) = error {
                failed.push(FailedRoll {
                    index: seq,
                    roll: entry.roll.clone(),
                    error,
                });
            }
            entries.push(entry);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT roll, subject, external, internal, total, grade, status
         FROM export_rows WHERE batch_id = ?1 ORDER BY seq",
    )?;
    let full_rows = stmt
        .query_map([id], |row| {
            Ok(FullExportRow {
                roll: row.get(0)?,
                subject: row.get(1)?,
                external: row.get(2)?,
                internal: row.get(3)?,
                total: row.get(4)?,
                grade: row.get(5)?,
                status: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(StoredBatch {
        id,
        batch: BatchResult {
            params,
            created_at,
            entries,
            full_rows,
            buckets,
            failed,
        },
    }))
}

// ── Listing ──

pub struct BatchSummary {
    pub id: i64,
    pub params: BatchParams,
    pub buckets: AnalysisBuckets,
    pub entries: usize,
    pub errors: usize,
    pub created_at: String,
}

pub fn list_batches(conn: &Connection, limit: usize) -> Result<Vec<BatchSummary>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.circular_no, b.college_code, b.branch_code, b.semester,
                b.roll_from, b.roll_to, b.pass_all, b.fail_1, b.fail_2, b.fail_3,
                b.fail_4_plus, substr(replace(b.created_at, 'T', ' '), 1, 16),
                (SELECT COUNT(*) FROM entries e WHERE e.batch_id = b.id),
                (SELECT COUNT(*) FROM entries e WHERE e.batch_id = b.id AND e.error IS NOT NULL)
         FROM batches b
         ORDER BY b.id DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok(BatchSummary {
                id: row.get(0)?,
                params: BatchParams {
                    circular_no: row.get(1)?,
                    college_code: row.get(2)?,
                    branch_code: row.get(3)?,
                    semester: row.get(4)?,
                    roll_from: row.get(5)?,
                    roll_to: row.get(6)?,
                },
                buckets: AnalysisBuckets {
                    pass_all: row.get(7)?,
                    fail_1: row.get(8)?,
                    fail_2: row.get(9)?,
                    fail_3: row.get(10)?,
                    fail_4_plus: row.get(11)?,
                },
                created_at: row.get(12)?,
                entries: row.get(13)?,
                errors: row.get(14)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::RollOutcome;
    use crate::parser::columns::ColumnMap;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn params(semester: &str) -> BatchParams {
        BatchParams {
            circular_no: "24".into(),
            college_code: "002".into(),
            branch_code: "EC".into(),
            semester: semester.into(),
            roll_from: 16,
            roll_to: 18,
        }
    }

    fn sample(semester: &str) -> BatchResult {
        let rolls = params(semester).rolls();
        let failed_page = std::fs::read_to_string("tests/fixtures/failed.html").unwrap();
        BatchResult::from_outcomes(
            params(semester),
            &rolls,
            vec![
                RollOutcome::Page(String::new()),
                RollOutcome::Page(failed_page),
                RollOutcome::Failed("portal answered HTTP 502".into()),
            ],
            &ColumnMap::default(),
        )
    }

    #[test]
    fn export_before_fetch_is_none() {
        let conn = memory();
        assert!(load_latest(&conn).unwrap().is_none());
        assert!(list_batches(&conn, 10).unwrap().is_empty());
    }

    #[test]
    fn round_trips_batch() {
        let conn = memory();
        let batch = sample("4SEM");
        let id = save_batch(&conn, &batch).unwrap();

        let stored = load_latest(&conn).unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.batch.entries, batch.entries);
        assert_eq!(stored.batch.full_rows, batch.full_rows);
        assert_eq!(stored.batch.buckets, batch.buckets);
        assert_eq!(stored.batch.failed, batch.failed);
        assert_eq!(stored.batch.params.semester, "4SEM");
        assert_eq!(stored.batch.created_at.timestamp(), batch.created_at.timestamp());
    }

    #[test]
    fn latest_batch_replaces_previous() {
        let conn = memory();
        let first = save_batch(&conn, &sample("3SEM")).unwrap();
        let second = save_batch(&conn, &sample("4SEM")).unwrap();
        assert!(second > first);

        let latest = load_latest(&conn).unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.batch.params.semester, "4SEM");
        // older batches stay addressable by id
        let older = load_batch(&conn, first).unwrap().unwrap();
        assert_eq!(older.batch.params.semester, "3SEM");
    }

    #[test]
    fn listing_counts_errors() {
        let conn = memory();
        save_batch(&conn, &sample("3SEM")).unwrap();
        let list = list_batches(&conn, 5).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].entries, 3);
        assert_eq!(list[0].errors, 1);
        assert_eq!(list[0].buckets.fail_3, 1);
    }

    #[test]
    fn unknown_id_is_none() {
        let conn = memory();
        assert!(load_batch(&conn, 42).unwrap().is_none());
    }
}
