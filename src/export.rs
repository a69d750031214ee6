use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::{BulkResultEntry, FullExportRow};

pub const SUMMARY_HEADER: [&str; 5] = [
    "Roll No",
    "Name",
    "Grand Total",
    "Result",
    "Failed Subjects Count",
];

pub const FULL_HEADER: [&str; 7] = [
    "Roll No",
    "Subject Code",
    "External",
    "Internal",
    "Total",
    "Grade",
    "Status",
];

pub fn summary_row(e: &BulkResultEntry) -> [String; 5] {
    [
        e.roll.clone(),
        e.name.clone(),
        e.total.clone(),
        e.result.clone(),
        e.fail_count.map(|n| n.to_string()).unwrap_or_default(),
    ]
}

pub fn full_row(r: &FullExportRow) -> [String; 7] {
    [
        r.roll.clone(),
        r.subject.clone(),
        r.external.clone(),
        r.internal.clone(),
        r.total.clone(),
        r.grade.clone(),
        r.status.clone(),
    ]
}

pub fn write_summary<W: Write>(out: W, entries: &[BulkResultEntry]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(SUMMARY_HEADER)?;
    for e in entries {
        wtr.write_record(summary_row(e))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_full<W: Write>(out: W, rows: &[FullExportRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(FULL_HEADER)?;
    for r in rows {
        wtr.write_record(full_row(r))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_summary_file(path: &Path, entries: &[BulkResultEntry]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_summary(file, entries)
}

pub fn write_full_file(path: &Path, rows: &[FullExportRow]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_full(file, rows)
}
