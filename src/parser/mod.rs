pub mod columns;
pub mod rows;

use scraper::Html;
use serde::Serialize;

use crate::models::{StudentRecord, SubjectRecord};
use columns::ColumnMap;
use rows::Row;

/// Everything read off one results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub student: StudentRecord,
    pub subjects: Vec<SubjectRecord>,
}

/// Two-pass pipeline: html → classified rows → records.
/// Pure function of its input; never fails.
pub fn extract_page(roll: &str, html: &str, columns: &ColumnMap) -> Extraction {
    let doc = Html::parse_document(html);
    build(roll, &rows::classify_rows(&doc, columns), columns)
}

/// Same as [`extract_page`], plus the student photo used by the single-student view.
pub fn extract_detail(roll: &str, html: &str, columns: &ColumnMap) -> Extraction {
    let doc = Html::parse_document(html);
    let mut extraction = build(roll, &rows::classify_rows(&doc, columns), columns);
    extraction.student.photo = rows::find_photo(&doc, columns);
    extraction
}

fn build(roll: &str, rows: &[Row], columns: &ColumnMap) -> Extraction {
    let mut student = StudentRecord::new(roll);
    let mut subjects = Vec::new();

    for row in rows {
        match row {
            Row::Attribute { key, value } => student.insert(key.clone(), value.clone()),
            Row::Subject { code, cells } => subjects.push(subject(code, cells, columns)),
            Row::ColumnTitles | Row::Other => {}
        }
    }

    Extraction { student, subjects }
}

fn subject(code: &str, cells: &[String], columns: &ColumnMap) -> SubjectRecord {
    let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
    SubjectRecord {
        code: code.to_string(),
        external: cell(columns.external),
        internal: cell(columns.internal),
        total: cell(columns.total),
        grade: cell(columns.grade),
        status: cell(columns.status),
    }
}

// ── Tests ──
