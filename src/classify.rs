use tracing::warn;

use crate::models::{
    BulkResultEntry, StudentRecord, SubjectRecord, GRAND_TOTAL_KEY, NAME_KEY, RESULT_KEY,
};

pub const PLACEHOLDER: &str = "—";
pub const NO_RESULT: &str = "NO RESULT";
pub const FETCH_ERROR: &str = "FETCH ERROR";

pub fn fail_count(subjects: &[SubjectRecord]) -> u32 {
    subjects.iter().filter(|s| s.is_failed()).count() as u32
}

/// Reduce one extracted page to its summary entry. A missing or empty
/// `Name` means the portal has no such student.
pub fn classify(student: &StudentRecord, subjects: &[SubjectRecord]) -> BulkResultEntry {
    classify_roll(student.pin(), student, subjects)
}

/// As [`classify`], but keyed by the requested roll even if the page
/// carried its own `PIN` row.
pub fn classify_roll(
    roll: &str,
    student: &StudentRecord,
    subjects: &[SubjectRecord],
) -> BulkResultEntry {
    let name = student.get(NAME_KEY).unwrap_or_default();
    if name.is_empty() {
        return placeholder_entry(roll, NO_RESULT);
    }

    if subjects.is_empty() {
        warn!(roll, "student has a name but no subject rows; counted as zero fails");
    }

    BulkResultEntry {
        roll: roll.to_string(),
        name: name.to_string(),
        total: student.get(GRAND_TOTAL_KEY).unwrap_or_default().to_string(),
        result: student.get(RESULT_KEY).unwrap_or_default().to_string(),
        fail_count: Some(fail_count(subjects)),
    }
}

/// Entry for a roll whose page could not be fetched at all.
pub fn fetch_error_entry(roll: &str) -> BulkResultEntry {
    placeholder_entry(roll, FETCH_ERROR)
}

fn placeholder_entry(roll: &str, result: &str) -> BulkResultEntry {
    BulkResultEntry {
        roll: roll.to_string(),
        name: PLACEHOLDER.to_string(),
        total: PLACEHOLDER.to_string(),
        result: result.to_string(),
        fail_count: None,
    }
}

/// Pass/fail distribution over the students that have a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisBuckets {
    pub pass_all: u32,
    pub fail_1: u32,
    pub fail_2: u32,
    pub fail_3: u32,
    pub fail_4_plus: u32,
}

impl AnalysisBuckets {
    pub fn from_entries(entries: &[BulkResultEntry]) -> Self {
        let mut buckets = Self::default();
        for fc in entries.iter().filter_map(|e| e.fail_count) {
            buckets.add(fc);
        }
        buckets
    }

    pub fn add(&mut self, fail_count: u32) {
        match fail_count {
            0 => self.pass_all += 1,
            1 => self.fail_1 += 1,
            2 => self.fail_2 += 1,
            3 => self.fail_3 += 1,
            _ => self.fail_4_plus += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.pass_all + self.fail_1 + self.fail_2 + self.fail_3 + self.fail_4_plus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subjects(statuses: &[&str]) -> Vec<SubjectRecord> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, s)| SubjectRecord {
                code: format!("CM-30{}", i + 1),
                status: s.to_string(),
                ..SubjectRecord::default()
            })
            .collect()
    }

    fn student(roll: &str, name: Option<&str>) -> StudentRecord {
        let mut s = StudentRecord::new(roll);
        if let Some(n) = name {
            s.insert("Name".into(), n.into());
            s.insert("Grand Total".into(), "540".into());
            s.insert("Result".into(), "PASS".into());
        }
        s
    }

    fn entry(fail_count: Option<u32>) -> BulkResultEntry {
        BulkResultEntry {
            roll: "r".into(),
            name: "n".into(),
            total: "".into(),
            result: "".into(),
            fail_count,
        }
    }

    #[test]
    fn counts_exact_f_only() {
        assert_eq!(fail_count(&subjects(&["P", "F", "f", "FAIL", "", "F"])), 2);
        assert_eq!(fail_count(&[]), 0);
    }

    #[test]
    fn two_fails_land_in_fail_2() {
        let e = classify(&student("r1", Some("A")), &subjects(&["P", "F", "F", "P"]));
        assert_eq!(e.fail_count, Some(2));
        let b = AnalysisBuckets::from_entries(&[e]);
        assert_eq!(b.fail_2, 1);
        assert_eq!(b.total(), 1);
    }

    #[test]
    fn missing_name_is_no_result() {
        let e = classify(&student("25ABC-CM-004", None), &subjects(&["F"]));
        assert_eq!(
            e,
            BulkResultEntry {
                roll: "25ABC-CM-004".into(),
                name: "—".into(),
                total: "—".into(),
                result: "NO RESULT".into(),
                fail_count: None,
            }
        );
        assert_eq!(AnalysisBuckets::from_entries(&[e]), AnalysisBuckets::default());
    }

    #[test]
    fn empty_name_is_no_result() {
        let mut s = StudentRecord::new("r");
        s.insert("Name".into(), "".into());
        assert_eq!(classify(&s, &[]).result, NO_RESULT);
    }

    #[test]
    fn result_fields_copied() {
        let e = classify(&student("r9", Some("RAVI")), &subjects(&["P"]));
        assert_eq!(e.roll, "r9");
        assert_eq!(e.name, "RAVI");
        assert_eq!(e.total, "540");
        assert_eq!(e.result, "PASS");
    }

    #[test]
    fn missing_total_and_result_default_empty() {
        let mut s = StudentRecord::new("r");
        s.insert("Name".into(), "X".into());
        let e = classify(&s, &subjects(&["P"]));
        assert_eq!(e.total, "");
        assert_eq!(e.result, "");
        assert_eq!(e.fail_count, Some(0));
    }

    #[test]
    fn name_without_subjects_scores_as_pass() {
        let e = classify(&student("r", Some("A")), &[]);
        assert_eq!(e.fail_count, Some(0));
    }

    #[test]
    fn buckets_partition_result_bearing_entries() {
        let entries: Vec<_> = [None, Some(0), Some(1), Some(2), Some(3), Some(4), Some(9), None, Some(0)]
            .into_iter()
            .map(entry)
            .collect();
        let b = AnalysisBuckets::from_entries(&entries);
        assert_eq!(
            b,
            AnalysisBuckets {
                pass_all: 2,
                fail_1: 1,
                fail_2: 1,
                fail_3: 1,
                fail_4_plus: 2,
            }
        );
        let with_result = entries.iter().filter(|e| e.has_result()).count() as u32;
        assert_eq!(b.total(), with_result);
    }

    #[test]
    fn requested_roll_wins_over_page_pin() {
        let mut s = student("25ABC-CM-001", Some("A"));
        s.insert("PIN".into(), "25ABC-CM-1".into());
        assert_eq!(classify(&s, &[]).roll, "25ABC-CM-1");
        assert_eq!(classify_roll("25ABC-CM-001", &s, &[]).roll, "25ABC-CM-001");
    }

    #[test]
    fn fetch_error_entry_has_no_fail_count() {
        let e = fetch_error_entry("r");
        assert_eq!(e.result, FETCH_ERROR);
        assert_eq!(e.name, PLACEHOLDER);
        assert!(!e.has_result());
    }
}
