use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

pub const PIN_KEY: &str = "PIN";
pub const NAME_KEY: &str = "Name";
pub const GRAND_TOTAL_KEY: &str = "Grand Total";
pub const RESULT_KEY: &str = "Result";
const PHOTO_KEY: &str = "photo";

/// Attribute rows scraped for one roll, in first-seen order.
/// Re-inserting a key overwrites its value in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    fields: Vec<(String, String)>,
    pub photo: Option<String>,
}

impl StudentRecord {
    pub fn new(roll: &str) -> Self {
        Self {
            fields: vec![(PIN_KEY.to_string(), roll.to_string())],
            photo: None,
        }
    }

    pub fn insert(&mut self, key: String, value: String) {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pin(&self) -> &str {
        self.get(PIN_KEY).unwrap_or_default()
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Number of attributes beyond `PIN`.
    pub fn attribute_count(&self) -> usize {
        self.fields.iter().filter(|(k, _)| k != PIN_KEY).count()
    }
}

impl Serialize for StudentRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // `photo` is reserved for the embedded image
        let scraped: Vec<_> = self.fields.iter().filter(|(k, _)| k != PHOTO_KEY).collect();
        let mut map = serializer.serialize_map(Some(scraped.len() + 1))?;
        for (k, v) in scraped {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry(PHOTO_KEY, &self.photo)?;
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubjectRecord {
    pub code: String,
    pub external: String,
    pub internal: String,
    pub total: String,
    pub grade: String,
    pub status: String,
}

impl SubjectRecord {
    pub fn is_failed(&self) -> bool {
        self.status == "F"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkResultEntry {
    pub roll: String,
    pub name: String,
    pub total: String,
    pub result: String,
    pub fail_count: Option<u32>,
}

impl BulkResultEntry {
    pub fn has_result(&self) -> bool {
        self.fail_count.is_some()
    }
}

/// One line of the full export. A separator has every column blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullExportRow {
    pub roll: String,
    pub subject: String,
    pub external: String,
    pub internal: String,
    pub total: String,
    pub grade: String,
    pub status: String,
}

impl FullExportRow {
    pub fn from_subject(roll: &str, s: &SubjectRecord) -> Self {
        Self {
            roll: roll.to_string(),
            subject: s.code.clone(),
            external: s.external.clone(),
            internal: s.internal.clone(),
            total: s.total.clone(),
            grade: s.grade.clone(),
            status: s.status.clone(),
        }
    }

    pub fn separator() -> Self {
        Self::default()
    }

    pub fn is_separator(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_always_first() {
        let s = StudentRecord::new("25ABC-CM-001");
        assert_eq!(s.pin(), "25ABC-CM-001");
        assert_eq!(s.attribute_count(), 0);
        assert_eq!(s.fields()[0].0, PIN_KEY);
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut s = StudentRecord::new("r");
        s.insert("Name".into(), "A".into());
        s.insert("Result".into(), "Pass".into());
        s.insert("Name".into(), "B".into());
        assert_eq!(s.get("Name"), Some("B"));
        let keys: Vec<&str> = s.fields().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["PIN", "Name", "Result"]);
    }

    #[test]
    fn failed_is_exact_match() {
        let mut s = SubjectRecord::default();
        for (status, failed) in [("F", true), ("f", false), ("P", false), ("", false), (" F", false)] {
            s.status = status.to_string();
            assert_eq!(s.is_failed(), failed, "status {:?}", status);
        }
    }

    #[test]
    fn student_json_keeps_order() {
        let mut s = StudentRecord::new("r1");
        s.insert("Name".into(), "Ravi".into());
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"PIN":"r1","Name":"Ravi","photo":null}"#);
    }

    #[test]
    fn scraped_photo_row_does_not_duplicate_json_key() {
        let mut s = StudentRecord::new("r1");
        s.insert("photo".into(), "see office".into());
        s.photo = Some("data:image/png;base64,AA".into());
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"PIN":"r1","photo":"data:image/png;base64,AA"}"#);
        assert_eq!(s.get("photo"), Some("see office"));
    }
}
