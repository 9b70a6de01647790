//! Glossary record types

use serde::{Deserialize, Serialize};

/// A row of the glossary table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source_term: String,
    pub target_term: String,
    pub category: String,
    pub confidence: f64,
    /// Incremented on every lookup hit for `source_term`
    pub usage_count: u64,
}

/// One ranked answer to a lookup
#[derive(Debug, Clone, PartialEq)]
pub struct GlossaryMatch {
    pub target_term: String,
    pub category: String,
    pub confidence: f64,
}

/// Interchange record used by the list import/export format.
///
/// Accepts the legacy `chinese` / `english` keys on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermRecord {
    #[serde(alias = "chinese", alias = "source_term")]
    pub source_term: String,
    #[serde(alias = "english", alias = "target_term")]
    pub target_term: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl TermRecord {
    pub fn new(source_term: &str, target_term: &str, category: &str, confidence: f64) -> Self {
        Self {
            source_term: source_term.to_string(),
            target_term: target_term.to_string(),
            category: category.to_string(),
            confidence,
        }
    }
}

impl From<GlossaryEntry> for TermRecord {
    fn from(entry: GlossaryEntry) -> Self {
        Self {
            source_term: entry.source_term,
            target_term: entry.target_term,
            category: entry.category,
            confidence: entry.confidence,
        }
    }
}

/// Outcome of a partial-failure import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

impl ImportReport {
    pub fn merge(&mut self, other: ImportReport) {
        self.imported += other.imported;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub term_count: usize,
    pub total_usage: u64,
}

pub(crate) fn default_category() -> String {
    "custom".to_string()
}

pub(crate) fn default_confidence() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accepts_legacy_keys() {
        let record: TermRecord =
            serde_json::from_str(r#"{"chinese": "伺服", "english": "Servo"}"#).unwrap();
        assert_eq!(record.source_term, "伺服");
        assert_eq!(record.target_term, "Servo");
        assert_eq!(record.category, "custom");
        assert_eq!(record.confidence, 1.0);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = TermRecord::new("启动", "Start", "automation", 1.0);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sourceTerm"], "启动");
        assert_eq!(json["targetTerm"], "Start");
    }
}
