//! Import/export formats and mapping utilities.
//!
//! Three on-disk shapes are accepted:
//! - a flat JSON mapping: `{"启动": "Start", ...}`
//! - a JSON list of records: `[{"sourceTerm": "启动", "targetTerm": "Start", "category": "ui", "confidence": 1.0}, ...]`
//! - CSV with a `chinese,english[,category,confidence]` header
//!
//! Parsing is partial-failure: a malformed record is skipped and counted,
//! the rest of the document still loads.

use crate::entry::TermRecord;
use crate::error::GlossaryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Source terms longer than this are flagged by [`validate_mapping`]
const SUSPICIOUS_SOURCE_CHARS: usize = 50;
/// Target terms longer than this are flagged by [`validate_mapping`]
const SUSPICIOUS_TARGET_CHARS: usize = 100;

/// File shapes understood by import and export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Csv,
}

impl FileFormat {
    /// `.csv` (any case) is CSV, everything else JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => FileFormat::Csv,
            _ => FileFormat::Json,
        }
    }
}

const CSV_HEADER: [&str; 4] = ["chinese", "english", "category", "confidence"];

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(alias = "source_term", alias = "sourceTerm")]
    chinese: String,
    #[serde(alias = "target_term", alias = "targetTerm")]
    english: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl From<CsvRow> for TermRecord {
    fn from(row: CsvRow) -> Self {
        TermRecord::new(
            &row.chinese,
            &row.english,
            row.category.as_deref().unwrap_or("custom"),
            row.confidence.unwrap_or(1.0),
        )
    }
}

/// Records recovered from an import document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlossaryDocument {
    pub records: Vec<TermRecord>,
    /// Records dropped because a required field was missing or invalid
    pub skipped: usize,
}

/// Parse either import shape
pub fn parse_document(json: &str) -> Result<GlossaryDocument, GlossaryError> {
    let value: Value = serde_json::from_str(json)?;
    let mut document = GlossaryDocument::default();

    match value {
        Value::Object(map) => {
            for (source, target) in map {
                match target.as_str() {
                    Some(target) => match validate_record(TermRecord::new(&source, target, "custom", 1.0)) {
                        Ok(record) => document.records.push(record),
                        Err(e) => {
                            debug!("Skipping mapping entry '{}': {}", source, e);
                            document.skipped += 1;
                        }
                    },
                    None => {
                        debug!("Skipping mapping entry '{}': target is not a string", source);
                        document.skipped += 1;
                    }
                }
            }
        }
        Value::Array(items) => {
            for (index, item) in items.into_iter().enumerate() {
                match record_from_value(item) {
                    Ok(record) => document.records.push(record),
                    Err(e) => {
                        debug!("Skipping record #{}: {}", index, e);
                        document.skipped += 1;
                    }
                }
            }
        }
        _ => {
            return Err(GlossaryError::InvalidRecord(
                "expected a JSON object or array at top level".to_string(),
            ))
        }
    }

    if document.skipped > 0 {
        warn!(
            "Glossary document: {} records accepted, {} skipped",
            document.records.len(),
            document.skipped
        );
    }

    Ok(document)
}

/// Parse CSV with a header row. Only an unreadable header fails the whole
/// document; bad rows are skipped.
pub fn parse_csv<R: Read>(reader: R) -> Result<GlossaryDocument, GlossaryError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    reader.headers()?;

    let mut document = GlossaryDocument::default();
    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        match row
            .map_err(|e| GlossaryError::InvalidRecord(e.to_string()))
            .and_then(|row| validate_record(row.into()))
        {
            Ok(record) => document.records.push(record),
            Err(e) => {
                debug!("Skipping CSV row {}: {}", index + 2, e);
                document.skipped += 1;
            }
        }
    }

    if document.skipped > 0 {
        warn!(
            "Glossary CSV: {} rows accepted, {} skipped",
            document.records.len(),
            document.skipped
        );
    }

    Ok(document)
}

/// Write records as CSV. The header is written even when there are no rows.
pub fn write_csv<W: Write>(records: &[TermRecord], writer: W) -> Result<(), GlossaryError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.serialize(CsvRow {
            chinese: record.source_term.clone(),
            english: record.target_term.clone(),
            category: Some(record.category.clone()),
            confidence: Some(record.confidence),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Decode and validate a single list-format record
pub fn record_from_value(value: Value) -> Result<TermRecord, GlossaryError> {
    let record: TermRecord = serde_json::from_value(value)
        .map_err(|e| GlossaryError::InvalidRecord(e.to_string()))?;
    validate_record(record)
}

/// Trim terms and check the record is storable
pub fn validate_record(record: TermRecord) -> Result<TermRecord, GlossaryError> {
    let source_term = record.source_term.trim();
    let target_term = record.target_term.trim();

    if source_term.is_empty() {
        return Err(GlossaryError::InvalidRecord("empty source term".to_string()));
    }
    if target_term.is_empty() {
        return Err(GlossaryError::InvalidRecord(format!(
            "empty target term for '{}'",
            source_term
        )));
    }
    if !record.confidence.is_finite() || !(0.0..=1.0).contains(&record.confidence) {
        return Err(GlossaryError::InvalidRecord(format!(
            "confidence {} out of range for '{}'",
            record.confidence, source_term
        )));
    }

    let category = match record.category.trim() {
        "" => "custom".to_string(),
        c => c.to_string(),
    };

    Ok(TermRecord {
        source_term: source_term.to_string(),
        target_term: target_term.to_string(),
        category,
        confidence: record.confidence,
    })
}

/// Issues found in a flat mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub empty_keys: Vec<String>,
    pub empty_values: Vec<String>,
    pub duplicate_values: Vec<String>,
    pub suspicious_entries: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.empty_keys.is_empty()
            && self.empty_values.is_empty()
            && self.duplicate_values.is_empty()
            && self.suspicious_entries.is_empty()
    }
}

pub fn validate_mapping(mapping: &BTreeMap<String, String>) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen_targets: HashMap<&str, &str> = HashMap::new();

    for (source, target) in mapping {
        if source.trim().is_empty() {
            report.empty_keys.push(source.clone());
        }
        if target.trim().is_empty() {
            report.empty_values.push(format!("{} -> {}", source, target));
        }

        match seen_targets.get(target.as_str()) {
            Some(first) => report.duplicate_values.push(format!(
                "'{}' used for both '{}' and '{}'",
                target, first, source
            )),
            None => {
                seen_targets.insert(target.as_str(), source.as_str());
            }
        }

        if source.chars().count() > SUSPICIOUS_SOURCE_CHARS
            || target.chars().count() > SUSPICIOUS_TARGET_CHARS
        {
            report.suspicious_entries.push(format!("{} -> {}", source, target));
        }
    }

    report
}

/// Merge mappings in order; on conflict the longer target term wins
pub fn merge_mappings(mappings: &[BTreeMap<String, String>]) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();

    for mapping in mappings {
        for (source, target) in mapping {
            match merged.get(source) {
                Some(existing) if existing != target => {
                    if target.chars().count() > existing.chars().count() {
                        debug!("Glossary conflict resolved: {} -> {}", source, target);
                        merged.insert(source.clone(), target.clone());
                    }
                }
                Some(_) => {}
                None => {
                    merged.insert(source.clone(), target.clone());
                }
            }
        }
    }

    merged
}
