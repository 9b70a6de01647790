//! SQLite storage for glossary terms

use crate::entry::{GlossaryEntry, GlossaryMatch, ImportReport, StoreStats, TermRecord};
use crate::error::GlossaryError;
use crate::transfer::{parse_csv, parse_document, validate_record, write_csv, FileFormat, GlossaryDocument};
use crate::vocabulary::{BuiltinTerm, BUILTIN_TERMS};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a statement waits on a locked database file before failing
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Persistent term table.
///
/// All access goes through one connection behind a mutex, so the store can be
/// shared across threads; every upsert is a single statement and therefore
/// atomic per `(source_term, target_term)` key.
pub struct GlossaryStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl GlossaryStore {
    /// Open or create the glossary at `path` and seed the builtin vocabulary
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GlossaryError> {
        let store = Self::open_unseeded(path)?;
        store.seed_defaults();
        Ok(store)
    }

    /// Open or create the glossary at `path` without seeding
    pub fn open_unseeded<P: AsRef<Path>>(path: P) -> Result<Self, GlossaryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        info!("Glossary opened at {}", path.display());
        Ok(store)
    }

    /// Open an in-memory glossary seeded with the builtin vocabulary
    pub fn open_in_memory() -> Result<Self, GlossaryError> {
        let store = Self::open_in_memory_unseeded()?;
        store.seed_defaults();
        Ok(store)
    }

    /// Open an empty in-memory glossary (for testing)
    pub fn open_in_memory_unseeded() -> Result<Self, GlossaryError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Default on-disk location
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("live-translator")
            .join("glossary.db")
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, GlossaryError> {
        self.conn
            .lock()
            .map_err(|_| GlossaryError::Unavailable("connection lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), GlossaryError> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS glossary (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_term TEXT NOT NULL,
                target_term TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'custom',
                confidence REAL NOT NULL DEFAULT 1.0,
                usage_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(source_term, target_term)
            );

            CREATE INDEX IF NOT EXISTS idx_glossary_source ON glossary(source_term);
            "#,
        )?;
        Ok(())
    }

    /// Ranked matches for an exact source term; bumps `usage_count` on a hit
    pub fn try_lookup(&self, term: &str) -> Result<Vec<GlossaryMatch>, GlossaryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let matches = {
            let mut stmt = tx.prepare(
                "SELECT target_term, category, confidence FROM glossary
                 WHERE source_term = ?1
                 ORDER BY confidence DESC, usage_count DESC, id ASC",
            )?;
            let rows = stmt.query_map(params![term], |row| {
                Ok(GlossaryMatch {
                    target_term: row.get(0)?,
                    category: row.get(1)?,
                    confidence: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        if !matches.is_empty() {
            tx.execute(
                "UPDATE glossary SET usage_count = usage_count + 1 WHERE source_term = ?1",
                params![term],
            )?;
        }

        tx.commit()?;
        Ok(matches)
    }

    /// Like [`try_lookup`](Self::try_lookup), but a store failure is a miss
    pub fn lookup(&self, term: &str) -> Vec<GlossaryMatch> {
        match self.try_lookup(term) {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Glossary lookup for '{}' failed, treating as miss: {}", term, e);
                Vec::new()
            }
        }
    }

    /// Insert or update the `(source_term, target_term)` pair.
    ///
    /// An existing pair keeps its usage count; category and confidence are
    /// overwritten.
    pub fn try_add_term(
        &self,
        source_term: &str,
        target_term: &str,
        category: &str,
        confidence: f64,
    ) -> Result<(), GlossaryError> {
        let record = validate_record(TermRecord::new(source_term, target_term, category, confidence))?;
        self.upsert(&record)
    }

    /// Add a term; failures are logged and dropped
    pub fn add_term(&self, source_term: &str, target_term: &str, category: &str, confidence: f64) -> bool {
        match self.try_add_term(source_term, target_term, category, confidence) {
            Ok(()) => {
                debug!("Added term: {} -> {}", source_term, target_term);
                true
            }
            Err(e) => {
                warn!("Dropping glossary term {} -> {}: {}", source_term, target_term, e);
                false
            }
        }
    }

    fn upsert(&self, record: &TermRecord) -> Result<(), GlossaryError> {
        self.conn()?.execute(
            "INSERT INTO glossary (source_term, target_term, category, confidence)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(source_term, target_term) DO UPDATE SET
                category = excluded.category,
                confidence = excluded.confidence,
                updated_at = datetime('now')",
            params![
                record.source_term,
                record.target_term,
                record.category,
                record.confidence
            ],
        )?;
        Ok(())
    }

    /// Seed the builtin vocabulary; existing pairs are left untouched
    pub fn seed_defaults(&self) -> usize {
        match self.seed_terms(BUILTIN_TERMS) {
            Ok(inserted) => {
                info!(
                    "Seeded glossary: {} of {} builtin terms were new",
                    inserted,
                    BUILTIN_TERMS.len()
                );
                inserted
            }
            Err(e) => {
                warn!("Failed to seed builtin glossary terms: {}", e);
                0
            }
        }
    }

    /// Insert-if-absent for a set of compiled-in terms
    pub fn seed_terms(&self, terms: &[BuiltinTerm]) -> Result<usize, GlossaryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO glossary (source_term, target_term, category, confidence)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for term in terms {
                inserted += stmt.execute(params![term.source, term.target, term.category, term.confidence])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Upsert each record; invalid or failing records are skipped
    pub fn import_records(&self, records: &[TermRecord]) -> ImportReport {
        let mut report = ImportReport::default();
        for record in records {
            let result = validate_record(record.clone()).and_then(|r| self.upsert(&r));
            match result {
                Ok(()) => report.imported += 1,
                Err(e) => {
                    warn!("Skipping glossary record '{}': {}", record.source_term, e);
                    report.skipped += 1;
                }
            }
        }
        report
    }

    /// Import a flat `source → target` mapping under one category
    pub fn import_mapping(&self, mapping: &BTreeMap<String, String>, category: &str) -> ImportReport {
        let records: Vec<TermRecord> = mapping
            .iter()
            .map(|(source, target)| TermRecord::new(source, target, category, 1.0))
            .collect();
        self.import_records(&records)
    }

    pub fn import_document(&self, document: &GlossaryDocument) -> ImportReport {
        let mut report = self.import_records(&document.records);
        report.skipped += document.skipped;
        report
    }

    /// Import either JSON shape from a string
    pub fn import_json(&self, json: &str) -> Result<ImportReport, GlossaryError> {
        let document = parse_document(json)?;
        Ok(self.import_document(&document))
    }

    /// Import CSV text with a `chinese,english` header
    pub fn import_csv(&self, csv: &str) -> Result<ImportReport, GlossaryError> {
        let document = parse_csv(csv.as_bytes())?;
        Ok(self.import_document(&document))
    }

    /// Import a file; `.csv` is read as CSV, anything else as JSON
    pub fn import_file<P: AsRef<Path>>(&self, path: P) -> Result<ImportReport, GlossaryError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let report = match FileFormat::from_path(path) {
            FileFormat::Csv => self.import_csv(&contents)?,
            FileFormat::Json => self.import_json(&contents)?,
        };
        info!(
            "Imported {} terms from {} ({} skipped)",
            report.imported,
            path.display(),
            report.skipped
        );
        Ok(report)
    }

    /// All rows, ordered by source term then rank
    pub fn entries(&self) -> Result<Vec<GlossaryEntry>, GlossaryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_term, target_term, category, confidence, usage_count
             FROM glossary
             ORDER BY source_term, confidence DESC, usage_count DESC, id ASC",
        )?;
        let rows = stmt.query_map([], row_to_entry)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Rows for one source term, ranked
    pub fn entries_for(&self, source_term: &str) -> Result<Vec<GlossaryEntry>, GlossaryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_term, target_term, category, confidence, usage_count
             FROM glossary WHERE source_term = ?1
             ORDER BY confidence DESC, usage_count DESC, id ASC",
        )?;
        let rows = stmt.query_map(params![source_term], row_to_entry)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn remove_term(&self, source_term: &str, target_term: &str) -> Result<bool, GlossaryError> {
        let removed = self.conn()?.execute(
            "DELETE FROM glossary WHERE source_term = ?1 AND target_term = ?2",
            params![source_term, target_term],
        )?;
        Ok(removed > 0)
    }

    pub fn export_records(&self) -> Result<Vec<TermRecord>, GlossaryError> {
        Ok(self.entries()?.into_iter().map(TermRecord::from).collect())
    }

    /// Best-ranked target per source term
    pub fn export_mapping(&self) -> Result<BTreeMap<String, String>, GlossaryError> {
        let mut mapping = BTreeMap::new();
        for entry in self.entries()? {
            mapping.entry(entry.source_term).or_insert(entry.target_term);
        }
        Ok(mapping)
    }

    /// Write every row to `path` as CSV or as the JSON record list, chosen
    /// by extension; returns the record count
    pub fn export_file<P: AsRef<Path>>(&self, path: P) -> Result<usize, GlossaryError> {
        let records = self.export_records()?;
        match FileFormat::from_path(path.as_ref()) {
            FileFormat::Csv => {
                let file = std::fs::File::create(path.as_ref())?;
                write_csv(&records, std::io::BufWriter::new(file))?;
            }
            FileFormat::Json => {
                let json = serde_json::to_string_pretty(&records)?;
                std::fs::write(path.as_ref(), json)?;
            }
        }
        info!("Exported {} terms to {}", records.len(), path.as_ref().display());
        Ok(records.len())
    }

    pub fn stats(&self) -> Result<StoreStats, GlossaryError> {
        let (count, usage): (i64, i64) = self.conn()?.query_row(
            "SELECT COUNT(*), COALESCE(SUM(usage_count), 0) FROM glossary",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(StoreStats {
            term_count: count.max(0) as usize,
            total_usage: usage.max(0) as u64,
        })
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<GlossaryEntry> {
    let usage: i64 = row.get(4)?;
    Ok(GlossaryEntry {
        source_term: row.get(0)?,
        target_term: row.get(1)?,
        category: row.get(2)?,
        confidence: row.get(3)?,
        usage_count: usage.max(0) as u64,
    })
}
