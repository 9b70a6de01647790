//! Glossary Store Library
//!
//! Curated source-term → target-term table that always outranks machine
//! translation. Backed by SQLite, seeded with a builtin vocabulary, and
//! extended through explicit adds and file imports.

pub mod entry;
pub mod error;
pub mod store;
pub mod transfer;
pub mod vocabulary;

pub use entry::{GlossaryEntry, GlossaryMatch, ImportReport, StoreStats, TermRecord};
pub use error::GlossaryError;
pub use store::GlossaryStore;
pub use transfer::{
    merge_mappings, parse_csv, parse_document, validate_mapping, write_csv, FileFormat, GlossaryDocument,
    ValidationReport,
};
pub use vocabulary::{domain_vocabulary, BuiltinTerm, BUILTIN_TERMS, DOMAINS};
