//! Import validation report.
//!
//! A successful `validate<Source>Import` call returns a
//! [`ValidationReport`]: the parsed batch partitioned into valid
//! candidates, detected duplicates, unsupported record kinds, and
//! malformed records. The report is immutable — it is produced once per
//! parse and every entry keeps its `index` into the *original* parsed
//! sequence (indices are never renumbered after filtering). The mutable
//! selection over it lives in `latchkey-import`.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A foreign credential record that parsed cleanly and is importable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEntry {
    /// Stable position in the original parsed sequence.
    pub index: usize,
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Source-specific extra fields the parser preserved verbatim.
    #[serde(default)]
    pub extra_fields: BTreeMap<String, String>,
}

/// A candidate that collides with an entry already in the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateEntry {
    /// Stable position in the original parsed sequence.
    pub index: usize,
    /// The parsed record itself.
    pub entry: CandidateEntry,
    /// Title of the existing vault entry it collides with.
    pub existing_title: String,
}

/// A record of a kind the importer does not handle (e.g. an attachment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedEntry {
    pub index: usize,
    /// Source-format kind label, as reported by the parser.
    pub kind: String,
    /// Whatever fields the source record supplied, possibly none. Used to
    /// pre-populate a manual single-entry creation draft.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// A record the parser could not make sense of at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedEntry {
    pub index: usize,
    pub reason: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Pre-populated draft for the manual single-entry creation path.
///
/// Unsupported and malformed records are excluded from batch import
/// entirely; this draft is the only way their content reaches the vault.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDraft {
    pub title: Option<String>,
    pub username: Option<String>,
    pub url: Option<String>,
    pub extra_fields: BTreeMap<String, String>,
}

/// Immutable result of validating a parsed import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid_entries: Vec<CandidateEntry>,
    pub duplicates: Vec<DuplicateEntry>,
    pub unsupported: Vec<UnsupportedEntry>,
    pub malformed: Vec<MalformedEntry>,
}

impl ValidationReport {
    /// Original-sequence indices of all valid entries.
    pub fn valid_indices(&self) -> BTreeSet<usize> {
        self.valid_entries.iter().map(|e| e.index).collect()
    }

    /// Original-sequence indices of all detected duplicates.
    pub fn duplicate_indices(&self) -> BTreeSet<usize> {
        self.duplicates.iter().map(|d| d.index).collect()
    }

    /// Number of cleanly importable entries.
    pub fn valid_count(&self) -> usize {
        self.valid_entries.len()
    }

    /// True when the batch contains nothing importable at all, in which
    /// case the confirm action is suppressed.
    pub fn is_empty_import(&self) -> bool {
        self.valid_entries.is_empty() && self.duplicates.is_empty()
    }

    /// Build a manual-creation draft for an unsupported or malformed
    /// record, pre-populated with whatever fields the source supplied.
    /// Returns `None` for indices that are not in those two categories.
    pub fn manual_entry_draft(&self, index: usize) -> Option<EntryDraft> {
        let fields = self
            .unsupported
            .iter()
            .find(|e| e.index == index)
            .map(|e| &e.fields)
            .or_else(|| {
                self.malformed
                    .iter()
                    .find(|e| e.index == index)
                    .map(|e| &e.fields)
            })?;

        let mut draft = EntryDraft::default();
        for (key, value) in fields {
            match key.as_str() {
                "title" | "name" => draft.title = Some(value.clone()),
                "username" | "login" => draft.username = Some(value.clone()),
                "url" | "website" => draft.url = Some(value.clone()),
                _ => {
                    draft.extra_fields.insert(key.clone(), value.clone());
                }
            }
        }
        Some(draft)
    }
}
