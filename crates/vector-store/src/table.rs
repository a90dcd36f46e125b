use crate::error::{Result, VectorStoreError};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write;
use std::io::Read;
use std::path::Path;

const CODE_HEADERS: &[&str] = &["code", "procedure code"];
const DESCRIPTION_HEADERS: &[&str] = &["description", "description of service"];
const KEYWORD_HEADERS: &[&str] = &["keywords"];

/// One billing code from the reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEntry {
    pub code: String,
    pub description: String,
    /// Normalized keyword text (lowercase, trimmed) as it appears in the embedded blob.
    pub keywords_text: String,
    pub keywords: BTreeSet<String>,
}

impl CodeEntry {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        keywords: impl AsRef<str>,
    ) -> Self {
        let keywords_text = keywords.as_ref().trim().to_lowercase();
        let keywords = keyword_tokens(&keywords_text);
        Self {
            code: code.into().trim().to_string(),
            description: description.into().trim().to_string(),
            keywords_text,
            keywords,
        }
    }

    /// Text submitted to the embedding service for this entry.
    #[must_use]
    pub fn canonical_text(&self) -> String {
        format!(
            "CDT Code: {}\nService: {}\nKeywords: {}",
            self.code, self.description, self.keywords_text
        )
    }
}

/// Cleaned reference table: rows without code or description dropped, codes unique.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: Vec<CodeEntry>,
}

impl ReferenceTable {
    /// Read a CSV table. A missing file is a configuration error, not an IO error.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(VectorStoreError::Configuration(format!(
                "reference table not found at {}",
                path.display()
            )));
        }
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        if table.is_empty() {
            return Err(VectorStoreError::Configuration(format!(
                "reference table {} has no rows with both a code and a description",
                path.display()
            )));
        }
        log::info!(
            "Loaded {} reference codes from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv.headers()?.clone();
        let code_col = find_column(&headers, CODE_HEADERS).ok_or_else(|| {
            VectorStoreError::Configuration("reference table has no 'Code' column".into())
        })?;
        let description_col = find_column(&headers, DESCRIPTION_HEADERS).ok_or_else(|| {
            VectorStoreError::Configuration("reference table has no 'Description' column".into())
        })?;
        let keywords_col = find_column(&headers, KEYWORD_HEADERS);

        let mut entries = Vec::new();
        let mut dropped = 0usize;
        for record in csv.records() {
            let record = record?;
            let code = cell(&record, Some(code_col));
            let description = cell(&record, Some(description_col));
            if code.is_empty() || description.is_empty() {
                dropped += 1;
                continue;
            }
            entries.push(CodeEntry::new(
                code,
                description,
                cell(&record, keywords_col),
            ));
        }
        if dropped > 0 {
            log::warn!("Dropped {dropped} reference rows missing a code or description");
        }
        Ok(Self::from_entries(entries))
    }

    /// Build from already-parsed entries, keeping the first occurrence of each code.
    #[must_use]
    pub fn from_entries(entries: Vec<CodeEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(entries.len());
        for entry in entries {
            if seen.insert(entry.code.clone()) {
                unique.push(entry);
            } else {
                log::warn!("Duplicate reference code {} ignored", entry.code);
            }
        }
        Self { entries: unique }
    }

    #[must_use]
    pub fn entries(&self) -> &[CodeEntry] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<CodeEntry> {
        self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Content hash of the cleaned rows; a persisted index built from a different table is stale.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint_entries(&self.entries)
    }
}

pub(crate) fn fingerprint_entries(entries: &[CodeEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.code.as_bytes());
        hasher.update([0]);
        hasher.update(entry.description.as_bytes());
        hasher.update([0]);
        hasher.update(entry.keywords_text.as_bytes());
        hasher.update([b'\n']);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| names.iter().any(|name| header.trim().eq_ignore_ascii_case(name)))
}

fn cell(record: &StringRecord, col: Option<usize>) -> String {
    col.and_then(|idx| record.get(idx))
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn keyword_tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '|'))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const TABLE: &str = "\
Code,Description,Keywords
D2140,\"Amalgam restoration, one surface\",\"  Caries, Amalgam restoration \"
D0120,Periodic oral evaluation,
,Orphan description,x
D9999,,y
D2140,Duplicate row,dup
";

    #[test]
    fn drops_incomplete_rows_and_duplicates() {
        let table = ReferenceTable::from_reader(TABLE.as_bytes()).unwrap();
        let codes: Vec<&str> = table.entries().iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["D2140", "D0120"]);
        assert_eq!(table.entries()[1].keywords_text, "");
        assert!(table.entries()[1].keywords.is_empty());
    }

    #[test]
    fn keywords_are_lowercase_tokens() {
        let table = ReferenceTable::from_reader(TABLE.as_bytes()).unwrap();
        let entry = &table.entries()[0];
        assert_eq!(entry.keywords_text, "caries, amalgam restoration");
        let tokens: Vec<&str> = entry.keywords.iter().map(String::as_str).collect();
        assert_eq!(tokens, vec!["amalgam", "caries", "restoration"]);
    }

    #[test]
    fn canonical_text_layout() {
        let entry = CodeEntry::new("D2140", "Amalgam restoration, one surface", "caries");
        assert_eq!(
            entry.canonical_text(),
            "CDT Code: D2140\nService: Amalgam restoration, one surface\nKeywords: caries"
        );
    }

    #[test]
    fn accepts_original_column_names() {
        let raw = "Procedure Code,Description of Service\nD1110,Prophylaxis - adult\n";
        let table = ReferenceTable::from_reader(raw.as_bytes()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries()[0].description, "Prophylaxis - adult");
    }

    #[test]
    fn missing_table_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let err = ReferenceTable::from_path(tmp.path().join("missing.csv")).unwrap_err();
        assert!(matches!(err, VectorStoreError::Configuration(_)));
    }

    #[test]
    fn table_without_valid_rows_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.csv");
        std::fs::write(&path, "Code,Description\n,\nD1,\n").unwrap();
        let err = ReferenceTable::from_path(&path).unwrap_err();
        assert!(matches!(err, VectorStoreError::Configuration(_)));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = ReferenceTable::from_entries(vec![CodeEntry::new("D1", "One", "")]);
        let b = ReferenceTable::from_entries(vec![CodeEntry::new("D1", "One", "x")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
