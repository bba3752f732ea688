//! Loaded-file representation and ownership of the active set.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::common::error::{LoadError, Severity};
use super::data::SheetData;

/// Outcome of one load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadStatus {
    /// All sheets read, no errors recorded.
    Success,
    /// At least one sheet read, but errors or warnings were recorded.
    PartialSuccess,
    /// Nothing usable was read.
    Failed,
}

/// Canonical in-memory representation of one loaded spreadsheet file.
///
/// Owned exclusively by its holder (usually a [`DocumentSet`]); dropping it
/// releases all sheet storage. Content-level failures live in `errors`,
/// never as thrown faults.
#[derive(Debug)]
pub struct FileDocument {
    path: PathBuf,
    status: LoadStatus,
    sheets: Vec<SheetData>,
    errors: Vec<LoadError>,
}

impl FileDocument {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            status: LoadStatus::Success,
            sheets: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Append a sheet. Duplicate names are deduplicated with `_2`, `_3`, ..
    /// suffixes so lookups by name stay unambiguous.
    pub(crate) fn push_sheet(&mut self, mut sheet: SheetData) {
        if self.sheet(sheet.name()).is_some() {
            let base = sheet.name().to_string();
            let mut suffix = 2;
            let mut candidate = format!("{}_{}", base, suffix);
            while self.sheet(&candidate).is_some() {
                suffix += 1;
                candidate = format!("{}_{}", base, suffix);
            }
            sheet.set_name(candidate);
        }
        self.sheets.push(sheet);
    }

    pub(crate) fn push_error(&mut self, error: LoadError) {
        self.errors.push(error);
    }

    /// Compute the final status. `Failed` exactly when no sheet was read.
    pub(crate) fn finalize(mut self) -> Self {
        self.status = if self.sheets.is_empty() {
            LoadStatus::Failed
        } else if self.errors.is_empty() {
            LoadStatus::Success
        } else {
            LoadStatus::PartialSuccess
        };
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name portion of the path, for display and name matching.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn sheets(&self) -> &[SheetData] {
        &self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetData> {
        self.sheets.iter().find(|sheet| sheet.name() == name)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(SheetData::name)
    }

    pub fn errors(&self) -> &[LoadError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Error)
    }

    /// Rough in-memory footprint across all sheets.
    pub fn estimated_bytes(&self) -> u64 {
        self.sheets.iter().map(SheetData::estimated_bytes).sum()
    }
}

/// Opaque handle to a document owned by a [`DocumentSet`].
///
/// Derived records (search results, captured rows) carry this instead of a
/// borrow; once the document is removed the id stops resolving, so stale
/// derivations fail explicitly instead of dangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DocumentId(u64);

/// Owns the active documents. Removal releases all sheet storage.
#[derive(Debug, Default)]
pub struct DocumentSet {
    next_id: u64,
    order: Vec<DocumentId>,
    documents: HashMap<DocumentId, FileDocument>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document: FileDocument) -> DocumentId {
        let id = DocumentId(self.next_id);
        self.next_id += 1;
        self.order.push(id);
        self.documents.insert(id, document);
        id
    }

    /// Remove and return a document, invalidating every derived reference
    /// that carries its id.
    pub fn remove(&mut self, id: DocumentId) -> Option<FileDocument> {
        self.order.retain(|existing| *existing != id);
        self.documents.remove(&id)
    }

    /// Swap the document stored under `id`, keeping the id and its position
    /// stable. Used when a file is reloaded in place; returns the previous
    /// document. `None` (and no insertion) when the id is not present.
    pub fn replace(&mut self, id: DocumentId, document: FileDocument) -> Option<FileDocument> {
        if !self.documents.contains_key(&id) {
            return None;
        }
        self.documents.insert(id, document)
    }

    pub fn get(&self, id: DocumentId) -> Option<&FileDocument> {
        self.documents.get(&id)
    }

    /// Documents in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (DocumentId, &FileDocument)> {
        self.order.iter().filter_map(|id| {
            self.documents.get(id).map(|document| (*id, document))
        })
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.documents.clear();
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::{LoadError, LoadErrorKind};
    use crate::sheet::data::SheetDataBuilder;

    fn sheet(name: &str) -> SheetData {
        let mut builder = SheetDataBuilder::new(name);
        builder.set_headers(vec!["A".into()]);
        builder.build()
    }

    #[test]
    fn status_reflects_sheets_and_errors() {
        let doc = FileDocument::new("a.csv").finalize();
        assert_eq!(doc.status(), LoadStatus::Failed);

        let mut doc = FileDocument::new("a.csv");
        doc.push_sheet(sheet("Sheet1"));
        let doc = doc.finalize();
        assert_eq!(doc.status(), LoadStatus::Success);

        let mut doc = FileDocument::new("a.csv");
        doc.push_sheet(sheet("Sheet1"));
        doc.push_error(LoadError::warning(LoadErrorKind::EmptyHeader, "empty"));
        let doc = doc.finalize();
        assert_eq!(doc.status(), LoadStatus::PartialSuccess);

        let mut doc = FileDocument::new("a.csv");
        doc.push_error(LoadError::error(LoadErrorKind::InvalidStructure, "bad"));
        let doc = doc.finalize();
        assert_eq!(doc.status(), LoadStatus::Failed);
        // Failed exactly when no sheet was read.
        assert!(doc.sheets().is_empty());
    }

    #[test]
    fn duplicate_sheet_names_are_suffixed() {
        let mut doc = FileDocument::new("a.xlsx");
        doc.push_sheet(sheet("Data"));
        doc.push_sheet(sheet("Data"));
        doc.push_sheet(sheet("Data"));
        let names: Vec<_> = doc.sheet_names().collect();
        assert_eq!(names, ["Data", "Data_2", "Data_3"]);
    }

    #[test]
    fn removal_invalidates_ids() {
        let mut set = DocumentSet::new();
        let mut doc = FileDocument::new("a.csv");
        doc.push_sheet(sheet("Sheet1"));
        let id = set.insert(doc.finalize());
        assert!(set.get(id).is_some());

        let removed = set.remove(id).unwrap();
        assert_eq!(removed.sheet_names().count(), 1);
        assert!(set.get(id).is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut set = DocumentSet::new();
        let a = set.insert(FileDocument::new("a.csv").finalize());
        let b = set.insert(FileDocument::new("b.csv").finalize());
        set.remove(a);
        let c = set.insert(FileDocument::new("c.csv").finalize());
        let order: Vec<_> = set.iter().map(|(id, _)| id).collect();
        assert_eq!(order, [b, c]);
    }
}
