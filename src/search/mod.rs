//! Text search across loaded documents.
//!
//! Search is pure: it walks a document and returns structured results with
//! stable metadata, never touching UI state. Result order is deterministic:
//! the file name first, then per sheet its name followed by cells in
//! row-major order.

use memchr::memmem;
use regex::RegexBuilder;
use serde::Serialize;
use std::path::PathBuf;

use crate::sheet::{to_reference, DocumentId, DocumentSet, FileDocument};

/// Independently toggleable search options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub exact_match: bool,
    pub use_regex: bool,
}

/// Where a match was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MatchLocation {
    FileName,
    SheetName {
        sheet: String,
    },
    /// Cell coordinates are grid indices: row 0 is the first data row.
    Cell {
        sheet: String,
        row: usize,
        column: usize,
    },
}

/// One match, with enough context to present it without re-reading the
/// document. Holds a non-owning [`DocumentId`], not the document itself.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document: DocumentId,
    pub path: PathBuf,
    pub location: MatchLocation,
    pub matched_text: String,
    /// Header of the matched cell's column.
    pub column_header: Option<String>,
    /// The row's leading (column 0) value, when it isn't itself the match.
    pub row_leading_value: Option<String>,
    /// "A1"-style coordinate, counting the header as the sheet's first row.
    pub coordinate: Option<String>,
}

enum Matcher {
    Substring { query: String, case_sensitive: bool },
    Exact { query: String, case_sensitive: bool },
    Regex(regex::Regex),
}

impl Matcher {
    fn build(query: &str, options: &SearchOptions) -> Matcher {
        if options.use_regex {
            match RegexBuilder::new(query)
                .case_insensitive(!options.case_sensitive)
                .build()
            {
                Ok(regex) => return Matcher::Regex(regex),
                Err(err) => {
                    log::warn!(
                        "invalid search pattern, falling back to substring matching: {}",
                        err
                    );
                    return Matcher::Substring {
                        query: query.to_lowercase(),
                        case_sensitive: false,
                    };
                }
            }
        }
        let stored = if options.case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };
        if options.exact_match {
            Matcher::Exact {
                query: stored,
                case_sensitive: options.case_sensitive,
            }
        } else {
            Matcher::Substring {
                query: stored,
                case_sensitive: options.case_sensitive,
            }
        }
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Regex(regex) => regex.is_match(text),
            Matcher::Exact {
                query,
                case_sensitive: true,
            } => text == query,
            Matcher::Exact {
                query,
                case_sensitive: false,
            } => text.to_lowercase() == *query,
            Matcher::Substring {
                query,
                case_sensitive: true,
            } => memmem::find(text.as_bytes(), query.as_bytes()).is_some(),
            Matcher::Substring {
                query,
                case_sensitive: false,
            } => text.to_lowercase().contains(query.as_str()),
        }
    }
}

/// Scans documents for a text query.
#[derive(Debug, Default)]
pub struct SearchEngine;

impl SearchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Search one document. A blank query yields no results.
    pub fn search(
        &self,
        id: DocumentId,
        document: &FileDocument,
        query: &str,
        options: &SearchOptions,
    ) -> Vec<SearchResult> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let matcher = Matcher::build(query, options);
        let mut results = Vec::new();

        let file_name = document.file_name();
        if matcher.matches(file_name) {
            results.push(SearchResult {
                document: id,
                path: document.path().to_path_buf(),
                location: MatchLocation::FileName,
                matched_text: file_name.to_string(),
                column_header: None,
                row_leading_value: None,
                coordinate: None,
            });
        }

        for sheet in document.sheets() {
            if matcher.matches(sheet.name()) {
                results.push(SearchResult {
                    document: id,
                    path: document.path().to_path_buf(),
                    location: MatchLocation::SheetName {
                        sheet: sheet.name().to_string(),
                    },
                    matched_text: sheet.name().to_string(),
                    column_header: None,
                    row_leading_value: None,
                    coordinate: None,
                });
            }

            for (row_index, row) in sheet.rows().iter().enumerate() {
                for (col_index, value) in row.iter().enumerate() {
                    if value.is_empty() {
                        continue;
                    }
                    let text = value.to_string();
                    if !matcher.matches(&text) {
                        continue;
                    }
                    let row_leading_value = if col_index > 0 {
                        row.first()
                            .filter(|leading| !leading.is_empty())
                            .map(|leading| leading.to_string())
                    } else {
                        None
                    };
                    results.push(SearchResult {
                        document: id,
                        path: document.path().to_path_buf(),
                        location: MatchLocation::Cell {
                            sheet: sheet.name().to_string(),
                            row: row_index,
                            column: col_index,
                        },
                        matched_text: text,
                        column_header: sheet.column_names().get(col_index).cloned(),
                        row_leading_value,
                        // Data row 0 sits one grid row below the header.
                        coordinate: Some(to_reference(row_index as u32 + 1, col_index as u32)),
                    });
                }
            }
        }
        results
    }

    /// Search every document in the set, in insertion order.
    pub fn search_all(
        &self,
        documents: &DocumentSet,
        query: &str,
        options: &SearchOptions,
    ) -> Vec<SearchResult> {
        documents
            .iter()
            .flat_map(|(id, document)| self.search(id, document, query, options))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::{CellValue, SheetDataBuilder};

    fn people_document() -> (DocumentSet, DocumentId) {
        let mut builder = SheetDataBuilder::new("People");
        builder.set_headers(vec!["Name".into(), "Age".into()]);
        builder.push_row(vec![CellValue::text("Alice"), CellValue::Number(30.0)]);
        builder.push_row(vec![CellValue::text("Bob"), CellValue::Number(25.0)]);

        let mut document = FileDocument::new("people.csv");
        document.push_sheet(builder.build());
        let mut set = DocumentSet::new();
        let id = set.insert(document.finalize());
        (set, id)
    }

    #[test]
    fn exact_match_finds_the_single_cell() {
        let (set, id) = people_document();
        let document = set.get(id).unwrap();
        let options = SearchOptions {
            exact_match: true,
            ..SearchOptions::default()
        };
        let results = SearchEngine::new().search(id, document, "30", &options);

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(
            result.location,
            MatchLocation::Cell {
                sheet: "People".into(),
                row: 0,
                column: 1,
            }
        );
        assert_eq!(result.column_header.as_deref(), Some("Age"));
        assert_eq!(result.row_leading_value.as_deref(), Some("Alice"));
        assert_eq!(result.coordinate.as_deref(), Some("B2"));
    }

    #[test]
    fn results_are_ordered_file_then_sheet_then_cells() {
        let mut builder = SheetDataBuilder::new("people list");
        builder.set_headers(vec!["Who".into()]);
        builder.push_row(vec![CellValue::text("people person")]);
        let mut document = FileDocument::new("people.csv");
        document.push_sheet(builder.build());
        let mut set = DocumentSet::new();
        let id = set.insert(document.finalize());

        let results = SearchEngine::new().search(
            id,
            set.get(id).unwrap(),
            "people",
            &SearchOptions::default(),
        );
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].location, MatchLocation::FileName);
        assert!(matches!(results[1].location, MatchLocation::SheetName { .. }));
        assert!(matches!(results[2].location, MatchLocation::Cell { .. }));
    }

    #[test]
    fn substring_matching_is_case_insensitive_by_default() {
        let (set, id) = people_document();
        let results = SearchEngine::new().search(
            id,
            set.get(id).unwrap(),
            "ALIC",
            &SearchOptions::default(),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_text, "Alice");

        let sensitive = SearchOptions {
            case_sensitive: true,
            ..SearchOptions::default()
        };
        let results =
            SearchEngine::new().search(id, set.get(id).unwrap(), "ALIC", &sensitive);
        assert!(results.is_empty());
    }

    #[test]
    fn regex_mode_matches_patterns() {
        let (set, id) = people_document();
        let options = SearchOptions {
            use_regex: true,
            ..SearchOptions::default()
        };
        let results =
            SearchEngine::new().search(id, set.get(id).unwrap(), "^ali.e$", &options);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_text, "Alice");
    }

    #[test]
    fn invalid_regex_falls_back_to_substring() {
        let mut builder = SheetDataBuilder::new("Staff");
        builder.set_headers(vec!["Who".into()]);
        builder.push_row(vec![CellValue::text("Bob (admin)")]);
        let mut document = FileDocument::new("staff.csv");
        document.push_sheet(builder.build());
        let mut set = DocumentSet::new();
        let id = set.insert(document.finalize());

        // "(ADMIN" is an unclosed group: invalid as a regex, matched as a
        // case-insensitive substring instead.
        let options = SearchOptions {
            use_regex: true,
            ..SearchOptions::default()
        };
        let results =
            SearchEngine::new().search(id, set.get(id).unwrap(), "(ADMIN", &options);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_text, "Bob (admin)");
    }

    #[test]
    fn blank_query_returns_nothing() {
        let (set, id) = people_document();
        let engine = SearchEngine::new();
        assert!(engine
            .search(id, set.get(id).unwrap(), "", &SearchOptions::default())
            .is_empty());
        assert!(engine
            .search(id, set.get(id).unwrap(), "   ", &SearchOptions::default())
            .is_empty());
    }
}
