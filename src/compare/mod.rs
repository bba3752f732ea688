//! Row extraction and the comparison/diff engine.
//!
//! Rows pulled from different files or sheets are aligned by header text,
//! never by position: the comparison columns are the ordered union of every
//! input's headers, first-seen order. Per header, each row's contribution is
//! classified as matching, missing, new, or different; different values get
//! a continuous highlight intensity where common values trend toward 0 and
//! rare ones toward 1. The rank/formula rules are a hard contract --
//! downstream visual intensity depends on them being reproducible.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::f64::consts::E;
use std::mem::{discriminant, Discriminant};
use std::path::{Path, PathBuf};

use crate::common::error::CompareError;
use crate::sheet::{CellValue, DocumentId, DocumentSet, FileDocument};

/// A captured row snapshot, addressed by header text rather than position.
///
/// Holds a non-owning [`DocumentId`]; once the source document leaves its
/// [`DocumentSet`] the row can no longer be compared.
#[derive(Debug, Clone)]
pub struct ExcelRow {
    source: DocumentId,
    source_path: PathBuf,
    sheet: String,
    row_index: usize,
    headers: Vec<String>,
    values: Vec<CellValue>,
}

impl ExcelRow {
    /// Snapshot one data row. `None` when the sheet or row doesn't exist.
    pub fn capture(
        source: DocumentId,
        document: &FileDocument,
        sheet_name: &str,
        row_index: usize,
    ) -> Option<ExcelRow> {
        let sheet = document.sheet(sheet_name)?;
        let row = sheet.row(row_index)?;
        Some(ExcelRow {
            source,
            source_path: document.path().to_path_buf(),
            sheet: sheet_name.to_string(),
            row_index,
            headers: sheet.column_names().to_vec(),
            values: row.to_vec(),
        })
    }

    pub fn source(&self) -> DocumentId {
        self.source
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn row_index(&self) -> usize {
        self.row_index
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    /// Lookup by header text, not position.
    pub fn value_for(&self, header: &str) -> Option<&CellValue> {
        self.header_position(header).map(|index| &self.values[index])
    }

    fn header_position(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

/// Classification of one row's contribution for one aligned header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffKind {
    /// All non-empty contributions agree (or none exist).
    Match,
    /// This row is empty while at least one other row has a value.
    Missing,
    /// This row is the sole non-empty contributor.
    New,
    /// Two or more distinct non-empty values exist.
    Different,
}

/// One cell of the comparison grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellDiff {
    pub kind: DiffKind,
    /// Highlight intensity in [0, 1]. For `Different` cells this is the
    /// rank-based logarithmic score; `Missing`/`New` are fully highlighted
    /// and `Match` not at all.
    pub intensity: f64,
    /// The rendered text this row contributed ("" when empty or absent).
    pub text: String,
}

/// Non-fatal structural findings. Header-based alignment already tolerates
/// all of these; they are surfaced so callers can explain the layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ComparisonWarning {
    /// The row at `row` has no column for `header`.
    MissingHeader { header: String, row: usize },
    /// The same header sits at different positions across the input rows.
    StructureMismatch { header: String },
    /// Non-empty contributions for `header` disagree on value type.
    DataInconsistency { header: String },
}

/// Result of comparing two or more captured rows.
#[derive(Debug)]
pub struct RowComparison {
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Ordered union of input headers, first-seen order.
    pub headers: Vec<String>,
    pub rows: Vec<ExcelRow>,
    /// `cells[row][column]`, aligned to `headers`.
    pub cells: Vec<Vec<CellDiff>>,
    pub warnings: Vec<ComparisonWarning>,
}

/// Aligns rows by header and computes per-cell diff classifications.
#[derive(Debug, Default)]
pub struct RowComparisonEngine;

impl RowComparisonEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn compare(
        &self,
        documents: &DocumentSet,
        rows: &[ExcelRow],
    ) -> Result<RowComparison, CompareError> {
        self.compare_named(documents, rows, format!("Comparison of {} rows", rows.len()))
    }

    /// Compare with an explicit display name.
    ///
    /// Fails below two rows, and when a row's source document or sheet is no
    /// longer present -- a vanished sheet after a reload must surface to the
    /// caller rather than produce a silently empty result.
    pub fn compare_named(
        &self,
        documents: &DocumentSet,
        rows: &[ExcelRow],
        name: String,
    ) -> Result<RowComparison, CompareError> {
        if rows.len() < 2 {
            return Err(CompareError::InsufficientRows(rows.len()));
        }
        for row in rows {
            let document =
                documents
                    .get(row.source)
                    .ok_or_else(|| CompareError::MissingDocument {
                        path: row.source_path.display().to_string(),
                    })?;
            if document.sheet(&row.sheet).is_none() {
                return Err(CompareError::MissingSheet {
                    path: row.source_path.display().to_string(),
                    sheet: row.sheet.clone(),
                });
            }
        }

        let headers = header_union(rows);
        let warnings = structural_warnings(&headers, rows);

        let mut cells: Vec<Vec<CellDiff>> = vec![Vec::with_capacity(headers.len()); rows.len()];
        for header in &headers {
            let texts: Vec<String> = rows
                .iter()
                .map(|row| {
                    row.value_for(header)
                        .map(|value| value.to_string())
                        .unwrap_or_default()
                })
                .collect();
            for (row_index, (kind, intensity)) in classify(&texts).into_iter().enumerate() {
                cells[row_index].push(CellDiff {
                    kind,
                    intensity,
                    text: texts[row_index].clone(),
                });
            }
        }

        Ok(RowComparison {
            name,
            created_at: Utc::now(),
            headers,
            rows: rows.to_vec(),
            cells,
            warnings,
        })
    }
}

/// Ordered union of all distinct headers, first-seen order.
fn header_union(rows: &[ExcelRow]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for header in row.headers() {
            if !headers.iter().any(|existing| existing == header) {
                headers.push(header.clone());
            }
        }
    }
    headers
}

fn structural_warnings(headers: &[String], rows: &[ExcelRow]) -> Vec<ComparisonWarning> {
    let mut warnings = Vec::new();
    for header in headers {
        let mut positions = BTreeSet::new();
        for (row_index, row) in rows.iter().enumerate() {
            match row.header_position(header) {
                Some(position) => {
                    positions.insert(position);
                }
                None => warnings.push(ComparisonWarning::MissingHeader {
                    header: header.clone(),
                    row: row_index,
                }),
            }
        }
        if positions.len() > 1 {
            warnings.push(ComparisonWarning::StructureMismatch {
                header: header.clone(),
            });
        }

        let mut kinds: HashSet<Discriminant<CellValue>> = HashSet::new();
        for row in rows {
            if let Some(value) = row.value_for(header) {
                if !value.is_empty() {
                    kinds.insert(discriminant(value));
                }
            }
        }
        if kinds.len() > 1 {
            warnings.push(ComparisonWarning::DataInconsistency {
                header: header.clone(),
            });
        }
    }
    warnings
}

/// Classify one header's contributions across all rows.
fn classify(texts: &[String]) -> Vec<(DiffKind, f64)> {
    let non_empty: Vec<&str> = texts
        .iter()
        .filter(|text| !text.is_empty())
        .map(String::as_str)
        .collect();

    if non_empty.is_empty() {
        // Nobody contributes; identical emptiness is agreement.
        return texts.iter().map(|_| (DiffKind::Match, 0.0)).collect();
    }

    let distinct: BTreeSet<&str> = non_empty.iter().copied().collect();
    if distinct.len() >= 2 {
        let intensities = rank_intensities(&non_empty);
        return texts
            .iter()
            .map(|text| {
                if text.is_empty() {
                    (DiffKind::Missing, 1.0)
                } else {
                    (DiffKind::Different, intensities[text.as_str()])
                }
            })
            .collect();
    }

    // Exactly one distinct non-empty value.
    let sole_contributor = non_empty.len() == 1 && texts.len() > 1;
    texts
        .iter()
        .map(|text| {
            if text.is_empty() {
                (DiffKind::Missing, 1.0)
            } else if sole_contributor {
                (DiffKind::New, 1.0)
            } else {
                (DiffKind::Match, 0.0)
            }
        })
        .collect()
}

/// Rank-based logarithmic intensity for `Different` cells.
///
/// Group the non-empty values by exact text, order groups by descending
/// frequency with alphabetical tie-break, normalize the group rank over
/// `groups - 1`, then warp with `ln(1 + r*(e-1))`: the most common value
/// scores 0, the rarest 1, and the curve spreads mid-ranks upward.
fn rank_intensities(values: &[&str]) -> HashMap<String, f64> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut groups: Vec<(&str, usize)> = counts.into_iter().collect();
    groups.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let span = (groups.len() - 1) as f64;
    groups
        .into_iter()
        .enumerate()
        .map(|(rank, (text, _))| {
            let normalized = rank as f64 / span;
            (text.to_string(), (1.0 + normalized * (E - 1.0)).ln())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::SheetDataBuilder;

    fn document(path: &str, sheet: &str, headers: &[&str], rows: &[&[CellValue]]) -> FileDocument {
        let mut builder = SheetDataBuilder::new(sheet);
        builder.set_headers(headers.iter().map(|h| h.to_string()).collect());
        for row in rows {
            builder.push_row(row.to_vec());
        }
        let mut document = FileDocument::new(path);
        document.push_sheet(builder.build());
        document.finalize()
    }

    fn text(s: &str) -> CellValue {
        CellValue::text(s)
    }

    #[test]
    fn matching_and_differing_columns_classify() {
        let mut set = DocumentSet::new();
        let a = set.insert(document(
            "a.csv",
            "S",
            &["Name", "Age"],
            &[&[text("Alice"), text("30")]],
        ));
        let b = set.insert(document(
            "b.csv",
            "S",
            &["Name", "Age"],
            &[&[text("Bob"), text("30")]],
        ));
        let rows = vec![
            ExcelRow::capture(a, set.get(a).unwrap(), "S", 0).unwrap(),
            ExcelRow::capture(b, set.get(b).unwrap(), "S", 0).unwrap(),
        ];

        let comparison = RowComparisonEngine::new().compare(&set, &rows).unwrap();
        assert_eq!(comparison.headers, ["Name", "Age"]);

        // Age: one distinct value -> Match for both.
        assert_eq!(comparison.cells[0][1].kind, DiffKind::Match);
        assert_eq!(comparison.cells[1][1].kind, DiffKind::Match);
        assert_eq!(comparison.cells[0][1].intensity, 0.0);

        // Name: two distinct values -> Different; "Alice" ranks first
        // alphabetically so it scores 0, "Bob" scores 1.
        assert_eq!(comparison.cells[0][0].kind, DiffKind::Different);
        assert_eq!(comparison.cells[1][0].kind, DiffKind::Different);
        assert_eq!(comparison.cells[0][0].intensity, 0.0);
        assert!((comparison.cells[1][0].intensity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn frequency_outranks_alphabetical_order() {
        let mut set = DocumentSet::new();
        let mut ids = Vec::new();
        for (i, value) in ["Zebra", "Zebra", "Apple"].iter().enumerate() {
            let id = set.insert(document(
                &format!("f{}.csv", i),
                "S",
                &["Col"],
                &[&[text(value)]],
            ));
            ids.push(id);
        }
        let rows: Vec<_> = ids
            .iter()
            .map(|id| ExcelRow::capture(*id, set.get(*id).unwrap(), "S", 0).unwrap())
            .collect();

        let comparison = RowComparisonEngine::new().compare(&set, &rows).unwrap();
        // "Zebra" appears twice: most common, intensity 0 despite sorting
        // after "Apple".
        assert_eq!(comparison.cells[0][0].intensity, 0.0);
        assert_eq!(comparison.cells[1][0].intensity, 0.0);
        assert!((comparison.cells[2][0].intensity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn intermediate_ranks_follow_the_logarithmic_warp() {
        let mut set = DocumentSet::new();
        let mut ids = Vec::new();
        for (i, value) in ["a", "a", "a", "b", "b", "c"].iter().enumerate() {
            let id = set.insert(document(
                &format!("f{}.csv", i),
                "S",
                &["Col"],
                &[&[text(value)]],
            ));
            ids.push(id);
        }
        let rows: Vec<_> = ids
            .iter()
            .map(|id| ExcelRow::capture(*id, set.get(*id).unwrap(), "S", 0).unwrap())
            .collect();

        let comparison = RowComparisonEngine::new().compare(&set, &rows).unwrap();
        // Three groups: a (3), b (2), c (1). Middle rank 1/2 normalized.
        let expected_mid = (1.0 + 0.5 * (E - 1.0)).ln();
        assert_eq!(comparison.cells[0][0].intensity, 0.0);
        assert!((comparison.cells[3][0].intensity - expected_mid).abs() < 1e-12);
        assert!((comparison.cells[5][0].intensity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sole_contributor_is_new_and_absentees_are_missing() {
        let mut set = DocumentSet::new();
        let a = set.insert(document(
            "a.csv",
            "S",
            &["Name", "Notes"],
            &[&[text("Alice"), text("only me")]],
        ));
        let b = set.insert(document(
            "b.csv",
            "S",
            &["Name", "Notes"],
            &[&[text("Alice"), CellValue::Empty]],
        ));
        let c = set.insert(document(
            "c.csv",
            "S",
            &["Name", "Notes"],
            &[&[text("Alice"), CellValue::Empty]],
        ));
        let rows: Vec<_> = [a, b, c]
            .iter()
            .map(|id| ExcelRow::capture(*id, set.get(*id).unwrap(), "S", 0).unwrap())
            .collect();

        let comparison = RowComparisonEngine::new().compare(&set, &rows).unwrap();
        let notes = comparison.headers.iter().position(|h| h == "Notes").unwrap();
        assert_eq!(comparison.cells[0][notes].kind, DiffKind::New);
        assert_eq!(comparison.cells[1][notes].kind, DiffKind::Missing);
        assert_eq!(comparison.cells[2][notes].kind, DiffKind::Missing);
    }

    #[test]
    fn headers_align_by_text_across_positions() {
        let mut set = DocumentSet::new();
        let a = set.insert(document(
            "a.csv",
            "S",
            &["Name", "Age"],
            &[&[text("Alice"), text("30")]],
        ));
        // Same columns, swapped order, plus an extra one.
        let b = set.insert(document(
            "b.csv",
            "S",
            &["Age", "Name", "City"],
            &[&[text("30"), text("Alice"), text("Paris")]],
        ));
        let rows = vec![
            ExcelRow::capture(a, set.get(a).unwrap(), "S", 0).unwrap(),
            ExcelRow::capture(b, set.get(b).unwrap(), "S", 0).unwrap(),
        ];

        let comparison = RowComparisonEngine::new().compare(&set, &rows).unwrap();
        // First-seen order: row a's headers, then b's extras.
        assert_eq!(comparison.headers, ["Name", "Age", "City"]);
        // Aligned by text: both Name and Age agree.
        assert_eq!(comparison.cells[0][0].kind, DiffKind::Match);
        assert_eq!(comparison.cells[0][1].kind, DiffKind::Match);
        // Row a has no City: missing for it, new for row b.
        assert_eq!(comparison.cells[0][2].kind, DiffKind::Missing);
        assert_eq!(comparison.cells[1][2].kind, DiffKind::New);

        assert!(comparison.warnings.contains(&ComparisonWarning::MissingHeader {
            header: "City".into(),
            row: 0,
        }));
        assert!(comparison
            .warnings
            .contains(&ComparisonWarning::StructureMismatch {
                header: "Name".into()
            }));
    }

    #[test]
    fn type_disagreement_warns_data_inconsistency() {
        let mut set = DocumentSet::new();
        let a = set.insert(document("a.csv", "S", &["V"], &[&[text("30")]]));
        let b = set.insert(document("b.csv", "S", &["V"], &[&[CellValue::Number(30.0)]]));
        let rows = vec![
            ExcelRow::capture(a, set.get(a).unwrap(), "S", 0).unwrap(),
            ExcelRow::capture(b, set.get(b).unwrap(), "S", 0).unwrap(),
        ];
        let comparison = RowComparisonEngine::new().compare(&set, &rows).unwrap();
        assert!(comparison
            .warnings
            .contains(&ComparisonWarning::DataInconsistency { header: "V".into() }));
        // Rendered texts agree, so the classification is still Match.
        assert_eq!(comparison.cells[0][0].kind, DiffKind::Match);
    }

    #[test]
    fn comparison_is_deterministic() {
        let mut set = DocumentSet::new();
        let mut ids = Vec::new();
        for (i, value) in ["x", "y", "z", "y"].iter().enumerate() {
            let id = set.insert(document(
                &format!("f{}.csv", i),
                "S",
                &["Col"],
                &[&[text(value)]],
            ));
            ids.push(id);
        }
        let rows: Vec<_> = ids
            .iter()
            .map(|id| ExcelRow::capture(*id, set.get(*id).unwrap(), "S", 0).unwrap())
            .collect();

        let engine = RowComparisonEngine::new();
        let first = engine.compare(&set, &rows).unwrap();
        let second = engine.compare(&set, &rows).unwrap();
        assert_eq!(first.cells, second.cells);
        assert_eq!(first.warnings, second.warnings);
    }

    #[test]
    fn fewer_than_two_rows_is_a_precondition_fault() {
        let mut set = DocumentSet::new();
        let a = set.insert(document("a.csv", "S", &["X"], &[&[text("1")]]));
        let row = ExcelRow::capture(a, set.get(a).unwrap(), "S", 0).unwrap();

        let err = RowComparisonEngine::new()
            .compare(&set, &[row])
            .unwrap_err();
        assert!(matches!(err, CompareError::InsufficientRows(1)));
    }

    #[test]
    fn removed_document_fails_the_comparison() {
        let mut set = DocumentSet::new();
        let a = set.insert(document("a.csv", "S", &["X"], &[&[text("1")]]));
        let b = set.insert(document("b.csv", "S", &["X"], &[&[text("2")]]));
        let rows = vec![
            ExcelRow::capture(a, set.get(a).unwrap(), "S", 0).unwrap(),
            ExcelRow::capture(b, set.get(b).unwrap(), "S", 0).unwrap(),
        ];
        set.remove(b);

        let err = RowComparisonEngine::new().compare(&set, &rows).unwrap_err();
        assert!(matches!(err, CompareError::MissingDocument { .. }));
    }

    #[test]
    fn vanished_sheet_fails_the_comparison() {
        let mut set = DocumentSet::new();
        let a = set.insert(document("a.csv", "S", &["X"], &[&[text("1")]]));
        let b = set.insert(document("b.csv", "S", &["X"], &[&[text("2")]]));
        let rows = vec![
            ExcelRow::capture(a, set.get(a).unwrap(), "S", 0).unwrap(),
            ExcelRow::capture(b, set.get(b).unwrap(), "S", 0).unwrap(),
        ];
        // Reload b with a different sheet layout under the same id.
        set.replace(b, document("b.csv", "Renamed", &["X"], &[&[text("2")]]));

        let err = RowComparisonEngine::new().compare(&set, &rows).unwrap_err();
        match err {
            CompareError::MissingSheet { sheet, .. } => assert_eq!(sheet, "S"),
            other => panic!("expected MissingSheet, got {other:?}"),
        }
    }
}
