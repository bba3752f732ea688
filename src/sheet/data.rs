//! The canonical worksheet grid.

use std::collections::HashMap;
use std::mem;

use super::value::CellValue;

/// One worksheet: ordered column names plus dense rows of typed cells.
///
/// Frozen once built. Invariant: every row holds exactly
/// `column_names().len()` cells. The source file's first occupied row is
/// always consumed as the header and never stored as data.
#[derive(Debug, Clone)]
pub struct SheetData {
    name: String,
    column_names: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl SheetData {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    /// Position of a header by its exact text.
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.column_names.iter().position(|name| name == header)
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[CellValue]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|cells| cells.get(col))
    }

    /// A sheet with no columns (absent or blank header row).
    pub fn is_empty(&self) -> bool {
        self.column_names.is_empty()
    }

    /// Rough in-memory footprint, for callers tracking large active sets.
    pub fn estimated_bytes(&self) -> u64 {
        let header_bytes: usize = self.column_names.iter().map(|n| n.capacity()).sum();
        let cell_bytes: usize = self
            .rows
            .iter()
            .map(|row| row.capacity() * mem::size_of::<CellValue>())
            .sum();
        let text_bytes: u64 = self
            .rows
            .iter()
            .flatten()
            .map(|cell| match cell {
                CellValue::Text(s) => s.len() as u64,
                _ => 0,
            })
            .sum();
        header_bytes as u64 + cell_bytes as u64 + text_bytes
    }
}

/// Incremental construction of a [`SheetData`], frozen by [`build`].
///
/// [`build`]: SheetDataBuilder::build
#[derive(Debug)]
pub struct SheetDataBuilder {
    name: String,
    column_names: Vec<String>,
    used_names: HashMap<String, u32>,
    rows: Vec<Vec<CellValue>>,
}

impl SheetDataBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_names: Vec::new(),
            used_names: HashMap::new(),
            rows: Vec::new(),
        }
    }

    /// Consume the header row.
    ///
    /// Blank header cells get generated `Column N` names; collisions are
    /// deduplicated with `_2`, `_3`, .. suffixes in encounter order. An
    /// entirely blank header leaves the sheet empty (zero columns).
    pub fn set_headers(&mut self, headers: Vec<String>) {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return;
        }
        for (index, raw) in headers.into_iter().enumerate() {
            let base = if raw.trim().is_empty() {
                format!("Column{}", index + 1)
            } else {
                raw
            };
            self.push_header(base);
        }
    }

    fn push_header(&mut self, base: String) {
        let mut candidate = base.clone();
        let mut suffix = *self.used_names.get(&base).unwrap_or(&1);
        while self.used_names.contains_key(&candidate) {
            suffix += 1;
            candidate = format!("{}_{}", base, suffix);
        }
        self.used_names.insert(base, suffix);
        self.used_names.insert(candidate.clone(), 1);
        self.column_names.push(candidate);
    }

    pub fn width(&self) -> usize {
        self.column_names.len()
    }

    pub fn has_headers(&self) -> bool {
        !self.column_names.is_empty()
    }

    /// Append a data row, padded or truncated to the header width.
    ///
    /// Rows pushed before any header are dropped; a sheet without columns
    /// stores no data.
    pub fn push_row(&mut self, mut cells: Vec<CellValue>) {
        let width = self.column_names.len();
        if width == 0 {
            return;
        }
        cells.resize(width, CellValue::Empty);
        self.rows.push(cells);
    }

    /// Freeze the grid, trimming excess capacity.
    pub fn build(mut self) -> SheetData {
        for row in &mut self.rows {
            row.shrink_to_fit();
        }
        self.rows.shrink_to_fit();
        self.column_names.shrink_to_fit();
        SheetData {
            name: self.name,
            column_names: self.column_names,
            rows: self.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduplicates_header_collisions_in_encounter_order() {
        let mut builder = SheetDataBuilder::new("Sheet1");
        builder.set_headers(vec![
            "Name".into(),
            "Name".into(),
            "Age".into(),
            "Name".into(),
        ]);
        let sheet = builder.build();
        assert_eq!(sheet.column_names(), ["Name", "Name_2", "Age", "Name_3"]);
    }

    #[test]
    fn dedup_avoids_preexisting_suffixed_names() {
        let mut builder = SheetDataBuilder::new("Sheet1");
        builder.set_headers(vec!["A".into(), "A_2".into(), "A".into()]);
        let sheet = builder.build();
        assert_eq!(sheet.column_names(), ["A", "A_2", "A_3"]);
    }

    #[test]
    fn blank_header_cells_get_generated_names() {
        let mut builder = SheetDataBuilder::new("Sheet1");
        builder.set_headers(vec!["Name".into(), "".into(), "  ".into()]);
        let sheet = builder.build();
        assert_eq!(sheet.column_names(), ["Name", "Column2", "Column3"]);
    }

    #[test]
    fn entirely_blank_header_yields_an_empty_sheet() {
        let mut builder = SheetDataBuilder::new("Sheet1");
        builder.set_headers(vec!["".into(), " ".into()]);
        builder.push_row(vec![CellValue::text("dropped")]);
        let sheet = builder.build();
        assert!(sheet.is_empty());
        assert_eq!(sheet.row_count(), 0);
    }

    #[test]
    fn rows_are_padded_and_truncated_to_header_width() {
        let mut builder = SheetDataBuilder::new("Sheet1");
        builder.set_headers(vec!["A".into(), "B".into(), "C".into()]);
        builder.push_row(vec![CellValue::Number(1.0)]);
        builder.push_row(vec![
            CellValue::Number(1.0),
            CellValue::Number(2.0),
            CellValue::Number(3.0),
            CellValue::Number(4.0),
        ]);
        let sheet = builder.build();
        for row in sheet.rows() {
            assert_eq!(row.len(), sheet.column_count());
        }
        assert_eq!(sheet.cell(0, 2), Some(&CellValue::Empty));
        assert_eq!(sheet.cell(1, 2), Some(&CellValue::Number(3.0)));
    }

    #[test]
    fn lookup_by_header_text() {
        let mut builder = SheetDataBuilder::new("People");
        builder.set_headers(vec!["Name".into(), "Age".into()]);
        builder.push_row(vec![CellValue::text("Alice"), CellValue::Number(30.0)]);
        let sheet = builder.build();
        let age = sheet.column_index("Age").unwrap();
        assert_eq!(sheet.cell(0, age), Some(&CellValue::Number(30.0)));
        assert_eq!(sheet.column_index("Missing"), None);
    }
}
