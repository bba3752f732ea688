//! Merged-range declarations and their per-coordinate resolution.

use std::collections::HashMap;

use super::reference::to_indices;
use super::value::CellValue;

/// Upper bound on cells registered per merge range. Ranges beyond this are
/// skipped; a corrupt declaration must not balloon memory.
const MAX_RANGE_CELLS: u64 = 1_000_000;

/// A rectangular block of cells declared as visually merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl MergeRange {
    /// Parse a declaration like `"A1:B2"`. A bare reference (`"C3"`) is a
    /// single-cell range. Corners are normalized so start <= end.
    pub fn parse(decl: &str) -> Option<Self> {
        let (first, second) = match decl.split_once(':') {
            Some((a, b)) => (a, b),
            None => (decl, decl),
        };
        let (r1, c1) = to_indices(first.trim())?;
        let (r2, c2) = to_indices(second.trim())?;
        Some(MergeRange {
            start_row: r1.min(r2),
            start_col: c1.min(c2),
            end_row: r1.max(r2),
            end_col: c1.max(c2),
        })
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.start_row && row <= self.end_row && col >= self.start_col && col <= self.end_col
    }

    fn cell_count(&self) -> u64 {
        u64::from(self.end_row - self.start_row + 1) * u64::from(self.end_col - self.start_col + 1)
    }
}

/// Per-coordinate lookup of merged origin values.
///
/// Consulted before normal cell decoding; a registered coordinate always
/// wins over the cell's own (typically empty) stored value.
#[derive(Debug, Default)]
pub struct MergedCellResolver {
    cells: HashMap<(u32, u32), CellValue>,
}

impl MergedCellResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every coordinate of `range` to the origin cell's value.
    pub fn register(&mut self, range: MergeRange, origin_value: CellValue) {
        if range.cell_count() > MAX_RANGE_CELLS {
            log::warn!(
                "skipping oversized merge range of {} cells",
                range.cell_count()
            );
            return;
        }
        for row in range.start_row..=range.end_row {
            for col in range.start_col..=range.end_col {
                self.cells.insert((row, col), origin_value.clone());
            }
        }
    }

    pub fn resolve(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.cells.get(&(row, col))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges() {
        assert_eq!(
            MergeRange::parse("A1:B2"),
            Some(MergeRange {
                start_row: 0,
                start_col: 0,
                end_row: 1,
                end_col: 1,
            })
        );
        // Reversed corners normalize.
        assert_eq!(MergeRange::parse("B2:A1"), MergeRange::parse("A1:B2"));
        // Single-cell declaration.
        let single = MergeRange::parse("C3").unwrap();
        assert!(single.contains(2, 2));
        assert_eq!(single.cell_count(), 1);
        assert_eq!(MergeRange::parse("notarange"), None);
    }

    #[test]
    fn registered_coordinates_resolve_to_the_origin_value() {
        let mut resolver = MergedCellResolver::new();
        resolver.register(MergeRange::parse("A1:B2").unwrap(), CellValue::text("X"));

        for (row, col) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            assert_eq!(resolver.resolve(row, col), Some(&CellValue::text("X")));
        }
        assert_eq!(resolver.resolve(2, 0), None);
    }
}
