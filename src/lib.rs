//! Sheetlens - read-only spreadsheet ingestion, search, and row comparison
//!
//! This library turns heterogeneous spreadsheet files -- modern XML-based
//! workbooks, legacy binary workbooks, and delimited text -- into one
//! canonical, strongly-typed sheet model, then searches and compares rows
//! across them.
//!
//! # Features
//!
//! - **XML reader**: modern workbooks (.xlsx, .xlsm, .xltx, .xltm) with
//!   shared strings, merged-range resolution, and date detection
//! - **Legacy binary reader**: BIFF workbooks (.xls, .xlt) via the OLE2
//!   compound container
//! - **Delimited-text reader**: .csv with delimiter auto-detection
//! - **Error-as-data contract**: content-level failures degrade the
//!   returned document instead of failing the call
//! - **String interning**: repeated short text values share one allocation
//!   across every concurrently loading file
//! - **Search**: ordered matches over file names, sheet names, and cells
//! - **Row comparison**: header-based alignment with a reproducible
//!   rank-based diff intensity
//!
//! # Example - Loading and searching
//!
//! ```no_run
//! use sheetlens::{CancelToken, DocumentSet, ReaderRegistry, SearchEngine, SearchOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ReaderRegistry::with_default_readers();
//! let document = registry.read_file(Path::new("report.xlsx"), &CancelToken::new())?;
//! println!("loaded with status {:?}", document.status());
//!
//! let mut documents = DocumentSet::new();
//! let id = documents.insert(document);
//!
//! let engine = SearchEngine::new();
//! for result in engine.search_all(&documents, "Total", &SearchOptions::default()) {
//!     println!("match: {}", result.matched_text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Comparing rows across files
//!
//! ```no_run
//! use sheetlens::{CancelToken, DocumentSet, ExcelRow, ReaderRegistry, RowComparisonEngine};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ReaderRegistry::with_default_readers();
//! let mut documents = DocumentSet::new();
//! let cancel = CancelToken::new();
//! let a = documents.insert(registry.read_file(Path::new("q1.xlsx"), &cancel)?);
//! let b = documents.insert(registry.read_file(Path::new("q2.xlsx"), &cancel)?);
//!
//! let rows = vec![
//!     ExcelRow::capture(a, documents.get(a).unwrap(), "Revenue", 4).unwrap(),
//!     ExcelRow::capture(b, documents.get(b).unwrap(), "Revenue", 4).unwrap(),
//! ];
//! let comparison = RowComparisonEngine::new().compare(&documents, &rows)?;
//! for (header, cell) in comparison.headers.iter().zip(&comparison.cells[0]) {
//!     println!("{}: {:?} ({:.2})", header, cell.kind, cell.intensity);
//! }
//! # Ok(())
//! # }
//! ```

/// Shared infrastructure: the two-plane error model and cancellation.
pub mod common;

/// Row extraction and the comparison/diff engine.
pub mod compare;

/// Format readers and extension-based dispatch.
pub mod reader;

/// Text search across loaded documents.
pub mod search;

/// The canonical sheet model shared by every reader.
pub mod sheet;

// Re-export commonly used types for convenience
pub use common::cancel::CancelToken;
pub use common::error::{CompareError, LoadError, LoadErrorKind, ReadFault, Severity};
pub use compare::{
    CellDiff, ComparisonWarning, DiffKind, ExcelRow, RowComparison, RowComparisonEngine,
};
pub use reader::{
    CsvReadOptions, DelimitedTextReader, FormatReader, LegacyBinaryReader, LoadOptions,
    ReadContext, ReaderRegistry, XmlSheetReader,
};
pub use search::{MatchLocation, SearchEngine, SearchOptions, SearchResult};
pub use sheet::{
    CellValue, DocumentId, DocumentSet, FileDocument, LoadStatus, MergeRange, MergedCellResolver,
    SheetData, SheetDataBuilder, StringPool,
};
