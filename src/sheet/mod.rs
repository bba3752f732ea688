//! Canonical in-memory sheet model shared by every format reader.

pub mod data;
pub mod document;
pub mod merge;
pub mod pool;
pub mod reference;
pub mod value;

pub use data::{SheetData, SheetDataBuilder};
pub use document::{DocumentId, DocumentSet, FileDocument, LoadStatus};
pub use merge::{MergeRange, MergedCellResolver};
pub use pool::StringPool;
pub use reference::{column_label, to_indices, to_reference};
pub use value::CellValue;
