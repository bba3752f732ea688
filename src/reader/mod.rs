//! Format readers and extension-based dispatch.
//!
//! Every supported format implements [`FormatReader`]: one file in, one
//! [`FileDocument`] out. Content-level problems -- unrecognized structure,
//! corrupt sheets, empty headers -- are recorded inside the document, never
//! thrown; a read only faults on cancellation or caller error. The
//! [`ReaderRegistry`] maps file extensions to readers, resolved once at
//! startup.

pub mod delimited;
pub mod xls;
pub mod xlsx;

pub use delimited::{CsvReadOptions, DelimitedTextReader};
pub use xls::LegacyBinaryReader;
pub use xlsx::XmlSheetReader;

use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::common::cancel::CancelToken;
use crate::common::error::{LoadError, LoadErrorKind, ReadFault};
use crate::sheet::{FileDocument, StringPool};

/// Shared state handed to a reader for one load attempt.
pub struct ReadContext<'a> {
    /// Pool shared across all concurrently loading files.
    pub pool: &'a StringPool,
    /// Checked at sheet boundaries.
    pub cancel: &'a CancelToken,
}

/// One spreadsheet format: a disjoint extension set and a read operation.
pub trait FormatReader: Send + Sync {
    /// Lowercase, dot-prefixed extensions this reader owns (e.g. `".csv"`).
    fn extensions(&self) -> &'static [&'static str];

    /// Read one file into a document.
    ///
    /// Must not fail for content-level problems; those become
    /// [`LoadError`] entries on the returned document. Faults are reserved
    /// for cancellation and programmer errors.
    fn read(&self, path: &Path, ctx: &ReadContext<'_>) -> Result<FileDocument, ReadFault>;
}

/// Options for multi-file ingestion.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Cap on files read in parallel.
    pub max_concurrent_loads: usize,
    pub cancel: CancelToken,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_concurrent_loads: 4,
            cancel: CancelToken::new(),
        }
    }
}

/// Extension-keyed reader table.
///
/// Built once; no reflection. Lookup is case-insensitive. An extension no
/// reader owns yields a `Failed` document whose error enumerates every
/// supported extension.
pub struct ReaderRegistry {
    readers: Vec<Box<dyn FormatReader>>,
    pool: StringPool,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::with_default_readers()
    }
}

impl ReaderRegistry {
    /// An empty registry; callers compose their own reader set.
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
            pool: StringPool::new(),
        }
    }

    /// The standard set: XML sheets, legacy binary, delimited text.
    pub fn with_default_readers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(XmlSheetReader::new()));
        registry.register(Box::new(LegacyBinaryReader::new()));
        registry.register(Box::new(DelimitedTextReader::new()));
        registry
    }

    /// Add a reader. Extension sets are expected to be disjoint; on overlap
    /// the earliest registration wins.
    pub fn register(&mut self, reader: Box<dyn FormatReader>) {
        self.readers.push(reader);
    }

    /// The pool shared by all loads through this registry.
    pub fn string_pool(&self) -> &StringPool {
        &self.pool
    }

    /// Every extension some reader owns, sorted.
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<_> = self
            .readers
            .iter()
            .flat_map(|reader| reader.extensions().iter().copied())
            .collect();
        extensions.sort_unstable();
        extensions
    }

    /// The reader owning `path`'s extension, if any.
    pub fn reader_for(&self, path: &Path) -> Option<&dyn FormatReader> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        let dotted = format!(".{}", extension);
        self.readers
            .iter()
            .find(|reader| reader.extensions().contains(&dotted.as_str()))
            .map(|reader| &**reader)
    }

    /// Read one file, dispatching on its extension.
    pub fn read_file(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<FileDocument, ReadFault> {
        if path.as_os_str().is_empty() {
            return Err(ReadFault::InvalidArgument("path must not be empty".into()));
        }
        if cancel.is_cancelled() {
            return Err(ReadFault::Cancelled);
        }
        match self.reader_for(path) {
            Some(reader) => {
                log::debug!("reading {}", path.display());
                let ctx = ReadContext {
                    pool: &self.pool,
                    cancel,
                };
                reader.read(path, &ctx)
            }
            None => {
                let mut document = FileDocument::new(path);
                document.push_error(LoadError::error(
                    LoadErrorKind::UnsupportedFormat,
                    format!(
                        "unsupported file extension for '{}'; supported extensions: {}",
                        path.display(),
                        self.supported_extensions().join(", ")
                    ),
                ));
                Ok(document.finalize())
            }
        }
    }

    /// Read many files, at most `max_concurrent_loads` at a time.
    ///
    /// File loads are independent; the only shared state is the read-only
    /// registry and the string pool. Cancellation aborts the batch.
    pub fn read_files(
        &self,
        paths: &[PathBuf],
        options: &LoadOptions,
    ) -> Result<Vec<FileDocument>, ReadFault> {
        let threads = options.max_concurrent_loads.max(1);
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| {
                paths
                    .par_iter()
                    .map(|path| self.read_file(path, &options.cancel))
                    .collect()
            }),
            Err(err) => {
                log::warn!("falling back to sequential loads: {}", err);
                paths
                    .iter()
                    .map(|path| self.read_file(path, &options.cancel))
                    .collect()
            }
        }
    }
}
