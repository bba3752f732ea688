//! Delimited-text reader.
//!
//! Reads `.csv` files into the canonical sheet model with a sniffed or
//! configured delimiter. Field handling is tolerant: short rows pad with
//! empty cells, long rows are truncated to the header width, and nothing in
//! the content aborts the read.

use std::fs;
use std::path::Path;

use crate::common::error::{LoadError, LoadErrorKind, ReadFault};
use crate::sheet::{CellValue, FileDocument, SheetDataBuilder};

use super::{FormatReader, ReadContext};

/// Delimiters considered during auto-detection, in tie-break order.
const SNIFF_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Leading non-blank lines sampled by the sniffer.
const SNIFF_LINES: usize = 5;

/// Runtime configuration for delimited-text loads.
#[derive(Debug, Clone)]
pub struct CsvReadOptions {
    /// Field delimiter; `None` auto-detects from the file's leading lines.
    pub delimiter: Option<u8>,
    /// Byte decoding; BOMs in the input take precedence.
    pub encoding: &'static encoding_rs::Encoding,
    /// When false, every record is data and `Column N` headers are generated.
    pub has_header_row: bool,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: encoding_rs::UTF_8,
            has_header_row: true,
        }
    }
}

/// Reader for delimited text files.
pub struct DelimitedTextReader {
    options: CsvReadOptions,
}

impl Default for DelimitedTextReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DelimitedTextReader {
    pub fn new() -> Self {
        Self::with_options(CsvReadOptions::default())
    }

    pub fn with_options(options: CsvReadOptions) -> Self {
        Self { options }
    }
}

/// Pick the delimiter whose per-line count is positive and identical across
/// up to [`SNIFF_LINES`] leading non-blank lines. Ties go to the highest
/// count; no qualifier falls back to comma.
fn sniff_delimiter(text: &str) -> u8 {
    let sample: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    if sample.is_empty() {
        return b',';
    }

    let mut best: Option<(u8, usize)> = None;
    for candidate in SNIFF_CANDIDATES {
        let mut counts = sample
            .iter()
            .map(|line| line.bytes().filter(|b| *b == candidate).count());
        let first = match counts.next() {
            Some(count) if count > 0 => count,
            _ => continue,
        };
        if counts.all(|count| count == first) && best.map_or(true, |(_, count)| first > count) {
            best = Some((candidate, first));
        }
    }
    best.map_or(b',', |(candidate, _)| candidate)
}

impl FormatReader for DelimitedTextReader {
    fn extensions(&self) -> &'static [&'static str] {
        &[".csv"]
    }

    fn read(&self, path: &Path, ctx: &ReadContext<'_>) -> Result<FileDocument, ReadFault> {
        let mut document = FileDocument::new(path);
        if ctx.cancel.is_cancelled() {
            return Err(ReadFault::Cancelled);
        }

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                document.push_error(
                    LoadError::error(LoadErrorKind::Io, "failed to read file").with_source(&err),
                );
                return Ok(document.finalize());
            }
        };

        let (text, encoding_used, had_errors) = self.options.encoding.decode(&bytes);
        if had_errors {
            document.push_error(LoadError::warning(
                LoadErrorKind::InvalidStructure,
                format!(
                    "some bytes could not be decoded as {}; replacement characters inserted",
                    encoding_used.name()
                ),
            ));
        }

        let sheet_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("Sheet1")
            .to_string();
        let mut builder = SheetDataBuilder::new(sheet_name);

        let delimiter = self
            .options
            .delimiter
            .unwrap_or_else(|| sniff_delimiter(&text));
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut records = csv_reader.records();
        let first = loop {
            match records.next() {
                Some(Ok(record)) => break Some(record),
                Some(Err(err)) => {
                    document.push_error(
                        LoadError::warning(LoadErrorKind::InvalidStructure, "malformed record")
                            .with_source(&err),
                    );
                }
                None => break None,
            }
        };

        let first = match first {
            Some(record) => record,
            None => {
                document.push_error(LoadError::warning(
                    LoadErrorKind::EmptyHeader,
                    "file contains no rows; header row is absent",
                ));
                document.push_sheet(builder.build());
                return Ok(document.finalize());
            }
        };

        if self.options.has_header_row {
            builder.set_headers(first.iter().map(str::to_string).collect());
        } else {
            builder.set_headers((0..first.len()).map(|i| format!("Column{}", i + 1)).collect());
            builder.push_row(decode_fields(&first, ctx));
        }

        if !builder.has_headers() {
            document.push_error(LoadError::warning(
                LoadErrorKind::EmptyHeader,
                "header row is empty; no columns could be read",
            ));
            document.push_sheet(builder.build());
            return Ok(document.finalize());
        }

        for record in records {
            match record {
                Ok(record) => builder.push_row(decode_fields(&record, ctx)),
                Err(err) => {
                    log::debug!("skipping malformed record in {}: {}", path.display(), err);
                    document.push_error(
                        LoadError::warning(LoadErrorKind::InvalidStructure, "malformed record")
                            .with_source(&err),
                    );
                }
            }
        }

        document.push_sheet(builder.build());
        Ok(document.finalize())
    }
}

fn decode_fields(record: &csv::StringRecord, ctx: &ReadContext<'_>) -> Vec<CellValue> {
    record
        .iter()
        .map(|field| CellValue::from_raw_text(field, ctx.pool))
        .collect()
}
