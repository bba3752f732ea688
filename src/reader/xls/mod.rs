//! Legacy-binary reader for `.xls`/`.xlt` workbooks.
//!
//! The file is an OLE2 compound document; everything interesting lives in
//! its `Workbook` (or `Book`) stream as a sequence of BIFF records. The
//! globals substream carries the shared-string table and per-sheet stream
//! offsets; each sheet substream carries the cell records. Fidelity is
//! deliberately reduced relative to the XML reader: no merged-cell
//! detection, no formula text, and no date detection -- cached formula
//! results and raw numbers only.

mod records;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use crate::common::error::{LoadError, LoadErrorKind, ReadFault};
use crate::sheet::{CellValue, FileDocument, SheetData, SheetDataBuilder, StringPool};

use super::{FormatReader, ReadContext};
use records::{
    error_literal, parse_cell_string, parse_short_string, parse_sst, read_f64, read_record,
    read_u16, read_u32, rk_to_f64, BiffVersion, XlsEncoding, RECORD_BOF, RECORD_BOOLERR,
    RECORD_BOUNDSHEET, RECORD_CODEPAGE, RECORD_CONTINUE, RECORD_DATE1904, RECORD_EOF,
    RECORD_FORMULA, RECORD_LABEL, RECORD_LABELSST, RECORD_MULRK, RECORD_NUMBER, RECORD_RK,
    RECORD_SST, RECORD_STRING,
};

/// Reader for legacy binary workbooks.
pub struct LegacyBinaryReader;

impl Default for LegacyBinaryReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LegacyBinaryReader {
    pub fn new() -> Self {
        Self
    }
}

impl FormatReader for LegacyBinaryReader {
    fn extensions(&self) -> &'static [&'static str] {
        &[".xls", ".xlt"]
    }

    fn read(&self, path: &Path, ctx: &ReadContext<'_>) -> Result<FileDocument, ReadFault> {
        let mut document = FileDocument::new(path);
        if ctx.cancel.is_cancelled() {
            return Err(ReadFault::Cancelled);
        }

        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                document.push_error(
                    LoadError::error(LoadErrorKind::Io, "failed to open file").with_source(&err),
                );
                return Ok(document.finalize());
            }
        };
        let mut compound = match cfb::CompoundFile::open(BufReader::new(file)) {
            Ok(compound) => compound,
            Err(err) => {
                document.push_error(
                    LoadError::error(
                        LoadErrorKind::InvalidStructure,
                        "file is not an OLE2 compound document",
                    )
                    .with_source(&err),
                );
                return Ok(document.finalize());
            }
        };

        let stream = match read_workbook_stream(&mut compound) {
            Ok(stream) => stream,
            Err(err) => {
                document.push_error(err);
                return Ok(document.finalize());
            }
        };

        let globals = match parse_globals(&stream, ctx.pool) {
            Ok(globals) => globals,
            Err(err) => {
                document.push_error(err);
                return Ok(document.finalize());
            }
        };

        if globals.sheets.is_empty() {
            document.push_error(LoadError::error(
                LoadErrorKind::InvalidStructure,
                "workbook contains no worksheets",
            ));
            return Ok(document.finalize());
        }

        for bound in &globals.sheets {
            if ctx.cancel.is_cancelled() {
                return Err(ReadFault::Cancelled);
            }
            match parse_sheet(&stream, bound, &globals, ctx.pool) {
                Ok(parsed) => {
                    if parsed.empty_header {
                        document.push_error(
                            LoadError::warning(
                                LoadErrorKind::EmptyHeader,
                                "sheet contains no cells; header row is absent",
                            )
                            .with_context(bound.name.clone()),
                        );
                    }
                    document.push_sheet(parsed.sheet);
                }
                Err(message) => {
                    log::warn!("sheet '{}' in {} failed: {}", bound.name, path.display(), message);
                    document.push_error(
                        LoadError::error(LoadErrorKind::InvalidStructure, message)
                            .with_context(bound.name.clone()),
                    );
                }
            }
        }

        Ok(document.finalize())
    }
}

/// The whole `Workbook` stream, wherever the producer put it.
fn read_workbook_stream<R: Read + std::io::Seek>(
    compound: &mut cfb::CompoundFile<R>,
) -> Result<Vec<u8>, LoadError> {
    for candidate in ["/Workbook", "/Book", "Workbook", "Book"] {
        if let Ok(mut stream) = compound.open_stream(candidate) {
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes).map_err(|err| {
                LoadError::error(LoadErrorKind::Io, "failed to read workbook stream")
                    .with_source(&err)
            })?;
            return Ok(bytes);
        }
    }
    Err(LoadError::error(
        LoadErrorKind::InvalidStructure,
        "missing workbook stream (expected 'Workbook' or 'Book')",
    ))
}

struct BoundSheet {
    name: String,
    position: usize,
}

struct WorkbookGlobals {
    version: BiffVersion,
    encoding: XlsEncoding,
    sheets: Vec<BoundSheet>,
    shared_strings: Vec<Arc<str>>,
}

/// Walk the globals substream: BOF, CodePage, BoundSheet8 entries, and the
/// shared-string table with its CONTINUE records.
fn parse_globals(stream: &[u8], pool: &StringPool) -> Result<WorkbookGlobals, LoadError> {
    let (first_id, first_data, mut pos) = read_record(stream, 0).ok_or_else(|| {
        LoadError::error(LoadErrorKind::InvalidStructure, "workbook stream is empty")
    })?;
    if first_id != RECORD_BOF {
        return Err(LoadError::error(
            LoadErrorKind::InvalidStructure,
            "workbook stream does not start with a BOF record",
        ));
    }
    let version = BiffVersion::from_bof(first_data).ok_or_else(|| {
        LoadError::error(
            LoadErrorKind::InvalidStructure,
            "unsupported BIFF stream version",
        )
    })?;

    let mut encoding = XlsEncoding::default();
    let mut sheets: Vec<BoundSheet> = Vec::new();
    let mut raw_bound_sheets: Vec<Vec<u8>> = Vec::new();
    let mut sst_segments: Vec<&[u8]> = Vec::new();
    let mut in_sst = false;

    while let Some((id, data, next)) = read_record(stream, pos) {
        match id {
            RECORD_CODEPAGE => {
                if let Some(codepage) = read_u16(data, 0) {
                    encoding = XlsEncoding::from_codepage(codepage);
                }
                in_sst = false;
            }
            RECORD_DATE1904 => {
                if read_u16(data, 0) == Some(1) {
                    log::debug!("workbook uses the 1904 date system");
                }
                in_sst = false;
            }
            RECORD_BOUNDSHEET => {
                raw_bound_sheets.push(data.to_vec());
                in_sst = false;
            }
            RECORD_SST => {
                sst_segments.clear();
                sst_segments.push(data);
                in_sst = true;
            }
            RECORD_CONTINUE if in_sst => {
                sst_segments.push(data);
            }
            RECORD_EOF => break,
            _ => {
                in_sst = false;
            }
        }
        pos = next;
    }

    // BoundSheet names need the (possibly later) CODEPAGE record, so decode
    // them after the walk.
    for data in &raw_bound_sheets {
        let position = read_u32(data, 0).unwrap_or(0) as usize;
        let sheet_type = data.get(5).copied().unwrap_or(0);
        if sheet_type != 0x00 {
            continue; // macro sheets, chart sheets, VB modules
        }
        let name = data
            .get(6..)
            .and_then(|name_data| parse_short_string(name_data, version, encoding))
            .unwrap_or_else(|| format!("Sheet{}", sheets.len() + 1));
        sheets.push(BoundSheet { name, position });
    }

    let shared_strings = parse_sst(&sst_segments, encoding)
        .into_iter()
        .map(|s| pool.intern(&s))
        .collect();

    Ok(WorkbookGlobals {
        version,
        encoding,
        sheets,
        shared_strings,
    })
}

struct ParsedSheet {
    sheet: SheetData,
    empty_header: bool,
}

/// Walk one sheet substream and materialize its grid.
fn parse_sheet(
    stream: &[u8],
    bound: &BoundSheet,
    globals: &WorkbookGlobals,
    pool: &StringPool,
) -> Result<ParsedSheet, String> {
    let (first_id, _, mut pos) = read_record(stream, bound.position)
        .ok_or_else(|| "sheet offset is outside the workbook stream".to_string())?;
    if first_id != RECORD_BOF {
        return Err("sheet substream does not start with a BOF record".to_string());
    }

    let mut cells: BTreeMap<u32, BTreeMap<u32, CellValue>> = BTreeMap::new();
    let mut insert = |row: u16, col: u16, value: CellValue| {
        if !value.is_empty() {
            cells
                .entry(u32::from(row))
                .or_default()
                .insert(u32::from(col), value);
        }
    };
    // A FORMULA record with a string result is followed by the STRING record
    // holding the cached text.
    let mut pending_string_cell: Option<(u16, u16)> = None;

    while let Some((id, data, next)) = read_record(stream, pos) {
        match id {
            RECORD_EOF => break,
            RECORD_LABELSST => {
                if let (Some(row), Some(col), Some(index)) =
                    (read_u16(data, 0), read_u16(data, 2), read_u32(data, 6))
                {
                    if let Some(text) = globals.shared_strings.get(index as usize) {
                        insert(row, col, CellValue::Text(Arc::clone(text)));
                    }
                }
            }
            RECORD_LABEL => {
                if let (Some(row), Some(col), Some(text_data)) =
                    (read_u16(data, 0), read_u16(data, 2), data.get(6..))
                {
                    if let Some(text) =
                        parse_cell_string(text_data, globals.version, globals.encoding)
                    {
                        if !text.is_empty() {
                            insert(row, col, CellValue::Text(pool.intern(&text)));
                        }
                    }
                }
            }
            RECORD_NUMBER => {
                if let (Some(row), Some(col), Some(value)) =
                    (read_u16(data, 0), read_u16(data, 2), read_f64(data, 6))
                {
                    insert(row, col, CellValue::Number(value));
                }
            }
            RECORD_RK => {
                if let (Some(row), Some(col), Some(rk)) =
                    (read_u16(data, 0), read_u16(data, 2), read_u32(data, 6))
                {
                    insert(row, col, CellValue::Number(rk_to_f64(rk)));
                }
            }
            RECORD_MULRK => {
                // row, first column, then (ixfe, rk) pairs, last column.
                if let (Some(row), Some(first_col)) = (read_u16(data, 0), read_u16(data, 2)) {
                    let pairs = data.len().saturating_sub(6) / 6;
                    for i in 0..pairs {
                        if let Some(rk) = read_u32(data, 4 + i * 6 + 2) {
                            insert(
                                row,
                                first_col.saturating_add(i as u16),
                                CellValue::Number(rk_to_f64(rk)),
                            );
                        }
                    }
                }
            }
            RECORD_BOOLERR => {
                if let (Some(row), Some(col)) = (read_u16(data, 0), read_u16(data, 2)) {
                    if let (Some(&value), Some(&is_error)) = (data.get(6), data.get(7)) {
                        let cell = if is_error == 0 {
                            CellValue::Boolean(value != 0)
                        } else {
                            CellValue::Text(pool.intern(error_literal(value)))
                        };
                        insert(row, col, cell);
                    }
                }
            }
            RECORD_FORMULA => {
                if let (Some(row), Some(col)) = (read_u16(data, 0), read_u16(data, 2)) {
                    if let Some(num) = data.get(6..14) {
                        if num[6] == 0xFF && num[7] == 0xFF {
                            match num[0] {
                                0x00 => pending_string_cell = Some((row, col)),
                                0x01 => insert(row, col, CellValue::Boolean(num[2] != 0)),
                                0x02 => {
                                    insert(row, col, CellValue::Text(pool.intern(error_literal(num[2]))))
                                }
                                _ => {} // cached empty string
                            }
                        } else if let Some(value) = read_f64(data, 6) {
                            insert(row, col, CellValue::Number(value));
                        }
                    }
                }
            }
            RECORD_STRING => {
                if let Some((row, col)) = pending_string_cell.take() {
                    if let Some(text) = parse_cell_string(data, globals.version, globals.encoding) {
                        if !text.is_empty() {
                            insert(row, col, CellValue::Text(pool.intern(&text)));
                        }
                    }
                }
            }
            RECORD_BOF => break, // ran into the next substream without an EOF
            _ => {}
        }
        pos = next;
    }

    Ok(materialize(bound.name.clone(), cells))
}

/// First occupied row becomes the header; later rows become data.
fn materialize(name: String, cells: BTreeMap<u32, BTreeMap<u32, CellValue>>) -> ParsedSheet {
    let mut builder = SheetDataBuilder::new(name);

    let mut min_col = u32::MAX;
    let mut max_col = 0u32;
    for columns in cells.values() {
        for col in columns.keys() {
            min_col = min_col.min(*col);
            max_col = max_col.max(*col);
        }
    }
    let (min_row, max_row) = match (cells.keys().next(), cells.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => {
            return ParsedSheet {
                sheet: builder.build(),
                empty_header: true,
            }
        }
    };

    let value_at = |row: u32, col: u32| -> CellValue {
        cells
            .get(&row)
            .and_then(|columns| columns.get(&col))
            .cloned()
            .unwrap_or(CellValue::Empty)
    };

    let headers: Vec<String> = (min_col..=max_col)
        .map(|col| value_at(min_row, col).to_string())
        .collect();
    builder.set_headers(headers);
    if !builder.has_headers() {
        return ParsedSheet {
            sheet: builder.build(),
            empty_header: true,
        };
    }

    for row in (min_row + 1)..=max_row {
        builder.push_row((min_col..=max_col).map(|col| value_at(row, col)).collect());
    }

    ParsedSheet {
        sheet: builder.build(),
        empty_header: false,
    }
}
