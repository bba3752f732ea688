//! XML-sheet reader for OOXML workbooks.
//!
//! Walks the ZIP package part by part: `xl/workbook.xml` for sheet names and
//! relationship ids, the rels part for sheet targets, `xl/sharedStrings.xml`
//! for the read-only shared-string table, `xl/styles.xml` for date-format
//! detection, then each worksheet part. Cell decoding is pure given the cell
//! node and the shared-string table; merged ranges are resolved before the
//! cell's own value is consulted.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use zip::ZipArchive;

use crate::common::error::{LoadError, LoadErrorKind, ReadFault};
use crate::sheet::{
    to_indices, CellValue, FileDocument, MergeRange, MergedCellResolver, SheetData,
    SheetDataBuilder, StringPool,
};

use super::{FormatReader, ReadContext};

/// Worksheet bounds accepted from `r` attributes, matching the host
/// application's own grid limits. Anything beyond is a corrupt part.
const MAX_ROWS: u32 = 1_048_576;
const MAX_COLS: u32 = 16_384;

/// Internal part-level failures; surfaced as [`LoadError`] entries.
#[derive(Debug, Error)]
enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("required part '{0}' is missing")]
    MissingPart(String),
    #[error("sheet dimensions exceed the supported grid")]
    DimensionsOutOfRange,
}

/// Reader for `.xlsx`-family packages.
pub struct XmlSheetReader;

impl Default for XmlSheetReader {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlSheetReader {
    pub fn new() -> Self {
        Self
    }
}

impl FormatReader for XmlSheetReader {
    fn extensions(&self) -> &'static [&'static str] {
        &[".xlsx", ".xlsm", ".xltx", ".xltm"]
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
        let mut archive = match ZipArchive::new(BufReader::new(file)) {
            Ok(archive) => archive,
            Err(err) => {
                document.push_error(
                    LoadError::error(
                        LoadErrorKind::InvalidStructure,
                        "file is not a valid OOXML package",
                    )
                    .with_source(&err),
                );
                return Ok(document.finalize());
            }
        };

        let workbook = match load_workbook_parts(&mut archive, ctx.pool) {
            Ok(workbook) => workbook,
            Err(err) => {
                document.push_error(
                    LoadError::error(
                        LoadErrorKind::InvalidStructure,
                        "failed to read workbook structure",
                    )
                    .with_source(&err),
                );
                return Ok(document.finalize());
            }
        };

        if workbook.sheets.is_empty() {
            document.push_error(LoadError::error(
                LoadErrorKind::InvalidStructure,
                "workbook contains no worksheets",
            ));
            return Ok(document.finalize());
        }

        for meta in &workbook.sheets {
            if ctx.cancel.is_cancelled() {
                return Err(ReadFault::Cancelled);
            }
            match read_sheet(&mut archive, &workbook, meta, ctx.pool) {
                Ok(parsed) => {
                    for warning in parsed.warnings {
                        document.push_error(warning.with_context(meta.name.clone()));
                    }
                    document.push_sheet(parsed.sheet);
                }
                Err(err) => {
                    log::warn!("sheet '{}' in {} failed: {}", meta.name, path.display(), err);
                    document.push_error(
                        LoadError::error(
                            LoadErrorKind::InvalidStructure,
                            "failed to read worksheet",
                        )
                        .with_context(meta.name.clone())
                        .with_source(&err),
                    );
                }
            }
        }

        Ok(document.finalize())
    }
}

struct SheetMeta {
    name: String,
    rel_id: String,
}

struct WorkbookParts {
    sheets: Vec<SheetMeta>,
    targets: HashMap<String, String>,
    shared_strings: Vec<Arc<str>>,
    date_styles: HashSet<u32>,
    date_1904: bool,
}

fn load_workbook_parts<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    pool: &StringPool,
) -> Result<WorkbookParts, XlsxError> {
    let workbook_xml = read_part(archive, "xl/workbook.xml")?
        .ok_or_else(|| XlsxError::MissingPart("xl/workbook.xml".into()))?;
    let (sheets, date_1904) = parse_workbook(&workbook_xml)?;

    let rels_xml = read_part(archive, "xl/_rels/workbook.xml.rels")?
        .ok_or_else(|| XlsxError::MissingPart("xl/_rels/workbook.xml.rels".into()))?;
    let targets = parse_relationships(&rels_xml)?;

    let shared_strings = match read_part(archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml, pool)?,
        None => Vec::new(),
    };

    let date_styles = match read_part(archive, "xl/styles.xml") {
        Ok(Some(xml)) => parse_date_styles(&xml).unwrap_or_else(|err| {
            log::debug!("styles part unreadable, date detection disabled: {}", err);
            HashSet::new()
        }),
        _ => HashSet::new(),
    };

    Ok(WorkbookParts {
        sheets,
        targets,
        shared_strings,
        date_styles,
        date_1904,
    })
}

/// Read a text part by name, tolerating a leading-slash variant.
fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, XlsxError> {
    let mut index = None;
    for (i, entry) in archive.file_names().enumerate() {
        if entry == name || entry.strip_prefix('/') == Some(name) {
            index = Some(i);
            break;
        }
    }
    match index {
        Some(i) => {
            let mut part = archive.by_index(i)?;
            let mut content = String::new();
            part.read_to_string(&mut content)?;
            Ok(Some(content))
        }
        None => Ok(None),
    }
}

/// Sheet declarations plus the 1904 date-system flag from `xl/workbook.xml`.
fn parse_workbook(xml: &str) -> Result<(Vec<SheetMeta>, bool), XlsxError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut date_1904 = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let mut name = None;
                    let mut rel_id = None;
                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"name" => name = Some(attr.unescape_value()?.into_owned()),
                            b"r:id" => rel_id = Some(attr.unescape_value()?.into_owned()),
                            _ => {}
                        }
                    }
                    if let (Some(name), Some(rel_id)) = (name, rel_id) {
                        sheets.push(SheetMeta { name, rel_id });
                    }
                }
                b"workbookPr" => {
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"date1904" {
                            let value = attr.unescape_value()?;
                            date_1904 = value == "1" || value == "true";
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok((sheets, date_1904))
}

/// Relationship id -> target from the workbook rels part.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, XlsxError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Id" => id = Some(attr.unescape_value()?.into_owned()),
                        b"Target" => target = Some(attr.unescape_value()?.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

/// The shared-string table, with rich-text runs flattened and phonetic runs
/// dropped. Every entry goes through the pool.
fn parse_shared_strings(xml: &str, pool: &StringPool) -> Result<Vec<Arc<str>>, XlsxError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si && !in_phonetic => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = false;
                    strings.push(pool.intern(&current));
                }
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Text(t) if in_text => current.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Indexes into `cellXfs` whose number format renders as a date or time.
fn parse_date_styles(xml: &str) -> Result<HashSet<u32>, XlsxError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut custom_formats: HashMap<u32, String> = HashMap::new();
    let mut date_styles = HashSet::new();
    let mut in_cell_xfs = false;
    let mut xf_index: u32 = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"numFmt" => {
                    let mut id = None;
                    let mut code = None;
                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"numFmtId" => id = attr.unescape_value()?.parse::<u32>().ok(),
                            b"formatCode" => code = Some(attr.unescape_value()?.into_owned()),
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(code)) = (id, code) {
                        custom_formats.insert(id, code);
                    }
                }
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    let mut fmt_id = 0;
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"numFmtId" {
                            fmt_id = attr.unescape_value()?.parse::<u32>().unwrap_or(0);
                        }
                    }
                    if is_date_format(fmt_id, &custom_formats) {
                        date_styles.insert(xf_index);
                    }
                    xf_index += 1;
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(date_styles)
}

fn is_date_format(fmt_id: u32, custom_formats: &HashMap<u32, String>) -> bool {
    if matches!(fmt_id, 14..=22 | 45..=47) {
        return true;
    }
    let Some(code) = custom_formats.get(&fmt_id) else {
        return false;
    };
    // Strip quoted literals and [..] sections, then look for date tokens.
    let mut stripped = String::with_capacity(code.len());
    let mut in_quote = false;
    let mut in_bracket = false;
    for ch in code.chars() {
        match ch {
            '"' => in_quote = !in_quote,
            '[' if !in_quote => in_bracket = true,
            ']' if !in_quote => in_bracket = false,
            _ if !in_quote && !in_bracket => stripped.push(ch.to_ascii_lowercase()),
            _ => {}
        }
    }
    stripped.contains('y') || stripped.contains('d') || stripped.contains('h')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellType {
    Number,
    SharedString,
    Boolean,
    InlineString,
    FormulaString,
    Error,
}

struct ParsedSheet {
    sheet: SheetData,
    warnings: Vec<LoadError>,
}

fn read_sheet<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    workbook: &WorkbookParts,
    meta: &SheetMeta,
    pool: &StringPool,
) -> Result<ParsedSheet, XlsxError> {
    let target = workbook
        .targets
        .get(&meta.rel_id)
        .ok_or_else(|| XlsxError::MissingPart(format!("relationship {}", meta.rel_id)))?;
    let part_name = resolve_target(target);
    let xml = read_part(archive, &part_name)?
        .ok_or_else(|| XlsxError::MissingPart(part_name.clone()))?;
    parse_sheet(&xml, meta, workbook, pool)
}

/// Worksheet targets are relative to `xl/` unless package-absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn parse_sheet(
    xml: &str,
    meta: &SheetMeta,
    workbook: &WorkbookParts,
    pool: &StringPool,
) -> Result<ParsedSheet, XlsxError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();

    let mut cells: BTreeMap<u32, BTreeMap<u32, CellValue>> = BTreeMap::new();
    let mut merges: Vec<MergeRange> = Vec::new();

    let mut current_row: u32 = 0;
    // Fallback index for rows without an `r` attribute.
    let mut next_row: u32 = 0;
    let mut next_col: u32 = 0;
    let mut cell_pos: Option<(u32, u32)> = None;
    let mut cell_type = CellType::Number;
    let mut cell_is_date = false;
    let mut pending = String::new();
    let mut in_value = false;
    let mut in_inline_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let mut row_attr = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"r" {
                        row_attr = Some(attr.unescape_value()?.parse::<u32>().ok());
                    }
                }
                current_row = match row_attr {
                    Some(Some(r)) if r >= 1 && r <= MAX_ROWS => r - 1,
                    Some(_) => return Err(XlsxError::DimensionsOutOfRange),
                    None if next_row < MAX_ROWS => next_row,
                    None => return Err(XlsxError::DimensionsOutOfRange),
                };
                next_row = current_row + 1;
                next_col = 0;
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let (pos, ty, is_date) =
                    begin_cell(&e, current_row, next_col, &workbook.date_styles)?;
                next_col = pos.1 + 1;
                cell_pos = Some(pos);
                cell_type = ty;
                cell_is_date = is_date;
                pending.clear();
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                // Valueless cell; advances the fallback column only.
                let (pos, _, _) = begin_cell(&e, current_row, next_col, &workbook.date_styles)?;
                next_col = pos.1 + 1;
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"mergeCell" =>
            {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"ref" {
                        if let Some(range) = MergeRange::parse(&attr.unescape_value()?) {
                            merges.push(range);
                        }
                    }
                }
            }
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" if cell_pos.is_some() => {
                    in_value = true;
                }
                b"t" if cell_pos.is_some() && cell_type == CellType::InlineString => {
                    in_inline_text = true;
                }
                _ => {}
            },
            Event::Text(t) if in_value || in_inline_text => {
                pending.push_str(&t.unescape()?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                b"c" => {
                    if let Some((row, col)) = cell_pos.take() {
                        let value = decode_cell(
                            cell_type,
                            &pending,
                            cell_is_date,
                            workbook,
                            pool,
                        );
                        if !value.is_empty() {
                            cells.entry(row).or_default().insert(col, value);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(materialize(meta.name.clone(), cells, merges))
}

/// Parse a `<c>` element's attributes: position, type, and date styling.
fn begin_cell(
    e: &quick_xml::events::BytesStart<'_>,
    current_row: u32,
    next_col: u32,
    date_styles: &HashSet<u32>,
) -> Result<((u32, u32), CellType, bool), XlsxError> {
    let mut pos = (current_row, next_col);
    let mut ty = CellType::Number;
    let mut is_date = false;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => {
                if let Some((row, col)) = to_indices(&attr.unescape_value()?) {
                    if row >= MAX_ROWS || col >= MAX_COLS {
                        return Err(XlsxError::DimensionsOutOfRange);
                    }
                    pos = (row, col);
                }
            }
            b"t" => {
                ty = match attr.unescape_value()?.as_ref() {
                    "s" => CellType::SharedString,
                    "b" => CellType::Boolean,
                    "inlineStr" => CellType::InlineString,
                    "str" => CellType::FormulaString,
                    "e" => CellType::Error,
                    _ => CellType::Number,
                };
            }
            b"s" => {
                if let Ok(style) = attr.unescape_value()?.parse::<u32>() {
                    is_date = date_styles.contains(&style);
                }
            }
            _ => {}
        }
    }
    Ok((pos, ty, is_date))
}

/// Decode one cell given its collected text. Pure: depends only on the node
/// content, the shared-string table, and the date-system flag.
fn decode_cell(
    ty: CellType,
    text: &str,
    is_date: bool,
    workbook: &WorkbookParts,
    pool: &StringPool,
) -> CellValue {
    match ty {
        CellType::SharedString => text
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|index| workbook.shared_strings.get(index))
            .map(|s| CellValue::Text(Arc::clone(s)))
            .unwrap_or(CellValue::Empty),
        CellType::Boolean => CellValue::Boolean(text.trim() == "1"),
        CellType::InlineString | CellType::FormulaString => {
            if text.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(pool.intern(text))
            }
        }
        CellType::Error => {
            if text.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(pool.intern(text))
            }
        }
        CellType::Number => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return CellValue::Empty;
            }
            match trimmed.parse::<f64>() {
                Ok(serial) if is_date => serial_to_datetime(serial, workbook.date_1904)
                    .map(CellValue::Date)
                    .unwrap_or(CellValue::Number(serial)),
                Ok(number) => CellValue::Number(number),
                Err(_) => CellValue::Text(pool.intern(text)),
            }
        }
    }
}

/// Excel serial date to a calendar datetime, honoring the 1904 system.
fn serial_to_datetime(serial: f64, date_1904: bool) -> Option<chrono::NaiveDateTime> {
    use chrono::{Duration, NaiveDate};

    let base = if date_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let days = serial.trunc() as i64;
    let micros = (serial.fract() * 86_400.0 * 1_000_000.0).round() as i64;
    let date = base.checked_add_signed(Duration::days(days))?;
    Some(date.and_hms_opt(0, 0, 0)? + Duration::microseconds(micros))
}

/// Turn the sparse cell map into the canonical grid. The first occupied row
/// is the header; merged ranges win over stored values.
fn materialize(
    name: String,
    cells: BTreeMap<u32, BTreeMap<u32, CellValue>>,
    merges: Vec<MergeRange>,
) -> ParsedSheet {
    let mut resolver = MergedCellResolver::new();
    for range in &merges {
        let origin = cells
            .get(&range.start_row)
            .and_then(|row| row.get(&range.start_col))
            .cloned()
            .unwrap_or(CellValue::Empty);
        resolver.register(*range, origin);
    }

    let mut min_row = u32::MAX;
    let mut max_row = 0u32;
    let mut min_col = u32::MAX;
    let mut max_col = 0u32;
    for (row, columns) in &cells {
        for col in columns.keys() {
            min_row = min_row.min(*row);
            max_row = max_row.max(*row);
            min_col = min_col.min(*col);
            max_col = max_col.max(*col);
        }
    }
    for range in &merges {
        min_row = min_row.min(range.start_row);
        max_row = max_row.max(range.end_row);
        min_col = min_col.min(range.start_col);
        max_col = max_col.max(range.end_col);
    }

    let mut builder = SheetDataBuilder::new(name);
    let mut warnings = Vec::new();

    if min_row > max_row || min_col > max_col {
        warnings.push(LoadError::warning(
            LoadErrorKind::EmptyHeader,
            "sheet contains no cells; header row is absent",
        ));
        return ParsedSheet {
            sheet: builder.build(),
            warnings,
        };
    }

    let value_at = |row: u32, col: u32| -> CellValue {
        resolver
            .resolve(row, col)
            .cloned()
            .or_else(|| cells.get(&row).and_then(|r| r.get(&col)).cloned())
            .unwrap_or(CellValue::Empty)
    };

    let headers: Vec<String> = (min_col..=max_col)
        .map(|col| value_at(min_row, col).to_string())
        .collect();
    builder.set_headers(headers);
    if !builder.has_headers() {
        warnings.push(LoadError::warning(
            LoadErrorKind::EmptyHeader,
            "header row is empty; no columns could be read",
        ));
        return ParsedSheet {
            sheet: builder.build(),
            warnings,
        };
    }

    for row in (min_row + 1)..=max_row {
        builder.push_row((min_col..=max_col).map(|col| value_at(row, col)).collect());
    }

    ParsedSheet {
        sheet: builder.build(),
        warnings,
    }
}
