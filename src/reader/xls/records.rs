//! BIFF record primitives for the legacy-binary reader.
//!
//! Records are a 4-byte header (type + payload length, little endian)
//! followed by the payload. Long structures span multiple records via
//! CONTINUE; string character data that crosses a continuation boundary
//! restarts with a fresh option byte, which [`SegmentedCursor`] handles.

use encoding_rs::Encoding;

pub(crate) const RECORD_BOF: u16 = 0x0809;
pub(crate) const RECORD_EOF: u16 = 0x000A;
pub(crate) const RECORD_CODEPAGE: u16 = 0x0042;
pub(crate) const RECORD_DATE1904: u16 = 0x0022;
pub(crate) const RECORD_BOUNDSHEET: u16 = 0x0085;
pub(crate) const RECORD_SST: u16 = 0x00FC;
pub(crate) const RECORD_CONTINUE: u16 = 0x003C;
pub(crate) const RECORD_LABEL: u16 = 0x0204;
pub(crate) const RECORD_LABELSST: u16 = 0x00FD;
pub(crate) const RECORD_NUMBER: u16 = 0x0203;
pub(crate) const RECORD_RK: u16 = 0x027E;
pub(crate) const RECORD_MULRK: u16 = 0x00BD;
pub(crate) const RECORD_BOOLERR: u16 = 0x0205;
pub(crate) const RECORD_FORMULA: u16 = 0x0006;
pub(crate) const RECORD_STRING: u16 = 0x0207;

/// BIFF stream versions this reader accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BiffVersion {
    Biff5,
    Biff8,
}

impl BiffVersion {
    pub(crate) fn from_bof(data: &[u8]) -> Option<Self> {
        match read_u16(data, 0)? {
            0x0500 => Some(BiffVersion::Biff5),
            0x0600 => Some(BiffVersion::Biff8),
            _ => None,
        }
    }
}

/// Read the record starting at `pos`: (type, payload, next position).
pub(crate) fn read_record(stream: &[u8], pos: usize) -> Option<(u16, &[u8], usize)> {
    let header = stream.get(pos..pos.checked_add(4)?)?;
    let record_type = u16::from_le_bytes([header[0], header[1]]);
    let len = u16::from_le_bytes([header[2], header[3]]) as usize;
    let data = stream.get(pos + 4..pos + 4 + len)?;
    Some((record_type, data, pos + 4 + len))
}

pub(crate) fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_f64(data: &[u8], offset: usize) -> Option<f64> {
    let bytes = data.get(offset..offset + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Some(f64::from_le_bytes(raw))
}

/// Decode an RK value: a 30-bit payload with integer and divide-by-100 flags.
pub(crate) fn rk_to_f64(rk: u32) -> f64 {
    let divide = rk & 0x02 != 0;
    let value = if rk & 0x01 != 0 {
        ((rk as i32) >> 2) as f64
    } else {
        f64::from_bits((u64::from(rk) & 0xFFFF_FFFC) << 32)
    };
    if divide {
        value / 100.0
    } else {
        value
    }
}

/// BoolErr error codes to their display literals.
pub(crate) fn error_literal(code: u8) -> &'static str {
    match code {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        _ => "#ERR!",
    }
}

/// 8-bit text decoding for pre-unicode strings.
#[derive(Debug, Clone, Copy)]
pub(crate) struct XlsEncoding {
    encoding: &'static Encoding,
}

impl XlsEncoding {
    pub(crate) fn from_codepage(codepage: u16) -> Self {
        use encoding_rs::*;
        let encoding = match codepage {
            874 => WINDOWS_874,
            932 => SHIFT_JIS,
            936 => GBK,
            949 => EUC_KR,
            950 => BIG5,
            1250 => WINDOWS_1250,
            1251 => WINDOWS_1251,
            1253 => WINDOWS_1253,
            1254 => WINDOWS_1254,
            1255 => WINDOWS_1255,
            1256 => WINDOWS_1256,
            1257 => WINDOWS_1257,
            1258 => WINDOWS_1258,
            10000 => MACINTOSH,
            _ => WINDOWS_1252,
        };
        Self { encoding }
    }

    pub(crate) fn decode(&self, bytes: &[u8]) -> String {
        self.encoding.decode(bytes).0.into_owned()
    }
}

impl Default for XlsEncoding {
    fn default() -> Self {
        Self::from_codepage(1252)
    }
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Sheet names: 1-byte length, then (BIFF8) an option byte and characters.
pub(crate) fn parse_short_string(
    data: &[u8],
    version: BiffVersion,
    encoding: XlsEncoding,
) -> Option<String> {
    let cch = *data.first()? as usize;
    match version {
        BiffVersion::Biff5 => {
            let bytes = data.get(1..1 + cch)?;
            Some(encoding.decode(bytes))
        }
        BiffVersion::Biff8 => {
            let wide = data.get(1)? & 0x01 != 0;
            if wide {
                let bytes = data.get(2..2 + cch * 2)?;
                Some(decode_utf16le(bytes))
            } else {
                let bytes = data.get(2..2 + cch)?;
                Some(encoding.decode(bytes))
            }
        }
    }
}

/// Inline cell strings (LABEL, STRING): 2-byte length, then characters with
/// a BIFF8 option byte.
pub(crate) fn parse_cell_string(
    data: &[u8],
    version: BiffVersion,
    encoding: XlsEncoding,
) -> Option<String> {
    let cch = read_u16(data, 0)? as usize;
    match version {
        BiffVersion::Biff5 => {
            let bytes = data.get(2..2 + cch)?;
            Some(encoding.decode(bytes))
        }
        BiffVersion::Biff8 => {
            let wide = data.get(2)? & 0x01 != 0;
            if wide {
                let bytes = data.get(3..3 + cch * 2)?;
                Some(decode_utf16le(bytes))
            } else {
                let bytes = data.get(3..3 + cch)?;
                Some(encoding.decode(bytes))
            }
        }
    }
}

/// Cursor over the SST payload and its CONTINUE payloads.
///
/// Fixed fields read straight across segment boundaries; character data that
/// crosses a boundary re-reads the option byte first, per the format.
pub(crate) struct SegmentedCursor<'a> {
    segments: &'a [&'a [u8]],
    segment: usize,
    offset: usize,
}

impl<'a> SegmentedCursor<'a> {
    pub(crate) fn new(segments: &'a [&'a [u8]]) -> Self {
        Self {
            segments,
            segment: 0,
            offset: 0,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        let current = self
            .segments
            .get(self.segment)
            .map_or(0, |seg| seg.len() - self.offset);
        let rest: usize = self.segments[(self.segment + 1).min(self.segments.len())..]
            .iter()
            .map(|seg| seg.len())
            .sum();
        current + rest
    }

    /// Move past exhausted segments so the next read starts on real bytes.
    fn normalize(&mut self) {
        while self.segment < self.segments.len() && self.offset >= self.segments[self.segment].len()
        {
            self.segment += 1;
            self.offset = 0;
        }
    }

    pub(crate) fn read_u8(&mut self) -> Option<u8> {
        self.normalize();
        let byte = *self.segments.get(self.segment)?.get(self.offset)?;
        self.offset += 1;
        Some(byte)
    }

    pub(crate) fn read_u16(&mut self) -> Option<u16> {
        Some(u16::from_le_bytes([self.read_u8()?, self.read_u8()?]))
    }

    pub(crate) fn read_u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes([
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
        ]))
    }

    pub(crate) fn skip(&mut self, mut count: usize) -> Option<()> {
        while count > 0 {
            self.normalize();
            let segment = self.segments.get(self.segment)?;
            let available = segment.len() - self.offset;
            let take = count.min(available);
            self.offset += take;
            count -= take;
            if take == 0 {
                return None;
            }
        }
        Some(())
    }

    /// Read `cch` characters, re-reading the option byte whenever character
    /// data resumes in a new segment.
    pub(crate) fn read_chars(
        &mut self,
        cch: usize,
        mut wide: bool,
        encoding: XlsEncoding,
    ) -> Option<String> {
        let mut out = String::with_capacity(cch);
        let mut remaining = cch;
        while remaining > 0 {
            self.normalize();
            let segment = self.segments.get(self.segment)?;
            if self.offset == 0 && self.segment > 0 {
                // Continuation: a fresh option byte precedes the characters.
                wide = (*segment.first()? & 0x01) != 0;
                self.offset = 1;
            }
            let segment = self.segments[self.segment];
            let available = segment.len() - self.offset;
            let char_width = if wide { 2 } else { 1 };
            let take = remaining.min(available / char_width);
            if take == 0 {
                if available > 0 {
                    return None; // split mid-character: corrupt
                }
                continue;
            }
            let bytes = &segment[self.offset..self.offset + take * char_width];
            if wide {
                out.push_str(&decode_utf16le(bytes));
            } else {
                out.push_str(&encoding.decode(bytes));
            }
            self.offset += take * char_width;
            remaining -= take;
        }
        Some(out)
    }
}

/// Safety valve against absurd unique-string counts in corrupt files.
const MAX_SST_STRINGS: usize = 4_000_000;

/// Parse the shared-string table from the SST payload plus its CONTINUE
/// payloads. Best effort: a truncated table yields the strings read so far.
pub(crate) fn parse_sst(segments: &[&[u8]], encoding: XlsEncoding) -> Vec<String> {
    let mut cursor = SegmentedCursor::new(segments);
    let Some(_total) = cursor.read_u32() else {
        return Vec::new();
    };
    let Some(unique) = cursor.read_u32() else {
        return Vec::new();
    };
    let unique = (unique as usize).min(MAX_SST_STRINGS);

    let mut strings = Vec::with_capacity(unique.min(64 * 1024));
    for _ in 0..unique {
        let Some(string) = parse_sst_entry(&mut cursor, encoding) else {
            log::debug!(
                "shared string table truncated after {} of {} entries",
                strings.len(),
                unique
            );
            break;
        };
        strings.push(string);
    }
    strings
}

fn parse_sst_entry(cursor: &mut SegmentedCursor<'_>, encoding: XlsEncoding) -> Option<String> {
    let cch = cursor.read_u16()? as usize;
    let flags = cursor.read_u8()?;
    let wide = flags & 0x01 != 0;
    let runs = if flags & 0x08 != 0 {
        cursor.read_u16()? as usize
    } else {
        0
    };
    let ext_bytes = if flags & 0x04 != 0 {
        cursor.read_u32()? as usize
    } else {
        0
    };
    let string = cursor.read_chars(cch, wide, encoding)?;
    cursor.skip(runs * 4)?;
    cursor.skip(ext_bytes)?;
    Some(string)
}
