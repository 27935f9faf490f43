//! Header and hash value tables: an ordered string→string map plus three
//! stateless serializers for the historical `header` (Latin-1), `header2`
//! (UTF-16LE) and `xheader` (XML) framings EnCase-family tools expect in
//! parallel (spec §3, §9 "two parallel header framings"). On read, values
//! are merged `xheader > header2 > header` so the richest framing wins on
//! conflicting keys.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::fmt::Write as _;

use crate::ewf::error::{Error, Result};
use crate::ewf::format::DateFormat;

/// Canonical identifiers used as keys. Not exhaustive — unknown
/// identifiers round-trip fine as plain strings.
pub mod keys {
    pub const CASE_NUMBER: &str = "case_number";
    pub const DESCRIPTION: &str = "description";
    pub const EXAMINER_NAME: &str = "examiner_name";
    pub const EVIDENCE_NUMBER: &str = "evidence_number";
    pub const NOTES: &str = "notes";
    pub const ACQUIRY_DATE: &str = "acquiry_date";
    pub const SYSTEM_DATE: &str = "system_date";
    pub const ACQUIRY_SOFTWARE_VERSION: &str = "acquiry_software_version";
    pub const ACQUIRY_OPERATING_SYSTEM: &str = "acquiry_operating_system";
    pub const PASSWORD: &str = "password";
    pub const MD5: &str = "md5";
    pub const SHA1: &str = "sha1";
}

/// Ordered identifier → value mapping. Insertion order is preserved so
/// `header`/`header2` emission reproduces a stable column order.
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    order: Vec<String>,
    values: std::collections::HashMap<String, String>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, identifier: impl Into<String>, value: impl Into<String>) {
        let identifier = identifier.into();
        if !self.values.contains_key(&identifier) {
            self.order.push(identifier.clone());
        }
        self.values.insert(identifier, value.into());
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.values.get(identifier).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .map(move |k| (k.as_str(), self.values[k].as_str()))
    }

    pub fn extend(&mut self, other: ValueTable) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Render `timestamp` the way `date_format` expects inside a header value.
///
/// The original UTF-8 variant's copy-to-string loop is inclusive of the
/// NUL terminator while the UTF-16 variant's is not — an off-by-one the
/// spec calls out as a probable source bug (spec §9). This implementation
/// uses the UTF-8 (inclusive) form uniformly; there is no separate byte
/// buffer to under-size here, so the distinction only matters as a note
/// for anyone porting the original's exact loop bounds.
pub fn format_date(timestamp: DateTime<Utc>, date_format: DateFormat) -> String {
    match date_format {
        DateFormat::Ctime => timestamp.format("%a %b %e %H:%M:%S %Y").to_string(),
        DateFormat::DayMonth => timestamp.format("%d/%m/%Y %H:%M:%S").to_string(),
        DateFormat::MonthDay => timestamp.format("%m/%d/%Y %H:%M:%S").to_string(),
        DateFormat::Iso8601 => timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
    }
}

/// Parse a header-table date value back into its components. EWF's legacy
/// `header`/`header2` payload actually stores dates as six tab-separated
/// integer fields (year, month, day, hour, minute, second) rather than the
/// human rendering above; `format_date` is used for `xheader`/display and
/// this for the tab-separated wire form.
pub fn parse_tabbed_date(value: &str) -> Result<DateTime<Utc>> {
    let parts: Vec<&str> = value.split(' ').collect();
    if parts.len() != 6 {
        return Err(Error::CorruptSection(format!(
            "expected 6 space-separated date fields, got {}",
            parts.len()
        )));
    }
    let mut n = [0i32; 6];
    for (i, p) in parts.iter().enumerate() {
        n[i] = p
            .parse()
            .map_err(|_| Error::CorruptSection(format!("invalid date field {p:?}")))?;
    }
    chrono::NaiveDate::from_ymd_opt(n[0], n[1] as u32, n[2] as u32)
        .and_then(|d| d.and_hms_opt(n[3] as u32, n[4] as u32, n[5] as u32))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::CorruptSection("date out of range".into()))
}

pub fn emit_tabbed_date(timestamp: DateTime<Utc>) -> String {
    format!(
        "{} {} {} {} {} {}",
        timestamp.year(),
        timestamp.month(),
        timestamp.day(),
        timestamp.hour(),
        timestamp.minute(),
        timestamp.second()
    )
}

/// The legacy UTF-16 month-name table used by some EnCase tools to spell
/// out `acquiry_date` in words. Exposed so callers needing word-form
/// dates use the *correct* mapping — the original's table mislabels index
/// 8 (September ends up under the wrong slot); spec §9 says implementers
/// must not replicate that bug, so this table is simply correct.
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

// ---------------------------------------------------------------------
// `header` (Latin-1, tab-separated, two-row category/value table)
// ---------------------------------------------------------------------

/// Column order EnCase historically emits for the plain `header` framing.
const HEADER_COLUMNS: [&str; 9] = [
    "case_number",
    "evidence_number",
    "description",
    "examiner_name",
    "notes",
    "acquiry_date",
    "system_date",
    "acquiry_software_version",
    "acquiry_operating_system",
];

/// Serialize `values` into the plaintext payload of a `header` section
/// (before zlib compression): a `main` category line, a tab-separated
/// column-id row, and a tab-separated value row.
pub fn emit_header(values: &ValueTable) -> Vec<u8> {
    let mut text = String::new();
    let _ = writeln!(text, "1");
    let _ = writeln!(text, "main");
    let ids: Vec<&str> = HEADER_COLUMNS
        .iter()
        .filter(|c| values.get(c).is_some())
        .copied()
        .collect();
    let _ = writeln!(text, "{}", ids.join("\t"));
    let row: Vec<&str> = ids.iter().map(|id| values.get(id).unwrap_or("")).collect();
    let _ = writeln!(text, "{}", row.join("\t"));
    text.push('\n');
    // Latin-1 is ASCII-compatible for every field we emit ourselves.
    text.into_bytes()
}

/// Parse a decompressed `header` payload back into a [`ValueTable`].
/// Tolerant of: a leading blank line, a missing category line, and images
/// that only ever wrote one entry per line (`id<TAB>value`) instead of the
/// two-row table form.
pub fn parse_header(raw: &[u8]) -> ValueTable {
    let text = decode_latin1(raw);
    parse_tab_table(&text)
}

fn decode_latin1(raw: &[u8]) -> String {
    raw.iter().map(|&b| b as char).collect()
}

fn parse_tab_table(text: &str) -> ValueTable {
    let lines: Vec<&str> = text
        .split(['\n', '\r'])
        .map(|l| l.trim_start_matches('\u{FEFF}'))
        .filter(|l| !l.is_empty())
        .collect();

    for i in 0..lines.len().saturating_sub(1) {
        if lines[i].contains('\t') && lines[i + 1].contains('\t') {
            let mut table = ValueTable::new();
            for (k, v) in lines[i].split('\t').zip(lines[i + 1].split('\t')) {
                table.set(k.trim_matches('\0'), v.trim_matches('\0'));
            }
            return table;
        }
    }

    let mut table = ValueTable::new();
    for line in lines {
        if let Some((k, v)) = line.split_once('\t') {
            table.set(k.trim_matches('\0'), v.trim_matches('\0'));
        }
    }
    table
}

// ---------------------------------------------------------------------
// `header2` (UTF-16LE, same tab-separated table shape)
// ---------------------------------------------------------------------

pub fn emit_header2(values: &ValueTable) -> Vec<u8> {
    let text = String::from_utf8(emit_header(values)).unwrap();
    let mut out = Vec::with_capacity(text.len() * 2 + 2);
    out.extend_from_slice(&0xFEFFu16.to_le_bytes()); // BOM
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

pub fn parse_header2(raw: &[u8]) -> Result<ValueTable> {
    if raw.len() % 2 != 0 {
        return Err(Error::CorruptSection(
            "header2 payload has odd byte length".into(),
        ));
    }
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let text = String::from_utf16(&units)
        .map_err(|e| Error::CorruptSection(format!("invalid UTF-16 in header2: {e}")))?;
    Ok(parse_tab_table(&text))
}

// ---------------------------------------------------------------------
// `xheader` (XML)
// ---------------------------------------------------------------------

pub fn emit_xheader(values: &ValueTable) -> Vec<u8> {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<xheader>\n");
    for (k, v) in values.iter() {
        let _ = writeln!(xml, "\t<{}>{}</{}>", k, xml_escape(v), k);
    }
    xml.push_str("</xheader>\n");
    xml.into_bytes()
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// A deliberately minimal XML parser: EWF's `xheader` payload is a flat
/// `<tag>value</tag>` list with no attributes or nesting below the root,
/// so a general-purpose XML crate would be pulling in far more than this
/// format ever uses.
pub fn parse_xheader(raw: &[u8]) -> Result<ValueTable> {
    let text = String::from_utf8(raw.to_vec())
        .map_err(|e| Error::CorruptSection(format!("invalid UTF-8 in xheader: {e}")))?;
    let mut table = ValueTable::new();
    let mut rest = text.as_str();
    while let Some(open_start) = rest.find('<') {
        let after_open = &rest[open_start + 1..];
        let Some(open_end) = after_open.find('>') else {
            break;
        };
        let tag = &after_open[..open_end];
        if tag.starts_with('?') || tag.starts_with('/') || tag == "xheader" {
            rest = &after_open[open_end + 1..];
            continue;
        }
        let body_start = open_end + 1;
        let closing = format!("</{tag}>");
        let Some(close_pos) = after_open[body_start..].find(&closing) else {
            rest = &after_open[body_start..];
            continue;
        };
        let value = &after_open[body_start..body_start + close_pos];
        table.set(tag, xml_unescape(value));
        rest = &after_open[body_start + close_pos + closing.len()..];
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut values = ValueTable::new();
        values.set(keys::CASE_NUMBER, "2026-001");
        values.set(keys::EXAMINER_NAME, "A. Examiner");
        let raw = emit_header(&values);
        let parsed = parse_header(&raw);
        assert_eq!(parsed.get(keys::CASE_NUMBER), Some("2026-001"));
        assert_eq!(parsed.get(keys::EXAMINER_NAME), Some("A. Examiner"));
    }

    #[test]
    fn header2_round_trip_utf16() {
        let mut values = ValueTable::new();
        values.set(keys::DESCRIPTION, "caf\u{e9} disk");
        let raw = emit_header2(&values);
        let parsed = parse_header2(&raw).unwrap();
        assert_eq!(parsed.get(keys::DESCRIPTION), Some("caf\u{e9} disk"));
    }

    #[test]
    fn xheader_round_trip() {
        let mut values = ValueTable::new();
        values.set(keys::NOTES, "a <tricky> & value");
        values.set(keys::CASE_NUMBER, "123");
        let raw = emit_xheader(&values);
        let parsed = parse_xheader(&raw).unwrap();
        assert_eq!(parsed.get(keys::NOTES), Some("a <tricky> & value"));
        assert_eq!(parsed.get(keys::CASE_NUMBER), Some("123"));
    }

    #[test]
    fn month_table_is_not_the_legacy_off_by_one() {
        assert_eq!(MONTH_NAMES[8], "September");
    }

    #[test]
    fn tabbed_date_round_trip() {
        let ts = chrono::DateTime::parse_from_rfc3339("2026-07-28T10:15:30Z")
            .unwrap()
            .with_timezone(&Utc);
        let emitted = emit_tabbed_date(ts);
        let parsed = parse_tabbed_date(&emitted).unwrap();
        assert_eq!(parsed, ts);
    }
}
