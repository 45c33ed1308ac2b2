//! Raw snapshot parsing.
//!
//! A snapshot is the wide CSV published by a source: identifier and metadata
//! columns followed by one column per period. Nothing here interprets the
//! columns beyond recognizing period headers; schema checks and cleaning
//! live in `ingest`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::error::FetchError;

/// Headers and unparsed records of one fetched table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl RawSnapshot {
    pub fn new(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Self { headers, records }
    }

    /// Parse CSV text. Short rows are allowed; missing trailing cells read as empty.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr
            .headers()?
            .iter()
            .map(normalize_header_name)
            .collect::<Vec<_>>();

        let mut records = Vec::new();
        for record in rdr.records() {
            let record = record?;
            records.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, records })
    }

    pub fn from_csv_str(text: &str) -> Result<Self, csv::Error> {
        Self::from_csv_reader(text.as_bytes())
    }

    /// Read a snapshot from a local CSV file.
    pub fn from_csv_path(path: &Path) -> Result<Self, FetchError> {
        let origin = path.display().to_string();
        let file = File::open(path).map_err(|e| FetchError::Http {
            url: origin.clone(),
            message: e.to_string(),
        })?;
        Self::from_csv_reader(file).map_err(|e| FetchError::Parse {
            origin,
            message: e.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Case-insensitive header lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Trimmed, non-empty cell of `record` under header `name`.
    pub fn cell<'a>(&self, record: &'a [String], name: &str) -> Option<&'a str> {
        let idx = self.column_index(name)?;
        record.get(idx).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    /// Headers that parse as periods, with their column index, in header order.
    pub fn period_columns(&self) -> Vec<(usize, NaiveDate)> {
        self.headers
            .iter()
            .enumerate()
            .filter_map(|(idx, h)| parse_period(h).map(|d| (idx, d)))
            .collect()
    }

    /// Headers that are not periods.
    pub fn non_period_columns(&self) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| parse_period(h).is_none())
            .map(String::as_str)
            .collect()
    }
}

pub(crate) fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}

/// Parse a period header.
///
/// Accepted: `YYYY-MM-DD`, `YYYY-MM` (first of month), `YYYY/MM/DD`, `MM/DD/YYYY`.
pub fn parse_period(header: &str) -> Option<NaiveDate> {
    let s = header.trim();
    if !s.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    const FMTS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    let bytes = s.as_bytes();
    if bytes.len() == 7 && bytes[4] == b'-' {
        return NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d").ok();
    }
    None
}

/// Parse a numeric cell; blanks and common missing markers read as `None`.
pub fn parse_value(s: &str) -> Option<f64> {
    let s = s.trim();
    if is_missing_marker(s) {
        return None;
    }
    let v = s.replace(',', "").parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

/// Blank cells and the usual "no data" markers.
pub fn is_missing_marker(s: &str) -> bool {
    let s = s.trim();
    s.is_empty() || s == "." || s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("nan")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_period_header_formats() {
        assert_eq!(parse_period("2024-01-31"), Some(ymd(2024, 1, 31)));
        assert_eq!(parse_period("2024-02"), Some(ymd(2024, 2, 1)));
        assert_eq!(parse_period("2024/03/31"), Some(ymd(2024, 3, 31)));
        assert_eq!(parse_period("04/30/2024"), Some(ymd(2024, 4, 30)));
        assert_eq!(parse_period("RegionID"), None);
        assert_eq!(parse_period("61639"), None);
        assert_eq!(parse_period("2024-13"), None);
    }

    #[test]
    fn reads_csv_with_bom_and_short_rows() {
        let text = "\u{feff}RegionID,RegionName,2024-01-31,2024-02-29\n1, 90001 ,500000,\n2,90002\n";
        let snap = RawSnapshot::from_csv_str(text).unwrap();
        assert_eq!(snap.headers[0], "RegionID");
        assert_eq!(snap.records.len(), 2);
        assert_eq!(snap.cell(&snap.records[0], "regionname"), Some("90001"));
        assert_eq!(snap.cell(&snap.records[0], "2024-02-29"), None);
        assert_eq!(snap.cell(&snap.records[1], "2024-01-31"), None);
        assert_eq!(snap.period_columns().len(), 2);
        assert_eq!(snap.non_period_columns(), vec!["RegionID", "RegionName"]);
    }

    #[test]
    fn value_parsing_treats_markers_as_missing() {
        assert_eq!(parse_value("512,345.5"), Some(512345.5));
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("n/a"), None);
        assert_eq!(parse_value("inf"), None);
    }
}
