use std::{fmt, io::Cursor, str::FromStr};

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx, XlsxError};
use model::raw::RawRecord;
use serde_json::Value;

use crate::normalize::{NormalizationError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// The supported bulk source layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Delimited text with a header row.
    Table,
    /// First worksheet of an xlsx workbook with a header row.
    Spreadsheet,
    /// An array of objects.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported source format `{hint}`")]
pub struct UnsupportedFormatError {
    pub hint: String,
}

impl SourceFormat {
    /// Resolves a format name, an extension or a file name.
    pub fn from_hint(hint: &str) -> std::result::Result<Self, UnsupportedFormatError> {
        let lowered = hint.trim().to_ascii_lowercase();
        let name = lowered
            .rsplit_once('.')
            .map_or(lowered.as_str(), |(_, extension)| extension);
        match name {
            "table" | "csv" => Ok(Self::Table),
            "spreadsheet" | "xlsx" => Ok(Self::Spreadsheet),
            "json" => Ok(Self::Json),
            _ => Err(UnsupportedFormatError {
                hint: hint.to_owned(),
            }),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = UnsupportedFormatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_hint(s)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceFormat::Table => "table",
            SourceFormat::Spreadsheet => "spreadsheet",
            SourceFormat::Json => "json",
        })
    }
}

/// Parses a whole payload into records in source order. Any structural
/// problem fails the payload as a whole.
pub fn parse(format: SourceFormat, data: &[u8]) -> Result<Vec<RawRecord>> {
    let records = match format {
        SourceFormat::Table => parse_table(data)?,
        SourceFormat::Spreadsheet => parse_spreadsheet(data)?,
        SourceFormat::Json => parse_json(data)?,
    };
    log::debug!("parsed {} {} records", records.len(), format);
    Ok(records)
}

fn parse_table(data: &[u8]) -> Result<Vec<RawRecord>> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    if headers.iter().all(str::is_empty) {
        return Err(NormalizationError::MissingHeader);
    }

    reader
        .records()
        .map(|row| -> Result<RawRecord> {
            let row = row?;
            Ok(headers
                .iter()
                .zip(row.iter())
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, cell)| (header.to_owned(), Value::String(cell.to_owned())))
                .collect())
        })
        .collect()
}

fn parse_spreadsheet(data: &[u8]) -> Result<Vec<RawRecord>> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(data))
        .map_err(|why: XlsxError| NormalizationError::Spreadsheet(why.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(NormalizationError::EmptySheet)?
        .map_err(|why| NormalizationError::Spreadsheet(why.to_string()))?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or(NormalizationError::MissingHeader)?
        .iter()
        .map(|cell| match cell {
            Data::String(text) => text.trim().to_owned(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>();
    if headers.iter().all(String::is_empty) {
        return Err(NormalizationError::MissingHeader);
    }

    Ok(rows
        .map(|row| {
            headers
                .iter()
                .zip(row)
                .filter(|(header, _)| !header.is_empty())
                .filter_map(|(header, cell)| cell_value(cell).map(|value| (header.clone(), value)))
                .collect()
        })
        .filter(|record: &RawRecord| !record.is_empty())
        .collect())
}

fn cell_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty => None,
        Data::Int(value) => Some(Value::from(*value)),
        Data::Float(value) => Some(Value::from(*value)),
        Data::String(text) => Some(Value::String(text.trim().to_owned())),
        Data::Bool(value) => Some(Value::Bool(*value)),
        other => Some(Value::String(other.to_string())),
    }
}

fn parse_json(data: &[u8]) -> Result<Vec<RawRecord>> {
    let Value::Array(elements) = serde_json::from_slice::<Value>(data)? else {
        return Err(NormalizationError::NotAnArray);
    };
    Ok(elements
        .into_iter()
        .enumerate()
        .filter_map(|(index, element)| match element {
            Value::Object(object) => Some(object.into_iter().collect()),
            other => {
                log::warn!("skipping json element {}: not an object but {}", index, other);
                None
            }
        })
        .collect())
}
