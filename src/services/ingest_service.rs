use csv::ReaderBuilder;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::AppError;

/// One input row before normalization, keyed by its original column names
pub type RawRecord = Map<String, Value>;

/// Keys under which a JSON object may wrap the article array
const WRAPPER_KEYS: [&str; 4] = ["articles", "data", "records", "items"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    /// Uploads are CSV unless the file name says JSON
    pub fn from_file_name(name: Option<&str>) -> Self {
        match name {
            Some(name) if name.to_lowercase().ends_with(".json") => InputFormat::Json,
            _ => InputFormat::Csv,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::Csv => "csv",
            InputFormat::Json => "json",
        }
    }
}

/// A raw batch as received over HTTP
#[derive(Debug, Clone)]
pub struct Submission {
    pub format: InputFormat,
    pub payload: Vec<u8>,
    pub granularity: Option<String>,
}

/// Decode a submission into raw records.
///
/// For JSON, a `granularity` field on the wrapping object is returned so the
/// caller can use it when the request carried none.
pub fn decode(format: InputFormat, payload: &[u8]) -> Result<(Vec<RawRecord>, Option<String>), AppError> {
    match format {
        InputFormat::Csv => Ok((parse_csv(payload)?, None)),
        InputFormat::Json => parse_json_payload(payload),
    }
}

/// Parse a CSV export with a header row. Empty cells become `null`.
pub fn parse_csv(payload: &[u8]) -> Result<Vec<RawRecord>, AppError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(payload);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| {
            String::from_utf8_lossy(h)
                .trim_start_matches('\u{feff}')
                .trim()
                .to_string()
        })
        .collect();

    let mut records = Vec::new();
    for row in reader.byte_records() {
        let row = row?;
        let mut record = RawRecord::new();
        for (header, field) in headers.iter().zip(row.iter()) {
            if header.is_empty() {
                continue;
            }
            let value = if field.is_empty() {
                Value::Null
            } else {
                Value::String(String::from_utf8_lossy(field).into_owned())
            };
            record.insert(header.clone(), value);
        }
        records.push(record);
    }

    debug!("Parsed {} CSV rows with {} columns", records.len(), headers.len());
    Ok(records)
}

/// Parse a JSON array of articles, or an object wrapping one.
pub fn parse_json_payload(payload: &[u8]) -> Result<(Vec<RawRecord>, Option<String>), AppError> {
    let value: Value = serde_json::from_slice(payload)?;

    let (items, granularity) = match value {
        Value::Array(items) => (items, None),
        Value::Object(mut object) => {
            let granularity = object
                .get("granularity")
                .and_then(Value::as_str)
                .map(str::to_string);
            let items = WRAPPER_KEYS
                .iter()
                .find_map(|key| match object.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .ok_or_else(|| {
                    AppError::Parse(format!(
                        "Expected an array of articles or an object with one of: {}",
                        WRAPPER_KEYS.join(", ")
                    ))
                })?;
            (items, granularity)
        }
        _ => {
            return Err(AppError::Parse(
                "Expected an array of articles".to_string(),
            ))
        }
    };

    let records = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            _ => Err(AppError::Parse(format!("Article at index {} is not an object", i))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((records, granularity))
}
