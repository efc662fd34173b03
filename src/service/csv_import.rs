use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

/// Tried in order; the first pattern that parses wins, so `03/04/2026` is read as March 4th.
pub const TIMESTAMP_PATTERNS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    TIMESTAMP_PATTERNS
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(text, pattern).ok())
}

/// One data row of a device export: badge, name, timestamp, status, verify type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvPunchRow {
    pub line: u64,
    pub badge_id: String,
    pub display_name: String,
    pub timestamp_text: String,
    pub status_code: Option<i32>,
    pub type_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ImportError {
    /// Line in the uploaded file, absent for errors raised after parsing.
    pub line: Option<u64>,
    pub message: String,
}

impl ImportError {
    pub fn at_line(line: u64, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: format!("Line {}: {}", line, message.into()),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            line: None,
            message: message.into(),
        }
    }
}

/// Splits an uploaded export into rows. The first line is a header.
/// Rows the csv reader cannot make sense of come back as line-numbered errors.
pub fn read_rows(data: &[u8]) -> (Vec<CsvPunchRow>, Vec<ImportError>) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for (index, record) in reader.records().enumerate() {
        // header is line 1
        let fallback_line = index as u64 + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(fallback_line);
                errors.push(ImportError::at_line(line, format!("unreadable row ({})", e)));
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);

        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() < 3 {
            errors.push(ImportError::at_line(
                line,
                "expected at least badge id, name and timestamp columns",
            ));
            continue;
        }

        rows.push(CsvPunchRow {
            line,
            badge_id: record[0].to_string(),
            display_name: record[1].to_string(),
            timestamp_text: record[2].to_string(),
            status_code: record.get(3).and_then(|v| v.parse().ok()),
            type_code: record.get(4).and_then(|v| v.parse().ok()),
        });
    }

    (rows, errors)
}
