//! Access log line extraction.
//!
//! This module splits one decompressed, tab-delimited access log line
//! and picks out the columns used for detection.

use serde::{Deserialize, Serialize};

/// Column offsets of the fields used for detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogColumns {
    /// Request date (YYYY-MM-DD)
    pub date: usize,
    /// Request time (HH:MM:SS)
    pub time: usize,
    /// Client IP address
    pub ip: usize,
    /// HTTP status code
    pub status: usize,
}

impl Default for LogColumns {
    fn default() -> Self {
        Self {
            date: 0,
            time: 1,
            ip: 4,
            status: 8,
        }
    }
}

impl LogColumns {
    /// Number of fields a line needs for every configured column to exist
    pub fn required_fields(&self) -> usize {
        self.date.max(self.time).max(self.ip).max(self.status) + 1
    }
}

/// Fields extracted from one log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub date: String,
    pub time: String,
    pub source_ip: String,
    pub http_status: String,
}

/// Result of extracting a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// A usable record
    Record(LogRecord),
    /// A `#` header or metadata line
    Comment,
    /// Too few fields for the configured columns
    Malformed { fields: usize },
}

/// Extract a record from one log line
///
/// Comment lines and lines that are too short are reported as such
/// rather than treated as errors, so callers can skip them and continue.
pub fn extract_record(line: &str, columns: &LogColumns) -> Extracted {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');

    if line.starts_with('#') {
        return Extracted::Comment;
    }
    if line.is_empty() {
        return Extracted::Malformed { fields: 0 };
    }

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < columns.required_fields() {
        return Extracted::Malformed { fields: fields.len() };
    }

    Extracted::Record(LogRecord {
        date: fields[columns.date].to_string(),
        time: fields[columns.time].to_string(),
        source_ip: fields[columns.ip].to_string(),
        http_status: fields[columns.status].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::cloudfront_line;

    #[test]
    fn test_extracts_default_columns() {
        let line = cloudfront_line("2024-01-01", "10:15:42", "10.0.0.1", "503");

        let extracted = extract_record(&line, &LogColumns::default());

        assert_eq!(
            extracted,
            Extracted::Record(LogRecord {
                date: "2024-01-01".to_string(),
                time: "10:15:42".to_string(),
                source_ip: "10.0.0.1".to_string(),
                http_status: "503".to_string(),
            })
        );
    }

    #[test]
    fn test_skips_comment_lines() {
        let columns = LogColumns::default();

        assert_eq!(extract_record("#Version: 1.0", &columns), Extracted::Comment);
        assert_eq!(
            extract_record("#Fields: date time x-edge-location sc-bytes c-ip", &columns),
            Extracted::Comment
        );
    }

    #[test]
    fn test_short_line_is_malformed() {
        let extracted = extract_record("2024-01-01\t10:15:42\tIAD89-C1", &LogColumns::default());

        assert_eq!(extracted, Extracted::Malformed { fields: 3 });
    }

    #[test]
    fn test_empty_line_is_malformed() {
        assert_eq!(
            extract_record("\n", &LogColumns::default()),
            Extracted::Malformed { fields: 0 }
        );
    }

    #[test]
    fn test_trailing_newline_is_stripped() {
        let columns = LogColumns {
            date: 0,
            time: 1,
            ip: 2,
            status: 3,
        };

        match extract_record("2024-01-01\t10:15:42\t10.0.0.9\t502\r\n", &columns) {
            Extracted::Record(record) => {
                assert_eq!(record.source_ip, "10.0.0.9");
                assert_eq!(record.http_status, "502");
            }
            other => panic!("unexpected extraction: {:?}", other),
        }
    }

    #[test]
    fn test_required_fields_follows_largest_offset() {
        assert_eq!(LogColumns::default().required_fields(), 9);

        let columns = LogColumns {
            date: 11,
            time: 1,
            ip: 2,
            status: 3,
        };
        assert_eq!(columns.required_fields(), 12);
    }
}
