//! Streaming scan of compressed access logs.
//!
//! This module drives decompressed lines through extraction and
//! aggregation, keeping line statistics along the way.

use std::io::{self, BufRead, BufReader, Read};

use flate2::read::MultiGzDecoder;
use log::trace;
use serde::Serialize;

use crate::core::aggregator::{FrequencyTable, RateAggregator};
use crate::core::extractor::{extract_record, Extracted, LogColumns};
use crate::core::DetectionConfig;

/// Longest line kept for extraction; longer lines are skipped as malformed
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Line statistics for one scanned artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineStats {
    pub total: u64,
    pub comments: u64,
    pub malformed: u64,
    pub records: u64,
    pub bad_status: u64,
}

/// Result of scanning one artifact
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub stats: LineStats,
    pub table: FrequencyTable,
}

/// Incremental scanner over decompressed lines
pub struct LogScanner {
    columns: LogColumns,
    aggregator: RateAggregator,
    stats: LineStats,
}

impl LogScanner {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            columns: config.columns,
            aggregator: RateAggregator::new(config),
            stats: LineStats::default(),
        }
    }

    /// Feed one line
    pub fn push_line(&mut self, line: &str) {
        self.stats.total += 1;

        match extract_record(line, &self.columns) {
            Extracted::Comment => self.stats.comments += 1,
            Extracted::Malformed { fields } => {
                trace!("Skipping line {} with {} field(s)", self.stats.total, fields);
                self.stats.malformed += 1;
            }
            Extracted::Record(record) => {
                trace!(
                    "date: {}, time: {}, ip: {}, status: {}",
                    record.date,
                    record.time,
                    record.source_ip,
                    record.http_status
                );
                self.stats.records += 1;
                if self.aggregator.record(&record) {
                    self.stats.bad_status += 1;
                }
            }
        }
    }

    /// Count a line that was dropped for exceeding `MAX_LINE_BYTES`
    pub fn push_oversized(&mut self, bytes: u64) {
        self.stats.total += 1;
        self.stats.malformed += 1;
        trace!("Skipping line {} of {} byte(s)", self.stats.total, bytes);
    }

    pub fn finish(self) -> ScanSummary {
        ScanSummary {
            stats: self.stats,
            table: self.aggregator.into_table(),
        }
    }
}

/// Decompress a gzip stream and scan it line by line
///
/// Lines that are not valid UTF-8 are decoded lossily rather than
/// aborting the scan, and lines longer than `MAX_LINE_BYTES` are skipped
/// without being buffered. Decompression and read failures are returned.
pub fn scan_gzip<R: Read>(reader: R, config: &DetectionConfig) -> io::Result<ScanSummary> {
    let mut reader = BufReader::new(MultiGzDecoder::new(reader));
    let mut scanner = LogScanner::new(config);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64 + 1)
            .read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        if buf.len() > MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
            let rest = discard_line(&mut reader)?;
            scanner.push_oversized(buf.len() as u64 + rest);
            continue;
        }
        scanner.push_line(&String::from_utf8_lossy(&buf));
    }

    Ok(scanner.finish())
}

/// Consume the remainder of the current line, returning the bytes skipped
fn discard_line<R: BufRead>(reader: &mut R) -> io::Result<u64> {
    let mut skipped = 0;
    loop {
        let (used, done) = {
            let available = reader.fill_buf()?;
            match available.iter().position(|b| *b == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), available.is_empty()),
            }
        };
        reader.consume(used);
        skipped += used as u64;
        if done {
            return Ok(skipped);
        }
    }
}

/// Scan lines that are already decompressed
pub fn scan_lines<I, S>(lines: I, config: &DetectionConfig) -> ScanSummary
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut scanner = LogScanner::new(config);
    for line in lines {
        scanner.push_line(line.as_ref());
    }
    scanner.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::{AggregationKey, MinuteBucket};
    use crate::core::fixtures::{cloudfront_line, gzip_lines};

    fn key(ip: &str) -> AggregationKey {
        AggregationKey {
            ip: ip.to_string(),
            bucket: MinuteBucket::new("2024-01-01", "10:15:00"),
        }
    }

    #[test]
    fn test_comment_lines_never_counted() {
        let config = DetectionConfig::new(["503"], 1);
        let lines = vec![
            "#Version: 1.0".to_string(),
            format!("#{}", cloudfront_line("2024-01-01", "10:15:00", "10.0.0.1", "503")),
            cloudfront_line("2024-01-01", "10:15:01", "10.0.0.2", "503"),
        ];

        let summary = scan_lines(&lines, &config);

        assert_eq!(summary.stats.comments, 2);
        assert_eq!(summary.table.len(), 1);
        assert!(!summary.table.contains_key(&key("10.0.0.1")));
        assert_eq!(summary.table[&key("10.0.0.2")], 1);
    }

    #[test]
    fn test_malformed_line_is_skipped_and_scan_continues() {
        let config = DetectionConfig::new(["503"], 1);
        let lines = vec![
            cloudfront_line("2024-01-01", "10:15:00", "10.0.0.1", "503"),
            "2024-01-01\t10:15:01\tIAD89-C1".to_string(),
            cloudfront_line("2024-01-01", "10:15:02", "10.0.0.1", "503"),
        ];

        let summary = scan_lines(&lines, &config);

        assert_eq!(
            summary.stats,
            LineStats {
                total: 3,
                comments: 0,
                malformed: 1,
                records: 2,
                bad_status: 2,
            }
        );
        assert_eq!(summary.table[&key("10.0.0.1")], 2);
    }

    #[test]
    fn test_scan_gzip_matches_plain_scan() {
        let config = DetectionConfig::new(["500", "503"], 1);
        let lines = vec![
            "#Version: 1.0".to_string(),
            cloudfront_line("2024-01-01", "10:15:00", "10.0.0.1", "503"),
            cloudfront_line("2024-01-01", "10:15:10", "10.0.0.1", "200"),
            cloudfront_line("2024-01-01", "10:15:20", "10.0.0.2", "500"),
        ];

        let from_gzip = scan_gzip(gzip_lines(&lines).as_slice(), &config).unwrap();
        let from_text = scan_lines(&lines, &config);

        assert_eq!(from_gzip.stats, from_text.stats);
        assert_eq!(from_gzip.table, from_text.table);
        assert_eq!(from_gzip.stats.bad_status, 2);
    }

    #[test]
    fn test_same_lines_build_identical_tables() {
        let config = DetectionConfig::new(["503"], 1);
        let lines: Vec<String> = (0..20)
            .map(|i| {
                let status = if i % 3 == 0 { "200" } else { "503" };
                cloudfront_line("2024-01-01", "10:15:00", &format!("10.0.0.{}", i % 4), status)
            })
            .collect();

        let first = scan_lines(&lines, &config);
        let second = scan_lines(lines.iter().rev(), &config);

        assert_eq!(first.table, second.table);
    }

    #[test]
    fn test_checksum_mismatch_is_an_error() {
        let config = DetectionConfig::new(["503"], 1);
        let mut bytes = gzip_lines(&[cloudfront_line("2024-01-01", "10:15:00", "10.0.0.1", "503")]);
        let crc_offset = bytes.len() - 8;
        bytes[crc_offset] ^= 0xff;

        assert!(scan_gzip(bytes.as_slice(), &config).is_err());
    }

    #[test]
    fn test_not_gzip_is_an_error() {
        let config = DetectionConfig::new(["503"], 1);

        assert!(scan_gzip(&b"plain text, not compressed\n"[..], &config).is_err());
    }

    #[test]
    fn test_overlong_line_is_skipped_and_scan_continues() {
        let config = DetectionConfig::new(["503"], 1);
        let overlong = format!(
            "{}\t{}",
            cloudfront_line("2024-01-01", "10:15:00", "10.0.0.9", "503"),
            "x".repeat(MAX_LINE_BYTES * 3)
        );
        let lines = vec![
            overlong,
            cloudfront_line("2024-01-01", "10:15:01", "10.0.0.1", "503"),
        ];

        let summary = scan_gzip(gzip_lines(&lines).as_slice(), &config).unwrap();

        assert_eq!(summary.stats.total, 2);
        assert_eq!(summary.stats.malformed, 1);
        assert_eq!(summary.stats.records, 1);
        assert_eq!(summary.table.len(), 1);
        assert_eq!(summary.table[&key("10.0.0.1")], 1);
    }

    #[test]
    fn test_line_at_limit_is_kept() {
        let config = DetectionConfig::new(["503"], 1);
        let line = cloudfront_line("2024-01-01", "10:15:00", "10.0.0.1", "503");
        let padded = format!("{}{}", line, "x".repeat(MAX_LINE_BYTES - line.len() - 1));

        let summary = scan_gzip(gzip_lines(&[padded]).as_slice(), &config).unwrap();

        assert_eq!(summary.stats.malformed, 0);
        assert_eq!(summary.table[&key("10.0.0.1")], 1);
    }
}
