//! Threshold classification of aggregated counts.

use std::collections::BTreeSet;

use crate::core::aggregator::FrequencyTable;
use crate::core::DetectionConfig;

/// Distinct IPs selected for blocklisting
pub type BlocklistCandidateSet = BTreeSet<String>;

/// Selects IPs whose bad-request count in any single minute reaches the threshold
#[derive(Debug, Clone, Copy)]
pub struct ThresholdClassifier {
    threshold: u32,
}

impl ThresholdClassifier {
    pub fn new(config: &DetectionConfig) -> Self {
        Self::with_threshold(config.bad_requests_per_min)
    }

    pub fn with_threshold(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Scan the table and collect every IP with at least one minute at or above the threshold
    pub fn classify(&self, table: &FrequencyTable) -> BlocklistCandidateSet {
        table
            .iter()
            .filter(|(_, count)| **count >= self.threshold)
            .map(|(key, _)| key.ip.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::{AggregationKey, MinuteBucket};

    fn table(entries: &[(&str, &str, u32)]) -> FrequencyTable {
        entries
            .iter()
            .map(|(ip, minute, count)| {
                (
                    AggregationKey {
                        ip: ip.to_string(),
                        bucket: MinuteBucket::new("2024-01-01", minute),
                    },
                    *count,
                )
            })
            .collect()
    }

    #[test]
    fn test_threshold_boundary() {
        let classifier = ThresholdClassifier::with_threshold(5);

        let below = classifier.classify(&table(&[("10.0.0.1", "10:15:00", 4)]));
        assert!(below.is_empty());

        let at = classifier.classify(&table(&[("10.0.0.1", "10:15:00", 5)]));
        assert_eq!(at, BlocklistCandidateSet::from(["10.0.0.1".to_string()]));
    }

    #[test]
    fn test_ip_listed_once_across_minutes() {
        let classifier = ThresholdClassifier::with_threshold(3);

        let candidates = classifier.classify(&table(&[
            ("10.0.0.1", "10:15:00", 3),
            ("10.0.0.1", "10:16:00", 7),
            ("10.0.0.1", "10:17:00", 1),
        ]));

        assert_eq!(candidates.len(), 1);
        assert!(candidates.contains("10.0.0.1"));
    }

    #[test]
    fn test_one_minute_is_enough() {
        let classifier = ThresholdClassifier::with_threshold(3);

        let candidates = classifier.classify(&table(&[
            ("10.0.0.1", "10:15:00", 2),
            ("10.0.0.1", "10:16:00", 2),
            ("10.0.0.2", "10:15:00", 2),
            ("10.0.0.2", "10:18:00", 3),
        ]));

        assert_eq!(candidates, BlocklistCandidateSet::from(["10.0.0.2".to_string()]));
    }

    #[test]
    fn test_empty_table_yields_empty_set() {
        let classifier = ThresholdClassifier::new(&DetectionConfig::new(["503"], 1));

        assert_eq!(classifier.threshold(), 1);
        assert!(classifier.classify(&FrequencyTable::new()).is_empty());
    }
}
