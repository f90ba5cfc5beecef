use std::sync::Arc;

use bloom::{BloomFilterPolicy, FilterPolicy};
use config::TableConfig;

/// Per-read settings handed down to every block materialized by a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Verify the CRC of every block read from disk.
    pub verify_checksums: bool,
}

impl From<&TableConfig> for ReadOptions {
    fn from(config: &TableConfig) -> Self {
        Self {
            verify_checksums: config.verify_checksums,
        }
    }
}

/// The bloom policy `config` asks for, or `None` when filters are disabled
/// (`bloom_bits_per_key == 0`).
pub fn filter_policy(config: &TableConfig) -> Option<Arc<dyn FilterPolicy>> {
    if !config.has_filter() {
        return None;
    }
    Some(Arc::new(BloomFilterPolicy::new(config.bloom_bits_per_key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_options_follow_config() {
        let config = TableConfig {
            verify_checksums: true,
            ..TableConfig::default()
        };
        assert!(ReadOptions::from(&config).verify_checksums);
        assert!(!ReadOptions::from(&TableConfig::default()).verify_checksums);
    }

    #[test]
    fn zero_bloom_bits_disables_filter() {
        let config = TableConfig {
            bloom_bits_per_key: 0,
            ..TableConfig::default()
        };
        assert!(filter_policy(&config).is_none());

        let policy = filter_policy(&TableConfig::default()).unwrap();
        assert_eq!(policy.name(), "riptide.BuiltinBloomFilter");
    }
}
