//! # Config - table construction settings
//!
//! Knobs shared by the table writer and reader. Every setting has a default
//! and can be overridden through environment variables:
//!
//! ```text
//! RIPTIDE_BLOCK_SIZE        Target data block size in bytes   (default: 4096)
//! RIPTIDE_RESTART_INTERVAL  Keys between restart points        (default: 16)
//! RIPTIDE_FILTER_BASE_LG    log2 of the filter bucket size     (default: 11 = 2 KiB)
//! RIPTIDE_BLOOM_BITS        Bloom bits per key, 0 = no filter  (default: 10)
//! RIPTIDE_VERIFY_CHECKSUMS  Verify block CRCs on every read    (default: "false")
//! ```

use thiserror::Error;

/// Default target size of an uncompressed data block (4 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Default number of keys between restart points in a block.
pub const DEFAULT_RESTART_INTERVAL: usize = 16;

/// Default filter bucket exponent: one filter per 2 KiB of data-block offsets.
pub const DEFAULT_FILTER_BASE_LG: u8 = 11;

/// Default bloom filter bits per key (~1% false positive rate).
pub const DEFAULT_BLOOM_BITS_PER_KEY: usize = 10;

/// Bucket exponents at or above this are rejected; the filter block stores
/// 32-bit offsets.
pub const MAX_FILTER_BASE_LG: u8 = 32;

/// Errors produced while loading or validating a [`TableConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    Parse {
        /// The variable name.
        var: &'static str,
        /// The raw value found.
        value: String,
    },

    /// A setting parsed fine but is out of range.
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Settings used when building and reading tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Approximate uncompressed bytes per data block before it is cut.
    pub block_size: usize,
    /// Number of keys between restart points for delta encoding.
    pub block_restart_interval: usize,
    /// Filters are generated for every `1 << filter_base_lg` bytes of
    /// data-block offsets.
    pub filter_base_lg: u8,
    /// Bloom bits per key; `0` disables the filter block.
    pub bloom_bits_per_key: usize,
    /// Verify block checksums on every read.
    pub verify_checksums: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_restart_interval: DEFAULT_RESTART_INTERVAL,
            filter_base_lg: DEFAULT_FILTER_BASE_LG,
            bloom_bits_per_key: DEFAULT_BLOOM_BITS_PER_KEY,
            verify_checksums: false,
        }
    }
}

impl TableConfig {
    /// Loads settings from the process environment, falling back to the
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but unparsable, or if the
    /// resulting config fails [`validate`](TableConfig::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](TableConfig::from_env) but reads variables through
    /// `lookup`, which makes the loader testable without touching the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            block_size: parse_or(&lookup, "RIPTIDE_BLOCK_SIZE", defaults.block_size)?,
            block_restart_interval: parse_or(
                &lookup,
                "RIPTIDE_RESTART_INTERVAL",
                defaults.block_restart_interval,
            )?,
            filter_base_lg: parse_or(&lookup, "RIPTIDE_FILTER_BASE_LG", defaults.filter_base_lg)?,
            bloom_bits_per_key: parse_or(&lookup, "RIPTIDE_BLOOM_BITS", defaults.bloom_bits_per_key)?,
            verify_checksums: parse_or(
                &lookup,
                "RIPTIDE_VERIFY_CHECKSUMS",
                defaults.verify_checksums,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that every setting is usable by the table format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be > 0".into()));
        }
        if self.block_restart_interval == 0 {
            return Err(ConfigError::Invalid(
                "block_restart_interval must be >= 1".into(),
            ));
        }
        if self.filter_base_lg >= MAX_FILTER_BASE_LG {
            return Err(ConfigError::Invalid(format!(
                "filter_base_lg must be < {}, got {}",
                MAX_FILTER_BASE_LG, self.filter_base_lg
            )));
        }
        Ok(())
    }

    /// Size in bytes of one filter bucket.
    #[must_use]
    pub fn filter_base(&self) -> u64 {
        1u64 << self.filter_base_lg
    }

    /// Returns `true` if tables built with this config carry a filter block.
    #[must_use]
    pub fn has_filter(&self) -> bool {
        self.bloom_bits_per_key > 0
    }
}

/// Reads `var` through `lookup` and parses it, falling back to `default`.
fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Parse { var, value: raw }),
        None => Ok(default),
    }
}
