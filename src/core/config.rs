//! Encoder configuration
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```toml
//! flush_threshold = 8192
//! initial_capacity = 8192
//! surrogate_encoding = "split"
//! ```

use crate::core::error::{CodecError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of buffered bytes that triggers a transport write
pub const DEFAULT_FLUSH_THRESHOLD: usize = 8192;

/// Default initial arena capacity
pub const DEFAULT_INITIAL_CAPACITY: usize = 8192;

/// How characters outside the Basic Multilingual Plane are written
///
/// The renderer historically receives every UTF-16 code unit encoded on its
/// own, so a supplementary character becomes two 3-byte sequences (one per
/// surrogate half) instead of one 4-byte UTF-8 sequence. That output is not
/// conformant UTF-8, but changing it changes the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurrogateEncoding {
    /// Each surrogate half as its own 3-byte sequence (wire compatible)
    #[default]
    Split,
    /// Conformant 4-byte UTF-8
    Standard,
}

/// Tunables for [`BlockFramer`](crate::core::framer::BlockFramer) and the
/// string encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    /// Buffered bytes that trigger a transport write once a block ends
    pub flush_threshold: usize,

    /// Initial capacity of the stream arena
    pub initial_capacity: usize,

    /// Supplementary character handling in AMF strings
    pub surrogate_encoding: SurrogateEncoding,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            surrogate_encoding: SurrogateEncoding::default(),
        }
    }
}

impl EncoderConfig {
    /// Validate field ranges
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(CodecError::InvalidConfig(
                "flush_threshold must be greater than 0".to_string(),
            ));
        }

        if self.initial_capacity == 0 {
            return Err(CodecError::InvalidConfig(
                "initial_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: EncoderConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = EncoderConfig::default();
        assert_eq!(config.flush_threshold, 8192);
        assert_eq!(config.initial_capacity, 8192);
        assert_eq!(config.surrogate_encoding, SurrogateEncoding::Split);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = EncoderConfig::from_toml_str("").unwrap();
        assert_eq!(config, EncoderConfig::default());
    }

    #[test]
    fn test_parse_all_fields() {
        let config = EncoderConfig::from_toml_str(
            r#"
            flush_threshold = 1024
            initial_capacity = 256
            surrogate_encoding = "standard"
            "#,
        )
        .unwrap();

        assert_eq!(config.flush_threshold, 1024);
        assert_eq!(config.initial_capacity, 256);
        assert_eq!(config.surrogate_encoding, SurrogateEncoding::Standard);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = EncoderConfig::from_toml_str("flush_threshold = 0");
        assert!(matches!(result, Err(CodecError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = EncoderConfig::from_toml_str("flush_treshold = 10");
        assert!(matches!(result, Err(CodecError::ConfigParse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "initial_capacity = 32").unwrap();

        let config = EncoderConfig::load(file.path()).unwrap();
        assert_eq!(config.initial_capacity, 32);
        assert_eq!(config.flush_threshold, DEFAULT_FLUSH_THRESHOLD);
    }
}
