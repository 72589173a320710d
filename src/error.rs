//! Error types for plasma-rnn-rs.
//!
//! # Example
//!
//! ```rust
//! use plasma_rnn_rs::{PlasmaConfig, PlasmaError};
//!
//! # fn main() {
//! match PlasmaConfig::from_preset("no-such-preset") {
//!     Ok(_) => println!("Loaded config"),
//!     Err(PlasmaError::Config(msg)) => eprintln!("Configuration error: {msg}"),
//!     Err(e) => eprintln!("Other error: {e}"),
//! }
//! # }
//! ```

use thiserror::Error;

/// Result type alias for plasma-rnn-rs operations.
pub type Result<T> = std::result::Result<T, PlasmaError>;

/// Errors that can occur in plasma-rnn-rs.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PlasmaError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid configuration file.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Model construction or forward error.
    #[error("model error: {0}")]
    Model(String),

    /// Tensor shape did not match what the model expects.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape description
        expected: String,
        /// Actual shape description
        actual: String,
    },

    /// Dataset error.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Training error.
    #[error("training error: {0}")]
    Training(String),

    /// Checkpoint error.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Progress bar template error.
    #[error("template error: {0}")]
    Template(String),
}

impl From<indicatif::style::TemplateError> for PlasmaError {
    fn from(err: indicatif::style::TemplateError) -> Self {
        PlasmaError::Template(err.to_string())
    }
}

impl PlasmaError {
    /// Builds a [`PlasmaError::ShapeMismatch`] from anything printable.
    pub fn shape_mismatch(expected: impl std::fmt::Debug, actual: impl std::fmt::Debug) -> Self {
        PlasmaError::ShapeMismatch {
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_error_creation() {
        let error = PlasmaError::Config("bucket_size must be > 0".to_string());
        assert_eq!(
            error.to_string(),
            "configuration error: bucket_size must be > 0"
        );
    }

    #[test]
    fn test_dataset_error_creation() {
        let error = PlasmaError::Dataset("empty bucket".to_string());
        assert_eq!(error.to_string(), "dataset error: empty bucket");
    }

    #[test]
    fn test_training_error_creation() {
        let error = PlasmaError::Training("no training sequences".to_string());
        assert_eq!(error.to_string(), "training error: no training sequences");
    }

    #[test]
    fn test_checkpoint_error_creation() {
        let error = PlasmaError::Checkpoint("missing checkpoint.json".to_string());
        assert_eq!(
            error.to_string(),
            "checkpoint error: missing checkpoint.json"
        );
    }

    #[test]
    fn test_shape_mismatch_message() {
        let error = PlasmaError::shape_mismatch((2, 4, 7), (2, 4, 5));
        assert_eq!(
            error.to_string(),
            "shape mismatch: expected (2, 4, 7), got (2, 4, 5)"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: PlasmaError = io_error.into();
        assert!(error.to_string().contains("IO error"));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_config_parse_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: yaml: :::").unwrap_err();
        let error: PlasmaError = yaml_error.into();
        assert!(error.to_string().contains("invalid config file"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: PlasmaError = json_error.into();
        assert!(error.to_string().starts_with("JSON error"));
    }

    #[test]
    fn test_candle_error_conversion() {
        let candle_error = candle_core::Error::Msg("bad op".to_string());
        let error: PlasmaError = candle_error.into();
        assert!(error.to_string().contains("candle error"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PlasmaError>();
    }
}
