//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Error types for background removal operations
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec errors raised by the `image` crate
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The background removal service rejected or failed to process its input
    #[error("removal service error: {0}")]
    Service(String),

    /// Bytes that were expected to hold an image could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Encoding a bitmap or mask failed
    #[error("encode error: {0}")]
    Encode(String),

    /// Model resolution, loading or initialization errors
    #[error("model error: {0}")]
    Model(String),

    /// Backend inference errors
    #[error("inference error: {0}")]
    Inference(String),

    /// Model download errors
    #[error("network error: {0}")]
    Network(String),

    /// Invalid configuration or parameters
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Export requested before any image was processed successfully
    #[error("no processed image to export")]
    NothingToExport,

    /// Generic error for unexpected conditions
    #[error("internal error: {0}")]
    Internal(String),
}

impl CutoutError {
    pub fn service<S: Into<String>>(msg: S) -> Self {
        Self::Service(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create network error with the failing operation
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Create processing error with stage context
    ///
    /// Used for failures inside a removal service, where the stage name is
    /// the most useful thing to surface to the user.
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Service(format!(
            "processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        let err = CutoutError::invalid_config("timeout must be positive");
        assert_eq!(
            err.to_string(),
            "invalid configuration: timeout must be positive"
        );

        let err = CutoutError::decode("not a png");
        assert_eq!(err.to_string(), "decode error: not a png");
    }

    #[test]
    fn test_file_io_error_keeps_kind_and_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = CutoutError::file_io_error("read image file", Path::new("/tmp/in.jpg"), &io_error);

        match &err {
            CutoutError::Io(inner) => {
                assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);
            },
            other => panic!("expected Io variant, got {other:?}"),
        }
        let message = err.to_string();
        assert!(message.starts_with("io error: "));
        assert!(message.contains("read image file"));
        assert!(message.contains("/tmp/in.jpg"));
    }

    #[test]
    fn test_processing_stage_error() {
        let err = CutoutError::processing_stage_error(
            "preprocessing",
            "invalid tensor shape",
            Some("1920x1080"),
        );
        assert!(matches!(err, CutoutError::Service(_)));
        let message = err.to_string();
        assert!(message.contains("preprocessing"));
        assert!(message.contains("1920x1080"));
    }

    #[test]
    fn test_config_value_error() {
        let err = CutoutError::config_value_error("intra_threads", 4096, "0-256");
        let message = err.to_string();
        assert!(message.contains("intra_threads"));
        assert!(message.contains("4096"));
        assert!(message.contains("0-256"));
    }
}
