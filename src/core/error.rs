// Copyright 2025
// Licensed under the Elastic License v2.0

use std::fmt;

/// Error kinds surfaced by the ingest bridge.
///
/// Per-row delivery failures are normally reported as a non-success
/// [`ClientResponse`](crate::core::ClientResponse) rather than as an error;
/// `DeliveryError` is reserved for transport failures of a single call.
#[derive(Debug)]
pub enum CoreError {
    /// Bad, missing or too few setup parameters
    ConfigError {
        message: String,
    },

    /// A single connection attempt to an endpoint failed
    ConnectionError {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A remote call could not be delivered or was rejected in transport
    DeliveryError {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The row source failed to produce or advance a row
    SourceError {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A wait or submission was interrupted before it completed
    Interrupted {
        message: String,
    },

    /// Generic internal errors
    InternalError {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CoreError {
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_error_with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConnectionError {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn delivery_error(message: impl Into<String>) -> Self {
        Self::DeliveryError {
            message: message.into(),
            source: None,
        }
    }

    pub fn delivery_error_with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DeliveryError {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn source_error_with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SourceError {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::Interrupted {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, CoreError::Interrupted { .. })
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::ConfigError { message } => write!(f, "Configuration error: {}", message),
            CoreError::ConnectionError { message, source } => {
                write!(f, "Connection error: {}", message)?;
                if let Some(src) = source {
                    write!(f, " (caused by: {})", src)?;
                }
                Ok(())
            }
            CoreError::DeliveryError { message, source } => {
                write!(f, "Delivery error: {}", message)?;
                if let Some(src) = source {
                    write!(f, " (caused by: {})", src)?;
                }
                Ok(())
            }
            CoreError::SourceError { message, source } => {
                write!(f, "Source error: {}", message)?;
                if let Some(src) = source {
                    write!(f, " (caused by: {})", src)?;
                }
                Ok(())
            }
            CoreError::Interrupted { message } => write!(f, "Interrupted: {}", message),
            CoreError::InternalError { message, source } => {
                write!(f, "Internal error: {}", message)?;
                if let Some(src) = source {
                    write!(f, " (caused by: {})", src)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::ConnectionError { source, .. }
            | CoreError::DeliveryError { source, .. }
            | CoreError::SourceError { source, .. }
            | CoreError::InternalError { source, .. } => {
                source.as_ref().map(|e| e.as_ref() as &dyn std::error::Error)
            }
            _ => None,
        }
    }
}

/// Result type alias using CoreError
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_creation() {
        let err = CoreError::config_error("Must supply at least 2 arguments");
        assert!(err.to_string().contains("at least 2 arguments"));

        let err = CoreError::interrupted("waiting for connections");
        assert!(err.is_interrupted());
        assert!(err.to_string().starts_with("Interrupted"));

        let err = CoreError::delivery_error("procedure rejected");
        assert!(!err.is_interrupted());
    }

    #[test]
    fn test_error_with_cause() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = CoreError::connection_error_with_cause("voltdb1:21212", io_err);
        assert!(err.to_string().contains("caused by: refused"));
        assert!(err.source().is_some());
    }
}
