//! # Error Handling Module
//!
//! Error types for the search cache. The cache never interrupts the caller's
//! primary compute path, so most of these errors are logged and folded into a
//! degraded outcome (a miss, a rejected admission) by the service layer rather
//! than returned to callers.
//!
//! ## Taxonomy
//! - Transport and payload errors (`Redis`, `Timeout`, `Serialization`, `Compression`)
//!   are non-fatal and degrade the remote tier to best-effort.
//! - `Strategy` errors turn a strategy's vote into an abstention.
//! - `Store` errors reject a single local write (an entry larger than the byte budget).
//! - `Configuration` errors are only raised while loading or validating config.

use thiserror::Error;

/// Result type used throughout the cache
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, Error)]
pub enum CacheError {
    /// Local store rejected an operation
    #[error("Cache store error: {message}")]
    Store { message: String },

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compressed payload could not be produced or inflated
    #[error("Compression error: {message}")]
    Compression { message: String },

    /// Remote store transport error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Invalid or inconsistent configuration
    #[error("Cache configuration error: {message}")]
    Configuration { message: String },

    /// Remote operation exceeded its deadline
    #[error("Cache operation timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A strategy failed to produce a decision
    #[error("Strategy '{strategy}' failed: {message}")]
    Strategy { strategy: String, message: String },
}

impl CacheError {
    /// Create a store error with a custom message
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a compression error with a custom message
    pub fn compression<S: Into<String>>(message: S) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    /// Create a strategy error for the named strategy
    pub fn strategy<S: Into<String>, M: Into<String>>(strategy: S, message: M) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    /// Whether the error came from the remote transport and should only degrade the tier
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Redis(_) | Self::Timeout { .. } | Self::Compression { .. }
        )
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store { .. } => "store",
            Self::Serialization(_) => "serialization",
            Self::Compression { .. } => "compression",
            Self::Redis(_) => "redis",
            Self::Configuration { .. } => "configuration",
            Self::Timeout { .. } => "timeout",
            Self::Strategy { .. } => "strategy",
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::store(format!("I/O error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CacheError::config("capacity must be positive");
        assert_eq!(err.to_string(), "Cache configuration error: capacity must be positive");

        let err = CacheError::Timeout { timeout_ms: 500 };
        assert_eq!(err.to_string(), "Cache operation timeout after 500ms");

        let err = CacheError::strategy("adaptive", "boom");
        assert_eq!(err.to_string(), "Strategy 'adaptive' failed: boom");
    }

    #[test]
    fn test_transport_classification() {
        assert!(CacheError::Timeout { timeout_ms: 1 }.is_transport());
        assert!(CacheError::compression("bad gzip header").is_transport());
        assert!(!CacheError::config("x").is_transport());
        assert!(!CacheError::strategy("s", "m").is_transport());
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CacheError = parse_err.into();
        assert_eq!(err.kind(), "serialization");
    }
}
