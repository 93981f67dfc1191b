use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {key}")]
    KeyNotFound { key: String },
    #[error("bucket not found: {bucket}")]
    BucketNotFound { bucket: String },
    #[error("object store credentials rejected: {message}")]
    Credentials { message: String },
    /// Explicit throttling signal from the store; the rate limiter halves
    /// its refill rate when it sees this.
    #[error("store signalled SlowDown")]
    SlowDown { retry_after: Option<Duration> },
    #[error("transient object store failure: {message}")]
    Transient { message: String },
    #[error("object store request failed: {message}")]
    Permanent { message: String },
    #[error("object store I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("object (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ObjectStoreError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ObjectStoreError::Transient { .. }
                | ObjectStoreError::SlowDown { .. }
                | ObjectStoreError::Io(_)
        )
    }

    /// Classifies an HTTP status the way the retry policy expects: 5xx is
    /// transient except 501; 408 and 429 are transient; every other 4xx is
    /// permanent. The 501 exclusion is part of the transient predicate
    /// itself, not an arm-ordering artifact.
    pub fn from_http_status(status: u16, message: String) -> Self {
        let transient =
            status == 408 || status == 429 || ((500..=599).contains(&status) && status != 501);
        if transient {
            ObjectStoreError::Transient { message }
        } else {
            ObjectStoreError::Permanent { message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(ObjectStoreError::from_http_status(500, String::new()).is_retriable());
        assert!(ObjectStoreError::from_http_status(503, String::new()).is_retriable());
        assert!(ObjectStoreError::from_http_status(429, String::new()).is_retriable());
        assert!(ObjectStoreError::from_http_status(408, String::new()).is_retriable());
        assert!(!ObjectStoreError::from_http_status(501, String::new()).is_retriable());
        assert!(!ObjectStoreError::from_http_status(404, String::new()).is_retriable());
        assert!(!ObjectStoreError::from_http_status(403, String::new()).is_retriable());
    }
}
