use std::time::Duration;

use thiserror::Error;

/// Failure of a single collaborator model call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Network-level failure (connection, timeout, DNS). Worth retrying.
    #[error("transient service failure: {0}")]
    Transient(String),

    /// Non-success HTTP status from the service.
    #[error("service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Missing or rejected credentials. Retrying will not help.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The service responded but the payload did not match its contract.
    #[error("malformed service response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Whether a retry with backoff is worthwhile.
    ///
    /// 429 and 5xx responses are treated as transient: rate limits clear and
    /// inference backends come back (HF returns 503 while a model loads).
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Transient(_) => true,
            ServiceError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            ServiceError::Auth(_) | ServiceError::Malformed(_) => false,
        }
    }
}

/// Top-level pipeline failure taxonomy.
///
/// Only `Parse` and `Timeout` abort a run. Collaborator failures degrade the
/// affected fields instead, and SOAP failures leave the structured outputs
/// intact.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The transcript contained no attributable utterances.
    #[error("unusable transcript: {0}")]
    Parse(String),

    /// A collaborator failed after bounded retries.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The generative output could not be split into the four SOAP sections.
    #[error("SOAP note format invalid: {0}")]
    SoapFormat(String),

    /// The caller-supplied deadline elapsed.
    #[error("pipeline timed out after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::Transient("reset".into()).is_transient());
        assert!(
            ServiceError::Http {
                status: 503,
                body: "loading".into()
            }
            .is_transient()
        );
        assert!(
            ServiceError::Http {
                status: 429,
                body: "rate limit".into()
            }
            .is_transient()
        );
        assert!(
            !ServiceError::Http {
                status: 404,
                body: "no such model".into()
            }
            .is_transient()
        );
        assert!(!ServiceError::Auth("bad key".into()).is_transient());
    }
}
