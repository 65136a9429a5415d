use thiserror::Error;

/// Typed failure modes for one supplier integration.
///
/// The variants carry the propagation policy: `Authentication` is fatal for
/// the whole sync run, `RequestFailed`/`Api` abort only the current VAS
/// type's fetch, and `Normalization`/`Persistence` are isolated to a single
/// record inside the reconciliation loop.
#[derive(Debug, Error)]
pub enum SupplierError {
    /// Token request failed or the token response was malformed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Non-2xx response after the single forced re-auth retry.
    #[error("request failed (status={status}): {body}")]
    RequestFailed { status: u16, body: String },

    /// HTTP 200 body carrying a supplier business error envelope.
    #[error("supplier api error (code={code}): {message}")]
    Api { code: i64, message: String },

    /// A single external record could not be mapped to the canonical shape.
    #[error("normalization failed: {0}")]
    Normalization(String),

    /// A single record's catalog write failed.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl SupplierError {
    /// True when the error should abort the entire sync run rather than a
    /// single VAS type or record.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, SupplierError::Authentication(_))
    }

    /// True when the error is isolated to one record (the reconcile loop
    /// catches these, counts them, and continues with the next record).
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self,
            SupplierError::Normalization(_) | SupplierError::Persistence(_)
        )
    }
}

impl From<reqwest::Error> for SupplierError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
        SupplierError::RequestFailed {
            status,
            body: err.to_string(),
        }
    }
}
