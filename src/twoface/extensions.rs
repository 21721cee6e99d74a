//! Ways to attach a user-facing description to errors from libraries, and to missing rows.
use crate::twoface::{Cause, ExternalError, TfError};

pub trait Describe {
    /// Keep `self` as the internal error and show `external` to the user.
    fn describe(self, external: ExternalError) -> TfError;
}

impl<Internal: Into<anyhow::Error>> Describe for Internal {
    fn describe(self, external: ExternalError) -> TfError {
        TfError {
            internal: self.into(),
            external,
        }
    }
}

/// Library errors that nobody described become a 500 with a generic text, so `?` works on
/// diesel, r2d2, serde_json and io errors alike.
impl<Internal: Into<anyhow::Error>> From<Internal> for TfError {
    fn from(internal: Internal) -> TfError {
        internal.describe(ExternalError::default())
    }
}

pub trait DescribeErr<T> {
    /// `result.describe_err(external)` is `result.map_err(|e| e.describe(external))`.
    fn describe_err(self, external: ExternalError) -> Result<T, TfError>;
}

impl<T, E> DescribeErr<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn describe_err(self, external: ExternalError) -> Result<T, TfError> {
        self.map_err(|e| e.describe(external))
    }
}

pub trait OrNotFound<T> {
    /// A lookup that found nothing answers 404 with `text`.
    fn or_not_found(self, text: &'static str) -> Result<T, TfError>;
}

impl<T> OrNotFound<T> for Option<T> {
    fn or_not_found(self, text: &'static str) -> Result<T, TfError> {
        self.ok_or_else(|| TfError::reject(Cause::NotFound, text))
    }
}
