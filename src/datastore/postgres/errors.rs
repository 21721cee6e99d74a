use crate::twoface::{Describe, ExternalError, TfError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Unique violations are the user's fault (a taken username or slug). Anything else stays a
/// server error.
pub fn unique_violation_as(err: DieselError, external: ExternalError) -> TfError {
    if let DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) = &err {
        err.describe(external)
    } else {
        err.into()
    }
}

/// Escape LIKE wildcards so user search terms match literally.
pub fn like_pattern(substring: &str) -> String {
    let mut escaped = String::with_capacity(substring.len() + 2);
    escaped.push('%');
    for c in substring.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
