//! Errors with two faces: the internal error goes to the logs, and a short static description
//! goes to the client.

mod extensions;
pub mod externalerror;
mod integrations;

pub use extensions::*;
pub use externalerror::{Cause, ExternalError};
pub use integrations::BlockingResp;
use std::fmt;
use std::fmt::{Display, Formatter};

/// An error as the service sees it, plus what the client is told about it.
#[derive(Debug)]
pub struct TfError {
    /// Logged, never sent. May name files, queries or secrets.
    pub internal: anyhow::Error,
    /// Sent to the client as `{"error": ...}`.
    pub external: ExternalError,
}

impl TfError {
    /// A request broke one of our own rules. There's no library error underneath, so the external
    /// text is logged as the internal one too.
    pub fn reject(cause: Cause, text: &'static str) -> Self {
        Self {
            internal: anyhow::anyhow!(text),
            external: ExternalError { cause, text },
        }
    }

    pub fn cause(&self) -> Cause {
        self.external.cause
    }
}

/// Only the external part is displayed.
impl Display for TfError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), fmt::Error> {
        write!(f, "{}", self.external)
    }
}

/// Return type of anything a handler calls that can fail.
pub type Fallible<T> = Result<T, TfError>;
