//! Shared infrastructure: error model and cancellation.

pub mod cancel;
pub mod error;

pub use cancel::CancelToken;
pub use error::{CompareError, LoadError, LoadErrorKind, ReadFault, Severity};
