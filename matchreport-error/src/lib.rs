//! # matchreport-error
//!
//! Unified error handling for matchreport.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., ValidationFailed, LengthNotConvergent)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use matchreport_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ValidationFailed, "missing 'date'")
//!         .with_operation("facts::extract")
//!         .with_context("missing", "date"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, matchreport_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using matchreport Error
pub type Result<T> = std::result::Result<T, Error>;
