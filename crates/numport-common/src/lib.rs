//! numport common library
//!
//! Shared types, logging, and error handling for the numport workspace.
//!
//! - **Error Handling**: [`NumportError`] and the [`Result`] alias
//! - **Logging**: environment-driven `tracing` setup shared by every binary
//! - **Phone numbers**: normalisation and DDD/prefix splitting used by lookups
//!
//! # Example
//!
//! ```no_run
//! use numport_common::{PhoneNumber, Result};
//!
//! fn range_key(raw: &str) -> Result<i64> {
//!     let phone = PhoneNumber::parse(raw)?;
//!     Ok(phone.range_key())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod phone;

// Re-export commonly used types
pub use error::{NumportError, Result};
pub use phone::PhoneNumber;
