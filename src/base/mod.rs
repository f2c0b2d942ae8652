//! Base types and error handling.
//!
//! Provides the status surface shared by both authentication roles:
//! - [`AuthError`]: unrecoverable authentication failures
//! - [`AuthDisposition`]: post-send outcomes (complete / retry)

pub mod error;

pub use error::{AuthDisposition, AuthError};
