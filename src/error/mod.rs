//! Error handling for query resolution.
//!
//! This module provides:
//! - A crate-wide error type wrapping parse, execution, connection and config failures
//! - Structured error information extracted from MongoDB driver errors
//!
//! # Example
//!
//! ```rust,no_run
//! use mongo_resolver::error::mongo::extract_error_info;
//!
//! fn log_backend_error(err: &mongodb::error::Error) {
//!     let info = extract_error_info(err);
//!     println!("{}", info.to_json().unwrap_or_default());
//! }
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ConnectionError, ExecutionError, ParseError, ResolverError, Result,
};
pub use mongo::ErrorInfo;
