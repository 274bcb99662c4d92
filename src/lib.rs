//! MongoDB shell-style query resolver
//!
//! Takes query strings written the way the MongoDB shell writes them, such as
//! `db.users.find({"age":{"$gt":30}}).limit(2)`, runs them through the MongoDB
//! driver and hands back structured JSON values.
//!
//! # Modules
//!
//! - `parser`: decomposes a call into collection, operation, parameters and modifiers
//! - `executor`: dispatches a parsed call to the matching driver operation
//! - `codec`: converts between JSON values and BSON documents
//! - `normalizer`: unwraps Extended JSON wrappers in results
//! - `connection`: lazily built, shared backend client
//! - `controller`: init/query/update/transaction contract for host frameworks
//! - `config`: settings loading
//! - `error`: error types and handling
//! - `logging`: tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use mongo_resolver::config::Settings;
//! use mongo_resolver::connection::ConnectionProvider;
//! use mongo_resolver::controller::{MongoPersistenceController, PersistenceController};
//! use tokio::runtime::Handle;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_toml_str(
//!         r#"
//!         [persistence]
//!         url = "mongodb://localhost:27017"
//!         database = "shop"
//!         "#,
//!     )?;
//!     let handle = Handle::current();
//!     let provider = ConnectionProvider::new();
//!     let controller = MongoPersistenceController::init(&provider, &settings, &handle).await?;
//!
//!     let users = controller
//!         .query(r#"db.users.find({"active": true}).limit(10)"#, &handle)
//!         .await?;
//!     println!("{users}");
//!
//!     controller.close(&handle).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod executor;
pub mod logging;
pub mod normalizer;
pub mod parser;

// Re-export commonly used types
pub use config::Settings;
pub use connection::ConnectionProvider;
pub use controller::{MongoPersistenceController, PersistenceController};
pub use error::{ResolverError, Result};
pub use executor::{OperationResult, QueryResolver};
pub use normalizer::{NormalizeMode, normalize};
pub use parser::{CallDescriptor, CallParser, Operation, ParsedQuery};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
