use std::fmt;

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`ResolverError`] as the error.
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Top-level error type for query resolution.
///
/// Every failure surfaces to the caller as one of these variants; no partial
/// results are returned alongside an error.
#[derive(Debug)]
pub enum ResolverError {
    /// The query string could not be decomposed into a call.
    Parse(ParseError),

    /// A known operation rejected its parameters, or the operation is unsupported.
    Execution(ExecutionError),

    /// Client construction or session handling failed.
    Connection(ConnectionError),

    /// Settings could not be loaded or are invalid.
    Config(ConfigError),

    /// MongoDB driver errors (network, auth, constraint violations).
    MongoDb(mongodb::error::Error),

    /// A value could not be converted between JSON and BSON.
    Codec(String),

    /// A task submitted to the executor panicked or was cancelled.
    Task(String),
}

/// Parsing-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Collection, operation name or parameter block could not be located.
    MalformedQuery(String),

    /// The parameter block is not valid JSON.
    InvalidParameters(String),
}

/// Execution-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Operation not in the dispatch table, or explicitly rejected.
    UnsupportedOperation(String),

    /// Parameter count or shape does not fit the operation.
    InvalidParameters(String),
}

/// Connection-specific errors.
///
/// `Clone` so that a memoized connection failure can be handed to every caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Failed to establish a client.
    ConnectionFailed(String),

    /// Invalid connection URI or options.
    InvalidUri(String),

    /// The controller was closed or never initialized.
    NotConnected,

    /// Transaction operation failed.
    TransactionFailed(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl ResolverError {
    /// True when the query text itself could not be parsed.
    pub fn is_malformed_query(&self) -> bool {
        matches!(self, ResolverError::Parse(_))
    }

    /// True when the operation is not (or not any more) supported.
    pub fn is_unsupported_operation(&self) -> bool {
        matches!(
            self,
            ResolverError::Execution(ExecutionError::UnsupportedOperation(_))
        )
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverError::Parse(e) => write!(f, "Error while parsing query: {e}"),
            ResolverError::Execution(e) => write!(f, "Execution error: {e}"),
            ResolverError::Connection(e) => write!(f, "Connection error: {e}"),
            ResolverError::Config(e) => write!(f, "Configuration error: {e}"),
            ResolverError::MongoDb(e) => format_mongodb_error(f, e),
            ResolverError::Codec(msg) => write!(f, "Conversion error: {msg}"),
            ResolverError::Task(msg) => write!(f, "Task failed: {msg}"),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedQuery(msg) => write!(f, "Malformed query: {msg}"),
            ParseError::InvalidParameters(msg) => write!(f, "Invalid parameter block: {msg}"),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::UnsupportedOperation(op) => {
                write!(f, "Unsupported operation: {op}")
            }
            ExecutionError::InvalidParameters(msg) => write!(f, "Invalid parameters: {msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::InvalidUri(msg) => write!(f, "Invalid connection options: {msg}"),
            ConnectionError::NotConnected => write!(f, "Not connected to MongoDB"),
            ConnectionError::TransactionFailed(msg) => {
                write!(f, "Transaction operation failed: {msg}")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ResolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolverError::Parse(e) => Some(e),
            ResolverError::Execution(e) => Some(e),
            ResolverError::Connection(e) => Some(e),
            ResolverError::Config(e) => Some(e),
            ResolverError::MongoDb(e) => Some(e),
            ResolverError::Codec(_) | ResolverError::Task(_) => None,
        }
    }
}
impl std::error::Error for ParseError {}
impl std::error::Error for ExecutionError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ResolverError ========================= */

impl From<mongodb::error::Error> for ResolverError {
    fn from(err: mongodb::error::Error) -> Self {
        ResolverError::MongoDb(err)
    }
}

impl From<ParseError> for ResolverError {
    fn from(err: ParseError) -> Self {
        ResolverError::Parse(err)
    }
}

impl From<ExecutionError> for ResolverError {
    fn from(err: ExecutionError) -> Self {
        ResolverError::Execution(err)
    }
}

impl From<ConnectionError> for ResolverError {
    fn from(err: ConnectionError) -> Self {
        ResolverError::Connection(err)
    }
}

impl From<ConfigError> for ResolverError {
    fn from(err: ConfigError) -> Self {
        ResolverError::Config(err)
    }
}

impl From<tokio::task::JoinError> for ResolverError {
    fn from(err: tokio::task::JoinError) -> Self {
        ResolverError::Task(err.to_string())
    }
}
