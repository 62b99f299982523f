/// Top-level relink error type.
///
/// All fallible operations in `relink-core` return [`Result<T, RelinkError>`](Result).
/// Each variant wraps a layer-specific error enum so callers can match on the
/// source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum RelinkError {
    /// Error from a graph backend (`SQLite` operations, serialization).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error while discovering or reading project files.
    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Error from the parsing front end.
    #[error("Graph engine error: {0}")]
    Graph(#[from] relink_graphs::GraphError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from graph storage backends.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema creation or version check failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// A stored label or relationship type is not recognised.
    #[error("Unknown {what}: {value}")]
    Unknown { what: &'static str, value: String },

    /// JSON serialization/deserialization of properties or records failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors during file discovery and parsing.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// Source file could not be parsed.
    #[error("Parse error in {path}: {message}")]
    Parse {
        /// Path of the file that failed to parse.
        path: String,
        /// Description of the parse failure.
        message: String,
    },

    /// The project root is missing or not a directory.
    #[error("Invalid project root: {0}")]
    ProjectRoot(String),

    /// File exceeds the configured size limit.
    #[error("File too large: {path} ({size} bytes)")]
    TooLarge { path: String, size: u64 },

    /// Filesystem I/O error during extraction.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in relink configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, RelinkError>`.
pub type Result<T> = std::result::Result<T, RelinkError>;
