//! Error types for appwrite-migrate.

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a migration run.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source API could not be reached or returned an error.
    #[error("Source connection error: {0}")]
    SourceConnection(String),

    /// The source rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The source is rate limiting; retry after the given number of seconds.
    #[error("Rate limited, retry after {0}s")]
    RateLimit(u64),

    /// A source response could not be interpreted.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// The target store could not be reached.
    #[error("Target connection error: {0}")]
    TargetConnection(String),

    /// A write to the target failed.
    #[error("Loading error: {0}")]
    Loading(String),

    /// Schema creation or translation failed.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A source record could not be turned into a target record.
    #[error("Transform error: {0}")]
    Transform(String),

    /// The requested target dialect is not available in this build.
    #[error("Unsupported target dialect: {0}")]
    UnsupportedDialect(String),

    /// A collection failed; the whole run is aborted.
    #[error("Collection '{collection}' failed: {source}")]
    Collection {
        /// Source collection id.
        collection: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid identifier pattern.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// SQL driver error.
    #[cfg(any(feature = "postgres", feature = "mysql"))]
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// MongoDB driver error.
    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// BSON encoding error.
    #[cfg(feature = "mongodb")]
    #[error("BSON error: {0}")]
    Bson(#[from] bson::ser::Error),
}

impl Error {
    /// Wraps an error with the collection it aborted.
    pub fn in_collection(self, collection: impl Into<String>) -> Self {
        Self::Collection {
            collection: collection.into(),
            source: Box::new(self),
        }
    }
}
