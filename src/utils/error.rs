// src/utils/error.rs
use std::time::Duration;
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Pattern '{0}' is already registered")]
    DuplicatePattern(String),

    #[error("Unknown pattern: {0}")]
    UnknownPattern(String),

    #[error("Invalid regex for pattern '{name}': {source}")]
    InvalidRegex {
        name: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit wait for '{domain}' would exceed the timeout (waited {waited:?})")]
    Timeout { domain: String, waited: Duration },

    #[error("Rate limit wait for '{domain}' was cancelled")]
    Cancelled { domain: String },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode), // e.g., 404 Not Found, 403 Forbidden

    #[error("Could not read local page: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page address: {0}")]
    InvalidUrl(String),

    #[error("Page not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbedError {
    #[error("Embedding backend failed: {0}")]
    Backend(String),

    #[error("Embedding backend returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Could not read template: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid template: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Pattern registry error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Page fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Rate limiting failed: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
