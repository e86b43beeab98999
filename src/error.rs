//! Error types for grabpackt.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for requests against the publisher's website.
#[derive(Error, Debug)]
pub enum SiteError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The site answered with a non-success status
    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// The site refused the account credentials
    #[error("Login rejected: {0}")]
    LoginRejected(String),

    /// Failed to parse HTML content
    #[error("Failed to parse page: {0}")]
    ParseError(String),

    /// The required element isn't found in HTML
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The claim request did not add the offer to the library
    #[error("Claim rejected: {0}")]
    ClaimRejected(String),

    /// URL parsing or joining failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file does not exist
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Error type for book downloads.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP request failed
    #[error("Download request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Failed to write a file
    #[error("Failed to write download: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to build the archive
    #[error("Failed to create archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The archive task panicked or was cancelled
    #[error("Archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Error type for email notifications.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Sender or recipient address is malformed
    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The message could not be assembled
    #[error("Failed to build email: {0}")]
    Message(#[from] lettre::error::Error),

    /// The SMTP exchange failed
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// An attachment's content type was rejected
    #[error("Invalid attachment content type: {0}")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),

    /// An attachment could not be read
    #[error("Failed to read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
