use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while decoding or sampling a submitted screenshot.
///
/// These are client-facing: a request that trips one of these carries a
/// malformed or unusable image and is answered with a 4xx status.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("screenshot decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("sample position ({x}, {y}) outside screenshot bounds {width}x{height}")]
    SampleOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("empty screenshot body")]
    EmptyBody,
}

/// Errors from the user record store backing the cooldown ledger.
///
/// Storage failures are never swallowed or defaulted; callers surface them
/// as a failed request.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to read store file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write store file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no record for identity {identity}")]
    MissingRecord { identity: String },

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from the fan-out side of the event bus.
///
/// Broadcast delivery is best-effort; these are logged by callers and never
/// fail a dispatch on their own.
#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("event publish failed: {details}")]
    PublishFailed { details: String },
}

/// Errors from the Twitch token service.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("twitch credentials not configured")]
    MissingCredentials,

    #[error("token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint rejected the refresh: HTTP {status}")]
    Rejected { status: u16 },

    #[error("token storage failed: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum VitalcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("operation timed out: {operation}")]
    Timeout { operation: &'static str },

    #[error("Server error: {message}")]
    Server { message: String },
}

impl VitalcastError {
    pub fn server<S: Into<String>>(message: S) -> Self {
        Self::Server {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VitalcastError>;
