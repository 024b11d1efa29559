use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaJobsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Target error: {0}")]
    Target(#[from] TargetError),

    #[error("Transcode error: {0}")]
    Transcode(#[from] TranscodeError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Unsupported config format for '{0}' (expected .json, .yaml or .yml)")]
    UnsupportedFormat(PathBuf),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid stage plan for '{kind}': {reason}")]
    InvalidStagePlan { kind: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid relative path '{0}'")]
    InvalidPath(String),

    #[error("Source artifact not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Could not find a free file name for '{0}'")]
    NameExhausted(PathBuf),
}

/// Errors raised by domain targets and the target resolver registry.
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("No resolver registered for target kind '{0}'")]
    UnknownKind(String),

    #[error("Target {kind}:{id} not found")]
    NotFound { kind: String, id: String },

    #[error("Target rejected field '{field}': {reason}")]
    FieldRejected { field: String, reason: String },

    #[error("Target operation failed: {0}")]
    Operation(String),
}

/// Failures raised while a runner drives the codec.
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Codec failed during stage '{stage}': {message}")]
    Codec { stage: String, message: String },

    #[error("Stage '{stage}' produced no output")]
    NoOutput { stage: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Target no longer exists")]
    TargetGone,

    #[error("Job was handed to a newer task")]
    Superseded,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker queue is full")]
    QueueFull,

    #[error("Invalid conversion request: {0}")]
    InvalidRequest(String),

    #[error("Cannot determine media kind for '{0}'")]
    UnknownMediaKind(String),

    #[error("No runner registered for {0} jobs")]
    NoRunner(String),

    #[error("Retries exhausted for {field} on {target} ({attempt}/{max_attempts} attempts)")]
    RetriesExhausted {
        target: String,
        field: String,
        attempt: u32,
        max_attempts: u32,
    },

    #[error("Job ledger unavailable")]
    LedgerUnavailable,

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

pub type Result<T> = std::result::Result<T, MediaJobsError>;
