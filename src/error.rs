//! Error types for stepcache
//!
//! All modules use `StepCacheResult<T>` as their return type. Nothing below
//! `main` terminates the process; errors travel up with `?` and are
//! formatted once at the top.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stepcache operations
pub type StepCacheResult<T> = Result<T, StepCacheError>;

/// All errors that can occur in stepcache
#[derive(Error, Debug)]
pub enum StepCacheError {
    // Configuration errors
    #[error("Can't find stepcache config file at '{}'", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("No step called '{0}'")]
    UnknownStep(String),

    #[error("Step names '{first}' and '{second}' are too similar. They both become '{slug}' when slugified.")]
    StepSlugClash {
        first: String,
        second: String,
        slug: String,
    },

    #[error("Can't get name of current git branch: {0}")]
    BranchUnresolved(String),

    #[error("S3 config vars not found: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    // Step command errors
    #[error("Command failed with exit code {code}: {command}")]
    CommandFailed { command: String, code: i32 },

    #[error("Failed to start command: {command}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Cache backend errors
    #[error("{method} request for '{key}' failed with status code {status}")]
    HttpStatus {
        method: &'static str,
        key: String,
        status: u16,
        body: String,
    },

    #[error("{method} request for '{key}' failed: {reason}")]
    Transport {
        method: &'static str,
        key: String,
        reason: String,
    },

    #[error("Malformed object listing: {0}")]
    ListingParse(String),

    #[error("Invalid object key '{0}'")]
    InvalidObjectKey(String),

    // Archive errors
    #[error("Declared path '{}' does not exist", .0.display())]
    ArchivePathMissing(PathBuf),

    #[error("Archive error: {context}")]
    Archive {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StepCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an archive error with context
    pub fn archive(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Archive {
            context: context.into(),
            source,
        }
    }

    /// Create a transport error for a request that never got a response
    pub fn transport(method: &'static str, key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            method,
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Exit code the process should terminate with
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandFailed { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }

    /// Extra detail worth showing below the headline (e.g. a response body)
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { body, .. } if !body.trim().is_empty() => Some(body.as_str()),
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound(_) => Some("Create stepcache.toml or pass --config <path>"),
            Self::BranchUnresolved(_) => {
                Some("Run inside a git repository or set current_branch in the config")
            }
            Self::MissingCredentials(_) => {
                Some("Set the variables above, or use backend = \"local\" in [store]")
            }
            Self::StepSlugClash { .. } => Some("Rename one of the steps"),
            _ => None,
        }
    }
}
