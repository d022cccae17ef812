//! Error taxonomy for the bridge
//!
//! Every failure surfaces synchronously as a `BridgeError`. None are retried
//! and none abort the process; the outer HTTP layer is expected to answer
//! any of them with `status()`.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a `BridgeError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing mandatory module/function name
    Configuration,
    /// Interpreter or its thread support failed to come up
    Startup,
    /// Named module or function could not be found
    Resolution,
    /// The optional init callable raised or returned garbage
    Initialization,
    /// Invocation attempted before a handler was resolved
    NotInitialized,
    /// The request could not be converted into handler arguments
    Arguments,
    /// The request handler raised
    Exception,
    /// The request handler returned something other than `(status, body, headers)`
    MalformedResult,
    /// The pinned worker thread died before producing a result
    Worker,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("both request module and request function are required")]
    MissingEntrypoint,

    #[error("failed to start python: {0}")]
    Startup(String),

    #[error("could not import {module}: {message}")]
    ModuleNotFound { module: String, message: String },

    #[error("could not find {function} in {module}")]
    FunctionNotFound { module: String, function: String },

    #[error("{module}.{function} is not callable")]
    NotCallable { module: String, function: String },

    #[error("init failure in {module}.{function}: {message}")]
    InitFailure {
        module: String,
        function: String,
        message: String,
    },

    #[error("initialize must be called before request")]
    NotInitialized,

    #[error("could not build arguments for {target}: {source}")]
    Arguments {
        target: String,
        #[source]
        source: MarshalError,
    },

    #[error("python exception in {target}: {message}")]
    Exception { target: String, message: String },

    #[error("malformed result from {target}: {source}")]
    MalformedResult {
        target: String,
        #[source]
        source: MarshalError,
    },

    #[error("python worker thread failed: {0}")]
    Worker(String),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingEntrypoint => ErrorKind::Configuration,
            Self::Startup(_) => ErrorKind::Startup,
            Self::ModuleNotFound { .. }
            | Self::FunctionNotFound { .. }
            | Self::NotCallable { .. } => ErrorKind::Resolution,
            Self::InitFailure { .. } => ErrorKind::Initialization,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::Arguments { .. } => ErrorKind::Arguments,
            Self::Exception { .. } => ErrorKind::Exception,
            Self::MalformedResult { .. } => ErrorKind::MalformedResult,
            Self::Worker(_) => ErrorKind::Worker,
        }
    }

    /// HTTP status the outer server should answer with
    pub fn status(&self) -> u16 {
        500
    }
}

/// Conversion failure between Python objects and Rust values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error("expected a 3-item (status, body, headers) sequence, found {found}")]
    NotATriple { found: String },

    #[error("expected an int status, found {found}")]
    InvalidStatus { found: String },

    #[error("status {0} is outside 100..=999")]
    StatusOutOfRange(i64),

    #[error("expected str, bytes or bytearray body, found {found}")]
    InvalidBody { found: String },

    #[error("expected a dict, found {found}")]
    NotADict { found: String },

    #[error("expected a str key, found {found}")]
    InvalidKey { found: String },

    #[error("values for {key:?} must be a list of str, found {found}")]
    InvalidValues { key: String, found: String },

    #[error("item {index} of {key:?} must be str, found {found}")]
    InvalidItem {
        key: String,
        index: usize,
        found: String,
    },

    #[error("{0}")]
    Python(String),
}

impl From<pyo3::PyErr> for MarshalError {
    fn from(err: pyo3::PyErr) -> Self {
        MarshalError::Python(err.to_string())
    }
}

/// Failure loading or writing `httpy.toml`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
