use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the resolution, acquisition and activation engine.
///
/// Variants follow the failure taxonomy the CLI layer renders: every fatal
/// variant names the tool and version involved so the message is actionable
/// without further context.
#[derive(Debug, Error)]
pub enum Error {
    /// The tool is not present in the catalog.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The version string is malformed or rejected by the tool's validation rule.
    #[error("invalid version '{version}' for {tool}: {reason}")]
    InvalidExpression {
        tool: String,
        version: String,
        reason: String,
    },

    /// No catalog entry matched a partial or wildcard expression.
    #[error("no {tool} version found matching '{expression}' (run `toolver list {tool} --remote` to see available versions)")]
    NotFound { tool: String, expression: String },

    /// A retryable network or HTTP failure.
    #[error("transfer of {url} failed: {message}")]
    Transport { url: String, message: String },

    /// A non-retryable HTTP response (4xx other than 408 and 429).
    #[error("download of {url} failed: HTTP {status}")]
    FatalHttp { url: String, status: u16 },

    /// The downloaded artifact did not hash to the expected digest.
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    DigestMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    /// The tool publishes checksums but none could be read for this artifact.
    #[error("no checksum for {tool} {version} from {url}: {message} (pass --skip-checksum to install unverified)")]
    ChecksumUnavailable {
        tool: String,
        version: String,
        url: String,
        message: String,
    },

    /// Retries were exhausted; wraps the last error seen.
    #[error("download failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// The archive is corrupt or has an unsupported layout.
    #[error("failed to install {tool} {version}: {message}")]
    ExtractionFailure {
        tool: String,
        version: String,
        message: String,
    },

    #[error("{tool} {version} is already installed")]
    AlreadyInstalled { tool: String, version: String },

    #[error("{tool} {version} is not installed (install it with: toolver install {tool} {version})")]
    NotInstalled { tool: String, version: String },

    /// Every persistent environment write method failed. This is a soft
    /// failure: callers report it as a warning once activation has happened.
    #[error("could not persist {variable} for {tool} (tried: {}); apply it manually for this session", attempts.join(", "))]
    PersistenceFailure {
        tool: String,
        variable: String,
        attempts: Vec<String>,
    },

    /// A tool definition could not be parsed.
    #[error("invalid tool definition {name}: {message}")]
    Catalog { name: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether the fetch retry loop should try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::DigestMismatch { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
