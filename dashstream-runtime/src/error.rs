use thiserror::Error;

/// Failures reported by the backend collaborator interfaces.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("entity not found")]
    NotFound,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("request timed out")]
    Timeout,

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the one-way/two-way command channel.
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    #[error("target device is not set")]
    NoTargetDevice,

    #[error("command timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("command rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Widget behavior compilation failure. Converted by the loader into the
/// well-known error widget type, never surfaced raw to widget owners.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("unknown behavior '{0}'")]
    UnknownBehavior(String),

    #[error("behavior compilation failed: {0}")]
    Failed(String),
}

/// Error raised by a widget behavior hook. Caught per hook invocation and
/// stored as widget-local error state.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct BehaviorError {
    pub message: String,
}

impl BehaviorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for BehaviorError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for BehaviorError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Data-path failure surfaced to the owning widget via
/// `on_data_update_error`; never propagated to sibling widgets.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct DataError {
    pub message: String,
}

impl DataError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ProviderError> for DataError {
    fn from(err: ProviderError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}
