use std::sync::Arc;

use thiserror::Error;

/// Lifecycle failures surfaced to `start`/`reload` callers.
///
/// Cloneable: every caller joined to the same in-flight operation gets the
/// same error.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("failed to create runtime context: {error:#}")]
    Construction { error: Arc<anyhow::Error> },

    #[error("failed to activate runtime context: {error:#}")]
    Activation { error: Arc<anyhow::Error> },

    #[error("runtime operation aborted: {message}")]
    Aborted { message: String },

    #[error("plugin runtime is not running")]
    NotRunning,

    #[error("no plugin named '{module}' in the current plugin specs")]
    UnknownPlugin { module: String },

    #[error("'{module}' is built in and can't be reloaded on its own")]
    BuiltinFeature { module: String },
}

impl Error {
    #[must_use]
    pub fn construction(error: anyhow::Error) -> Self {
        Self::Construction {
            error: Arc::new(error),
        }
    }

    #[must_use]
    pub fn activation(error: anyhow::Error) -> Self {
        Self::Activation {
            error: Arc::new(error),
        }
    }

    #[must_use]
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unknown_plugin(module: impl Into<String>) -> Self {
        Self::UnknownPlugin {
            module: module.into(),
        }
    }

    #[must_use]
    pub fn builtin_feature(module: impl Into<String>) -> Self {
        Self::BuiltinFeature {
            module: module.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
