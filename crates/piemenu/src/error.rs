use crate::config::ConfigError;
use crate::executor::ExecError;
use strum::IntoStaticStr;
use thiserror::Error;

/// Why an intent was rejected. `kind()` is the stable tag sent to the UI.
#[derive(Debug, Error, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum EngineError {
    #[error("failed to save configuration: {0}")]
    ConfigIo(#[from] ConfigError),
    #[error("{0}")]
    Validation(String),
    #[error("invalid action index {index} (have {len} actions)")]
    Index { index: i64, len: usize },
    #[error("action not found at index {0}")]
    NotFound(i64),
    #[error("failed to execute action: {0}")]
    Execution(#[from] ExecError),
    #[error("no hotkey bound to '{0}'")]
    Unbound(String),
    #[error("malformed request: {0}")]
    Protocol(String),
    #[error("engine is not running")]
    EngineStopped,
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}
