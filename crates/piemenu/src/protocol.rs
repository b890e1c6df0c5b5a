//! Line-delimited JSON spoken on the intent socket.
//!
//! Each request line is one [`Intent`]; each reply line is one [`Response`].
//! After `subscribe`, the connection carries every `Broadcast` as its own line.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "kebab-case")]
pub enum Intent {
    ExecuteAction { action: Value },
    OpenSettings,
    Toggle,
    Dismiss,
    PressHotkey { combo: String },
    GetConfig,
    SaveConfig { partial: Map<String, Value> },
    AddAction { action: Map<String, Value> },
    UpdateAction { index: i64, patch: Map<String, Value> },
    DeleteAction { index: i64 },
    TestAction { index: i64 },
    ResetActions,
    ResetAppearance,
    ResetHotkeys,
    Subscribe,
}

impl Intent {
    /// Intents that are queued and acknowledged without waiting for the
    /// engine to finish them. `press-hotkey` waits so an unbound combo can
    /// be reported.
    pub fn is_fire(&self) -> bool {
        matches!(
            self,
            Intent::ExecuteAction { .. } | Intent::OpenSettings | Intent::Toggle | Intent::Dismiss
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Ok(Value),
    Error(WireError),
}

impl From<Result<Value, EngineError>> for Response {
    fn from(result: Result<Value, EngineError>) -> Self {
        match result {
            Ok(value) => Response::Ok(value),
            Err(e) => Response::Error(WireError {
                kind: e.kind().to_string(),
                message: e.to_string(),
            }),
        }
    }
}
