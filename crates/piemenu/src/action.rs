use crate::error::EngineError;
use pietool::keys::Modifier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChordError {
    #[error("no main key in '{0}'")]
    NoMainKey(String),
    #[error("more than one main key ('{0}' and '{1}')")]
    MultipleMainKeys(String, String),
}

/// A keyboard shortcut: one main key plus the modifiers held with it.
///
/// Stored actions spell this either as a token list in any order
/// (`["c", "control"]`) or as one `+`-joined string (`"control+c"`).
/// Both are folded into this form on the way in and written back as
/// `[main, modifiers...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "KeysRepr", into = "Vec<String>")]
pub struct KeyChord {
    main: String,
    modifiers: BTreeSet<Modifier>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeysRepr {
    Tokens(Vec<String>),
    Joined(String),
}

impl KeyChord {
    pub fn new(main: impl Into<String>, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        Self {
            main: main.into().to_lowercase(),
            modifiers: modifiers.into_iter().collect(),
        }
    }

    /// Classifies each token as a modifier or the main key. Blank tokens are
    /// skipped; a second main key is an error rather than silently winning.
    pub fn parse<I, S>(tokens: I) -> Result<Self, ChordError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::classify(tokens, false)
    }

    /// Like [`KeyChord::parse`], but the last main key wins. Used for
    /// documents written before a second main key was rejected.
    pub fn parse_last_wins<I, S>(tokens: I) -> Result<Self, ChordError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::classify(tokens, true)
    }

    fn classify<I, S>(tokens: I, last_wins: bool) -> Result<Self, ChordError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut main: Option<String> = None;
        let mut modifiers = BTreeSet::new();
        let mut seen = Vec::new();

        for token in tokens {
            let token = token.as_ref().trim().to_lowercase();
            if token.is_empty() {
                continue;
            }
            seen.push(token.clone());
            match Modifier::from_str(&token) {
                Ok(m) => {
                    modifiers.insert(m);
                }
                Err(_) => {
                    if let Some(first) = main.take() {
                        if !last_wins {
                            return Err(ChordError::MultipleMainKeys(first, token));
                        }
                        log::warn!(
                            "Key chord has main keys '{}' and '{}', using '{}'",
                            first,
                            token,
                            token
                        );
                    }
                    main = Some(token);
                }
            }
        }

        let main = main.ok_or_else(|| ChordError::NoMainKey(seen.join("+")))?;
        Ok(Self { main, modifiers })
    }

    pub fn main(&self) -> &str {
        &self.main
    }

    pub fn modifiers(&self) -> &BTreeSet<Modifier> {
        &self.modifiers
    }
}

impl FromStr for KeyChord {
    type Err = ChordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.split('+'))
    }
}

impl TryFrom<KeysRepr> for KeyChord {
    type Error = ChordError;

    fn try_from(repr: KeysRepr) -> Result<Self, Self::Error> {
        match repr {
            KeysRepr::Tokens(tokens) => Self::parse(tokens),
            KeysRepr::Joined(joined) => joined.parse(),
        }
    }
}

impl From<KeyChord> for Vec<String> {
    fn from(chord: KeyChord) -> Self {
        std::iter::once(chord.main)
            .chain(chord.modifiers.iter().map(Modifier::to_string))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    Keyboard {
        keys: KeyChord,
    },
    Exec {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
}

/// One entry of the ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub icon: String,
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

fn stored_chord(keys: &Value) -> Option<KeyChord> {
    match keys {
        Value::String(joined) => KeyChord::parse_last_wins(joined.split('+')).ok(),
        Value::Array(tokens) => {
            let tokens: Option<Vec<&str>> = tokens.iter().map(Value::as_str).collect();
            KeyChord::parse_last_wins(tokens?).ok()
        }
        _ => None,
    }
}

/// Reads the `actions` list of a stored document one entry at a time. An
/// entry that cannot be used is logged and left out instead of failing the
/// whole document.
pub(crate) fn deserialize_stored<'de, D>(deserializer: D) -> Result<Vec<Action>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries = Vec::<Value>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| match Action::from_document(entry) {
            Ok(action) => Some(action),
            Err(e) => {
                log::warn!("Skipping stored action {}: {}", i, e);
                None
            }
        })
        .collect())
}

impl Action {
    pub fn keyboard(name: &str, icon: &str, keys: KeyChord) -> Self {
        Self {
            name: name.to_string(),
            icon: icon.to_string(),
            kind: ActionKind::Keyboard { keys },
            enabled: true,
        }
    }

    pub fn exec(name: &str, icon: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            icon: icon.to_string(),
            kind: ActionKind::Exec {
                command: command.to_string(),
                args: Vec::new(),
            },
            enabled: true,
        }
    }

    /// Parses an action from its wire/document form and checks the fields
    /// the ring and the executor rely on.
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        let action: Self = serde_json::from_value(value)
            .map_err(|e| EngineError::Validation(format!("invalid action: {e}")))?;
        action.validate()?;
        Ok(action)
    }

    /// Parses an action stored in the config document. Unlike input from
    /// the UI, a chord with several main keys is accepted with the last one
    /// winning.
    pub fn from_document(mut value: Value) -> Result<Self, EngineError> {
        if let Some(keys) = value.get_mut("keys")
            && let Some(chord) = stored_chord(keys)
        {
            *keys = Value::from(Vec::<String>::from(chord));
        }
        Self::from_value(value)
    }

    /// Builds a new action for appending: `enabled` is forced on unless the
    /// caller explicitly passed `false`.
    pub fn from_new(mut fields: Map<String, Value>) -> Result<Self, EngineError> {
        let disabled = matches!(fields.get("enabled"), Some(Value::Bool(false)));
        fields.insert("enabled".to_string(), Value::Bool(!disabled));
        Self::from_value(Value::Object(fields))
    }

    /// Shallow-merges `patch` over this action. A patch that switches `type`
    /// must bring the new payload; the old one is dropped.
    pub fn patched(&self, patch: &Map<String, Value>) -> Result<Self, EngineError> {
        let merged = crate::config::merge_shallow(self, patch)
            .map_err(|e| EngineError::Validation(format!("invalid action: {e}")))?;
        Self::from_value(merged)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() || self.icon.trim().is_empty() {
            return Err(EngineError::Validation(
                "name and icon are required".to_string(),
            ));
        }
        if let ActionKind::Exec { command, .. } = &self.kind
            && command.trim().is_empty()
        {
            return Err(EngineError::Validation("command is required".to_string()));
        }
        Ok(())
    }
}
