use crate::action::Action;
use crate::config::{Config, ConfigStore, default_actions};
use crate::error::EngineError;
use crate::events::Broadcast;
use crate::executor::ActionExecutor;
use crate::hotkeys;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Holds the live configuration and applies every change to it.
///
/// A change is built on a copy, written to disk, and only then swapped in
/// and broadcast. When the write fails the live configuration is left as it
/// was, so memory and disk never disagree.
pub struct ActionRegistry {
    store: ConfigStore,
    live: Config,
    observers: broadcast::Sender<Broadcast>,
}

impl ActionRegistry {
    pub fn new(store: ConfigStore, live: Config, observers: broadcast::Sender<Broadcast>) -> Self {
        Self {
            store,
            live,
            observers,
        }
    }

    pub fn config(&self) -> &Config {
        &self.live
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn add_action(&mut self, fields: Map<String, Value>) -> Result<&Config, EngineError> {
        let action = Action::from_new(fields)?;
        log::info!("Adding action '{}'", action.name);

        let mut next = self.live.clone();
        next.actions.push(action);
        self.commit(next)?;
        self.broadcast();
        Ok(&self.live)
    }

    pub fn update_action(
        &mut self,
        index: i64,
        patch: &Map<String, Value>,
    ) -> Result<&Config, EngineError> {
        let i = self.checked_index(index)?;
        let updated = self.live.actions[i].patched(patch)?;
        log::info!("Updating action {} ('{}')", i, updated.name);

        let mut next = self.live.clone();
        next.actions[i] = updated;
        self.commit(next)?;
        self.broadcast();
        Ok(&self.live)
    }

    /// Removes the action at `index`; later actions move down by one.
    pub fn delete_action(&mut self, index: i64) -> Result<&Config, EngineError> {
        let i = self.checked_index(index)?;

        let mut next = self.live.clone();
        let removed = next.actions.remove(i);
        log::info!("Deleting action {} ('{}')", i, removed.name);
        self.commit(next)?;
        self.broadcast();
        Ok(&self.live)
    }

    /// Runs the action at `index` whether or not it is enabled.
    pub fn test_action(
        &self,
        index: i64,
        executor: &mut ActionExecutor,
    ) -> Result<(), EngineError> {
        let action = usize::try_from(index)
            .ok()
            .and_then(|i| self.live.actions.get(i))
            .ok_or(EngineError::NotFound(index))?;

        log::info!("Testing action {} ('{}')", index, action.name);
        executor.execute(action)?;
        Ok(())
    }

    /// The live config with `partial` merged over its top-level keys.
    pub fn merged(&self, partial: &Map<String, Value>) -> Result<Config, EngineError> {
        // The document reader skips unusable actions; input from the UI is
        // held to the strict rules instead.
        match partial.get("actions") {
            Some(Value::Array(entries)) => {
                for entry in entries {
                    Action::from_value(entry.clone())?;
                }
            }
            Some(_) => {
                return Err(EngineError::Validation(
                    "actions must be a list".to_string(),
                ));
            }
            None => {}
        }

        let next = self
            .live
            .merged(partial)
            .map_err(|e| EngineError::Validation(format!("invalid configuration: {e}")))?;

        if let Some(bad) = next.actions.iter().find_map(|a| a.validate().err()) {
            return Err(bad);
        }

        let touches_hotkeys =
            partial.contains_key("hotkey") || partial.contains_key("settingsHotkey");
        if touches_hotkeys && hotkeys::same_combo(&next.hotkey, &next.settings_hotkey) {
            return Err(EngineError::Validation(
                "hotkeys must be different".to_string(),
            ));
        }
        Ok(next)
    }

    pub fn reset_actions(&mut self) -> Result<&Config, EngineError> {
        let mut next = self.live.clone();
        next.actions = default_actions();
        self.commit(next)?;
        self.broadcast();
        Ok(&self.live)
    }

    pub fn reset_appearance(&mut self) -> Result<&Config, EngineError> {
        let mut next = self.live.clone();
        next.reset_appearance();
        self.commit(next)?;
        self.broadcast();
        Ok(&self.live)
    }

    /// Persists `next` and makes it the live configuration. Does not notify
    /// observers; callers broadcast once their whole change is in.
    pub fn commit(&mut self, next: Config) -> Result<(), EngineError> {
        if let Err(e) = self.store.save(&next) {
            log::error!(
                "Error saving config to {}: {}",
                self.store.path().display(),
                e
            );
            return Err(e.into());
        }
        self.live = next;
        Ok(())
    }

    /// Takes a configuration that is already on disk (an external edit).
    pub fn adopt(&mut self, next: Config) {
        self.live = next;
    }

    pub fn broadcast(&self) {
        // No subscribers is fine.
        let _ = self.observers.send(Broadcast::ConfigUpdate {
            config: self.live.clone(),
        });
    }

    fn checked_index(&self, index: i64) -> Result<usize, EngineError> {
        let len = self.live.actions.len();
        usize::try_from(index)
            .ok()
            .filter(|&i| i < len)
            .ok_or(EngineError::Index { index, len })
    }
}
