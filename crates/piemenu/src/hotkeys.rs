use crate::config::{Accelerator, Config, DEFAULT_HOTKEY, DEFAULT_SETTINGS_HOTKEY};
use parking_lot::Mutex;
use pietool::keys::Modifier;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// What a global hotkey does when pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    ToggleOverlay,
    OpenSettings,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HotkeyError {
    #[error("'{0}' is not a valid hotkey")]
    Invalid(String),
    #[error("'{0}' is already registered")]
    AlreadyRegistered(String),
}

/// A well-formed hotkey has a modifier, a key, and no empty `+` segments.
pub fn validate(hotkey: &str) -> bool {
    !hotkey.is_empty()
        && hotkey.contains('+')
        && !hotkey.contains("++")
        && hotkey.split('+').all(|part| !part.trim().is_empty())
}

/// Returns `hotkey` if it is valid, `default` otherwise.
pub fn validate_and_fix(hotkey: &Accelerator, default: &str) -> Accelerator {
    if validate(hotkey) {
        hotkey.clone()
    } else {
        Accelerator::new(default)
    }
}

/// Canonical spelling used to compare combos: modifiers in a fixed order
/// with one name each, then the lowercased key.
pub fn normalize_combo(combo: &str) -> String {
    let mut modifiers = Vec::new();
    let mut keys = Vec::new();
    for part in combo.split('+').map(|p| p.trim().to_lowercase()) {
        if part.is_empty() {
            continue;
        }
        match Modifier::from_str(&part) {
            Ok(m) => modifiers.push(m),
            Err(_) => keys.push(part),
        }
    }
    modifiers.sort();
    modifiers.dedup();
    modifiers
        .iter()
        .map(Modifier::to_string)
        .chain(keys)
        .collect::<Vec<_>>()
        .join("+")
}

pub fn same_combo(a: &str, b: &str) -> bool {
    normalize_combo(a) == normalize_combo(b)
}

/// Binds key combinations to triggers at the OS level.
pub trait HotkeyBackend: Send {
    fn unregister_all(&mut self);
    fn register(&mut self, combo: &Accelerator, trigger: Trigger) -> Result<(), HotkeyError>;
    /// The trigger currently bound to `combo`, if any.
    fn trigger_for(&self, combo: &str) -> Option<Trigger>;
}

/// In-process binding table. Presses arrive from outside (a compositor
/// bind running `pietool press ...`) and are looked up here.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: Arc<Mutex<HashMap<String, Trigger>>>,
}

impl BindingTable {
    pub fn lookup(&self, combo: &str) -> Option<Trigger> {
        self.bindings.lock().get(&normalize_combo(combo)).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HotkeyBackend for BindingTable {
    fn unregister_all(&mut self) {
        self.bindings.lock().clear();
    }

    fn register(&mut self, combo: &Accelerator, trigger: Trigger) -> Result<(), HotkeyError> {
        let key = normalize_combo(combo);
        let mut bindings = self.bindings.lock();
        if bindings.contains_key(&key) {
            return Err(HotkeyError::AlreadyRegistered(combo.to_string()));
        }
        bindings.insert(key, trigger);
        Ok(())
    }

    fn trigger_for(&self, combo: &str) -> Option<Trigger> {
        self.lookup(combo)
    }
}

pub struct HotkeyManager {
    backend: Box<dyn HotkeyBackend>,
}

impl HotkeyManager {
    pub fn new(backend: Box<dyn HotkeyBackend>) -> Self {
        Self { backend }
    }

    /// Copy of `config` with any malformed hotkey reset to its default, or
    /// `None` when both are fine.
    pub fn corrected(config: &Config) -> Option<Config> {
        let hotkey = validate_and_fix(&config.hotkey, DEFAULT_HOTKEY);
        let settings_hotkey = validate_and_fix(&config.settings_hotkey, DEFAULT_SETTINGS_HOTKEY);

        if hotkey == config.hotkey && settings_hotkey == config.settings_hotkey {
            return None;
        }
        if hotkey != config.hotkey {
            log::error!(
                "Invalid carousel hotkey '{}', resetting to {}",
                config.hotkey,
                DEFAULT_HOTKEY
            );
        }
        if settings_hotkey != config.settings_hotkey {
            log::error!(
                "Invalid settings hotkey '{}', resetting to {}",
                config.settings_hotkey,
                DEFAULT_SETTINGS_HOTKEY
            );
        }

        let mut fixed = config.clone();
        fixed.hotkey = hotkey;
        fixed.settings_hotkey = settings_hotkey;
        Some(fixed)
    }

    /// Drops every binding and binds both hotkeys of `config` again. A
    /// failure on one binding leaves the other in place; the result is true
    /// only if both succeeded.
    pub fn register_all(&mut self, config: &Config) -> bool {
        self.backend.unregister_all();

        let bindings = [
            (&config.hotkey, Trigger::ToggleOverlay, "carousel"),
            (&config.settings_hotkey, Trigger::OpenSettings, "settings"),
        ];

        bindings
            .into_iter()
            .map(|(combo, trigger, label)| {
                let result = if validate(combo) {
                    self.backend.register(combo, trigger)
                } else {
                    Err(HotkeyError::Invalid(combo.to_string()))
                };
                match result {
                    Ok(()) => {
                        log::info!("Registered {} hotkey {}", label, combo);
                        true
                    }
                    Err(e) => {
                        log::error!("Failed to register {} hotkey: {}", label, e);
                        false
                    }
                }
            })
            .fold(true, |all, ok| all && ok)
    }

    pub fn unregister_all(&mut self) {
        self.backend.unregister_all();
    }

    pub fn trigger_for(&self, combo: &str) -> Option<Trigger> {
        self.backend.trigger_for(combo)
    }
}
