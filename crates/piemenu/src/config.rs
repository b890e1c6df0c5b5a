use crate::action::{Action, KeyChord};
use crate::engine::EngineHandle;
use crate::events::AppEvent;
use derive_more::{AsRef, Deref, Display, From, Into};
use directories::ProjectDirs;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pietool::keys::Modifier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

pub const DEFAULT_HOTKEY: &str = "CommandOrControl+Alt+Space";
pub const DEFAULT_SETTINGS_HOTKEY: &str = "Shift+Alt+Space";
pub const DEFAULT_THEME: &str = "dark";
pub const DEFAULT_RING_SIZE: u32 = 300;
pub const DEFAULT_ANIMATION_SPEED: u32 = 200;

const BASE_EXTENT: u32 = 280;
const EXTENT_PER_ACTION: u32 = 25;
const BASE_ACTION_COUNT: usize = 6;

/// A global key combination as written in the document, e.g. `Shift+Alt+Space`.
/// Not validated on load; the hotkey manager checks it before binding.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Deref, From, Into, AsRef,
)]
#[serde(transparent)]
pub struct Accelerator(String);

pietool::impl_string_newtype!(Accelerator);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeColors {
    pub bg_color: String,
    pub accent_color: String,
    pub icon_color: String,
    pub hover_icon_color: String,
}

impl Default for ThemeColors {
    fn default() -> Self {
        Self {
            bg_color: "rgba(25, 25, 25, 0.9)".to_string(),
            accent_color: "#9333ea".to_string(),
            icon_color: "#9333ea".to_string(),
            hover_icon_color: "#ffffff".to_string(),
        }
    }
}

/// The whole settings document. Missing keys take their defaults and
/// unknown top-level keys are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub hotkey: Accelerator,
    pub settings_hotkey: Accelerator,
    pub theme: String,
    pub ring_size: u32,
    pub animation_speed: u32,
    #[serde(deserialize_with = "crate::action::deserialize_stored")]
    pub actions: Vec<Action>,
    pub themes: BTreeMap<String, ThemeColors>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: Accelerator::new(DEFAULT_HOTKEY),
            settings_hotkey: Accelerator::new(DEFAULT_SETTINGS_HOTKEY),
            theme: DEFAULT_THEME.to_string(),
            ring_size: DEFAULT_RING_SIZE,
            animation_speed: DEFAULT_ANIMATION_SPEED,
            actions: default_actions(),
            themes: BTreeMap::from([(DEFAULT_THEME.to_string(), ThemeColors::default())]),
            extra: Map::new(),
        }
    }
}

pub fn default_actions() -> Vec<Action> {
    vec![
        Action::exec("Spotify", "spotify", "start spotify:"),
        Action::keyboard("Copy", "clipboard", KeyChord::new("c", [Modifier::Control])),
        Action::keyboard(
            "Paste",
            "clipboard-check",
            KeyChord::new("v", [Modifier::Control]),
        ),
        Action::exec("Screenshot", "crop", "explorer ms-screenclip:"),
        Action::exec("Settings", "gear", "start ms-settings:"),
        Action::keyboard(
            "Last Window",
            "window-stack",
            KeyChord::new("tab", [Modifier::Alt]),
        ),
    ]
}

impl Config {
    /// Actions reachable from the ring, in ring order.
    pub fn enabled_actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| a.enabled)
    }

    /// Overlay diameter: grows past six sectors so they keep their spacing.
    pub fn ring_extent(&self) -> u32 {
        let extra = self.enabled_actions().count().saturating_sub(BASE_ACTION_COUNT);
        BASE_EXTENT + EXTENT_PER_ACTION * extra as u32
    }

    /// Colors of the selected theme, falling back to `dark`, then to the
    /// built-in dark colors.
    pub fn active_theme(&self) -> ThemeColors {
        self.themes
            .get(&self.theme)
            .or_else(|| self.themes.get(DEFAULT_THEME))
            .cloned()
            .unwrap_or_default()
    }

    /// Top-level shallow merge: keys present in `partial` replace whole values.
    pub fn merged(&self, partial: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(merge_shallow(self, partial)?)
    }

    pub fn reset_appearance(&mut self) {
        let defaults = Self::default();
        self.theme = defaults.theme;
        self.ring_size = defaults.ring_size;
        self.animation_speed = defaults.animation_speed;
        self.themes
            .insert(DEFAULT_THEME.to_string(), ThemeColors::default());
    }

    pub fn reset_hotkeys(&mut self) {
        self.hotkey = Accelerator::new(DEFAULT_HOTKEY);
        self.settings_hotkey = Accelerator::new(DEFAULT_SETTINGS_HOTKEY);
    }

    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Serializes `base` and overwrites its top-level keys with `patch`.
pub(crate) fn merge_shallow(
    base: &impl Serialize,
    patch: &Map<String, Value>,
) -> Result<Value, serde_json::Error> {
    let mut merged = serde_json::to_value(base)?;
    if let Value::Object(fields) = &mut merged {
        fields.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Ok(merged)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine config directory")]
    ConfigDirNotFound,
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
}

pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs =
        ProjectDirs::from("org", "piemenu", "piemenu").ok_or(ConfigError::ConfigDirNotFound)?;
    Ok(proj_dirs.config_dir().join("config.json"))
}

/// `config.json` shipped next to the executable, used to seed a fresh install.
pub fn bundled_template_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()?
        .parent()
        .map(|dir| dir.join("config.json"))
}

/// Owns the on-disk document. The daemon is its only writer.
///
/// When the document on disk could not be read in full, the next save first
/// copies it to `config.json.bak` so the user's text is never lost.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    template: Option<PathBuf>,
    keep_original: Arc<AtomicBool>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, template: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            template,
            keep_original: Arc::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.bak")
    }

    /// Loads the document, seeding it first on a fresh install. Never fails:
    /// any error is logged and the built-in default is used in memory. A
    /// damaged file is backed up before anything is written over it.
    pub fn load(&self) -> Config {
        match self.seed().and_then(|()| self.read()) {
            Ok(config) => {
                log::info!("Config loaded from {}", self.path.display());
                config
            }
            Err(e) => {
                log::error!(
                    "Failed to load config from {}: {}; using defaults",
                    self.path.display(),
                    e
                );
                Config::default()
            }
        }
    }

    /// Reads and parses the document without seeding. Stored actions that
    /// cannot be used are left out of the result.
    pub fn read(&self) -> Result<Config, ConfigError> {
        let text = fs_err::read_to_string(&self.path)?;
        let doc: Value = serde_json::from_str(&text).inspect_err(|_| self.keep_original())?;
        let stored = doc.get("actions").and_then(Value::as_array).map_or(0, Vec::len);

        let config: Config = serde_json::from_value(doc).inspect_err(|_| self.keep_original())?;
        if config.actions.len() < stored {
            log::warn!(
                "{} stored action(s) could not be loaded",
                stored - config.actions.len()
            );
            self.keep_original();
        }
        Ok(config)
    }

    fn keep_original(&self) {
        self.keep_original.store(true, Ordering::SeqCst);
    }

    /// Creates the document if it does not exist yet: a copy of the bundled
    /// template when there is one, the built-in default otherwise.
    fn seed(&self) -> Result<(), ConfigError> {
        if self.path.exists() {
            return Ok(());
        }
        log::info!("No config at {}, creating it", self.path.display());

        if let Some(template) = self.template.as_ref().filter(|t| t.is_file()) {
            self.ensure_parent()?;
            fs_err::copy(template, &self.path)?;
            log::info!("Copied default config from {}", template.display());
            return Ok(());
        }

        self.save(&Config::default())
    }

    /// Writes the whole document as pretty JSON. The text goes to a sibling
    /// temp file that is renamed over the target, so readers never see a
    /// half-written document.
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        self.ensure_parent()?;
        if self.keep_original.swap(false, Ordering::SeqCst) && self.path.exists() {
            let backup = self.backup_path();
            fs_err::copy(&self.path, &backup).inspect_err(|_| self.keep_original())?;
            log::warn!("Previous config kept as {}", backup.display());
        }
        let text = config.to_pretty_json()?;
        let tmp = self.path.with_extension("json.tmp");
        fs_err::write(&tmp, text)?;
        fs_err::rename(&tmp, &self.path)?;
        log::debug!("Config saved to {}", self.path.display());
        Ok(())
    }

    fn ensure_parent(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs_err::create_dir_all(parent)?;
            log::info!("Created config directory {}", parent.display());
        }
        Ok(())
    }
}

/// Watches the config directory and asks the engine to reload whenever the
/// document itself changes on disk.
pub async fn run_async_watcher(config_path: PathBuf, engine: EngineHandle) {
    let config_dir = match config_path.parent() {
        Some(p) => p.to_path_buf(),
        None => return,
    };

    if let Err(e) = fs_err::create_dir_all(&config_dir) {
        log::error!("Failed to create config directory for watching: {}", e);
        return;
    }

    let (bridge_tx, bridge_rx) = async_channel::unbounded();

    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            let _ = bridge_tx.send_blocking(res);
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            log::error!("Failed to create watcher: {}", ConfigError::from(e));
            return;
        }
    };

    if let Err(e) = watcher.watch(&config_dir, RecursiveMode::NonRecursive) {
        log::error!("Failed to watch config directory: {}", ConfigError::from(e));
        return;
    }

    while let Ok(res) = bridge_rx.recv().await {
        match res {
            Ok(event) => {
                let touches_document = matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_)
                ) && event.paths.iter().any(|p| p == &config_path);

                if touches_document && engine.send_event(AppEvent::ConfigReload).await.is_err() {
                    break;
                }
            }
            Err(e) => log::error!("Watch error: {}", e),
        }
    }
}
