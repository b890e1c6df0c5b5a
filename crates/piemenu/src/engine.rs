use crate::action::Action;
use crate::config::{Config, ConfigStore};
use crate::error::EngineError;
use crate::events::{AppEvent, Broadcast};
use crate::executor::ActionExecutor;
use crate::hotkeys::{HotkeyBackend, HotkeyManager, Trigger};
use crate::protocol::Intent;
use crate::registry::ActionRegistry;
use crate::surface::Surfaces;
use async_channel::{Receiver, Sender};
use pietool::keys::KeySynth;
use pietool::spawn::Spawner;
use pietool::wm::Pointer;
use serde_json::{Value, json};
use tokio::sync::{broadcast, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayState {
    #[default]
    Hidden,
    Visible,
}

/// The OS-facing pieces the engine drives.
pub struct Capabilities {
    pub keys: Box<dyn KeySynth>,
    pub spawner: Box<dyn Spawner>,
    pub hotkeys: Box<dyn HotkeyBackend>,
    pub pointer: Box<dyn Pointer>,
    pub surfaces: Box<dyn Surfaces>,
}

/// Sole owner of the configuration and the overlay state. Every intent and
/// event is handled to completion before the next one starts.
pub struct Engine {
    registry: ActionRegistry,
    executor: ActionExecutor,
    hotkeys: HotkeyManager,
    pointer: Box<dyn Pointer>,
    surfaces: Box<dyn Surfaces>,
    overlay: OverlayState,
}

impl Engine {
    pub fn new(
        store: ConfigStore,
        config: Config,
        caps: Capabilities,
        observers: broadcast::Sender<Broadcast>,
    ) -> Self {
        Self {
            registry: ActionRegistry::new(store, config, observers),
            executor: ActionExecutor::new(caps.keys, caps.spawner),
            hotkeys: HotkeyManager::new(caps.hotkeys),
            pointer: caps.pointer,
            surfaces: caps.surfaces,
            overlay: OverlayState::Hidden,
        }
    }

    /// Binds the hotkeys of the loaded configuration.
    pub fn start(&mut self) -> bool {
        self.register_hotkeys()
    }

    pub fn shutdown(&mut self) {
        self.hotkeys.unregister_all();
    }

    pub fn config(&self) -> &Config {
        self.registry.config()
    }

    pub fn overlay(&self) -> OverlayState {
        self.overlay
    }

    pub fn handle(&mut self, intent: Intent) -> Result<Value, EngineError> {
        let extent = self.config().ring_extent();
        let result = self.apply(intent);
        self.follow_extent(extent);
        result
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        let extent = self.config().ring_extent();
        match event {
            AppEvent::Hotkey(Trigger::ToggleOverlay) => self.toggle_overlay(),
            AppEvent::Hotkey(Trigger::OpenSettings) => self.surfaces.open_settings(),
            AppEvent::Dismiss => self.hide_overlay(),
            AppEvent::ConfigReload => self.reload_config(),
        }
        self.follow_extent(extent);
    }

    fn apply(&mut self, intent: Intent) -> Result<Value, EngineError> {
        match intent {
            Intent::ExecuteAction { action } => {
                self.execute_action(action);
                Ok(Value::Null)
            }
            Intent::OpenSettings => {
                self.surfaces.open_settings();
                Ok(Value::Null)
            }
            Intent::Toggle => {
                self.toggle_overlay();
                Ok(Value::Null)
            }
            Intent::Dismiss => {
                self.hide_overlay();
                Ok(Value::Null)
            }
            Intent::PressHotkey { combo } => {
                let trigger = self
                    .hotkeys
                    .trigger_for(&combo)
                    .ok_or(EngineError::Unbound(combo))?;
                self.handle_event(AppEvent::Hotkey(trigger));
                Ok(Value::Null)
            }
            Intent::GetConfig => config_value(self.config()),
            Intent::SaveConfig { partial } => {
                let mut next = self.registry.merged(&partial)?;
                if let Some(fixed) = HotkeyManager::corrected(&next) {
                    next = fixed;
                }
                self.registry.commit(next)?;
                self.hotkeys.register_all(self.registry.config());
                self.registry.broadcast();
                config_value(self.config())
            }
            Intent::AddAction { action } => self.registry.add_action(action).and_then(config_value),
            Intent::UpdateAction { index, patch } => self
                .registry
                .update_action(index, &patch)
                .and_then(config_value),
            Intent::DeleteAction { index } => {
                self.registry.delete_action(index).and_then(config_value)
            }
            Intent::TestAction { index } => {
                self.registry.test_action(index, &mut self.executor)?;
                Ok(json!({ "success": true }))
            }
            Intent::ResetActions => self.registry.reset_actions().and_then(config_value),
            Intent::ResetAppearance => self.registry.reset_appearance().and_then(config_value),
            Intent::ResetHotkeys => {
                let mut next = self.config().clone();
                next.reset_hotkeys();
                self.registry.commit(next)?;
                self.register_hotkeys();
                self.registry.broadcast();
                config_value(self.config())
            }
            Intent::Subscribe => Err(EngineError::Protocol(
                "subscribe is handled by the connection".to_string(),
            )),
        }
    }

    /// Runs an action picked on the ring, then hides the ring no matter what.
    /// Failures only reach the log: the overlay is gone before they are known.
    fn execute_action(&mut self, action: Value) {
        match Action::from_value(action) {
            Ok(action) if !action.enabled => {
                log::warn!("Ignoring disabled action '{}'", action.name);
            }
            Ok(action) => {
                if let Err(e) = self.executor.execute(&action) {
                    log::error!("Failed to execute '{}': {}", action.name, e);
                }
            }
            Err(e) => log::error!("Rejected action: {}", e),
        }
        self.hide_overlay();
    }

    fn toggle_overlay(&mut self) {
        match self.overlay {
            OverlayState::Visible => self.hide_overlay(),
            OverlayState::Hidden => self.show_overlay(),
        }
    }

    fn show_overlay(&mut self) {
        let cursor = self.pointer.cursor_position().unwrap_or_else(|| {
            log::warn!("Cursor position unavailable, showing overlay at the origin");
            Default::default()
        });
        let config = self.registry.config();
        let origin = cursor.offset(f64::from(config.ring_size) / 2.0);
        self.surfaces.show_overlay(origin, config.ring_extent());
        self.overlay = OverlayState::Visible;
    }

    fn hide_overlay(&mut self) {
        self.surfaces.hide_overlay();
        self.overlay = OverlayState::Hidden;
    }

    /// Resizes a visible overlay when the number of enabled actions changed.
    fn follow_extent(&mut self, before: u32) {
        let extent = self.config().ring_extent();
        if self.overlay == OverlayState::Visible && extent != before {
            self.surfaces.resize_overlay(extent);
        }
    }

    /// Full unbind/rebind cycle. Malformed hotkeys are reset to their
    /// defaults and the corrected document is saved before binding. The live
    /// config always matches what is bound, even when that save fails.
    fn register_hotkeys(&mut self) -> bool {
        if let Some(fixed) = HotkeyManager::corrected(self.registry.config())
            && self.registry.commit(fixed.clone()).is_err()
        {
            self.registry.adopt(fixed);
        }
        self.hotkeys.register_all(self.registry.config())
    }

    fn reload_config(&mut self) {
        let next = match self.registry.store().read() {
            Ok(next) => next,
            Err(e) => {
                log::error!("Failed to reload config: {}", e);
                return;
            }
        };
        if &next == self.config() {
            return;
        }

        self.registry.adopt(next);
        self.register_hotkeys();
        self.registry.broadcast();
        log::info!("Configuration reloaded");
    }
}

fn config_value(config: &Config) -> Result<Value, EngineError> {
    serde_json::to_value(config).map_err(|e| EngineError::Protocol(e.to_string()))
}

pub enum EngineMsg {
    Request {
        intent: Intent,
        reply: Option<oneshot::Sender<Result<Value, EngineError>>>,
    },
    Event(AppEvent),
}

/// Cheap handle for talking to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: Sender<EngineMsg>,
    observers: broadcast::Sender<Broadcast>,
}

impl EngineHandle {
    pub fn new(tx: Sender<EngineMsg>, observers: broadcast::Sender<Broadcast>) -> Self {
        Self { tx, observers }
    }

    /// Queues `intent` and waits for its outcome.
    pub async fn request(&self, intent: Intent) -> Result<Value, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineMsg::Request {
                intent,
                reply: Some(reply),
            })
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        rx.await.map_err(|_| EngineError::EngineStopped)?
    }

    /// Queues `intent` without waiting for it to run.
    pub async fn fire(&self, intent: Intent) -> Result<(), EngineError> {
        self.tx
            .send(EngineMsg::Request {
                intent,
                reply: None,
            })
            .await
            .map_err(|_| EngineError::EngineStopped)
    }

    pub async fn send_event(&self, event: AppEvent) -> Result<(), EngineError> {
        self.tx
            .send(EngineMsg::Event(event))
            .await
            .map_err(|_| EngineError::EngineStopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.observers.subscribe()
    }
}

/// Processes queued messages one at a time until every sender is gone.
pub async fn run(mut engine: Engine, rx: Receiver<EngineMsg>) -> Engine {
    while let Ok(msg) = rx.recv().await {
        match msg {
            EngineMsg::Request { intent, reply } => {
                let result = engine.handle(intent);
                if let Err(e) = &result {
                    log::warn!("Intent rejected: {}", e);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            EngineMsg::Event(event) => engine.handle_event(event),
        }
    }
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Accelerator, DEFAULT_HOTKEY};
    use crate::executor::fakes::{FakeKeys, FakeSpawner, Recorder};
    use crate::hotkeys::BindingTable;
    use crate::surface::BroadcastSurfaces;
    use pietool::wm::Point;
    use serde_json::json;

    struct FixedPointer(Option<Point>);

    impl Pointer for FixedPointer {
        fn cursor_position(&self) -> Option<Point> {
            self.0
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        engine: Engine,
        bindings: BindingTable,
        recorder: Recorder,
        rx: broadcast::Receiver<Broadcast>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = ConfigStore::new(dir.path().join("config.json"), None);
            let config = store.load();
            Self::with(dir, store, config)
        }

        fn with(dir: tempfile::TempDir, store: ConfigStore, config: Config) -> Self {
            let (tx, rx) = broadcast::channel(64);
            let recorder = Recorder::default();
            let bindings = BindingTable::default();
            let caps = Capabilities {
                keys: Box::new(FakeKeys {
                    recorder: recorder.clone(),
                    fail: false,
                }),
                spawner: Box::new(FakeSpawner {
                    recorder: recorder.clone(),
                }),
                hotkeys: Box::new(bindings.clone()),
                pointer: Box::new(FixedPointer(Some(Point::new(500.0, 400.0)))),
                surfaces: Box::new(BroadcastSurfaces::new(tx.clone())),
            };
            let mut engine = Engine::new(store, config, caps, tx);
            engine.start();
            Self {
                dir,
                engine,
                bindings,
                recorder,
                rx,
            }
        }

        fn drain(&mut self) -> Vec<Broadcast> {
            std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
        }

        fn on_disk(&self) -> Config {
            let text = fs_err::read_to_string(self.dir.path().join("config.json")).unwrap();
            serde_json::from_str(&text).unwrap()
        }
    }

    fn obj(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_fresh_install_get_config_is_default() {
        let mut h = Harness::new();
        let value = h.engine.handle(Intent::GetConfig).unwrap();
        assert_eq!(value, serde_json::to_value(Config::default()).unwrap());
        assert_eq!(h.bindings.len(), 2);
    }

    #[test]
    fn test_hotkey_toggles_overlay_at_cursor() {
        let mut h = Harness::new();

        h.engine.handle_event(AppEvent::Hotkey(Trigger::ToggleOverlay));
        assert_eq!(h.engine.overlay(), OverlayState::Visible);
        h.engine.handle_event(AppEvent::Hotkey(Trigger::ToggleOverlay));
        assert_eq!(h.engine.overlay(), OverlayState::Hidden);

        assert_eq!(
            h.drain(),
            vec![
                Broadcast::OverlayShow {
                    x: 350.0,
                    y: 250.0,
                    extent: 280
                },
                Broadcast::OverlayHide,
            ]
        );
    }

    #[test]
    fn test_execute_action_always_hides() {
        let mut h = Harness::new();
        h.engine.handle(Intent::Toggle).unwrap();

        let copy = json!({ "name": "Copy", "icon": "clipboard", "type": "keyboard", "keys": ["c", "control"] });
        h.engine.handle(Intent::ExecuteAction { action: copy }).unwrap();
        assert_eq!(h.engine.overlay(), OverlayState::Hidden);
        assert_eq!(h.recorder.taps.lock().len(), 1);

        h.engine
            .handle(Intent::ExecuteAction { action: json!({ "bogus": 1 }) })
            .unwrap();
        assert_eq!(h.engine.overlay(), OverlayState::Hidden);

        let hides = h
            .drain()
            .into_iter()
            .filter(|b| *b == Broadcast::OverlayHide)
            .count();
        assert_eq!(hides, 2);
    }

    #[test]
    fn test_disabled_action_never_runs_from_the_ring() {
        let mut h = Harness::new();
        h.engine
            .handle(Intent::UpdateAction {
                index: 1,
                patch: obj(json!({ "enabled": false })),
            })
            .unwrap();

        let disabled = serde_json::to_value(&h.engine.config().actions[1]).unwrap();
        assert!(h.engine.config().enabled_actions().all(|a| a.enabled));
        assert_eq!(h.engine.config().enabled_actions().count(), 5);

        h.engine.handle(Intent::ExecuteAction { action: disabled }).unwrap();
        assert!(h.recorder.taps.lock().is_empty());

        let reply = h.engine.handle(Intent::TestAction { index: 1 }).unwrap();
        assert_eq!(reply, json!({ "success": true }));
        assert_eq!(h.recorder.taps.lock().len(), 1);
    }

    #[test]
    fn test_save_config_resets_bad_hotkey() {
        let mut h = Harness::new();
        h.drain();

        let value = h
            .engine
            .handle(Intent::SaveConfig {
                partial: obj(json!({ "hotkey": "BadFormat" })),
            })
            .unwrap();

        assert_eq!(value["hotkey"], json!(DEFAULT_HOTKEY));
        assert_eq!(h.on_disk().hotkey.as_str(), DEFAULT_HOTKEY);
        assert_eq!(
            h.bindings.lookup(DEFAULT_HOTKEY),
            Some(Trigger::ToggleOverlay)
        );
        assert_eq!(
            h.drain(),
            vec![Broadcast::ConfigUpdate {
                config: h.engine.config().clone()
            }]
        );
    }

    #[test]
    fn test_save_config_rebinds_new_hotkeys() {
        let mut h = Harness::new();
        h.engine
            .handle(Intent::SaveConfig {
                partial: obj(json!({ "hotkey": "Super+Space", "ringSize": 360 })),
            })
            .unwrap();

        assert_eq!(h.bindings.lookup("meta+space"), Some(Trigger::ToggleOverlay));
        assert_eq!(h.bindings.lookup(DEFAULT_HOTKEY), None);
        assert_eq!(h.on_disk().ring_size, 360);
    }

    #[test]
    fn test_invalid_startup_hotkeys_are_fixed_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"), None);
        let mut config = Config::default();
        config.settings_hotkey = Accelerator::new("Shift++Space");
        store.save(&config).unwrap();

        let h = Harness::with(dir, store.clone(), config);
        assert_eq!(h.engine.config().settings_hotkey.as_str(), "Shift+Alt+Space");
        assert_eq!(store.read().unwrap().settings_hotkey.as_str(), "Shift+Alt+Space");
        assert_eq!(h.bindings.len(), 2);
    }

    #[test]
    fn test_visible_overlay_follows_ring_extent() {
        let mut h = Harness::new();
        h.engine.handle(Intent::Toggle).unwrap();
        for name in ["A", "B"] {
            h.engine
                .handle(Intent::AddAction {
                    action: obj(json!({ "name": name, "icon": "i", "type": "exec", "command": "true" })),
                })
                .unwrap();
        }
        h.engine
            .handle(Intent::UpdateAction {
                index: 0,
                patch: obj(json!({ "icon": "music" })),
            })
            .unwrap();

        let resizes: Vec<_> = h
            .drain()
            .into_iter()
            .filter(|b| matches!(b, Broadcast::OverlayResize { .. }))
            .collect();
        assert_eq!(
            resizes,
            vec![
                Broadcast::OverlayResize { extent: 305 },
                Broadcast::OverlayResize { extent: 330 },
            ]
        );

        h.engine.handle(Intent::Dismiss).unwrap();
        h.engine.handle(Intent::DeleteAction { index: 7 }).unwrap();
        assert!(
            !h.drain()
                .iter()
                .any(|b| matches!(b, Broadcast::OverlayResize { .. }))
        );
    }

    #[test]
    fn test_press_hotkey_resolves_bindings() {
        let mut h = Harness::new();
        h.engine
            .handle(Intent::PressHotkey { combo: "ctrl+alt+space".to_string() })
            .unwrap();
        assert_eq!(h.engine.overlay(), OverlayState::Visible);

        h.drain();
        h.engine
            .handle(Intent::PressHotkey { combo: "alt+shift+space".to_string() })
            .unwrap();
        assert_eq!(h.drain(), vec![Broadcast::SettingsOpen]);

        let err = h
            .engine
            .handle(Intent::PressHotkey { combo: "Ctrl+Q".to_string() })
            .unwrap_err();
        assert!(matches!(err, EngineError::Unbound(combo) if combo == "Ctrl+Q"));
    }

    #[test]
    fn test_failed_save_config_keeps_memory_and_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs_err::write(&blocker, "").unwrap();
        let store = ConfigStore::new(blocker.join("config.json"), None);
        let mut h = Harness::with(dir, store, Config::default());

        let err = h
            .engine
            .handle(Intent::SaveConfig {
                partial: obj(json!({ "hotkey": "BadFormat" })),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::ConfigIo(_)));
        assert_eq!(h.engine.config(), &Config::default());
        assert_eq!(
            h.bindings.lookup(DEFAULT_HOTKEY),
            Some(Trigger::ToggleOverlay)
        );
    }

    #[test]
    fn test_unsaved_hotkey_fix_still_matches_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs_err::write(&blocker, "").unwrap();
        let store = ConfigStore::new(blocker.join("config.json"), None);
        let mut config = Config::default();
        config.hotkey = Accelerator::new("BadFormat");

        let h = Harness::with(dir, store, config);
        assert_eq!(h.engine.config().hotkey.as_str(), DEFAULT_HOTKEY);
        assert_eq!(
            h.bindings.lookup(DEFAULT_HOTKEY),
            Some(Trigger::ToggleOverlay)
        );
    }

    #[test]
    fn test_delete_out_of_range() {
        let mut h = Harness::new();
        let err = h.engine.handle(Intent::DeleteAction { index: 99 }).unwrap_err();
        assert!(matches!(err, EngineError::Index { index: 99, len: 6 }));
        assert_eq!(h.engine.config().actions.len(), 6);
    }

    #[test]
    fn test_settings_hotkey_opens_settings() {
        let mut h = Harness::new();
        h.engine.handle_event(AppEvent::Hotkey(Trigger::OpenSettings));
        h.engine.handle(Intent::OpenSettings).unwrap();
        assert_eq!(
            h.drain(),
            vec![Broadcast::SettingsOpen, Broadcast::SettingsOpen]
        );
        assert_eq!(h.engine.overlay(), OverlayState::Hidden);
    }

    #[test]
    fn test_reload_adopts_external_edit() {
        let mut h = Harness::new();
        h.drain();

        let mut edited = h.engine.config().clone();
        edited.ring_size = 420;
        edited.hotkey = Accelerator::new("Alt+F1");
        fs_err::write(
            h.dir.path().join("config.json"),
            edited.to_pretty_json().unwrap(),
        )
        .unwrap();

        h.engine.handle_event(AppEvent::ConfigReload);
        assert_eq!(h.engine.config(), &edited);
        assert_eq!(h.bindings.lookup("alt+f1"), Some(Trigger::ToggleOverlay));
        assert_eq!(h.drain().len(), 1);

        h.engine.handle_event(AppEvent::ConfigReload);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_reload_keeps_live_config_on_parse_error() {
        let mut h = Harness::new();
        fs_err::write(h.dir.path().join("config.json"), "{").unwrap();
        h.engine.handle_event(AppEvent::ConfigReload);
        assert_eq!(h.engine.config(), &Config::default());
    }

    #[test]
    fn test_reset_hotkeys() {
        let mut h = Harness::new();
        h.engine
            .handle(Intent::SaveConfig {
                partial: obj(json!({ "hotkey": "Alt+F2", "settingsHotkey": "Alt+F3" })),
            })
            .unwrap();

        let value = h.engine.handle(Intent::ResetHotkeys).unwrap();
        assert_eq!(value["hotkey"], json!(DEFAULT_HOTKEY));
        assert_eq!(h.bindings.lookup("alt+f2"), None);
        assert_eq!(h.bindings.len(), 2);
    }

    #[tokio::test]
    async fn test_actor_serializes_requests() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"), None);
        let config = store.load();
        let h = Harness::with(dir, store, config);

        let (tx, rx) = async_channel::unbounded();
        let (observers, _) = broadcast::channel(16);
        let handle = EngineHandle::new(tx, observers);
        let actor = tokio::spawn(run(h.engine, rx));

        let (a, b) = tokio::join!(
            handle.request(Intent::DeleteAction { index: 0 }),
            handle.request(Intent::DeleteAction { index: 0 }),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        let lens = [a["actions"].as_array().unwrap().len(), b["actions"].as_array().unwrap().len()];
        assert!(lens.contains(&5) && lens.contains(&4));

        handle.fire(Intent::Toggle).await.unwrap();
        handle.send_event(AppEvent::Dismiss).await.unwrap();
        let config = handle.request(Intent::GetConfig).await.unwrap();
        assert_eq!(config["actions"].as_array().unwrap().len(), 4);

        drop(handle);
        let engine = actor.await.unwrap();
        assert_eq!(engine.overlay(), OverlayState::Hidden);
    }
}
