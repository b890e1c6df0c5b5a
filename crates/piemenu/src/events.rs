use crate::config::Config;
use crate::hotkeys::Trigger;
use serde::Serialize;

/// Things that happen to the engine without a caller waiting on a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Hotkey(Trigger),
    Dismiss,
    ConfigReload,
}

/// Pushed to every observer surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Broadcast {
    ConfigUpdate { config: Config },
    OverlayShow { x: f64, y: f64, extent: u32 },
    OverlayResize { extent: u32 },
    OverlayHide,
    SettingsOpen,
}
