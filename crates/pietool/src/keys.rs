use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::collections::BTreeSet;
use std::process::Command;
use strum::{Display as StrumDisplay, EnumString};
use thiserror::Error;

/// A modifier held down while a key is tapped.
///
/// Parsing is case-insensitive and accepts the spellings found in stored
/// actions and accelerator strings (`ctrl`, `CommandOrControl`, `meta`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    SerializeDisplay,
    DeserializeFromStr,
    EnumString,
    StrumDisplay,
)]
#[strum(ascii_case_insensitive)]
pub enum Modifier {
    #[strum(to_string = "control", serialize = "ctrl", serialize = "commandorcontrol")]
    Control,
    #[strum(to_string = "shift")]
    Shift,
    #[strum(to_string = "alt")]
    Alt,
    #[strum(to_string = "super", serialize = "command", serialize = "meta")]
    Super,
}

impl Modifier {
    /// Name of the modifier as `xdotool` spells it.
    pub fn xdotool_name(&self) -> &'static str {
        match self {
            Modifier::Control => "ctrl",
            Modifier::Shift => "shift",
            Modifier::Alt => "alt",
            Modifier::Super => "super",
        }
    }
}

#[derive(Debug, Error)]
pub enum KeyTapError {
    #[error("failed to run xdotool: {0}")]
    Io(#[from] std::io::Error),
    #[error("xdotool rejected '{combo}' ({status}): {stderr}")]
    Rejected {
        combo: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Synthesizes a single key press with modifiers held.
pub trait KeySynth: Send {
    fn key_tap(&mut self, key: &str, modifiers: &BTreeSet<Modifier>) -> Result<(), KeyTapError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Xdotool;

impl KeySynth for Xdotool {
    fn key_tap(&mut self, key: &str, modifiers: &BTreeSet<Modifier>) -> Result<(), KeyTapError> {
        let combo = xdotool_combo(key, modifiers);
        let output = crate::spawn::blocking(|| {
            Command::new("xdotool")
                .args(["key", "--clearmodifiers", &combo])
                .output()
        })?;

        if !output.status.success() {
            return Err(KeyTapError::Rejected {
                combo,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Builds the `mod+mod+key` argument understood by `xdotool key`.
pub fn xdotool_combo(key: &str, modifiers: &BTreeSet<Modifier>) -> String {
    modifiers
        .iter()
        .map(|m| m.xdotool_name().to_string())
        .chain(std::iter::once(keysym(key)))
        .collect::<Vec<_>>()
        .join("+")
}

/// Maps the lowercase key names used in stored actions to X keysyms.
/// Single characters and unknown names pass through untouched.
pub fn keysym(key: &str) -> String {
    let named = match key {
        "tab" => "Tab",
        "enter" | "return" => "Return",
        "escape" | "esc" => "Escape",
        "space" => "space",
        "backspace" => "BackSpace",
        "delete" => "Delete",
        "insert" => "Insert",
        "home" => "Home",
        "end" => "End",
        "pageup" => "Prior",
        "pagedown" => "Next",
        "up" => "Up",
        "down" => "Down",
        "left" => "Left",
        "right" => "Right",
        "printscreen" => "Print",
        "audio_mute" => "XF86AudioMute",
        "audio_vol_up" => "XF86AudioRaiseVolume",
        "audio_vol_down" => "XF86AudioLowerVolume",
        "audio_play" => "XF86AudioPlay",
        "audio_next" => "XF86AudioNext",
        "audio_prev" => "XF86AudioPrev",
        _ => {
            return match key.strip_prefix('f') {
                Some(n) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => {
                    format!("F{n}")
                }
                _ => key.to_string(),
            };
        }
    };
    named.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_modifier_spellings() {
        let cases = vec![
            ("ctrl", Modifier::Control),
            ("Control", Modifier::Control),
            ("CommandOrControl", Modifier::Control),
            ("SHIFT", Modifier::Shift),
            ("alt", Modifier::Alt),
            ("super", Modifier::Super),
            ("Command", Modifier::Super),
            ("meta", Modifier::Super),
        ];

        for (raw, expected) in cases {
            assert_eq!(Modifier::from_str(raw).unwrap(), expected, "{raw}");
        }
        assert!(Modifier::from_str("c").is_err());
        assert!(Modifier::from_str("tab").is_err());
    }

    #[test]
    fn test_modifier_serialization() {
        let json = serde_json::to_string(&Modifier::Control).unwrap();
        assert_eq!(json, "\"control\"");
        let parsed: Modifier = serde_json::from_str("\"Meta\"").unwrap();
        assert_eq!(parsed, Modifier::Super);
    }

    #[test]
    fn test_xdotool_combo() {
        let mods = BTreeSet::from([Modifier::Alt, Modifier::Control]);
        assert_eq!(xdotool_combo("tab", &mods), "ctrl+alt+Tab");
        assert_eq!(xdotool_combo("c", &BTreeSet::new()), "c");
    }

    #[test]
    fn test_keysym() {
        assert_eq!(keysym("f5"), "F5");
        assert_eq!(keysym("f"), "f");
        assert_eq!(keysym("foo"), "foo");
        assert_eq!(keysym("enter"), "Return");
    }
}
