use derive_more::{AsRef, Deref, Display, From, Into};
use hyprland::data::CursorPosition;
use hyprland::prelude::*;
use serde::{Deserialize, Serialize};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Shifts the point up and to the left by `by` on both axes.
    pub fn offset(self, by: f64) -> Self {
        Self::new(self.x - by, self.y - by)
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Deref, From, Into, AsRef,
)]
#[serde(transparent)]
pub struct ShellCommand(String);

crate::impl_string_newtype!(ShellCommand);

/// Reports where the pointer currently is, in global screen coordinates.
pub trait Pointer: Send {
    fn cursor_position(&self) -> Option<Point>;
}

/// Asks Hyprland first and falls back to `xdotool` on other X11 sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPointer;

impl Pointer for SystemPointer {
    fn cursor_position(&self) -> Option<Point> {
        crate::spawn::blocking(|| hyprland_cursor().or_else(xdotool_cursor))
    }
}

fn hyprland_cursor() -> Option<Point> {
    // The hyprland crate expects its instance variable to be set.
    std::env::var_os("HYPRLAND_INSTANCE_SIGNATURE")?;
    let cursor = CursorPosition::get().ok()?;
    Some(Point::new(cursor.x as f64, cursor.y as f64))
}

fn xdotool_cursor() -> Option<Point> {
    let output = Command::new("xdotool")
        .args(["getmouselocation", "--shell"])
        .output()
        .ok()?;
    if !output.status.success() {
        log::debug!("xdotool getmouselocation exited with {}", output.status);
        return None;
    }
    parse_mouse_location(&String::from_utf8_lossy(&output.stdout))
}

/// Parses the `KEY=value` lines printed by `xdotool getmouselocation --shell`.
pub fn parse_mouse_location(output: &str) -> Option<Point> {
    let (mut x, mut y) = (None, None);
    for line in output.lines() {
        match line.trim().split_once('=') {
            Some(("X", v)) => x = v.parse::<f64>().ok(),
            Some(("Y", v)) => y = v.parse::<f64>().ok(),
            _ => {}
        }
    }
    Some(Point::new(x?, y?))
}
