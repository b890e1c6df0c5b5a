//! Configuration and action engine behind the pie menu.

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod hotkeys;
pub mod protocol;
pub mod registry;
pub mod surface;
pub mod sys;
