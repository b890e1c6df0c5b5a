//! OS capabilities used by the pie menu daemon: pointer queries, key-tap
//! synthesis, detached shell commands, and the intent socket client.

pub mod client;
pub mod keys;
pub mod macros;
pub mod spawn;
pub mod wm;
