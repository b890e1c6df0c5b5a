use crate::config::{self, Config, ConfigStore};
use crate::engine::{Capabilities, Engine, EngineHandle, run as run_engine};
use crate::hotkeys::BindingTable;
use crate::surface::BroadcastSurfaces;
use crate::sys::server;
use pietool::keys::Xdotool;
use pietool::spawn::ShellSpawner;
use pietool::wm::SystemPointer;
use std::path::PathBuf;
use tokio::net::UnixListener;
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 64;

/// Runs the engine, the intent socket and the config watcher until Ctrl-C.
/// Fails without starting anything if the socket cannot be bound.
pub async fn run(store: ConfigStore, config: Config, socket: PathBuf) -> std::io::Result<()> {
    let listener = server::bind(&socket)?;
    let (observers, _) = broadcast::channel(BROADCAST_CAPACITY);

    let caps = Capabilities {
        keys: Box::new(Xdotool),
        spawner: Box::new(ShellSpawner),
        hotkeys: Box::new(BindingTable::default()),
        pointer: Box::new(SystemPointer),
        surfaces: Box::new(BroadcastSurfaces::new(observers.clone())),
    };

    let config_path = store.path().to_path_buf();
    let mut engine = Engine::new(store, config, caps, observers.clone());
    if !engine.start() {
        log::warn!("Not every hotkey could be registered");
    }

    let (tx, rx) = async_channel::bounded(32);
    let handle = EngineHandle::new(tx, observers);

    start_background_services(handle, listener, config_path);

    tokio::select! {
        mut engine = run_engine(engine, rx) => engine.shutdown(),
        _ = tokio::signal::ctrl_c() => log::info!("Shutting down"),
    }
    server::remove_socket(&socket);
    Ok(())
}

fn start_background_services(handle: EngineHandle, listener: UnixListener, config_path: PathBuf) {
    tokio::spawn(config::run_async_watcher(config_path, handle.clone()));
    tokio::spawn(server::run_server(listener, handle));
}
