use clap::Parser;
use piemenu::config::{self, ConfigStore};
use piemenu::sys::runtime;
use pietool::client;
use std::path::PathBuf;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(version, about = "Radial quick-launcher daemon", long_about = None)]
struct Args {
    /// Config document to use instead of the per-user one
    #[arg(short, long, env = "PIEMENU_CONFIG")]
    config: Option<PathBuf>,

    /// Socket to accept intents on
    #[arg(short, long, env = "PIEMENU_SOCKET")]
    socket: Option<PathBuf>,

    /// Document copied into place on first run
    #[arg(long)]
    template: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let template = args.template.or_else(config::bundled_template_path);
    let path = match args.config {
        Some(path) => path,
        None => config::get_config_path()?,
    };
    let store = ConfigStore::new(path, template);
    log::info!("Config path: {}", store.path().display());

    let config = store.load();
    let socket = args.socket.unwrap_or_else(client::default_socket_path);

    Runtime::new()?.block_on(runtime::run(store, config, socket))?;
    Ok(())
}
