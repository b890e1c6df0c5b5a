use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use pietool::client;
use serde_json::{Value, json};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pietool", version, about = "Drive a running piemenu daemon", long_about = None)]
struct Cli {
    /// Socket the daemon listens on
    #[arg(short, long, env = "PIEMENU_SOCKET")]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Show the pie menu at the cursor, or hide it if it is open
    Toggle,
    /// Hide the pie menu
    Dismiss,
    /// Open the settings surface
    Settings,
    /// Deliver a key combination press to whatever it is bound to
    Press { combo: String },
    /// Print the live configuration
    GetConfig,
    /// Merge top-level keys from a JSON object into the configuration
    SaveConfig { partial: String },
    /// Append an action given as a JSON object
    AddAction { action: String },
    /// Merge a JSON object into the action at INDEX
    UpdateAction { index: i64, patch: String },
    /// Remove the action at INDEX
    DeleteAction { index: i64 },
    /// Run the action at INDEX without touching the menu
    TestAction { index: i64 },
    /// Run an action given as a JSON object, as if picked from the menu
    Execute { action: String },
    /// Restore part of the configuration to its defaults
    Reset { what: ResetTarget },
    /// Print every broadcast from the daemon
    Watch,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ResetTarget {
    Actions,
    Appearance,
    Hotkeys,
}

fn parse_object(raw: &str) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_str(raw).with_context(|| format!("invalid JSON: {raw}"))?;
    anyhow::ensure!(value.is_object(), "expected a JSON object, got: {raw}");
    Ok(value)
}

fn build_request(command: &Commands) -> anyhow::Result<Value> {
    Ok(match command {
        Commands::Toggle => json!({ "intent": "toggle" }),
        Commands::Dismiss => json!({ "intent": "dismiss" }),
        Commands::Settings => json!({ "intent": "open-settings" }),
        Commands::Press { combo } => json!({ "intent": "press-hotkey", "combo": combo }),
        Commands::GetConfig => json!({ "intent": "get-config" }),
        Commands::SaveConfig { partial } => {
            json!({ "intent": "save-config", "partial": parse_object(partial)? })
        }
        Commands::AddAction { action } => {
            json!({ "intent": "add-action", "action": parse_object(action)? })
        }
        Commands::UpdateAction { index, patch } => {
            json!({ "intent": "update-action", "index": index, "patch": parse_object(patch)? })
        }
        Commands::DeleteAction { index } => json!({ "intent": "delete-action", "index": index }),
        Commands::TestAction { index } => json!({ "intent": "test-action", "index": index }),
        Commands::Execute { action } => {
            json!({ "intent": "execute-action", "action": parse_object(action)? })
        }
        Commands::Reset { what } => match what {
            ResetTarget::Actions => json!({ "intent": "reset-actions" }),
            ResetTarget::Appearance => json!({ "intent": "reset-appearance" }),
            ResetTarget::Hotkeys => json!({ "intent": "reset-hotkeys" }),
        },
        Commands::Watch => json!({ "intent": "subscribe" }),
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let socket = cli.socket.unwrap_or_else(client::default_socket_path);
    let request = build_request(&cli.command)?.to_string();

    if let Commands::Watch = cli.command {
        client::stream(&socket, &request, |line| {
            println!("{line}");
            true
        })?;
        return Ok(());
    }

    let reply: Value = serde_json::from_str(&client::request(&socket, &request)?)?;
    if let Some(err) = reply.get("error") {
        anyhow::bail!(
            "{}: {}",
            err.get("kind").and_then(Value::as_str).unwrap_or("error"),
            err.get("message").and_then(Value::as_str).unwrap_or_default()
        );
    }
    match reply.get("ok") {
        Some(Value::Null) | None => {}
        Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
