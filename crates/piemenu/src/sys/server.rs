use crate::engine::EngineHandle;
use crate::error::EngineError;
use crate::events::Broadcast;
use crate::protocol::{Intent, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::{self, error::RecvError};

/// Binds the intent socket, replacing a stale one left by an earlier run.
pub fn bind(socket: &Path) -> std::io::Result<UnixListener> {
    // Cleanup old socket if it exists
    if fs_err::metadata(socket).is_ok() {
        let _ = fs_err::remove_file(socket);
    }

    let listener = UnixListener::bind(socket).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("failed to bind unix socket {}: {}", socket.display(), e),
        )
    })?;
    log::info!("Listening on {}", socket.display());
    Ok(listener)
}

pub async fn run_server(listener: UnixListener, engine: EngineHandle) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, engine).await {
                        log::debug!("Connection closed: {}", e);
                    }
                });
            }
            Err(e) => {
                log::error!("Failed to accept connection: {}", e);
            }
        }
    }
}

pub fn remove_socket(socket: &Path) {
    if let Err(e) = fs_err::remove_file(socket) {
        log::debug!("Could not remove socket: {}", e);
    }
}

async fn serve_connection(stream: UnixStream, engine: EngineHandle) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let intent = match serde_json::from_str::<Intent>(&line) {
            Ok(intent) => intent,
            Err(e) => {
                let reply = Response::from(Err(EngineError::Protocol(e.to_string())));
                write_line(&mut writer, &reply).await?;
                continue;
            }
        };

        if intent == Intent::Subscribe {
            let rx = engine.subscribe();
            write_line(&mut writer, &Response::Ok(serde_json::Value::Null)).await?;
            return forward_broadcasts(rx, &mut writer).await;
        }

        let reply = Response::from(dispatch(intent, &engine).await);
        write_line(&mut writer, &reply).await?;
    }
    Ok(())
}

async fn dispatch(intent: Intent, engine: &EngineHandle) -> Result<serde_json::Value, EngineError> {
    match intent {
        intent if intent.is_fire() => {
            engine.fire(intent).await?;
            Ok(serde_json::Value::Null)
        }
        intent => engine.request(intent).await,
    }
}

async fn forward_broadcasts<W: AsyncWrite + Unpin>(
    mut rx: broadcast::Receiver<Broadcast>,
    writer: &mut W,
) -> std::io::Result<()> {
    loop {
        match rx.recv().await {
            Ok(event) => write_line(writer, &event).await?,
            Err(RecvError::Lagged(n)) => log::warn!("Observer fell behind by {} broadcasts", n),
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    value: &impl serde::Serialize,
) -> std::io::Result<()> {
    let mut text = serde_json::to_string(value)?;
    text.push('\n');
    writer.write_all(text.as_bytes()).await
}
