use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SOCKET_NAME: &str = "piemenu.sock";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to piemenu daemon at {path}: {source}. Is piemenu running?")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("daemon closed the connection without replying")]
    NoReply,
}

/// `$XDG_RUNTIME_DIR/piemenu.sock`, or `/tmp/piemenu.sock` without a runtime dir.
pub fn default_socket_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(SOCKET_NAME)
}

fn connect(socket: &Path) -> Result<UnixStream, ClientError> {
    UnixStream::connect(socket).map_err(|source| ClientError::Connect {
        path: socket.to_path_buf(),
        source,
    })
}

/// Sends one request line and returns the single reply line.
pub fn request(socket: &Path, line: &str) -> Result<String, ClientError> {
    let mut stream = connect(socket)?;
    writeln!(stream, "{}", line)?;

    let mut reply = String::new();
    if BufReader::new(stream).read_line(&mut reply)? == 0 {
        return Err(ClientError::NoReply);
    }
    Ok(reply.trim_end().to_string())
}

/// Sends one request line and hands every line the daemon writes back to
/// `on_line` until the connection closes or `on_line` returns `false`.
pub fn stream(
    socket: &Path,
    line: &str,
    mut on_line: impl FnMut(&str) -> bool,
) -> Result<(), ClientError> {
    let mut stream = connect(socket)?;
    writeln!(stream, "{}", line)?;

    for received in BufReader::new(stream).lines() {
        if !on_line(&received?) {
            break;
        }
    }
    Ok(())
}
