//! SCPI protocol connection handler.
//!
//! Frames newline-terminated commands, executes them against the shared
//! device and writes one response line per non-blank command.

use super::parser::{decode_line, Command, ErrorCode, ParseResult, Parser, Response};
use crate::device::{legacy_pair, DeviceState};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

/// Read buffer size
const BUFFER_SIZE: usize = 4 * 1024;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handle a single client connection.
///
/// Returns `Ok` when the peer closes its side or stays idle for
/// `idle_timeout`; I/O faults are returned to the caller.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    device: Arc<DeviceState>,
    idle_timeout: Duration,
) -> Result<(), HandlerError> {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        let n = match tokio::time::timeout(idle_timeout, stream.read_buf(&mut buffer)).await {
            Ok(read) => read?,
            Err(_) => {
                debug!(peer = %peer, "Idle timeout, closing connection");
                return Ok(());
            }
        };
        if n == 0 {
            // Connection closed, any partial line is dropped
            trace!(peer = %peer, "Connection closed by client");
            return Ok(());
        }

        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line = buffer.split_to(pos + 1);
            let text = decode_line(&line[..pos]);

            let parsed = Parser::parse(&text);
            if matches!(parsed, ParseResult::Empty) {
                continue;
            }
            info!(peer = %peer, command = %text.trim(), "SCPI command");

            let response = match parsed {
                ParseResult::Complete(command) => execute_command(&command, &device).await?,
                ParseResult::Error(e) => {
                    debug!(peer = %peer, error = %e, "Parse error");
                    Response::error(ErrorCode::BadSyntax)
                }
                ParseResult::Empty => continue,
            };

            stream.write_all(&response).await?;
        }
    }
}

/// Execute a parsed command and build its response line
pub async fn execute_command(
    command: &Command,
    device: &Arc<DeviceState>,
) -> Result<BytesMut, HandlerError> {
    match command {
        Command::SelectSwitchPath { switch, path } => match valid_pair(*switch, *path) {
            Some((switch, path)) => {
                apply(device, switch, path).await?;
                Ok(BytesMut::from(Response::ok()))
            }
            None => Ok(Response::error(ErrorCode::InvalidArgs)),
        },

        Command::SelectLegacyPath(n) => match legacy_pair(*n) {
            Some((switch, path)) => {
                apply(device, switch, path).await?;
                Ok(BytesMut::from(Response::ok()))
            }
            None => Ok(Response::error(ErrorCode::InvalidPath)),
        },

        Command::QueryState => {
            let snapshot = device.snapshot().await;
            Ok(Response::state(&snapshot)?)
        }

        Command::Unrecognized => Ok(Response::error(ErrorCode::Unknown)),
    }
}

/// Range check a SWITCH:SELECT pair
fn valid_pair(switch: i64, path: i64) -> Option<(u8, u8)> {
    match (switch, path) {
        (1..=2, 1..=4) => Some((switch as u8, path as u8)),
        _ => None,
    }
}

/// Run the selection on its own task so that dropping the connection
/// cannot interrupt it halfway.
async fn apply(
    device: &Arc<DeviceState>,
    switch: u8,
    path: u8,
) -> Result<(), tokio::task::JoinError> {
    let device = Arc::clone(device);
    tokio::spawn(async move { device.apply_selection(switch, path).await }).await
}
