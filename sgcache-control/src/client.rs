//! The control plane client: sends one command to a running instance
//! and reads back its reply.
//!
//! Grounded on the original implementation's `commands/ctrl.py`, which
//! opens the control socket, writes one JSON line, and reads one JSON
//! line back before exiting — this rework keeps one connection per
//! call rather than pooling, since control commands are rare and
//! latency-insensitive.

use std::path::Path;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use tokio::net::UnixStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::protocol::{Command, Reply, Request};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("control socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("control socket reply was not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("control call timed out")]
    Timeout,
    #[error("connection closed before a reply arrived")]
    ClosedEarly,
}

pub struct ControlClient {
    socket_path: std::path::PathBuf,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(socket_path: impl Into<std::path::PathBuf>, timeout: Duration) -> Self {
        ControlClient {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    pub async fn ping(&self) -> Result<JsonValue, ClientError> {
        self.call(Command::Ping, None, false).await
    }

    pub async fn start(&self, subsystem: &str) -> Result<JsonValue, ClientError> {
        self.call(Command::Start, Some(subsystem), false).await
    }

    pub async fn stop(&self, subsystem: &str) -> Result<JsonValue, ClientError> {
        self.call(Command::Stop, Some(subsystem), false).await
    }

    pub async fn poll(&self, subsystem: &str, wait: bool) -> Result<JsonValue, ClientError> {
        self.call(Command::Poll, Some(subsystem), wait).await
    }

    async fn call(&self, command: Command, subsystem: Option<&str>, wait: bool) -> Result<JsonValue, ClientError> {
        let fut = self.call_inner(command, subsystem, wait);
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn call_inner(
        &self,
        command: Command,
        subsystem: Option<&str>,
        wait: bool,
    ) -> Result<JsonValue, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (reader, writer) = stream.into_split();
        let mut lines = FramedRead::new(reader, LinesCodec::new());
        let mut out = FramedWrite::new(writer, LinesCodec::new());

        let request = Request {
            command,
            subsystem: subsystem.map(str::to_string),
            wait,
            session: None,
        };
        let line = serde_json::to_string(&request)?;
        out.send(line).await.map_err(std::io::Error::from)?;

        let reply_line = lines
            .next()
            .await
            .ok_or(ClientError::ClosedEarly)?
            .map_err(std::io::Error::from)?;
        let reply: Reply = serde_json::from_str(&reply_line)?;
        Ok(reply.body)
    }
}

pub fn default_socket_path() -> std::path::PathBuf {
    Path::new("/tmp/sgcache.sock").to_path_buf()
}
