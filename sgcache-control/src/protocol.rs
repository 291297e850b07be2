//! The control plane's wire shape: one JSON object per line.
//!
//! Grounded on the original implementation's `Controller._handle_child`
//! (newline-delimited JSON, `type` names the handler, the rest of the
//! object is passed as keyword arguments) and `commands/ctrl.py` (the
//! CLI-side client sends one such line and reads one reply line back).
//! This rework adds a `subsystem` field absent from the original, since
//! one process here multiplexes both the follower's and the scanner's
//! control surface over a single socket rather than running them as
//! separate processes each with their own control listener.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The four recognised command names. `Poll` carries an optional
/// `wait` flag: when true, the caller blocks until the woken loop
/// iteration completes rather than returning immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Ping,
    Start,
    Stop,
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub command: Command,
    /// Which long-running subsystem this command targets (`"follower"`
    /// or `"scanner"`). Absent only for `ping`, which answers for the
    /// server process as a whole.
    #[serde(default)]
    pub subsystem: Option<String>,
    #[serde(default)]
    pub wait: bool,
    /// A client-assigned correlation id, echoed back in the reply's
    /// `for` field so a client pipelining multiple commands on one
    /// connection can match replies to requests.
    #[serde(default)]
    pub session: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    #[serde(rename = "for", skip_serializing_if = "Option::is_none")]
    pub session: Option<i64>,
    #[serde(flatten)]
    pub body: JsonValue,
}

impl Reply {
    pub fn new(session: Option<i64>, body: JsonValue) -> Self {
        Reply { session, body }
    }
}
