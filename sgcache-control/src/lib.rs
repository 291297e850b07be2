//! In-process start/stop/poll/ping control plane for the event
//! follower and the scanner, exposed over a small line-delimited JSON
//! protocol on a local socket.

pub mod client;
pub mod protocol;
pub mod server;
pub mod state;

pub use client::{default_socket_path, ClientError, ControlClient};
pub use protocol::{Command, Reply, Request};
pub use server::ControlServer;
pub use state::ControlState;
