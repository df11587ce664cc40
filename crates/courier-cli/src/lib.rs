//! Line-oriented terminal client for the Courier relay.
//!
//! Wires the session runtime to real collaborators: a WebSocket
//! [`WsDriver`], the REST directory and the system environment. The
//! [`console`] reads commands from stdin and prints session updates.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod command;
pub mod console;
pub mod error;
pub mod ws_driver;

pub use command::{Command, CommandError};
pub use error::CliError;
pub use ws_driver::WsDriver;

/// WebSocket endpoint of the relay serving the directory at `server`.
///
/// `http` maps to `ws` and `https` to `wss`; other URLs are used as given.
pub fn websocket_endpoint(server: &str) -> String {
    let server = server.trim_end_matches('/');
    if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        server.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_follows_scheme() {
        assert_eq!(websocket_endpoint("http://localhost:8080/"), "ws://localhost:8080");
        assert_eq!(websocket_endpoint("https://chat.example.com"), "wss://chat.example.com");
        assert_eq!(websocket_endpoint("ws://relay:9000"), "ws://relay:9000");
    }
}
