//! WebSocket driver for the session runtime.

use std::time::Duration;

use courier_app::Driver;
use courier_client::transport::{self, ConnectedClient, DEFAULT_CONNECT_TIMEOUT, TransportError};

/// [`Driver`] over a real relay WebSocket.
pub struct WsDriver {
    connection: Option<ConnectedClient>,
    connect_timeout: Duration,
}

impl Default for WsDriver {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WsDriver {
    /// Driver whose handshakes give up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connection: None, connect_timeout }
    }
}

impl Driver for WsDriver {
    type Error = TransportError;

    async fn connect(&mut self, url: &str) -> Result<(), Self::Error> {
        self.disconnect();
        let client = transport::connect(url, self.connect_timeout).await?;
        self.connection = Some(client);
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), Self::Error> {
        match &self.connection {
            Some(client) => client.send(text).await,
            None => Err(TransportError::Closed),
        }
    }

    async fn recv_text(&mut self) -> Option<String> {
        match self.connection.as_mut() {
            Some(client) => client.recv().await,
            None => None,
        }
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn disconnect(&mut self) {
        if let Some(client) = self.connection.take() {
            client.stop();
        }
    }
}

impl Drop for WsDriver {
    fn drop(&mut self) {
        self.disconnect();
    }
}
