//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the session runtime from a specific
//! connection implementation. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::future::Future;

/// Abstracts the relay connection for the session runtime.
///
/// Implementations own the raw connection handle; nothing else in the
/// session ever touches it. This ensures the same orchestration code runs
/// against a real WebSocket and in simulation.
///
/// # Implementations
///
/// - **CLI**: WebSocket via `courier_client::transport`
/// - **Simulation**: scripted relay recording outgoing frames
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Establish a connection to the session URL.
    ///
    /// Resolves once the handshake completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn connect(&mut self, url: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or the send fails.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receive the next text frame.
    ///
    /// Returns `None` once the connection is closed. Must be cancel safe: the
    /// runtime polls it alongside commands and timers.
    fn recv_text(&mut self) -> impl Future<Output = Option<String>> + Send;

    /// Check if a connection is established.
    fn is_connected(&self) -> bool;

    /// Close the connection and release its resources. Idempotent.
    fn disconnect(&mut self);
}
