//! Browser driver error types.

use thiserror::Error;

/// Result alias for browser operations.
pub type Result<T> = std::result::Result<T, BrowserError>;

/// Errors that can occur while driving the browser.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The browser process could not be started.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// The DevTools page target could not be discovered.
    #[error("devtools target discovery failed: {0}")]
    Discovery(String),

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The browser answered a command with an error, or sent something
    /// that does not parse as a CDP message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A bounded wait expired.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The connection to the browser was closed.
    #[error("browser connection closed")]
    Closed,

    /// HTTP failure talking to the DevTools discovery endpoint.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem failure (screenshot write, profile dir).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
