//! Client configuration.

use std::time::Duration;

use rookery_common::transport::DEFAULT_MAX_FRAME_BYTES;

/// Tunables for a [`Rookery`](crate::Rookery) client.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rookery_client::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_session_timeout(Duration::from_secs(30));
/// assert_eq!(config.session_timeout, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Session timeout requested during the handshake. The server may
    /// negotiate it down or up; heartbeat cadence follows the negotiated
    /// value, not this one.
    pub session_timeout: Duration,
    /// Upper bound on a single wire frame in either direction.
    pub max_frame_bytes: usize,
    /// Cap on the random sleep inserted after a full pass over the host
    /// list without reaching the connected state.
    pub connect_backoff_max: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            session_timeout: Duration::from_secs(10),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            connect_backoff_max: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Sets the requested session timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Sets the maximum frame size.
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Sets the cap on the reconnect backoff sleep.
    pub fn with_connect_backoff_max(mut self, max: Duration) -> Self {
        self.connect_backoff_max = max;
        self
    }
}
