//! Injected SASL capability.
//!
//! The core never implements a SASL mechanism. If the application supplies
//! a [`SaslClient`], the session engine hands it the freshly established
//! connection right after the handshake succeeds, before any user request
//! is written. A failed handshake is terminal: the engine transitions to
//! the auth-failed state.

use std::future::Future;
use std::pin::Pin;

use tokio::net::TcpStream;

use rookery_common::{FrameConnection, Result};

/// Drives a SASL exchange over a newly connected session.
///
/// Implementations own the mechanism (token generation, challenge
/// evaluation) and use the connection only to move opaque frames. The
/// engine calls this once per TCP connection, including reconnects.
pub trait SaslClient: Send + Sync {
    fn authenticate<'a>(
        &'a self,
        conn: &'a mut FrameConnection<TcpStream>,
        session_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
