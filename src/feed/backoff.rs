use std::time::Duration;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_REFUSED_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_ERROR_DELAY: Duration = Duration::from_secs(10);

/// Why the connection dropped back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Connect attempt hit an I/O error (refused, reset) or the peer closed
    /// during the handshake.
    ConnectRefused,
    /// Any other connect failure: bad handshake response, TLS, invalid URL.
    ConnectFailed,
    /// An established stream ended: peer close, read error, protocol error.
    StreamClosed,
    /// The message handler reported an unexpected error and the receive
    /// loop was abandoned.
    HandlerAborted,
}

/// Fixed-interval, two-tier reconnect policy.
///
/// A stream that dropped after connecting is retried on the short tier.
/// Failures to connect (and aborted receive loops) wait on the long tier,
/// which is split between refused and unexpected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub reconnect: Duration,
    pub connect_refused: Duration,
    pub connect_error: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            reconnect: DEFAULT_RECONNECT_DELAY,
            connect_refused: DEFAULT_CONNECT_REFUSED_DELAY,
            connect_error: DEFAULT_CONNECT_ERROR_DELAY,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, reason: DisconnectReason) -> Duration {
        match reason {
            DisconnectReason::StreamClosed => self.reconnect,
            DisconnectReason::ConnectRefused => self.connect_refused,
            DisconnectReason::ConnectFailed | DisconnectReason::HandlerAborted => {
                self.connect_error
            }
        }
    }
}
