use async_trait::async_trait;
use tokio::sync::watch;

use super::backoff::{BackoffPolicy, DisconnectReason};
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: shutdown was requested.
    Draining,
}

/// One transport-level message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping/pong and other keep-alive traffic.
    Control,
    Close,
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    fn endpoint(&self) -> &str;

    async fn connect(&self) -> Result<Self::Session, TransportError>;
}

#[async_trait]
pub trait Session: Send {
    /// `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    async fn close(&mut self);
}

pub trait MessageHandler: Send {
    /// Returning `Err` abandons the current session. Bad payloads are the
    /// handler's own business and must not be reported here.
    fn on_message(&mut self, raw: &[u8]) -> anyhow::Result<()>;
}

enum SessionEnd {
    Shutdown,
    Dropped(DisconnectReason),
}

/// Persistent connection driver:
/// `Disconnected -> Connecting -> Connected -> Disconnected -> ...`, with
/// `Draining` entered only on shutdown.
pub struct StreamConnection<C> {
    connector: C,
    backoff: BackoffPolicy,
    state_tx: watch::Sender<ConnectionState>,
}

impl<C: Connector> StreamConnection<C> {
    pub fn new(connector: C, backoff: BackoffPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            backoff,
            state_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = self.state_tx.send_replace(state);
        if prev != state {
            tracing::debug!(from = ?prev, to = ?state, "Connection state changed");
        }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped),
    /// feeding every inbound payload to `handler` in arrival order.
    pub async fn run<H: MessageHandler>(
        &self,
        handler: &mut H,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let endpoint = self.connector.endpoint().to_string();
        let mut attempt: u64 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            attempt += 1;
            self.set_state(ConnectionState::Connecting);
            tracing::info!(endpoint = %endpoint, attempt, "Connecting to stream");

            let connected = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                res = self.connector.connect() => res,
            };

            let reason = match connected {
                Ok(mut session) => {
                    attempt = 0;
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(endpoint = %endpoint, "Stream connected");

                    match self.receive(&mut session, handler, &mut shutdown).await {
                        SessionEnd::Shutdown => {
                            self.set_state(ConnectionState::Draining);
                            session.close().await;
                            break;
                        }
                        SessionEnd::Dropped(reason) => reason,
                    }
                }
                Err(e) => {
                    let reason = if e.is_refusal() {
                        DisconnectReason::ConnectRefused
                    } else {
                        DisconnectReason::ConnectFailed
                    };
                    tracing::warn!(endpoint = %endpoint, error = %e, ?reason, "Stream connect failed");
                    reason
                }
            };

            self.set_state(ConnectionState::Disconnected);
            let delay = self.backoff.delay_for(reason);
            tracing::warn!(
                ?reason,
                delay_ms = delay.as_millis() as u64,
                "Disconnected; waiting before reconnect"
            );

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::info!("Shutdown during reconnect backoff");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Draining);
        tracing::info!(endpoint = %endpoint, "Stream connection drained");
    }

    async fn receive<H: MessageHandler>(
        &self,
        session: &mut C::Session,
        handler: &mut H,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            let frame = tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => return SessionEnd::Shutdown,
                frame = session.next_frame() => frame,
            };

            let payload = match frame {
                Some(Ok(Frame::Text(text))) => text.into_bytes(),
                Some(Ok(Frame::Binary(data))) => data,
                Some(Ok(Frame::Control)) => continue,
                Some(Ok(Frame::Close)) | None => {
                    tracing::info!("Stream closed by peer");
                    return SessionEnd::Dropped(DisconnectReason::StreamClosed);
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Stream read error");
                    return SessionEnd::Dropped(DisconnectReason::StreamClosed);
                }
            };

            if let Err(e) = handler.on_message(&payload) {
                tracing::error!(error = %e, "Message handler failed; abandoning session");
                return SessionEnd::Dropped(DisconnectReason::HandlerAborted);
            }
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender can never request
/// it, so that counts as shutdown as well.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
