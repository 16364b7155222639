pub mod backoff;
pub mod connection;
pub mod ws;

pub use backoff::{BackoffPolicy, DisconnectReason};
pub use connection::{ConnectionState, Connector, Frame, MessageHandler, Session, StreamConnection};
pub use ws::WsConnector;
