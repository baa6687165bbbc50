//! Live notification fan-out over websocket connections.

pub mod hub;
pub mod session;
pub mod transport;

pub use hub::{Hub, HubError, HubStats, SessionKey};
pub use session::{start_session, DEFAULT_QUEUE_CAPACITY};
