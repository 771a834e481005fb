// fleetalarm-api: Async Rust client for the fleet alarm backend (REST + SSE)

pub mod client;
pub mod error;
pub mod models;
pub mod stream;
pub mod transport;

pub use client::AlarmClient;
pub use error::Error;
pub use models::{AlarmAction, RawRecord};
pub use stream::{ReconnectConfig, StreamConfig, StreamConnection, StreamEvent, StreamHandle, StreamState};
pub use transport::{TlsMode, TransportConfig};
