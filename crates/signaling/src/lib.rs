//! notruf-signaling – WebSocket Presence- und Signaling-Layer
//!
//! Dieser Crate implementiert den Echtzeit-Teil der Notruf-Leitstelle:
//! wer ist ueber welche Verbindung erreichbar und wo steht er, sowie die
//! Weiterleitung von WebRTC-Signaling-Nachrichten zwischen zwei Verbindungen.
//! Medienstroeme laufen nie ueber den Server.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket Listener (SignalingServer, axum)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Upgrade -> `me` -> Ereignisschleife -> Cleanup
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- PresenceHandler (join, location-update, Verbindungsende)
//!     +-- CallHandler     (callToUser, answeredCall, call-ended, reject-call)
//!
//! PresenceRegistry – User-ID -> Handle, Name, Position
//! EventBroadcaster – Ereignisse an eine, alle oder alle anderen Verbindungen
//! CallSessions     – Offene Anrufe (nur bei `strikte_anrufe`)
//! ```

pub mod broadcast;
pub mod call_session;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod presence;
pub mod server_state;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::EventBroadcaster;
pub use call_session::CallSessions;
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use presence::PresenceRegistry;
pub use server_state::{SignalingConfig, SignalingState};
pub use ws::{signaling_router, SignalingServer, STANDARD_WS_PFAD};
