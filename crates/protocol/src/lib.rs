//! notruf-protocol – Ereignis-Definitionen
//!
//! Dieses Crate definiert alle Ereignisse und Strukturen die zwischen
//! Client und Server ueber die WebSocket-Verbindung ausgetauscht werden.

pub mod events;

pub use events::{ClientEreignis, PresenceEintrag, ServerEreignis};
