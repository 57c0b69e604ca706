//! Gemeinsame Identifikationstypen fuer Notruf
//!
//! IDs verwenden das Newtype-Pattern um Verwechslungen mit den frei
//! gewaehlten User-IDs der Clients (einfache Strings) zur Compilezeit
//! auszuschliessen.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::NotrufError;

/// Opakes Handle einer einzelnen WebSocket-Verbindung
///
/// Wird beim Verbindungsaufbau vergeben und dem Client per `me` mitgeteilt.
/// Clients adressieren Signaling-Nachrichten ueber dieses Handle, deshalb
/// ist die Textform die nackte UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerbindungsId(pub Uuid);

impl VerbindungsId {
    /// Erstellt eine neue zufaellige VerbindungsId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VerbindungsId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VerbindungsId {
    type Err = NotrufError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| NotrufError::UngueltigesHandle(s.trim().to_string()))
    }
}
