//! Fehlertypen fuer Notruf
//!
//! Zentraler Fehler-Enum fuer crate-uebergreifende Fehlerzustaende.
//! Untermodule koennen eigene Fehler definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Alle crate-uebergreifenden Fehler im Notruf-System
#[derive(Debug, Error)]
pub enum NotrufError {
    #[error("Ungueltiges Verbindungs-Handle: {0}")]
    UngueltigesHandle(String),
}
