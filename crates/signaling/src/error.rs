//! Fehlertypen fuer den Signaling-Service

use notruf_core::NotrufError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
///
/// Kein Fehler verlaesst den Handler der ihn ausgeloest hat; die Varianten
/// dienen der Protokollierung und der Entscheidung, ob der Absender eine
/// Rueckmeldung bekommt.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (Socket, Listener)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Fehler aus notruf-core
    #[error(transparent)]
    Core(#[from] NotrufError),

    /// Protokollfehler (ungueltiges Ereignis, fehlendes Pflichtfeld)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Ziel nicht gefunden (User nicht online, Verbindung unbekannt)
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Signaling-Schritt passt zu keiner offenen Anrufsitzung
    #[error("Ungueltiger Anruf-Uebergang: {0}")]
    UngueltigerUebergang(String),

    /// Senden an Client fehlgeschlagen (Queue voll oder geschlossen)
    #[error("Senden fehlgeschlagen")]
    SendFehler,
}

impl SignalingError {
    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Erstellt einen Uebergangsfehler
    pub fn uebergang(msg: impl Into<String>) -> Self {
        Self::UngueltigerUebergang(msg.into())
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
