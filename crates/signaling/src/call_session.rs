//! Anrufsitzungen – optionale Zustandspruefung fuer den Signaling-Relay
//!
//! Im Standardbetrieb ist der Relay zustandslos und vertraut den Adressen,
//! die Clients zurueckschicken. Mit `strikte_anrufe` fuehrt der Server
//! stattdessen pro Anruf eine Sitzung und verwirft Schritte, die zu keiner
//! offenen Sitzung passen.
//!
//! ## State Machine
//! ```text
//! (kein Eintrag) --anruf_starten--> Klingelt --annehmen--> Angenommen
//!                                      |                       |
//!                                  ablehnen / beenden       beenden
//!                                      v                       v
//!                                 (entfernt)              (entfernt)
//! ```

use notruf_core::types::VerbindungsId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{SignalingError, SignalingResult};

/// Serverseitig vergebene Anruf-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnrufId(pub Uuid);

impl AnrufId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnrufId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnrufId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anruf:{}", self.0)
    }
}

/// Zustand einer offenen Anrufsitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrufZustand {
    Klingelt,
    Angenommen,
}

/// Eine offene Anrufsitzung zwischen zwei Verbindungen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    pub id: AnrufId,
    pub anrufer: VerbindungsId,
    pub angerufener: VerbindungsId,
    pub zustand: AnrufZustand,
}

impl CallSession {
    fn verbindet(&self, a: &VerbindungsId, b: &VerbindungsId) -> bool {
        (self.anrufer == *a && self.angerufener == *b)
            || (self.anrufer == *b && self.angerufener == *a)
    }

    fn betrifft(&self, v: &VerbindungsId) -> bool {
        self.anrufer == *v || self.angerufener == *v
    }
}

/// Tabelle aller offenen Anrufsitzungen
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct CallSessions {
    sitzungen: Arc<Mutex<HashMap<AnrufId, CallSession>>>,
}

impl CallSessions {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Oeffnet eine neue Sitzung im Zustand `Klingelt`
    ///
    /// Eine noch klingelnde Sitzung desselben Anrufers beim selben Ziel wird
    /// ersetzt (erneutes Waehlen).
    pub fn anruf_starten(&self, anrufer: VerbindungsId, angerufener: VerbindungsId) -> AnrufId {
        let mut sitzungen = self.sitzungen.lock();
        sitzungen.retain(|_, s| {
            !(s.anrufer == anrufer && s.angerufener == angerufener && s.zustand == AnrufZustand::Klingelt)
        });

        let id = AnrufId::new();
        sitzungen.insert(
            id,
            CallSession {
                id,
                anrufer,
                angerufener,
                zustand: AnrufZustand::Klingelt,
            },
        );
        tracing::debug!(anruf = %id, anrufer = %anrufer, angerufener = %angerufener, "Anrufsitzung geoeffnet");
        id
    }

    /// Angerufener `von` nimmt den Anruf von `an` an
    pub fn annehmen(&self, von: &VerbindungsId, an: &VerbindungsId) -> SignalingResult<AnrufId> {
        let mut sitzungen = self.sitzungen.lock();
        let sitzung = sitzungen
            .values_mut()
            .find(|s| {
                s.angerufener == *von && s.anrufer == *an && s.zustand == AnrufZustand::Klingelt
            })
            .ok_or_else(|| SignalingError::uebergang(format!("kein klingelnder Anruf von {an} an {von}")))?;

        sitzung.zustand = AnrufZustand::Angenommen;
        Ok(sitzung.id)
    }

    /// Angerufener `von` lehnt den Anruf von `an` ab
    pub fn ablehnen(&self, von: &VerbindungsId, an: &VerbindungsId) -> SignalingResult<AnrufId> {
        let mut sitzungen = self.sitzungen.lock();
        let id = sitzungen
            .values()
            .find(|s| {
                s.angerufener == *von && s.anrufer == *an && s.zustand == AnrufZustand::Klingelt
            })
            .map(|s| s.id)
            .ok_or_else(|| SignalingError::uebergang(format!("kein klingelnder Anruf von {an} an {von}")))?;

        sitzungen.remove(&id);
        Ok(id)
    }

    /// Eine der beiden Seiten beendet den Anruf (klingelnd oder angenommen)
    pub fn beenden(&self, von: &VerbindungsId, an: &VerbindungsId) -> SignalingResult<AnrufId> {
        let mut sitzungen = self.sitzungen.lock();
        let id = sitzungen
            .values()
            .find(|s| s.verbindet(von, an))
            .map(|s| s.id)
            .ok_or_else(|| SignalingError::uebergang(format!("kein Anruf zwischen {von} und {an}")))?;

        sitzungen.remove(&id);
        Ok(id)
    }

    /// Schliesst alle Sitzungen an denen `verbindung` beteiligt ist
    pub fn verbindung_entfernen(&self, verbindung: &VerbindungsId) -> Vec<CallSession> {
        let mut sitzungen = self.sitzungen.lock();
        let betroffen: Vec<AnrufId> = sitzungen
            .values()
            .filter(|s| s.betrifft(verbindung))
            .map(|s| s.id)
            .collect();

        betroffen
            .iter()
            .filter_map(|id| sitzungen.remove(id))
            .collect()
    }

    /// Verwirft eine Sitzung, deren `callToUser` nicht zugestellt wurde
    pub fn entfernen(&self, id: &AnrufId) -> Option<CallSession> {
        self.sitzungen.lock().remove(id)
    }

    /// Gibt die Sitzung zurueck
    pub fn sitzung(&self, id: &AnrufId) -> Option<CallSession> {
        self.sitzungen.lock().get(id).cloned()
    }

    /// Anzahl offener Sitzungen
    pub fn anzahl(&self) -> usize {
        self.sitzungen.lock().len()
    }
}
