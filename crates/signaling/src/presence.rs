//! Presence-Registry – Wer ist erreichbar, ueber welche Verbindung, wo?
//!
//! Haelt den ephemeren Zustand aller gemeldeten User: Anzeigename, aktuelle
//! Verbindung und letzte Position. Nichts davon wird persistiert; nach einem
//! Neustart ist die Registry leer.
//!
//! ## Nebenlaeufigkeit
//! Alle Operationen sind Read-Modify-Write auf derselben Tabelle und laufen
//! deshalb hinter einem einzigen Mutex. Jede mutierende Operation uebergibt
//! den neuen Snapshot an `verteilen`, solange der Lock noch gehalten wird.
//! Damit kommen Snapshots bei jedem Empfaenger in Mutationsreihenfolge an;
//! `verteilen` darf deshalb nicht blockieren (nur `try_send`).

use chrono::Utc;
use notruf_core::types::VerbindungsId;
use notruf_protocol::events::PresenceEintrag;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Verwaltet die Erreichbarkeit aller gemeldeten User
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    /// User-ID -> Eintrag. BTreeMap fuer eine stabile Snapshot-Reihenfolge.
    eintraege: Arc<Mutex<BTreeMap<String, PresenceEintrag>>>,
}

impl PresenceRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self::default()
    }

    /// Meldet einen User ueber `join` an
    ///
    /// Unbekannte User werden ohne Position angelegt. Bekannte User behalten
    /// ihre Position; Name und Verbindung werden ueberschrieben.
    /// Gibt `None` zurueck wenn die User-ID leer ist, sonst das Ergebnis
    /// von `verteilen`.
    pub fn beitritt<R>(
        &self,
        user_id: &str,
        name: Option<&str>,
        verbindung: VerbindungsId,
        verteilen: impl FnOnce(Vec<PresenceEintrag>) -> R,
    ) -> Option<R> {
        if ist_leer(user_id) {
            return None;
        }

        let mut eintraege = self.eintraege.lock();
        let eintrag = eintraege
            .entry(user_id.to_string())
            .or_insert_with(|| leerer_eintrag(user_id, verbindung));

        if let Some(name) = name {
            eintrag.display_name = Some(name.to_string());
        }
        if eintrag.connection_handle != verbindung {
            tracing::debug!(
                user_id = %user_id,
                alt = %eintrag.connection_handle,
                neu = %verbindung,
                "Verbindung eines Users ersetzt"
            );
        }
        eintrag.connection_handle = verbindung;
        eintrag.last_seen = Utc::now();

        tracing::info!(user_id = %user_id, verbindung = %verbindung, "User online");
        Some(verteilen(snapshot_aus(&eintraege)))
    }

    /// Uebernimmt eine neue Position aus `location-update`
    ///
    /// Leere User-IDs und nicht-endliche Koordinaten werden still verworfen
    /// (`None`). Unbekannte User werden mit der Verbindung des Aufrufers
    /// angelegt. Der Name wird nur bei nicht-leerem Wert aktualisiert.
    pub fn standort_aktualisieren<R>(
        &self,
        user_id: &str,
        name: Option<&str>,
        lat: f64,
        lng: f64,
        verbindung: VerbindungsId,
        verteilen: impl FnOnce(Vec<PresenceEintrag>) -> R,
    ) -> Option<R> {
        if ist_leer(user_id) || !lat.is_finite() || !lng.is_finite() {
            return None;
        }

        let mut eintraege = self.eintraege.lock();
        let eintrag = eintraege
            .entry(user_id.to_string())
            .or_insert_with(|| leerer_eintrag(user_id, verbindung));

        if let Some(name) = name.filter(|n| !n.is_empty()) {
            eintrag.display_name = Some(name.to_string());
        }
        eintrag.connection_handle = verbindung;
        eintrag.latitude = Some(lat);
        eintrag.longitude = Some(lng);
        eintrag.last_seen = Utc::now();

        tracing::trace!(user_id = %user_id, lat, lng, "Position aktualisiert");
        Some(verteilen(snapshot_aus(&eintraege)))
    }

    /// Entfernt alle Eintraege deren *aktuelle* Verbindung `verbindung` ist
    ///
    /// Eine ueberholte Verbindung (der User hat sich inzwischen neu
    /// verbunden) trifft keinen Eintrag. Der Snapshot danach geht immer an
    /// `verteilen`, auch wenn nichts entfernt wurde.
    pub fn verbindung_entfernen<R>(
        &self,
        verbindung: &VerbindungsId,
        verteilen: impl FnOnce(Vec<PresenceEintrag>) -> R,
    ) -> (Vec<String>, R) {
        let mut eintraege = self.eintraege.lock();
        let mut entfernt = Vec::new();
        eintraege.retain(|user_id, eintrag| {
            if eintrag.connection_handle == *verbindung {
                entfernt.push(user_id.clone());
                false
            } else {
                true
            }
        });

        for user_id in &entfernt {
            tracing::info!(user_id = %user_id, verbindung = %verbindung, "User offline");
        }
        let ergebnis = verteilen(snapshot_aus(&eintraege));
        (entfernt, ergebnis)
    }

    /// Gibt alle aktuellen Eintraege zurueck
    pub fn snapshot(&self) -> Vec<PresenceEintrag> {
        snapshot_aus(&self.eintraege.lock())
    }

    /// Gibt die aktuelle Verbindung eines Users zurueck
    pub fn verbindung_von(&self, user_id: &str) -> Option<VerbindungsId> {
        self.eintraege
            .lock()
            .get(user_id)
            .map(|e| e.connection_handle)
    }

    /// Gibt den Eintrag eines Users zurueck
    pub fn eintrag(&self, user_id: &str) -> Option<PresenceEintrag> {
        self.eintraege.lock().get(user_id).cloned()
    }

    /// Prueft ob ein User gemeldet ist
    pub fn ist_online(&self, user_id: &str) -> bool {
        self.eintraege.lock().contains_key(user_id)
    }

    /// Anzahl gemeldeter User
    pub fn anzahl(&self) -> usize {
        self.eintraege.lock().len()
    }
}

/// User-IDs sind opake Schluessel; nur leere oder reine Leerzeichen sind ungueltig
fn ist_leer(user_id: &str) -> bool {
    user_id.trim().is_empty()
}

fn leerer_eintrag(user_id: &str, verbindung: VerbindungsId) -> PresenceEintrag {
    PresenceEintrag {
        user_id: user_id.to_string(),
        display_name: None,
        connection_handle: verbindung,
        latitude: None,
        longitude: None,
        last_seen: Utc::now(),
    }
}

fn snapshot_aus(eintraege: &BTreeMap<String, PresenceEintrag>) -> Vec<PresenceEintrag> {
    eintraege.values().cloned().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
