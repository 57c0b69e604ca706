//! Event-Broadcaster – Sendet Ereignisse an verbundene Clients
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller offenen Verbindungen
//! und stellt Methoden bereit, um Ereignisse gezielt oder an alle zu senden.
//!
//! ## Zustellung
//! Alle Sendungen sind fire-and-forget: `try_send` in eine begrenzte Queue.
//! Ist die Queue voll oder geschlossen, wird das Ereignis verworfen.
//!
//! - An alle Verbindungen: `an_alle_senden`
//! - An alle ausser einer: `an_alle_ausser_senden`
//! - An eine Verbindung: `an_verbindung_senden`

use dashmap::DashMap;
use notruf_core::types::VerbindungsId;
use notruf_protocol::events::ServerEreignis;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Standard-Groesse der Send-Queue pro Verbindung
pub const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Ergebnis eines einzelnen Sendeversuchs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellung {
    /// In die Queue eingereiht
    Eingereiht,
    /// Queue voll, Ereignis verworfen
    QueueVoll,
    /// Verbindung bereits geschlossen
    Geschlossen,
    /// Keine Verbindung mit diesem Handle registriert
    Unbekannt,
}

impl Zustellung {
    /// `true` wenn das Ereignis eingereiht wurde
    pub fn ist_erfolgreich(self) -> bool {
        self == Self::Eingereiht
    }
}

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub verbindung: VerbindungsId,
    pub tx: mpsc::Sender<ServerEreignis>,
}

impl ClientSender {
    /// Sendet ein Ereignis nicht-blockierend an den Client
    pub fn senden(&self, ereignis: ServerEreignis) -> Zustellung {
        match self.tx.try_send(ereignis) {
            Ok(()) => Zustellung::Eingereiht,
            Err(mpsc::error::TrySendError::Full(ev)) => {
                tracing::warn!(
                    verbindung = %self.verbindung,
                    event = ev.name(),
                    "Send-Queue voll – Ereignis verworfen"
                );
                Zustellung::QueueVoll
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(verbindung = %self.verbindung, "Send-Queue geschlossen (Client getrennt)");
                Zustellung::Geschlossen
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Event-Broadcaster fuer alle offenen Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    /// Sender, indiziert nach Verbindung
    clients: DashMap<VerbindungsId, ClientSender>,
    /// Kapazitaet neuer Send-Queues
    queue_groesse: usize,
}

impl EventBroadcaster {
    /// Erstellt einen neuen EventBroadcaster mit Standard-Queue-Groesse
    pub fn neu() -> Self {
        Self::mit_queue_groesse(SEND_QUEUE_GROESSE)
    }

    /// Erstellt einen EventBroadcaster mit eigener Queue-Groesse pro Verbindung
    pub fn mit_queue_groesse(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Registriert eine Verbindung und gibt ihre Empfangs-Queue zurueck
    ///
    /// Die `ClientConnection` liest aus dieser Queue und schreibt in den Socket.
    pub fn client_registrieren(&self, verbindung: VerbindungsId) -> mpsc::Receiver<ServerEreignis> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        let sender = ClientSender { verbindung, tx };
        self.inner.clients.insert(verbindung, sender);
        tracing::debug!(verbindung = %verbindung, "Verbindung im Broadcaster registriert");
        rx
    }

    /// Entfernt eine Verbindung aus dem Broadcaster
    pub fn client_entfernen(&self, verbindung: &VerbindungsId) {
        if self.inner.clients.remove(verbindung).is_some() {
            tracing::debug!(verbindung = %verbindung, "Verbindung aus Broadcaster entfernt");
        }
    }

    /// Sendet ein Ereignis an eine einzelne Verbindung
    pub fn an_verbindung_senden(
        &self,
        verbindung: &VerbindungsId,
        ereignis: ServerEreignis,
    ) -> Zustellung {
        // Sender klonen, damit kein DashMap-Guard waehrend des Sendens gehalten wird
        let sender = self.inner.clients.get(verbindung).map(|s| s.clone());
        match sender {
            Some(sender) => sender.senden(ereignis),
            None => {
                tracing::debug!(verbindung = %verbindung, "Senden an unbekannte Verbindung");
                Zustellung::Unbekannt
            }
        }
    }

    /// Sendet ein Ereignis an alle offenen Verbindungen
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_alle_senden(&self, ereignis: ServerEreignis) -> usize {
        self.senden_gefiltert(None, ereignis)
    }

    /// Sendet ein Ereignis an alle offenen Verbindungen ausser einer
    pub fn an_alle_ausser_senden(
        &self,
        ausgeschlossen: &VerbindungsId,
        ereignis: ServerEreignis,
    ) -> usize {
        self.senden_gefiltert(Some(ausgeschlossen), ereignis)
    }

    /// Gibt die Anzahl der registrierten Verbindungen zurueck
    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    /// Prueft ob eine Verbindung registriert ist
    pub fn ist_registriert(&self, verbindung: &VerbindungsId) -> bool {
        self.inner.clients.contains_key(verbindung)
    }

    fn senden_gefiltert(
        &self,
        ausgeschlossen: Option<&VerbindungsId>,
        ereignis: ServerEreignis,
    ) -> usize {
        let empfaenger: Vec<ClientSender> = self
            .inner
            .clients
            .iter()
            .filter(|entry| Some(entry.key()) != ausgeschlossen)
            .map(|entry| entry.value().clone())
            .collect();

        empfaenger
            .iter()
            .filter(|sender| sender.senden(ereignis.clone()).ist_erfolgreich())
            .count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ereignis() -> ServerEreignis {
        ServerEreignis::CallEnded {
            name: Some("Test".into()),
        }
    }

    #[tokio::test]
    async fn client_registrieren_und_senden() {
        let broadcaster = EventBroadcaster::neu();
        let v = VerbindungsId::new();

        let mut rx = broadcaster.client_registrieren(v);
        assert!(broadcaster.ist_registriert(&v));

        let zustellung = broadcaster.an_verbindung_senden(&v, test_ereignis());
        assert_eq!(zustellung, Zustellung::Eingereiht);

        let empfangen = rx.try_recv().expect("Ereignis muss vorhanden sein");
        assert_eq!(empfangen, test_ereignis());
    }

    #[test]
    fn senden_an_unbekannte_verbindung() {
        let broadcaster = EventBroadcaster::neu();
        let zustellung = broadcaster.an_verbindung_senden(&VerbindungsId::new(), test_ereignis());
        assert_eq!(zustellung, Zustellung::Unbekannt);
    }

    #[tokio::test]
    async fn an_alle_senden() {
        let broadcaster = EventBroadcaster::neu();

        let ids: Vec<VerbindungsId> = (0..5).map(|_| VerbindungsId::new()).collect();
        let mut receivers: Vec<_> = ids
            .iter()
            .map(|v| broadcaster.client_registrieren(*v))
            .collect();

        let gesendet = broadcaster.an_alle_senden(test_ereignis());
        assert_eq!(gesendet, 5);

        for rx in &mut receivers {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn an_alle_ausser_senden() {
        let broadcaster = EventBroadcaster::neu();
        let v1 = VerbindungsId::new();
        let v2 = VerbindungsId::new();

        let mut rx1 = broadcaster.client_registrieren(v1);
        let mut rx2 = broadcaster.client_registrieren(v2);

        let gesendet = broadcaster.an_alle_ausser_senden(&v1, test_ereignis());
        assert_eq!(gesendet, 1);
        assert!(rx1.try_recv().is_err(), "Ausgeschlossene Verbindung darf nichts empfangen");
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn volle_queue_verwirft_ereignis() {
        let broadcaster = EventBroadcaster::mit_queue_groesse(1);
        let v = VerbindungsId::new();
        let _rx = broadcaster.client_registrieren(v);

        assert_eq!(
            broadcaster.an_verbindung_senden(&v, test_ereignis()),
            Zustellung::Eingereiht
        );
        assert_eq!(
            broadcaster.an_verbindung_senden(&v, test_ereignis()),
            Zustellung::QueueVoll
        );
    }

    #[test]
    fn geschlossene_queue_wird_erkannt() {
        let broadcaster = EventBroadcaster::neu();
        let v = VerbindungsId::new();
        let rx = broadcaster.client_registrieren(v);
        drop(rx);

        assert_eq!(
            broadcaster.an_verbindung_senden(&v, test_ereignis()),
            Zustellung::Geschlossen
        );
        assert_eq!(broadcaster.an_alle_senden(test_ereignis()), 0);
    }

    #[test]
    fn client_entfernen() {
        let broadcaster = EventBroadcaster::neu();
        let v = VerbindungsId::new();

        let _rx = broadcaster.client_registrieren(v);
        assert_eq!(broadcaster.client_anzahl(), 1);

        broadcaster.client_entfernen(&v);
        assert!(!broadcaster.ist_registriert(&v));
        assert_eq!(broadcaster.client_anzahl(), 0);
    }
}
