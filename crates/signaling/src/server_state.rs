//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Zustands-Manager, die sicher zwischen tokio-Tasks
//! geteilt werden koennen.

use notruf_observability::NotrufMetrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::broadcast::{EventBroadcaster, SEND_QUEUE_GROESSE};
use crate::call_session::CallSessions;
use crate::presence::PresenceRegistry;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers (nur fuer Logs)
    pub server_name: String,
    /// Maximale gleichzeitige WebSocket-Verbindungen
    pub max_clients: usize,
    /// Intervall fuer WebSocket-Pings in Sekunden (0 = aus)
    pub keepalive_sek: u64,
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Groesse einer eingehenden Nachricht in Bytes
    pub max_nachrichten_groesse: usize,
    /// Anrufschritte gegen offene Sitzungen pruefen statt blind weiterleiten
    pub strikte_anrufe: bool,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Notruf Leitstelle".to_string(),
            max_clients: 512,
            keepalive_sek: 25,
            send_queue_groesse: SEND_QUEUE_GROESSE,
            max_nachrichten_groesse: notruf_protocol::events::MAX_NACHRICHTEN_GROESSE,
            strikte_anrufe: false,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Presence-Registry (wer ist ueber welche Verbindung erreichbar)
    pub presence: PresenceRegistry,
    /// Event-Broadcaster (Ereignisse an Verbindungen senden)
    pub broadcaster: EventBroadcaster,
    /// Offene Anrufsitzungen (nur bei `strikte_anrufe` befuellt)
    pub anrufe: CallSessions,
    /// Freie Verbindungsplaetze (`max_clients` Permits)
    pub verbindungs_plaetze: Arc<Semaphore>,
    /// Prometheus-Metriken
    pub metriken: NotrufMetrics,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(config: SignalingConfig, metriken: NotrufMetrics) -> Arc<Self> {
        let broadcaster = EventBroadcaster::mit_queue_groesse(config.send_queue_groesse);
        let verbindungs_plaetze = Arc::new(Semaphore::new(config.max_clients));
        Arc::new(Self {
            config: Arc::new(config),
            presence: PresenceRegistry::neu(),
            broadcaster,
            anrufe: CallSessions::neu(),
            verbindungs_plaetze,
            metriken,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
