//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede WebSocket-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task.
//!
//! ## Lebenszyklus
//! ```text
//! Upgrade -> Registrieren -> `me` senden -> Ereignisschleife -> Cleanup
//! ```
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen WebSocket-Ping
//! - Pongs beantwortet der Client-Stack selbst; es gibt keinen Timeout,
//!   die Verbindung endet erst mit Close, Lesefehler oder Shutdown

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use notruf_core::types::VerbindungsId;
use notruf_protocol::events::ServerEreignis;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::server_state::SignalingState;

/// Close-Code "Going Away" (RFC 6455)
const CLOSE_GOING_AWAY: u16 = 1001;

/// Verarbeitet eine einzelne WebSocket-Verbindung
///
/// Liest Text-Frames, dispatcht an `MessageDispatcher` und schreibt
/// Antworten sowie Ereignisse aus der Send-Queue zurueck.
pub struct ClientConnection {
    state: Arc<SignalingState>,
    verbindung: VerbindungsId,
    peer_addr: Option<SocketAddr>,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection mit frischem Handle
    pub fn neu(state: Arc<SignalingState>, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            state,
            verbindung: VerbindungsId::new(),
            peer_addr,
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis der Client trennt oder ein Shutdown-Signal eingeht.
    /// Der Cleanup laeuft in jedem Fall genau einmal.
    pub async fn verarbeiten(
        self,
        socket: WebSocket,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let verbindung = self.verbindung;
        let keepalive_aktiv = self.state.config.keepalive_sek > 0;
        let mut ping_intervall =
            tokio::time::interval(Duration::from_secs(self.state.config.keepalive_sek.max(1)));
        // Erster Tick kommt sofort
        ping_intervall.tick().await;

        tracing::info!(verbindung = %verbindung, peer = ?self.peer_addr, "Neue Verbindung");

        // Vor `me` registrieren, damit kein Broadcast verloren geht
        let mut sende_rx = self.state.broadcaster.client_registrieren(verbindung);
        self.state
            .metriken
            .connected_clients
            .set(self.state.broadcaster.client_anzahl() as i64);

        let (mut ws_tx, mut ws_rx) = socket.split();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));
        let ctx = DispatcherContext::neu(verbindung, self.peer_addr);

        let begruesst = match frame_erstellen(&ServerEreignis::Me(verbindung)) {
            Some(frame) => ws_tx.send(frame).await.is_ok(),
            None => false,
        };

        if begruesst {
            loop {
                tokio::select! {
                    // Eingehender Frame vom Client
                    frame = ws_rx.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(antwort) = dispatcher.dispatch_text(&text, &ctx) {
                                    if !self.state.broadcaster
                                        .an_verbindung_senden(&verbindung, antwort)
                                        .ist_erfolgreich()
                                    {
                                        tracing::debug!(verbindung = %verbindung, "Direkte Antwort verworfen");
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                tracing::debug!(verbindung = %verbindung, "Binaer-Frame ignoriert");
                                self.state.metriken.ereignis_verworfen("binary");
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!(verbindung = %verbindung, "Verbindung vom Client getrennt");
                                break;
                            }
                            // Ping/Pong beantwortet axum selbst
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(verbindung = %verbindung, fehler = %e, "WebSocket-Lesefehler");
                                break;
                            }
                        }
                    }

                    // Ausgehendes Ereignis aus der Send-Queue
                    ausgehend = sende_rx.recv() => {
                        let Some(ereignis) = ausgehend else { break };
                        let Some(frame) = frame_erstellen(&ereignis) else { continue };
                        if let Err(e) = ws_tx.send(frame).await {
                            tracing::warn!(verbindung = %verbindung, fehler = %e, "Senden fehlgeschlagen");
                            break;
                        }
                    }

                    // Keepalive-Ping
                    _ = ping_intervall.tick(), if keepalive_aktiv => {
                        if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
                            tracing::warn!(verbindung = %verbindung, fehler = %e, "Ping-Senden fehlgeschlagen");
                            break;
                        }
                        tracing::trace!(verbindung = %verbindung, "Ping gesendet");
                    }

                    // Shutdown-Signal
                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!(verbindung = %verbindung, "Shutdown-Signal – Verbindung wird getrennt");
                            let abschied = Message::Close(Some(CloseFrame {
                                code: CLOSE_GOING_AWAY,
                                reason: "Server wird heruntergefahren".into(),
                            }));
                            let _ = ws_tx.send(abschied).await;
                            break;
                        }
                    }
                }
            }
        } else {
            tracing::warn!(verbindung = %verbindung, "Begruessung konnte nicht gesendet werden");
        }

        // Cleanup beim Verbindungsende
        drop(sende_rx);
        dispatcher.client_cleanup(&verbindung);

        tracing::info!(verbindung = %verbindung, "Verbindungs-Task beendet");
    }
}

/// Serialisiert ein Ereignis als Text-Frame
fn frame_erstellen(ereignis: &ServerEreignis) -> Option<Message> {
    match ereignis.to_json() {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::error!(event = ereignis.name(), fehler = %e, "Serialisierung fehlgeschlagen");
            None
        }
    }
}
