//! Message-Dispatcher – Routet Client-Ereignisse an die richtigen Handler
//!
//! Der Dispatcher empfaengt Text-Frames von einer ClientConnection, parst sie
//! zu `ClientEreignis`, bestimmt den Handler und gibt eine eventuelle direkte
//! Antwort an den Absender zurueck.
//!
//! ## Fehlerbehandlung
//! Fehlerhafte Frames werden nie mit einem Fehler an den Client beantwortet:
//! - Unparsebares JSON oder unbekannter Ereignisname: verworfen (debug)
//! - `join` ohne ID: verworfen (warn)
//! - Relay an ungueltige Handles: verworfen (debug)

use notruf_core::types::VerbindungsId;
use notruf_protocol::events::{ClientEreignis, ServerEreignis};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::handlers::{call_handler, presence_handler};
use crate::server_state::SignalingState;

/// Metrik-Label fuer Frames die nicht geparst werden konnten
const UNBEKANNTES_EREIGNIS: &str = "unknown";

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
#[derive(Debug, Clone)]
pub struct DispatcherContext {
    /// Handle dieser Verbindung
    pub verbindung: VerbindungsId,
    /// Peer-Adresse (nur fuer Logs)
    pub peer_addr: Option<SocketAddr>,
}

impl DispatcherContext {
    pub fn neu(verbindung: VerbindungsId, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            verbindung,
            peer_addr,
        }
    }
}

/// Zentraler Message-Dispatcher
#[derive(Clone)]
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Parst und verarbeitet einen Text-Frame
    pub fn dispatch_text(&self, text: &str, ctx: &DispatcherContext) -> Option<ServerEreignis> {
        match ClientEreignis::from_json(text) {
            Ok(ereignis) => self.dispatch(ereignis, ctx),
            Err(e) => {
                tracing::debug!(
                    verbindung = %ctx.verbindung,
                    fehler = %e,
                    "Unlesbares Ereignis verworfen"
                );
                self.state.metriken.ereignis_verworfen(UNBEKANNTES_EREIGNIS);
                None
            }
        }
    }

    /// Verarbeitet ein Client-Ereignis
    ///
    /// Gibt `None` zurueck wenn keine direkte Antwort an den Absender geht.
    /// Broadcasts und Weiterleitungen laufen ueber den Broadcaster.
    pub fn dispatch(
        &self,
        ereignis: ClientEreignis,
        ctx: &DispatcherContext,
    ) -> Option<ServerEreignis> {
        let verbindung = ctx.verbindung;
        self.state.metriken.ereignis_empfangen(ereignis.name());
        tracing::trace!(verbindung = %verbindung, event = ereignis.name(), "Ereignis empfangen");

        match ereignis {
            // -------------------------------------------------------------------
            // Presence
            // -------------------------------------------------------------------
            ClientEreignis::Join(req) => {
                presence_handler::handle_join(req, verbindung, &self.state);
                None
            }

            ClientEreignis::LocationUpdate(req) => {
                presence_handler::handle_location_update(req, verbindung, &self.state);
                None
            }

            // -------------------------------------------------------------------
            // Anruf-Signaling
            // -------------------------------------------------------------------
            ClientEreignis::CallToUser(req) => {
                call_handler::handle_call_to_user(req, verbindung, &self.state)
            }

            ClientEreignis::AnsweredCall(req) => {
                call_handler::handle_answered_call(req, verbindung, &self.state);
                None
            }

            ClientEreignis::CallEnded(req) => {
                call_handler::handle_call_ended(req, verbindung, &self.state);
                None
            }

            ClientEreignis::RejectCall(req) => {
                call_handler::handle_reject_call(req, verbindung, &self.state);
                None
            }
        }
    }

    /// Bereinigt alle Ressourcen einer getrennten Verbindung
    pub fn client_cleanup(&self, verbindung: &VerbindungsId) {
        presence_handler::handle_disconnect(*verbindung, &self.state);
        tracing::debug!(verbindung = %verbindung, "Client-Ressourcen bereinigt");
    }
}
