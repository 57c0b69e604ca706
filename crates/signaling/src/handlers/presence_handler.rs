//! Presence-Handler – join, location-update, Verbindungsende
//!
//! Jede Aenderung der Registry wird sofort als vollstaendiger Snapshot an
//! alle offenen Verbindungen verteilt, einschliesslich des Ausloesers.

use notruf_core::types::VerbindungsId;
use notruf_protocol::events::{JoinAnfrage, PresenceEintrag, ServerEreignis, StandortAnfrage};

use crate::server_state::SignalingState;

/// Verarbeitet `join`
///
/// Ohne `id` wird das Ereignis verworfen und serverseitig protokolliert.
pub fn handle_join(request: JoinAnfrage, verbindung: VerbindungsId, state: &SignalingState) {
    let user_id = request.id.as_deref().unwrap_or_default();
    let verteilt = state
        .presence
        .beitritt(user_id, request.name.as_deref(), verbindung, |snapshot| {
            presence_verteilen(state, snapshot)
        });

    if verteilt.is_none() {
        tracing::warn!(verbindung = %verbindung, "join ohne User-ID verworfen");
        state.metriken.ereignis_verworfen("join");
    }
}

/// Verarbeitet `location-update`
///
/// Fehlende ID oder fehlende/nicht-endliche Koordinaten: still verworfen,
/// keine Registry-Aenderung, kein Broadcast.
pub fn handle_location_update(
    request: StandortAnfrage,
    verbindung: VerbindungsId,
    state: &SignalingState,
) {
    let user_id = request.id.as_deref().unwrap_or_default();
    let verteilt = match (request.lat, request.lng) {
        (Some(lat), Some(lng)) => state.presence.standort_aktualisieren(
            user_id,
            request.name.as_deref(),
            lat,
            lng,
            verbindung,
            |snapshot| presence_verteilen(state, snapshot),
        ),
        _ => None,
    };

    if verteilt.is_none() {
        tracing::trace!(verbindung = %verbindung, "location-update verworfen");
        state.metriken.ereignis_verworfen("location-update");
    }
}

/// Raeumt eine getrennte Verbindung auf
///
/// Reihenfolge: aus dem Broadcaster austragen, Registry bereinigen,
/// Snapshot an alle verteilen, dann `DisconnectUser` an alle anderen.
/// Laeuft auch wenn die Verbindung nie einen `join` gesendet hat.
pub fn handle_disconnect(verbindung: VerbindungsId, state: &SignalingState) {
    state.broadcaster.client_entfernen(&verbindung);
    state
        .metriken
        .connected_clients
        .set(state.broadcaster.client_anzahl() as i64);

    let (entfernt, _) = state
        .presence
        .verbindung_entfernen(&verbindung, |snapshot| presence_verteilen(state, snapshot));
    if entfernt.is_empty() {
        tracing::debug!(verbindung = %verbindung, "Keine aktuellen Presence-Eintraege fuer Verbindung");
    }

    state.broadcaster.an_alle_ausser_senden(
        &verbindung,
        ServerEreignis::DisconnectUser {
            dis_user: verbindung,
        },
    );

    let sitzungen = state.anrufe.verbindung_entfernen(&verbindung);
    if !sitzungen.is_empty() {
        tracing::debug!(
            verbindung = %verbindung,
            anzahl = sitzungen.len(),
            "Offene Anrufsitzungen geschlossen"
        );
    }
}

/// Verteilt einen Presence-Snapshot an alle offenen Verbindungen
///
/// Wird von der Registry unter ihrem Lock aufgerufen.
pub fn presence_verteilen(state: &SignalingState, snapshot: Vec<PresenceEintrag>) -> usize {
    state.metriken.online_users.set(snapshot.len() as i64);
    state.metriken.broadcasts_total.inc();

    let anzahl = snapshot.len();
    let gesendet = state
        .broadcaster
        .an_alle_senden(ServerEreignis::OnlineUsers(snapshot));
    tracing::trace!(eintraege = anzahl, empfaenger = gesendet, "Presence-Snapshot verteilt");
    gesendet
}
