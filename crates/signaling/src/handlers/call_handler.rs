//! Anruf-Handler – callToUser, answeredCall, call-ended, reject-call
//!
//! Der Server leitet Signaling-Nutzdaten nur weiter und interpretiert sie
//! nicht. Ohne `strikte_anrufe` wird jedes Ereignis an das adressierte
//! Handle weitergereicht; mit `strikte_anrufe` muss es zu einer offenen
//! Anrufsitzung passen.

use notruf_core::types::VerbindungsId;
use notruf_protocol::events::{
    AblehnenAnfrage, AnnahmeAnfrage, AnrufAnfrage, BeendenAnfrage, EingehenderAnruf,
    ServerEreignis,
};

use crate::broadcast::Zustellung;
use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

/// Meldung an den Anrufer wenn die Zustellung scheitert
pub const ANRUF_FEHLGESCHLAGEN: &str = "Anruf konnte nicht zugestellt werden";

/// Verarbeitet `callToUser`
///
/// Gibt die Antwort an den Anrufer zurueck (`userUnavailable` oder
/// `callFailed`), sonst `None`.
pub fn handle_call_to_user(
    request: AnrufAnfrage,
    verbindung: VerbindungsId,
    state: &SignalingState,
) -> Option<ServerEreignis> {
    let ziel_user = request.call_to_user_id.as_deref().unwrap_or_default();
    if ziel_user.trim().is_empty() {
        tracing::debug!(verbindung = %verbindung, "callToUser ohne Ziel verworfen");
        state.metriken.ereignis_verworfen("callToUser");
        return None;
    }

    let ziel = match state.presence.verbindung_von(ziel_user) {
        Some(ziel) => ziel,
        None => {
            tracing::debug!(
                verbindung = %verbindung,
                ziel_user = %ziel_user,
                "Anrufziel nicht online"
            );
            return Some(ServerEreignis::UserUnavailable {
                message: nicht_erreichbar_meldung(request.name.as_deref()),
            });
        }
    };

    let strikt = state.config.strikte_anrufe;
    // Im strikten Modus bestimmt der Server den Absender selbst
    let from = if strikt {
        Some(verbindung.to_string())
    } else {
        request.from
    };

    let anruf = ServerEreignis::CallToUser(EingehenderAnruf {
        signal: request.signal_data,
        from,
        name: request.name,
        email: request.email,
        profilepic: request.profilepic,
    });

    // Sitzung vor der Zustellung oeffnen, damit keine Annahme ins Leere laeuft
    let anruf_id = strikt.then(|| state.anrufe.anruf_starten(verbindung, ziel));

    match state.broadcaster.an_verbindung_senden(&ziel, anruf) {
        Zustellung::Eingereiht => {
            state.metriken.signal_weitergeleitet("callToUser");
            tracing::debug!(von = %verbindung, an = %ziel, "Anruf weitergeleitet");
            None
        }
        zustellung => {
            if let Some(id) = anruf_id {
                state.anrufe.entfernen(&id);
            }
            tracing::warn!(
                von = %verbindung,
                an = %ziel,
                zustellung = ?zustellung,
                "Anruf konnte nicht zugestellt werden"
            );
            Some(ServerEreignis::CallFailed {
                message: ANRUF_FEHLGESCHLAGEN.to_string(),
            })
        }
    }
}

/// Verarbeitet `answeredCall`
pub fn handle_answered_call(
    request: AnnahmeAnfrage,
    verbindung: VerbindungsId,
    state: &SignalingState,
) {
    let ergebnis = handle_parsen(request.to.as_deref()).and_then(|ziel| {
        if state.config.strikte_anrufe {
            state.anrufe.annehmen(&verbindung, &ziel)?;
        }
        weiterleiten(
            state,
            &ziel,
            ServerEreignis::CallAccepted {
                signal: request.signal,
                from: verbindung,
            },
        )
    });
    ergebnis_protokollieren(state, "answeredCall", verbindung, ergebnis);
}

/// Verarbeitet `call-ended`
pub fn handle_call_ended(request: BeendenAnfrage, verbindung: VerbindungsId, state: &SignalingState) {
    let ergebnis = handle_parsen(request.to.as_deref()).and_then(|ziel| {
        if state.config.strikte_anrufe {
            state.anrufe.beenden(&verbindung, &ziel)?;
        }
        weiterleiten(state, &ziel, ServerEreignis::CallEnded { name: request.name })
    });
    ergebnis_protokollieren(state, "call-ended", verbindung, ergebnis);
}

/// Verarbeitet `reject-call`
pub fn handle_reject_call(
    request: AblehnenAnfrage,
    verbindung: VerbindungsId,
    state: &SignalingState,
) {
    let ergebnis = handle_parsen(request.to.as_deref()).and_then(|ziel| {
        if state.config.strikte_anrufe {
            state.anrufe.ablehnen(&verbindung, &ziel)?;
        }
        weiterleiten(
            state,
            &ziel,
            ServerEreignis::CallRejected {
                name: request.name,
                profilepic: request.profilepic,
            },
        )
    });
    ergebnis_protokollieren(state, "reject-call", verbindung, ergebnis);
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

/// Meldung fuer `userUnavailable`, adressiert an den Anrufer
pub fn nicht_erreichbar_meldung(anrufer_name: Option<&str>) -> String {
    match anrufer_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{name}, der angerufene Teilnehmer ist nicht erreichbar"),
        None => "Der angerufene Teilnehmer ist nicht erreichbar".to_string(),
    }
}

/// Parst ein adressiertes Verbindungs-Handle aus dem `to`-Feld
fn handle_parsen(to: Option<&str>) -> SignalingResult<VerbindungsId> {
    let roh = to.ok_or_else(|| SignalingError::protokoll("Feld `to` fehlt"))?;
    Ok(roh.parse::<VerbindungsId>()?)
}

fn weiterleiten(
    state: &SignalingState,
    ziel: &VerbindungsId,
    ereignis: ServerEreignis,
) -> SignalingResult<()> {
    match state.broadcaster.an_verbindung_senden(ziel, ereignis) {
        Zustellung::Eingereiht => Ok(()),
        Zustellung::Unbekannt => Err(SignalingError::NichtGefunden(ziel.to_string())),
        Zustellung::QueueVoll | Zustellung::Geschlossen => Err(SignalingError::SendFehler),
    }
}

/// Relay-Fehler gehen nie an den Absender zurueck
fn ergebnis_protokollieren(
    state: &SignalingState,
    event: &'static str,
    verbindung: VerbindungsId,
    ergebnis: SignalingResult<()>,
) {
    match ergebnis {
        Ok(()) => {
            state.metriken.signal_weitergeleitet(event);
            tracing::debug!(verbindung = %verbindung, event, "Signal weitergeleitet");
        }
        Err(SignalingError::SendFehler) => {
            state.metriken.ereignis_verworfen(event);
            tracing::warn!(verbindung = %verbindung, event, "Ziel-Queue voll oder geschlossen");
        }
        Err(e) => {
            state.metriken.ereignis_verworfen(event);
            tracing::debug!(verbindung = %verbindung, event, fehler = %e, "Signal verworfen");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notruf_observability::NotrufMetrics;
    use serde_json::json;
    use std::sync::Arc;

    use crate::server_state::SignalingConfig;

    fn test_state(strikt: bool) -> Arc<SignalingState> {
        let config = SignalingConfig {
            strikte_anrufe: strikt,
            ..SignalingConfig::default()
        };
        SignalingState::neu(config, NotrufMetrics::neu().unwrap())
    }

    fn anruf_an(ziel: &str) -> AnrufAnfrage {
        AnrufAnfrage {
            call_to_user_id: Some(ziel.to_string()),
            signal_data: json!({"type": "offer", "sdp": "v=0"}),
            from: Some("client-sagt-x".into()),
            name: Some("Bob".into()),
            email: None,
            profilepic: None,
        }
    }

    #[test]
    fn nicht_erreichbar_nennt_anrufer() {
        assert_eq!(
            nicht_erreichbar_meldung(Some("Bob")),
            "Bob, der angerufene Teilnehmer ist nicht erreichbar"
        );
        assert_eq!(
            nicht_erreichbar_meldung(Some("  ")),
            "Der angerufene Teilnehmer ist nicht erreichbar"
        );
    }

    #[test]
    fn anruf_an_offline_user_antwortet_user_unavailable() {
        let state = test_state(false);
        let bob = VerbindungsId::new();

        let antwort = handle_call_to_user(anruf_an("dave"), bob, &state);
        assert!(matches!(antwort, Some(ServerEreignis::UserUnavailable { .. })));
    }

    #[test]
    fn anruf_leitet_from_im_freien_modus_unveraendert_weiter() {
        let state = test_state(false);
        let alice = VerbindungsId::new();
        let bob = VerbindungsId::new();
        let mut rx_alice = state.broadcaster.client_registrieren(alice);
        state.presence.beitritt("alice", Some("Alice"), alice, |_| ());

        assert!(handle_call_to_user(anruf_an("alice"), bob, &state).is_none());

        match rx_alice.try_recv().unwrap() {
            ServerEreignis::CallToUser(anruf) => {
                assert_eq!(anruf.from.as_deref(), Some("client-sagt-x"));
                assert_eq!(anruf.signal["type"], "offer");
                assert_eq!(anruf.name.as_deref(), Some("Bob"));
            }
            andere => panic!("Erwartet callToUser, erhalten {:?}", andere),
        }
        assert_eq!(state.anrufe.anzahl(), 0);
    }

    #[test]
    fn anruf_im_strikten_modus_setzt_echten_absender() {
        let state = test_state(true);
        let alice = VerbindungsId::new();
        let bob = VerbindungsId::new();
        let mut rx_alice = state.broadcaster.client_registrieren(alice);
        state.presence.beitritt("alice", None, alice, |_| ());

        handle_call_to_user(anruf_an("alice"), bob, &state);

        match rx_alice.try_recv().unwrap() {
            ServerEreignis::CallToUser(anruf) => {
                assert_eq!(anruf.from, Some(bob.to_string()));
            }
            andere => panic!("Erwartet callToUser, erhalten {:?}", andere),
        }
        assert_eq!(state.anrufe.anzahl(), 1);
    }

    #[test]
    fn anruf_an_geschlossene_queue_meldet_call_failed() {
        let state = test_state(false);
        let alice = VerbindungsId::new();
        let bob = VerbindungsId::new();
        let rx_alice = state.broadcaster.client_registrieren(alice);
        state.presence.beitritt("alice", None, alice, |_| ());
        drop(rx_alice);

        let antwort = handle_call_to_user(anruf_an("alice"), bob, &state);
        assert_eq!(
            antwort,
            Some(ServerEreignis::CallFailed {
                message: ANRUF_FEHLGESCHLAGEN.to_string()
            })
        );
    }

    #[test]
    fn strikter_modus_verwirft_sitzung_bei_fehlgeschlagener_zustellung() {
        let state = test_state(true);
        let alice = VerbindungsId::new();
        let bob = VerbindungsId::new();
        let rx_alice = state.broadcaster.client_registrieren(alice);
        state.presence.beitritt("alice", None, alice, |_| ());
        drop(rx_alice);

        let antwort = handle_call_to_user(anruf_an("alice"), bob, &state);
        assert!(matches!(antwort, Some(ServerEreignis::CallFailed { .. })));
        assert_eq!(state.anrufe.anzahl(), 0);
    }

    #[test]
    fn strikter_modus_oeffnet_sitzung_vor_der_zustellung() {
        let state = test_state(true);
        let alice = VerbindungsId::new();
        let bob = VerbindungsId::new();
        let mut rx_alice = state.broadcaster.client_registrieren(alice);
        let mut rx_bob = state.broadcaster.client_registrieren(bob);
        state.presence.beitritt("alice", None, alice, |_| ());

        handle_call_to_user(anruf_an("alice"), bob, &state);

        // Sobald der Anruf in Alices Queue liegt, muss die Annahme durchgehen
        assert!(matches!(rx_alice.try_recv(), Ok(ServerEreignis::CallToUser(_))));
        handle_answered_call(
            AnnahmeAnfrage {
                to: Some(bob.to_string()),
                signal: json!({"type": "answer"}),
            },
            alice,
            &state,
        );
        assert!(matches!(rx_bob.try_recv(), Ok(ServerEreignis::CallAccepted { .. })));
    }

    #[test]
    fn anrufziel_wird_nicht_normalisiert() {
        let state = test_state(false);
        let alice = VerbindungsId::new();
        let _rx_alice = state.broadcaster.client_registrieren(alice);
        state.presence.beitritt("alice", None, alice, |_| ());

        let antwort = handle_call_to_user(anruf_an(" alice"), VerbindungsId::new(), &state);
        assert!(matches!(antwort, Some(ServerEreignis::UserUnavailable { .. })));

        let antwort = handle_call_to_user(anruf_an("   "), VerbindungsId::new(), &state);
        assert!(antwort.is_none());
    }

    #[test]
    fn annahme_an_ungueltiges_handle_wird_verworfen() {
        let state = test_state(false);
        let alice = VerbindungsId::new();

        handle_answered_call(
            AnnahmeAnfrage {
                to: Some("kein-handle".into()),
                signal: json!({}),
            },
            alice,
            &state,
        );
        assert_eq!(
            state
                .metriken
                .discarded_events_total
                .with_label_values(&["answeredCall"])
                .get(),
            1
        );
    }

    #[test]
    fn annahme_traegt_handle_des_absenders() {
        let state = test_state(false);
        let alice = VerbindungsId::new();
        let bob = VerbindungsId::new();
        let mut rx_bob = state.broadcaster.client_registrieren(bob);

        handle_answered_call(
            AnnahmeAnfrage {
                to: Some(bob.to_string()),
                signal: json!({"type": "answer"}),
            },
            alice,
            &state,
        );

        assert_eq!(
            rx_bob.try_recv().unwrap(),
            ServerEreignis::CallAccepted {
                signal: json!({"type": "answer"}),
                from: alice,
            }
        );
    }

    #[test]
    fn strikter_modus_verwirft_annahme_ohne_anruf() {
        let state = test_state(true);
        let alice = VerbindungsId::new();
        let bob = VerbindungsId::new();
        let mut rx_bob = state.broadcaster.client_registrieren(bob);

        handle_answered_call(
            AnnahmeAnfrage {
                to: Some(bob.to_string()),
                signal: json!({}),
            },
            alice,
            &state,
        );
        assert!(rx_bob.try_recv().is_err());
    }

    #[test]
    fn ablehnen_und_beenden_werden_weitergeleitet() {
        let state = test_state(false);
        let alice = VerbindungsId::new();
        let bob = VerbindungsId::new();
        let mut rx_bob = state.broadcaster.client_registrieren(bob);

        handle_reject_call(
            AblehnenAnfrage {
                to: Some(bob.to_string()),
                name: Some("Alice".into()),
                profilepic: Some("a.png".into()),
            },
            alice,
            &state,
        );
        handle_call_ended(
            BeendenAnfrage {
                to: Some(bob.to_string()),
                name: Some("Alice".into()),
            },
            alice,
            &state,
        );

        assert_eq!(
            rx_bob.try_recv().unwrap(),
            ServerEreignis::CallRejected {
                name: Some("Alice".into()),
                profilepic: Some("a.png".into()),
            }
        );
        assert_eq!(
            rx_bob.try_recv().unwrap(),
            ServerEreignis::CallEnded {
                name: Some("Alice".into())
            }
        );
    }
}
