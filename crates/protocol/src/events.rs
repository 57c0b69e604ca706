//! Ereignis-Protokoll (WebSocket)
//!
//! Definiert alle Ereignisse die ueber die WebSocket-Verbindung zwischen
//! Client und Server ausgetauscht werden.
//!
//! ## Design
//! - Jede Text-Frame traegt genau ein Ereignis als JSON
//! - Umschlag: `{"event": "<name>", "data": <nutzdaten>}`
//! - Tagged Enums fuer typsichere Ereignistypen
//! - Signaling-Nutzdaten (`signal`) sind fuer den Server opak und werden
//!   unveraendert weitergereicht

use chrono::{DateTime, Utc};
use notruf_core::types::VerbindungsId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximale Groesse einer eingehenden WebSocket-Nachricht (256 KB)
///
/// SDP-Angebote mit vielen ICE-Kandidaten bleiben deutlich darunter.
pub const MAX_NACHRICHTEN_GROESSE: usize = 256 * 1024;

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Erreichbarkeit eines Users, wie sie in `online-users` verteilt wird
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEintrag {
    /// Vom Client vergebene, stabile User-ID (eindeutig in der Registry)
    pub user_id: String,
    /// Zuletzt gemeldeter Anzeigename
    pub display_name: Option<String>,
    /// Aktuelle Verbindung des Users
    pub connection_handle: VerbindungsId,
    /// Letzte bekannte Position (erst nach dem ersten `location-update`)
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Zeitpunkt der letzten Aenderung
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// `join` – User meldet sich online
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinAnfrage {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// `location-update` – neue Position eines Users
///
/// Alle Felder optional: unvollstaendige Updates werden vom Server still
/// verworfen statt als Protokollfehler behandelt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandortAnfrage {
    pub id: Option<String>,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// `callToUser` – Anruf an eine User-ID starten
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnrufAnfrage {
    #[serde(rename = "callToUserId")]
    pub call_to_user_id: Option<String>,
    #[serde(rename = "signalData", default)]
    pub signal_data: Value,
    pub from: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub profilepic: Option<String>,
}

/// `answeredCall` – Anruf annehmen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnahmeAnfrage {
    pub to: Option<String>,
    #[serde(default)]
    pub signal: Value,
}

/// `call-ended` – laufenden Anruf beenden
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeendenAnfrage {
    pub to: Option<String>,
    pub name: Option<String>,
}

/// `reject-call` – eingehenden Anruf ablehnen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AblehnenAnfrage {
    pub to: Option<String>,
    pub name: Option<String>,
    pub profilepic: Option<String>,
}

/// Alle Ereignisse die ein Client senden darf
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEreignis {
    #[serde(rename = "join")]
    Join(JoinAnfrage),
    #[serde(rename = "location-update")]
    LocationUpdate(StandortAnfrage),
    #[serde(rename = "callToUser")]
    CallToUser(AnrufAnfrage),
    #[serde(rename = "answeredCall")]
    AnsweredCall(AnnahmeAnfrage),
    #[serde(rename = "call-ended")]
    CallEnded(BeendenAnfrage),
    #[serde(rename = "reject-call")]
    RejectCall(AblehnenAnfrage),
}

impl ClientEreignis {
    /// Deserialisiert ein Ereignis aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serialisiert das Ereignis als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Wire-Name des Ereignisses (fuer Logs und Metrik-Labels)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::LocationUpdate(_) => "location-update",
            Self::CallToUser(_) => "callToUser",
            Self::AnsweredCall(_) => "answeredCall",
            Self::CallEnded(_) => "call-ended",
            Self::RejectCall(_) => "reject-call",
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Eingehender Anruf, wie ihn der Angerufene sieht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EingehenderAnruf {
    pub signal: Value,
    pub from: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub profilepic: Option<String>,
}

/// Alle Ereignisse die der Server sendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEreignis {
    /// Eigenes Verbindungs-Handle, direkt nach dem Verbindungsaufbau
    #[serde(rename = "me")]
    Me(VerbindungsId),

    /// Vollstaendiger Presence-Snapshot
    #[serde(rename = "online-users")]
    OnlineUsers(Vec<PresenceEintrag>),

    /// Anrufziel ist nicht online
    #[serde(rename = "userUnavailable")]
    UserUnavailable { message: String },

    /// Anruf konnte nicht zugestellt werden
    #[serde(rename = "callFailed")]
    CallFailed { message: String },

    #[serde(rename = "callToUser")]
    CallToUser(EingehenderAnruf),

    #[serde(rename = "callAccepted")]
    CallAccepted { signal: Value, from: VerbindungsId },

    #[serde(rename = "callEnded")]
    CallEnded { name: Option<String> },

    #[serde(rename = "callRejected")]
    CallRejected {
        name: Option<String>,
        profilepic: Option<String>,
    },

    /// Eine andere Verbindung wurde getrennt
    #[serde(rename = "DisconnectUser")]
    DisconnectUser {
        #[serde(rename = "disUser")]
        dis_user: VerbindungsId,
    },
}

impl ServerEreignis {
    /// Serialisiert das Ereignis als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert ein Ereignis aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Wire-Name des Ereignisses (fuer Logs und Metrik-Labels)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Me(_) => "me",
            Self::OnlineUsers(_) => "online-users",
            Self::UserUnavailable { .. } => "userUnavailable",
            Self::CallFailed { .. } => "callFailed",
            Self::CallToUser(_) => "callToUser",
            Self::CallAccepted { .. } => "callAccepted",
            Self::CallEnded { .. } => "callEnded",
            Self::CallRejected { .. } => "callRejected",
            Self::DisconnectUser { .. } => "DisconnectUser",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_parsen() {
        let ev = ClientEreignis::from_json(r#"{"event":"join","data":{"id":"alice","name":"Alice"}}"#)
            .unwrap();
        match ev {
            ClientEreignis::Join(j) => {
                assert_eq!(j.id.as_deref(), Some("alice"));
                assert_eq!(j.name.as_deref(), Some("Alice"));
            }
            andere => panic!("Erwartet Join, erhalten {:?}", andere),
        }
    }

    #[test]
    fn join_ohne_id_ist_parsebar() {
        let ev = ClientEreignis::from_json(r#"{"event":"join","data":{"name":"Anonym"}}"#).unwrap();
        assert!(matches!(ev, ClientEreignis::Join(JoinAnfrage { id: None, .. })));
    }

    #[test]
    fn location_update_mit_fehlenden_koordinaten() {
        let ev = ClientEreignis::from_json(
            r#"{"event":"location-update","data":{"id":"carol","lat":12.9}}"#,
        )
        .unwrap();
        if let ClientEreignis::LocationUpdate(s) = ev {
            assert_eq!(s.lat, Some(12.9));
            assert_eq!(s.lng, None);
        } else {
            panic!("Erwartet LocationUpdate");
        }
    }

    #[test]
    fn location_update_mit_string_koordinate_wird_abgelehnt() {
        let ergebnis = ClientEreignis::from_json(
            r#"{"event":"location-update","data":{"id":"carol","lat":"12.9","lng":77.6}}"#,
        );
        assert!(ergebnis.is_err());
    }

    #[test]
    fn call_to_user_behaelt_signal_unveraendert() {
        let ev = ClientEreignis::from_json(
            r#"{"event":"callToUser","data":{"callToUserId":"alice","signalData":{"type":"offer","sdp":"v=0"},"from":"abc","name":"Bob"}}"#,
        )
        .unwrap();
        if let ClientEreignis::CallToUser(a) = ev {
            assert_eq!(a.call_to_user_id.as_deref(), Some("alice"));
            assert_eq!(a.signal_data, json!({"type":"offer","sdp":"v=0"}));
            assert_eq!(a.email, None);
        } else {
            panic!("Erwartet CallToUser");
        }
    }

    #[test]
    fn unbekanntes_ereignis_ist_fehler() {
        assert!(ClientEreignis::from_json(r#"{"event":"explode","data":{}}"#).is_err());
        assert!(ClientEreignis::from_json("kein json").is_err());
    }

    #[test]
    fn me_serialisierung() {
        let id = VerbindungsId(uuid::Uuid::nil());
        let json = ServerEreignis::Me(id).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"event":"me","data":"00000000-0000-0000-0000-000000000000"}"#
        );
    }

    #[test]
    fn disconnect_user_feldname() {
        let id = VerbindungsId::new();
        let wert: Value =
            serde_json::to_value(ServerEreignis::DisconnectUser { dis_user: id }).unwrap();
        assert_eq!(wert["event"], "DisconnectUser");
        assert_eq!(wert["data"]["disUser"], id.to_string());
    }

    #[test]
    fn online_users_feldnamen_camel_case() {
        let eintrag = PresenceEintrag {
            user_id: "alice".into(),
            display_name: Some("Alice".into()),
            connection_handle: VerbindungsId::new(),
            latitude: Some(1.5),
            longitude: None,
            last_seen: Utc::now(),
        };
        let wert = serde_json::to_value(ServerEreignis::OnlineUsers(vec![eintrag])).unwrap();
        let erster = &wert["data"][0];
        assert_eq!(erster["userId"], "alice");
        assert_eq!(erster["displayName"], "Alice");
        assert_eq!(erster["latitude"], 1.5);
        assert!(erster["longitude"].is_null());
        assert!(erster.get("connectionHandle").is_some());
    }

    #[test]
    fn ereignis_namen_passen_zum_wire_format() {
        let ev = ServerEreignis::CallEnded { name: None };
        let wert = serde_json::to_value(&ev).unwrap();
        assert_eq!(wert["event"], ev.name());

        let ev = ClientEreignis::RejectCall(AblehnenAnfrage::default());
        let wert = serde_json::to_value(&ev).unwrap();
        assert_eq!(wert["event"], ev.name());
    }
}
