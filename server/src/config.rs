//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use notruf_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Signaling-Einstellungen (Keepalive, Queues, Anrufpruefung)
    pub signaling: SignalingEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger WebSocket-Verbindungen
    pub max_clients: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Notruf Leitstelle".into(),
            max_clients: 512,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port fuer den WebSocket-Endpunkt
    pub ws_port: u16,
    /// Pfad des WebSocket-Endpunkts
    pub ws_pfad: String,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            ws_port: 8000,
            ws_pfad: notruf_signaling::STANDARD_WS_PFAD.into(),
        }
    }
}

/// Signaling-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Intervall fuer WebSocket-Pings in Sekunden (0 = aus)
    pub keepalive_sek: u64,
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Groesse eingehender Nachrichten in Bytes
    pub max_nachrichten_groesse: usize,
    /// Anrufschritte nur innerhalb offener Anrufsitzungen weiterleiten
    pub strikte_anrufe: bool,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        let standard = SignalingConfig::default();
        Self {
            keepalive_sek: standard.keepalive_sek,
            send_queue_groesse: standard.send_queue_groesse,
            max_nachrichten_groesse: standard.max_nachrichten_groesse,
            strikte_anrufe: standard.strikte_anrufe,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config.pruefen()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte die serde nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if !self.netzwerk.ws_pfad.starts_with('/') {
            anyhow::bail!(
                "netzwerk.ws_pfad muss mit '/' beginnen: '{}'",
                self.netzwerk.ws_pfad
            );
        }
        if self.server.max_clients == 0 {
            anyhow::bail!("server.max_clients muss groesser als 0 sein");
        }
        if self.signaling.send_queue_groesse == 0 {
            anyhow::bail!("signaling.send_queue_groesse muss groesser als 0 sein");
        }
        if !notruf_observability::log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Unbekanntes Log-Level: '{}'", self.logging.level);
        }
        if !notruf_observability::log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Unbekanntes Log-Format: '{}'", self.logging.format);
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer den WebSocket-Server zurueck
    pub fn ws_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.ws_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }

    /// Leitet die Laufzeit-Konfiguration des Signaling-Service ab
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            keepalive_sek: self.signaling.keepalive_sek,
            send_queue_groesse: self.signaling.send_queue_groesse,
            max_nachrichten_groesse: self.signaling.max_nachrichten_groesse,
            strikte_anrufe: self.signaling.strikte_anrufe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_clients, 512);
        assert_eq!(cfg.netzwerk.ws_port, 8000);
        assert_eq!(cfg.netzwerk.ws_pfad, "/ws");
        assert_eq!(cfg.signaling.keepalive_sek, 25);
        assert!(!cfg.signaling.strikte_anrufe);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ws_bind_adresse(), "0.0.0.0:8000");
        assert_eq!(cfg.observability_bind_adresse(), "0.0.0.0:9300");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Leitstelle Nord"
            max_clients = 100

            [netzwerk]
            ws_port = 9000

            [signaling]
            strikte_anrufe = true
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Leitstelle Nord");
        assert_eq!(cfg.server.max_clients, 100);
        assert_eq!(cfg.netzwerk.ws_port, 9000);
        assert!(cfg.signaling.strikte_anrufe);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.signaling.keepalive_sek, 25);
    }

    #[test]
    fn signaling_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.server.max_clients = 7;
        cfg.signaling.strikte_anrufe = true;

        let sig = cfg.signaling_config();
        assert_eq!(sig.max_clients, 7);
        assert!(sig.strikte_anrufe);
        assert_eq!(sig.server_name, "Notruf Leitstelle");
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.ws_pfad = "ws".into();
        assert!(cfg.pruefen().is_err());

        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/notruf.toml").unwrap();
        assert_eq!(cfg.server.max_clients, 512);
    }
}
