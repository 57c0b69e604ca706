//! notruf-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use notruf_observability::{HealthState, NotrufMetrics};
use notruf_signaling::{SignalingServer, SignalingState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Metriken registrieren
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. WebSocket-Signaling-Server starten
    /// 4. Auf Ctrl-C warten, dann alle Verbindungen schliessen
    pub async fn starten(self) -> Result<()> {
        let ws_addr: SocketAddr = self
            .config
            .ws_bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige WebSocket-Adresse '{}'", self.config.ws_bind_adresse()))?;

        tracing::info!(
            server_name = %self.config.server.name,
            ws = %ws_addr,
            pfad = %self.config.netzwerk.ws_pfad,
            strikte_anrufe = self.config.signaling.strikte_anrufe,
            "Server startet"
        );

        let metriken = NotrufMetrics::neu()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Observability (Metriken + Health)
        let observability_task = if self.config.observability.aktiviert {
            let obs_addr: SocketAddr = self
                .config
                .observability_bind_adresse()
                .parse()
                .with_context(|| {
                    format!(
                        "Ungueltige Observability-Adresse '{}'",
                        self.config.observability_bind_adresse()
                    )
                })?;
            let health = HealthState::neu(metriken.clone(), self.config.server.max_clients);
            let mut stop_rx = shutdown_rx.clone();
            let obs_metriken = metriken.clone();
            Some(tokio::spawn(async move {
                let stop = async move {
                    while stop_rx.changed().await.is_ok() {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                };
                if let Err(e) =
                    notruf_observability::observability_server_starten(obs_addr, obs_metriken, health, stop)
                        .await
                {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }))
        } else {
            tracing::info!("Observability-Server deaktiviert");
            None
        };

        // Signaling
        let state = SignalingState::neu(self.config.signaling_config(), metriken);
        let signaling = SignalingServer::neu(Arc::clone(&state), ws_addr)
            .mit_pfad(self.config.netzwerk.ws_pfad.clone());
        let mut signaling_task = tokio::spawn(signaling.starten(shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            }
            ergebnis = &mut signaling_task => {
                // Listener ist vorzeitig ausgefallen (z.B. Port belegt)
                let _ = shutdown_tx.send(true);
                ergebnis.context("Signaling-Task abgebrochen")??;
                anyhow::bail!("Signaling-Server unerwartet beendet");
            }
        }

        let _ = shutdown_tx.send(true);
        signaling_task.await.context("Signaling-Task abgebrochen")??;
        if let Some(task) = observability_task {
            let _ = task.await;
        }

        tracing::info!(uptime_sek = state.uptime_sek(), "Server gestoppt");
        Ok(())
    }
}
