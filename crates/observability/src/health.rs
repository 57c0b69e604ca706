//! Health-Check-Endpunkt fuer Notruf
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und aktueller Auslastung

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::NotrufMetrics;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Verbindungslimit erreicht, neue Clients werden abgewiesen
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: i64,
    pub online_users: i64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub metriken: NotrufMetrics,
    pub max_verbindungen: usize,
}

impl HealthState {
    pub fn neu(metriken: NotrufMetrics, max_verbindungen: usize) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            metriken,
            max_verbindungen,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Erstellt die aktuelle Health-Antwort
    pub fn bericht(&self) -> HealthResponse {
        let connections = self.metriken.connected_clients.get();
        let status = if connections >= self.max_verbindungen as i64 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            connections,
            online_users: self.metriken.online_users.get(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
///
/// Auch `degraded` antwortet mit 200, damit Probes den Prozess nicht neu starten.
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.bericht()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn bericht_gesund_unter_limit() {
        let metriken = NotrufMetrics::neu().unwrap();
        metriken.connected_clients.set(2);
        metriken.online_users.set(1);
        let state = HealthState::neu(metriken, 10);

        let bericht = state.bericht();
        assert_eq!(bericht.status, HealthStatus::Healthy);
        assert_eq!(bericht.connections, 2);
        assert_eq!(bericht.online_users, 1);
        assert!(bericht.uptime_seconds < 5);
    }

    #[test]
    fn bericht_degraded_am_limit() {
        let metriken = NotrufMetrics::neu().unwrap();
        metriken.connected_clients.set(10);
        let state = HealthState::neu(metriken, 10);
        assert_eq!(state.bericht().status, HealthStatus::Degraded);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            connections: 4,
            online_users: 3,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"online_users\":3"));
    }

    #[tokio::test]
    async fn health_endpunkt_antwortet() {
        let state = HealthState::neu(NotrufMetrics::neu().unwrap(), 10);
        let antwort = health_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);
    }
}
