//! WebSocket-Listener – Bindet Socket, nimmt Upgrades an
//!
//! Der `SignalingServer` bindet einen TCP-Socket, bedient darauf einen
//! axum-Router mit dem WebSocket-Endpunkt und startet fuer jede
//! angenommene Verbindung eine `ClientConnection` in einem eigenen Task.

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use notruf_observability::middleware::timing_middleware;
use notruf_observability::request_timing_layer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::connection::ClientConnection;
use crate::error::SignalingResult;
use crate::server_state::SignalingState;

/// Standard-Pfad des WebSocket-Endpunkts
pub const STANDARD_WS_PFAD: &str = "/ws";

/// Zustand des Upgrade-Handlers
#[derive(Clone)]
struct WsZustand {
    state: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Erstellt den Router mit dem WebSocket-Endpunkt unter `pfad`
pub fn signaling_router(
    state: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
    pfad: &str,
) -> Router {
    Router::new()
        .route(pfad, get(ws_handler))
        .with_state(WsZustand { state, shutdown_rx })
}

/// `GET <pfad>` – WebSocket-Upgrade
///
/// Bei erreichtem Verbindungslimit oder laufendem Shutdown: 503.
async fn ws_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(zustand): State<WsZustand>,
) -> Response {
    let peer_addr = connect_info.map(|ConnectInfo(addr)| addr);
    let state = zustand.state;

    if *zustand.shutdown_rx.borrow() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server wird heruntergefahren").into_response();
    }

    // Der Platz bleibt belegt, bis der Verbindungs-Task endet
    let platz = match Arc::clone(&state.verbindungs_plaetze).try_acquire_owned() {
        Ok(platz) => platz,
        Err(_) => {
            tracing::warn!(
                peer = ?peer_addr,
                max = state.config.max_clients,
                "Server voll – Verbindung abgelehnt"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Server voll").into_response();
        }
    };

    let max_groesse = state.config.max_nachrichten_groesse;
    let shutdown_rx = zustand.shutdown_rx;
    ws.max_message_size(max_groesse)
        .max_frame_size(max_groesse)
        .on_upgrade(move |socket| async move {
            ClientConnection::neu(state, peer_addr)
                .verarbeiten(socket, shutdown_rx)
                .await;
            drop(platz);
        })
}

// ---------------------------------------------------------------------------
// SignalingServer
// ---------------------------------------------------------------------------

/// WebSocket-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    bind_addr: SocketAddr,
    pfad: String,
}

impl SignalingServer {
    /// Erstellt einen neuen SignalingServer
    pub fn neu(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Self {
        Self {
            state,
            bind_addr,
            pfad: STANDARD_WS_PFAD.to_string(),
        }
    }

    /// Setzt den Pfad des WebSocket-Endpunkts
    pub fn mit_pfad(mut self, pfad: impl Into<String>) -> Self {
        self.pfad = pfad.into();
        self
    }

    /// Bindet den Socket und bedient Verbindungen
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> SignalingResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.auf_listener_starten(listener, shutdown_rx).await
    }

    /// Bedient Verbindungen auf einem bereits gebundenen Listener
    pub async fn auf_listener_starten(
        self,
        listener: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> SignalingResult<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(
            adresse = %lokale_addr,
            pfad = %self.pfad,
            server = %self.state.config.server_name,
            "WebSocket Signaling-Server gestartet"
        );

        let router = signaling_router(Arc::clone(&self.state), shutdown_rx.clone(), &self.pfad)
            .layer(axum::middleware::from_fn_with_state(
                self.state.metriken.clone(),
                timing_middleware,
            ))
            .layer(request_timing_layer());
        let mut stop_rx = shutdown_rx;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while stop_rx.changed().await.is_ok() {
                if *stop_rx.borrow() {
                    break;
                }
            }
            tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
        })
        .await?;

        tracing::info!("WebSocket Signaling-Server gestoppt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use notruf_observability::NotrufMetrics;
    use tower::ServiceExt;

    use crate::server_state::SignalingConfig;

    #[tokio::test]
    async fn anfrage_ohne_upgrade_wird_abgelehnt() {
        let state = SignalingState::neu(SignalingConfig::default(), NotrufMetrics::neu().unwrap());
        let (_tx, rx) = watch::channel(false);

        let antwort = signaling_router(state, rx, STANDARD_WS_PFAD)
            .oneshot(Request::get(STANDARD_WS_PFAD).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(antwort.status().is_client_error());
    }

    #[tokio::test]
    async fn unbekannter_pfad_liefert_404() {
        let state = SignalingState::neu(SignalingConfig::default(), NotrufMetrics::neu().unwrap());
        let (_tx, rx) = watch::channel(false);

        let antwort = signaling_router(state, rx, STANDARD_WS_PFAD)
            .oneshot(Request::get("/anderes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::NOT_FOUND);
    }
}
