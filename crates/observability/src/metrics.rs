//! Prometheus-kompatible Metriken fuer Notruf
//!
//! Registrierte Metriken:
//! - `notruf_connected_clients` – Gauge: Offene WebSocket-Verbindungen
//! - `notruf_online_users` – Gauge: Eintraege in der Presence-Registry
//! - `notruf_inbound_events_total` – Counter: Empfangene Ereignisse (event)
//! - `notruf_discarded_events_total` – Counter: Still verworfene Ereignisse (event)
//! - `notruf_broadcasts_total` – Counter: Versendete `online-users`-Snapshots
//! - `notruf_relayed_signals_total` – Counter: Weitergeleitete Signaling-Ereignisse (event)
//! - `notruf_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `notruf_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Notruf-Prometheus-Metriken
///
/// Clone teilt die Registry und alle Metrik-Handles.
#[derive(Clone)]
pub struct NotrufMetrics {
    pub registry: Arc<Registry>,

    // Signaling-Metriken
    pub connected_clients: IntGauge,
    pub online_users: IntGauge,
    pub inbound_events_total: IntCounterVec,
    pub discarded_events_total: IntCounterVec,
    pub broadcasts_total: IntCounter,
    pub relayed_signals_total: IntCounterVec,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl NotrufMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Signaling-Metriken ---
        let connected_clients = IntGauge::with_opts(Opts::new(
            "notruf_connected_clients",
            "Anzahl offener WebSocket-Verbindungen",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let online_users = IntGauge::with_opts(Opts::new(
            "notruf_online_users",
            "Anzahl gemeldeter User in der Presence-Registry",
        ))?;
        registry.register(Box::new(online_users.clone()))?;

        let inbound_events_total = IntCounterVec::new(
            Opts::new(
                "notruf_inbound_events_total",
                "Gesamtanzahl empfangener Client-Ereignisse",
            ),
            &["event"],
        )?;
        registry.register(Box::new(inbound_events_total.clone()))?;

        let discarded_events_total = IntCounterVec::new(
            Opts::new(
                "notruf_discarded_events_total",
                "Gesamtanzahl still verworfener Client-Ereignisse",
            ),
            &["event"],
        )?;
        registry.register(Box::new(discarded_events_total.clone()))?;

        let broadcasts_total = IntCounter::with_opts(Opts::new(
            "notruf_broadcasts_total",
            "Gesamtanzahl versendeter Presence-Snapshots",
        ))?;
        registry.register(Box::new(broadcasts_total.clone()))?;

        let relayed_signals_total = IntCounterVec::new(
            Opts::new(
                "notruf_relayed_signals_total",
                "Gesamtanzahl weitergeleiteter Signaling-Ereignisse",
            ),
            &["event"],
        )?;
        registry.register(Box::new(relayed_signals_total.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("notruf_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "notruf_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            online_users,
            inbound_events_total,
            discarded_events_total,
            broadcasts_total,
            relayed_signals_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Zaehlt ein empfangenes Ereignis
    pub fn ereignis_empfangen(&self, event: &str) {
        self.inbound_events_total.with_label_values(&[event]).inc();
    }

    /// Zaehlt ein still verworfenes Ereignis
    pub fn ereignis_verworfen(&self, event: &str) {
        self.discarded_events_total.with_label_values(&[event]).inc();
    }

    /// Zaehlt ein weitergeleitetes Signaling-Ereignis
    pub fn signal_weitergeleitet(&self, event: &str) {
        self.relayed_signals_total.with_label_values(&[event]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: NotrufMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(
    axum::extract::State(metriken): axum::extract::State<NotrufMetrics>,
) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
