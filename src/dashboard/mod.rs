//! Dashboard: Axum web server for settings, trade history and live
//! monitoring.
//!
//! Serves a REST API and a self-contained HTML status page.
//! CORS enabled for local development.

pub mod routes;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    response::Html,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub use routes::{AppState, DashboardState};

/// The embedded dashboard HTML (compiled into the binary).
const DASHBOARD_HTML: &str = include_str!("templates/index.html");

/// Start the dashboard web server.
///
/// This spawns a background task; it doesn't block.
pub fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "Dashboard server starting on http://localhost:{port}");

        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(port, error = %e, "Failed to bind dashboard port");
                return;
            }
        };

        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // Backend API
        .route("/api/health", get(routes::health))
        .route("/api/token", get(routes::get_token))
        .route(
            "/api/settings",
            get(routes::get_settings).put(routes::put_settings),
        )
        .route(
            "/api/trades",
            get(routes::get_trades).post(routes::post_trade),
        )
        // Monitor views
        .route("/api/monitor", get(routes::get_monitor))
        .route("/api/alerts", get(routes::get_alerts))
        .route("/api/statistics", get(routes::get_statistics))
        .route("/api/statistics/reset", post(routes::reset_statistics))
        .route("/api/connection", get(routes::get_connection))
        // Dashboard HTML
        .route("/", get(serve_dashboard))
        .layer(cors)
        .with_state(state)
}

/// Serve the embedded HTML dashboard.
async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{shared_session, AlertLog, Statistics, SymbolRegistry};
    use crate::settings::Settings;
    use crate::storage::Storage;
    use crate::types::Symbol;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use parking_lot::RwLock;
    use secrecy::SecretString;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tower::ServiceExt;

    async fn test_state(token: Option<&str>) -> (AppState, watch::Receiver<Settings>) {
        let (settings_tx, settings_rx) = watch::channel(Settings::default());
        let registry =
            SymbolRegistry::with_symbols(50, [Symbol::from("R_10"), Symbol::from("R_25")]);
        let state = Arc::new(DashboardState {
            storage: Storage::in_memory().await.unwrap(),
            settings: settings_tx,
            registry: Arc::new(RwLock::new(registry)),
            alerts: Arc::new(AlertLog::default()),
            stats: Arc::new(Statistics::new()),
            session: shared_session(),
            token: token.map(|t| SecretString::new(t.to_string())),
            started: chrono::Utc::now(),
        });
        (state, settings_rx)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _) = test_state(None).await;
        let resp = build_router(state).oneshot(get_req("/api/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["db"], true);
    }

    #[tokio::test]
    async fn test_token_missing_is_500() {
        let (state, _) = test_state(None).await;
        let resp = build_router(state).oneshot(get_req("/api/token")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_token_present() {
        let (state, _) = test_state(Some("abc123")).await;
        let resp = build_router(state).oneshot(get_req("/api/token")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["token"], "abc123");
    }

    #[tokio::test]
    async fn test_settings_defaults() {
        let (state, _) = test_state(None).await;
        let resp = build_router(state).oneshot(get_req("/api/settings")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["connectionSettings"]["alertThreshold"], 5);
        assert_eq!(json["paperSettings"]["enabled"], true);
    }

    #[tokio::test]
    async fn test_put_settings_publishes_update() {
        let (state, settings_rx) = test_state(None).await;
        let app = build_router(state.clone());

        let resp = app
            .clone()
            .oneshot(json_req(
                "PUT",
                "/api/settings",
                serde_json::json!({ "connectionSettings": { "autoTrade": true } }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(settings_rx.borrow().connection_settings.auto_trade);

        let resp = app.oneshot(get_req("/api/settings")).await.unwrap();
        assert_eq!(body_json(resp).await["connectionSettings"]["autoTrade"], true);
    }

    #[tokio::test]
    async fn test_put_invalid_settings_is_400() {
        let (state, settings_rx) = test_state(None).await;
        let resp = build_router(state)
            .oneshot(json_req(
                "PUT",
                "/api/settings",
                serde_json::json!({ "autoTradeSettings": { "minClusterSize": 1 } }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(settings_rx.borrow().min_cluster_size(), 5);
    }

    #[tokio::test]
    async fn test_trades_post_and_list() {
        let (state, _) = test_state(None).await;
        let app = build_router(state);

        for (digit, ts) in [(3, 1_000i64), (8, 2_000i64)] {
            let resp = app
                .clone()
                .oneshot(json_req(
                    "POST",
                    "/api/trades",
                    serde_json::json!({
                        "symbol": "R_25",
                        "contract_type": "DIGITDIFF",
                        "amount": 1,
                        "duration": 1,
                        "target_digit": digit,
                        "paper": true,
                        "timestamp": ts
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let resp = app.oneshot(get_req("/api/trades?limit=1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        let trades = json["trades"].as_array().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0]["target_digit"], 8);
        assert_eq!(trades[0]["timestamp"], 2_000);
    }

    #[tokio::test]
    async fn test_invalid_trade_is_400() {
        let (state, _) = test_state(None).await;
        let resp = build_router(state)
            .oneshot(json_req(
                "POST",
                "/api/trades",
                serde_json::json!({ "symbol": "R_25", "amount": "lots" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trades_bad_limit_uses_default() {
        let (state, _) = test_state(None).await;
        let resp = build_router(state)
            .oneshot(get_req("/api/trades?limit=abc"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_monitor_endpoint() {
        let (state, _) = test_state(None).await;
        let resp = build_router(state).oneshot(get_req("/api/monitor")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["symbols"].as_array().unwrap().len(), 2);
        assert_eq!(json["symbols"][0]["trackers"].as_array().unwrap().len(), 10);
        assert_eq!(json["min_cluster_size"], 5);
    }

    #[tokio::test]
    async fn test_statistics_reset_logs_alert() {
        let (state, _) = test_state(None).await;
        state.stats.record_tick();
        let app = build_router(state.clone());

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/statistics/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["ticks_processed"], 0);

        let resp = app.oneshot(get_req("/api/alerts")).await.unwrap();
        let alerts = body_json(resp).await;
        assert_eq!(alerts[0]["message"], "Statistics reset");
    }

    #[tokio::test]
    async fn test_connection_endpoint() {
        let (state, _) = test_state(None).await;
        state.session.write().connected = true;
        let resp = build_router(state).oneshot(get_req("/api/connection")).await.unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["connected"], true);
        assert!(json["account"].is_null());
    }

    #[tokio::test]
    async fn test_dashboard_html() {
        let (state, _) = test_state(None).await;
        let resp = build_router(state).oneshot(get_req("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("DIGITWATCH"));
        assert!(html.contains("Dashboard"));
    }
}
