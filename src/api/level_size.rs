//! Level size endpoint.
//!
//! `GET /` snapshots the trade window and computes the level size over the
//! relevant sub-window. Window access never awaits.

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::models::WindowConfig;
use crate::scrapers::trade_window::TradeWindow;
use crate::sizing::{CalibrationCurve, LevelSize};

/// Hint sent in `Retry-After` on retryable 503s.
const RETRY_AFTER_MS: i64 = 250;

/// State shared by every request.
#[derive(Debug, Clone)]
pub struct LevelSizeState {
    pub window: Arc<TradeWindow>,
    pub relevant: Duration,
    pub curve: Arc<CalibrationCurve>,
}

impl LevelSizeState {
    pub fn new(window: Arc<TradeWindow>, config: WindowConfig) -> Self {
        Self {
            window,
            relevant: Duration::from_std(config.relevant).unwrap_or_else(|_| Duration::seconds(10)),
            curve: Arc::new(CalibrationCurve::default()),
        }
    }
}

/// User-visible query failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The window has not been bootstrapped yet.
    NotYetInitialized,
    /// No trades inside the relevant sub-window.
    EmptyRelevantWindow,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotYetInitialized => write!(f, "Not yet initialized"),
            Self::EmptyRelevantWindow => write!(f, "No trades in the relevant window"),
        }
    }
}

impl std::error::Error for QueryError {}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        // Both are transient: a new trade or the bootstrap will clear them.
        let retry_at = (Utc::now() + Duration::milliseconds(RETRY_AFTER_MS))
            .to_rfc3339_opts(SecondsFormat::Micros, false);
        let body = Json(json!({ "detail": self.to_string() }));

        let mut response = (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_at) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

pub async fn get_level_size(
    State(state): State<LevelSizeState>,
) -> Result<Json<LevelSize>, QueryError> {
    let snapshot = state.window.snapshot().ok_or(QueryError::NotYetInitialized)?;

    LevelSize::compute(&snapshot, Utc::now(), state.relevant, &state.curve)
        .map(Json)
        .ok_or(QueryError::EmptyRelevantWindow)
}

pub async fn health_check(State(state): State<LevelSizeState>) -> Json<serde_json::Value> {
    let trades = state.window.len();
    Json(json!({
        "status": "ok",
        "initialized": trades.is_some(),
        "trades": trades.unwrap_or(0),
    }))
}

pub fn level_size_router() -> Router<LevelSizeState> {
    Router::new()
        .route("/", get(get_level_size))
        .route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Trade;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> LevelSizeState {
        let window = Arc::new(TradeWindow::new(std::time::Duration::from_secs(60)));
        LevelSizeState::new(window, WindowConfig::default())
    }

    fn trade(id: &str, price: f64, ts: chrono::DateTime<Utc>) -> Trade {
        Trade {
            id: id.to_string(),
            price,
            amount: 0.1,
            timestamp: ts,
        }
    }

    async fn get(state: LevelSizeState, uri: &str) -> Response {
        level_size_router()
            .with_state(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_not_ready_before_bootstrap() {
        let response = get(state(), "/").await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let retry = response
            .headers()
            .get(header::RETRY_AFTER)
            .expect("Retry-After header")
            .to_str()
            .unwrap()
            .to_string();
        let retry_at = chrono::DateTime::parse_from_rfc3339(&retry)
            .unwrap()
            .with_timezone(&Utc);
        assert!(retry_at > Utc::now() - Duration::seconds(1));

        let body = body_json(response).await;
        assert_eq!(body["detail"], "Not yet initialized");
    }

    #[tokio::test]
    async fn test_level_size_after_bootstrap() {
        let s = state();
        let now = Utc::now();
        s.window.replace_all(vec![
            trade("1", 100.0, now),
            trade("2", 101.0, now),
            trade("3", 99.0, now),
        ]);

        let response = get(s, "/").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["trades"], 3);
        assert_eq!(body["relevant_trades"], 3);
        let level_size = body["level_size"].as_f64().unwrap();
        let relative = body["level_size_relative"].as_f64().unwrap();
        assert!((level_size - 0.00495).abs() < 1e-9);
        assert!(relative >= 0.00005 * 0.9 && relative <= 0.0004 * 1.1);
        assert!(body["first_trade"].is_string());
        assert!(body["first_relevant_trade"].is_string());
    }

    #[tokio::test]
    async fn test_quiet_market_is_retryable() {
        let s = state();
        s.window
            .replace_all(vec![trade("1", 100.0, Utc::now() - Duration::seconds(30))]);

        let response = get(s, "/").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        let body = body_json(response).await;
        assert_eq!(body["detail"], QueryError::EmptyRelevantWindow.to_string());
    }

    #[tokio::test]
    async fn test_health_reports_initialisation() {
        let s = state();
        let body = body_json(get(s.clone(), "/health").await).await;
        assert_eq!(body["initialized"], false);

        s.window.replace_all(vec![trade("1", 100.0, Utc::now())]);
        let body = body_json(get(s, "/health").await).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["initialized"], true);
        assert_eq!(body["trades"], 1);
    }
}
