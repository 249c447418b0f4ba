//! HTTP control surface: monitor listing and subscription CRUD.
//!
//! The API mutates only the subscription map; the monitor map is owned
//! by the session engine and read here.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::persistence::save_subscriptions;
use crate::state::{SharedMonitors, SharedSubscriptions, Subscription};

#[derive(Clone)]
pub struct AppState {
    pub monitors: SharedMonitors,
    pub subscriptions: SharedSubscriptions,
    pub started_at: Instant,
}

// ─── Health ───────────────────────────────────────────────────────────────────

pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": app.started_at.elapsed().as_secs(),
    }))
}

// ─── Monitors ─────────────────────────────────────────────────────────────────

/// GET /api/monitors
pub async fn list_monitors(State(app): State<AppState>) -> Response {
    let monitors = app.monitors.read().await;
    let mut list: Vec<_> = monitors.values().cloned().collect();
    list.sort_by_key(|m| m.mac_address);
    Json(list).into_response()
}

// ─── Subscriptions ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub url: String,
}

/// GET /subscriptions
pub async fn list_subscriptions(State(app): State<AppState>) -> Response {
    let subscriptions = app.subscriptions.read().await;
    let mut list: Vec<_> = subscriptions.values().cloned().collect();
    list.sort_by_key(|s| s.subscription_id);
    Json(list).into_response()
}

/// POST /api/monitor/:mac/subscribe
pub async fn subscribe(
    State(app): State<AppState>,
    Path(mac): Path<String>,
    Json(body): Json<SubscribeRequest>,
) -> Response {
    let monitor_id = match mac.parse() {
        Ok(mac) => mac,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response();
        }
    };
    if body.url.parse::<reqwest::Url>().is_err() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid callback url" })))
            .into_response();
    }

    let subscription =
        Subscription { monitor_id, url: body.url, subscription_id: Uuid::new_v4() };
    info!(
        monitor = %subscription.monitor_id,
        url = %subscription.url,
        subscription = %subscription.subscription_id,
        "subscription created"
    );

    {
        let mut subscriptions = app.subscriptions.write().await;
        subscriptions.insert(subscription.subscription_id, subscription.clone());
        if let Err(e) = save_subscriptions(&subscriptions).await {
            warn!("failed to persist subscriptions: {e}");
        }
    }

    Json(subscription).into_response()
}

/// DELETE /api/subscribe/:subscription_id
pub async fn unsubscribe(
    State(app): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> StatusCode {
    let mut subscriptions = app.subscriptions.write().await;
    match subscriptions.remove(&subscription_id) {
        Some(sub) => {
            info!(monitor = %sub.monitor_id, subscription = %subscription_id, "subscription removed");
            if let Err(e) = save_subscriptions(&subscriptions).await {
                warn!("failed to persist subscriptions: {e}");
            }
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn test_state() -> AppState {
        AppState {
            monitors: Arc::new(RwLock::new(HashMap::new())),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            started_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn subscribe_rejects_bad_input() {
        let app = test_state();
        let response = subscribe(
            State(app.clone()),
            Path("not-a-mac".into()),
            Json(SubscribeRequest { url: "http://example.com/hook".into() }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = subscribe(
            State(app.clone()),
            Path("06:08:06:08:00:01".into()),
            Json(SubscribeRequest { url: "not a url".into() }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.subscriptions.read().await.is_empty());
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe() {
        let app = test_state();
        let response = subscribe(
            State(app.clone()),
            Path("06:08:06:08:00:01".into()),
            Json(SubscribeRequest { url: "http://example.com/hook".into() }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let id = *app.subscriptions.read().await.keys().next().unwrap();
        assert_eq!(unsubscribe(State(app.clone()), Path(id)).await, StatusCode::NO_CONTENT);
        assert_eq!(unsubscribe(State(app.clone()), Path(id)).await, StatusCode::NOT_FOUND);
    }
}
