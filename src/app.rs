use std::net::SocketAddr;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{analysis, auth, profile, tracker};

/// Room for a 5MB photo after base64 inflation plus the JSON around it.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(analysis::handlers::routes())
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(profile::router())
                .merge(tracker::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::signed_in;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        token: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_is_public() {
        let res = build_app(AppState::fake())
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tracker_routes_require_auth() {
        let res = build_app(AppState::fake())
            .oneshot(Request::get("/api/v1/summary").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn analyze_confirm_flow_updates_summary() {
        let state = AppState::fake();
        let (_, token) = signed_in(&state).await;
        let image = "data:image/png;base64,iVBORw0KGgo=";

        let (status, pending) = send(
            &state,
            "POST",
            "/api/v1/meals/analyze",
            &token,
            Some(json!({ "image": image, "mealType": "jantar" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending["calories"], 650);
        let ticket = pending["ticket"].as_str().unwrap().to_string();

        let (status, confirmed) = send(
            &state,
            "POST",
            "/api/v1/meals/confirm",
            &token,
            Some(json!({ "ticket": ticket })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(confirmed["meal"]["mealType"], "jantar");
        assert_eq!(confirmed["summary"]["caloriesConsumed"], 650);
        assert_eq!(confirmed["summary"]["caloriesBurned"], 0);

        // same ticket again: nothing pending
        let (status, json) = send(
            &state,
            "POST",
            "/api/v1/meals/confirm",
            &token,
            Some(json!({ "ticket": ticket })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "no_pending_analysis");

        let (_, meals) = send(&state, "GET", "/api/v1/meals", &token, None).await;
        assert_eq!(meals.as_array().unwrap().len(), 1);

        let meal_id = confirmed["meal"]["id"].as_str().unwrap();
        let (status, _) = send(&state, "GET", &format!("/api/v1/meals/{}", meal_id), &token, None).await;
        assert_eq!(status, StatusCode::OK);
        // no photo archive configured
        let (status, _) = send(&state, "GET", &format!("/api/v1/meals/{}/photo", meal_id), &token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn raw_upload_is_sniffed_and_bounded() {
        let state = AppState::fake();
        let (_, token) = signed_in(&state).await;

        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        let req = Request::post("/api/v1/meals/analyze/upload?mealType=lanche")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(jpeg.to_vec()))
            .unwrap();
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let req = Request::post("/api/v1/meals/analyze/upload")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(b"plain text, not a photo".to_vec()))
            .unwrap();
        let res = build_app(state).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn water_and_reset() {
        let state = AppState::fake();
        let (_, token) = signed_in(&state).await;

        let (status, summary) = send(&state, "POST", "/api/v1/water", &token, Some(json!({ "amountMl": 3000 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["waterConsumedMl"], 2450);

        let (status, _) = send(&state, "POST", "/api/v1/water", &token, Some(json!({ "amountMl": 0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, summary) = send(&state, "POST", "/api/v1/summary/reset", &token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["waterConsumedMl"], 0);
    }

    #[tokio::test]
    async fn activities_round_trip() {
        let state = AppState::fake();
        let (_, token) = signed_in(&state).await;

        let (status, _) = send(
            &state,
            "POST",
            "/api/v1/activities",
            &token,
            Some(json!({ "kind": "walk", "durationMinutes": 40, "caloriesBurned": 150 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, list) = send(&state, "GET", "/api/v1/activities", &token, None).await;
        assert_eq!(list[0]["kind"], "walk");
    }

    #[tokio::test]
    async fn bad_path_and_body_are_json_errors() {
        let state = AppState::fake();
        let (_, token) = signed_in(&state).await;

        let (status, json) = send(&state, "GET", "/api/v1/meals/not-a-uuid", &token, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_path");

        let (status, json) = send(&state, "POST", "/api/v1/water", &token, Some(json!({ "amountMl": "lots" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_body");

        let (status, json) = send(&state, "POST", "/api/v1/auth/login", &token, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_body");
    }

    #[tokio::test]
    async fn cancel_reports_whether_anything_was_cleared() {
        let state = AppState::fake();
        let (_, token) = signed_in(&state).await;
        let (status, json) = send(&state, "POST", "/api/v1/meals/analysis/cancel", &token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cancelled"], false);
    }
}
