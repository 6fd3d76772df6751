use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::state::SharedState;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .with_state(state)
}

async fn api_status(State(state): State<SharedState>) -> impl IntoResponse {
    let st = state.read().await;
    Json(st.to_status())
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: SharedState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    tracing::info!(%addr, "status endpoint listening");

    axum::serve(listener, router(state))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::plan::{Plan, PlanCore};
    use crate::state::AgentState;
    use crate::status::{self, Status};

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn status_reflects_published_snapshot() {
        let shared = AgentState::shared();
        {
            let mut st = shared.write().await;
            let plan = Plan::Basic(PlanCore::new("balcony", 250).unwrap());
            st.record_plan(&plan, &Status::success(status::BASIC_PLAN_SUCCESS));
            st.record_cycle(91.5, 44, Some(plan));
        }

        let (code, json) = get_json(router(shared), "/api/status").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(json["water_percent"], 91.5);
        assert_eq!(json["moisture_percent"], 44);
        assert_eq!(json["cycles"], 1);
        assert_eq!(json["running_plan"]["plan_type"], "basic");
        assert_eq!(json["running_plan"]["name"], "balcony");
        assert_eq!(json["last_status"]["watering_status"], true);
        assert_eq!(json["events"][0]["kind"], "plan");
    }

    #[tokio::test]
    async fn fresh_agent_reports_no_plan() {
        let (code, json) = get_json(router(AgentState::shared()), "/api/status").await;
        assert_eq!(code, StatusCode::OK);
        assert!(json["running_plan"].is_null());
        assert!(json["last_status"].is_null());
        assert_eq!(json["cycles"], 0);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (code, _) = get_json(router(AgentState::shared()), "/nope").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }
}
