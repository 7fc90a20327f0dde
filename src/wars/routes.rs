//! HTTP handlers for the wars API

use crate::error::{wars_error, Result, WarsError};
use crate::metrics::MetricsCollector;
use crate::types::{EntitySummary, VoteSubmission};
use crate::wars::leaderboard::Leaderboard;
use crate::wars::pairing::PairSelector;
use crate::wars::workflow::VoteWorkflow;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// Shared state of the wars handlers
#[derive(Clone)]
pub struct WarsState {
    pub workflow: Arc<VoteWorkflow>,
    pub pair_selector: Arc<dyn PairSelector>,
    pub leaderboard: Arc<Leaderboard>,
    pub metrics_collector: Arc<MetricsCollector>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

/// Build the `/wars` routes
pub fn router(state: WarsState) -> Router {
    Router::new()
        .route("/wars/pair", get(pair_handler))
        .route("/wars/vote", post(vote_handler))
        .route("/wars/leaderboard", get(leaderboard_handler))
        .route("/wars/entities", post(register_handler))
        .with_state(state)
}

/// Error response carrying a domain error
pub struct ApiError(anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match wars_error(&self.0) {
            Some(WarsError::InvalidInput { .. }) => (StatusCode::BAD_REQUEST, "invalid_input"),
            Some(WarsError::NotFound { .. }) => (StatusCode::NOT_FOUND, "not_found"),
            Some(WarsError::NotEnoughContenders { .. }) => {
                (StatusCode::NOT_FOUND, "not_enough_contenders")
            }
            Some(WarsError::AlreadyExists { .. }) => (StatusCode::CONFLICT, "already_exists"),
            Some(WarsError::Conflict { .. }) => (StatusCode::CONFLICT, "conflict"),
            Some(WarsError::SubmissionInProgress { .. }) => {
                (StatusCode::CONFLICT, "submission_in_progress")
            }
            Some(WarsError::StoreUnavailable { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            Some(WarsError::StoreWriteFailure { .. }) => {
                (StatusCode::BAD_GATEWAY, "store_write_failure")
            }
            Some(WarsError::ConfigurationError { .. })
            | Some(WarsError::InternalError { .. })
            | None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            error!("Request failed: {:#}", self.0);
        }

        let mut body = json!({
            "error": kind,
            "message": self.0.to_string(),
        });
        if let Some(WarsError::StoreWriteFailure { partial, .. }) = wars_error(&self.0) {
            body["partial"] = json!(partial);
        }

        (status, Json(body)).into_response()
    }
}

/// Turn a handler result into a response and count it
fn respond<T: IntoResponse>(state: &WarsState, route: &str, result: Result<T>) -> Response {
    let response = match result {
        Ok(body) => body.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    };
    state
        .metrics_collector
        .record_http_request(route, response.status().as_u16());
    response
}

async fn pair_handler(State(state): State<WarsState>) -> Response {
    let result = state.pair_selector.select_pair().await;
    if result.is_ok() {
        state.metrics_collector.record_pair_served();
    }
    respond(&state, "/wars/pair", result.map(Json))
}

/// Malformed request bodies are reported like any other invalid input
fn invalid_body(rejection: JsonRejection) -> anyhow::Error {
    WarsError::invalid_input(rejection.body_text()).into()
}

async fn vote_handler(
    State(state): State<WarsState>,
    payload: std::result::Result<Json<VoteSubmission>, JsonRejection>,
) -> Response {
    let result = match payload {
        Ok(Json(vote)) => state.workflow.submit_comparison(vote).await,
        Err(rejection) => Err(invalid_body(rejection)),
    };
    respond(&state, "/wars/vote", result.map(Json))
}

async fn leaderboard_handler(
    State(state): State<WarsState>,
    Query(query): Query<LeaderboardQuery>,
) -> Response {
    let result = state.leaderboard.top(query.limit).await;
    respond(&state, "/wars/leaderboard", result.map(Json))
}

async fn register_handler(
    State(state): State<WarsState>,
    payload: std::result::Result<Json<EntitySummary>, JsonRejection>,
) -> Response {
    let result = match payload {
        Ok(Json(entity)) => state.workflow.register_entity(entity).await,
        Err(rejection) => Err(invalid_body(rejection)),
    };
    respond(
        &state,
        "/wars/entities",
        result.map(|contender| (StatusCode::CREATED, Json(contender))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RatingSettings;
    use crate::rating::storage::{InMemoryRatingStore, RatingEntry, RatingStore};
    use crate::rating::EloRatingCalculator;
    use crate::wars::pairing::RandomPairSelector;
    use crate::wars::workflow::WorkflowSettings;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router(ids: &[&str]) -> (Router, Arc<InMemoryRatingStore>) {
        let store = Arc::new(InMemoryRatingStore::with_entries(ids.iter().map(|id| {
            RatingEntry::new(EntitySummary::new(*id, format!("repo-{id}")), 1200.0)
        })));
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap());
        let dyn_store: Arc<dyn RatingStore> = store.clone();

        let state = WarsState {
            workflow: Arc::new(VoteWorkflow::with_metrics(
                dyn_store.clone(),
                Arc::new(EloRatingCalculator::default()),
                WorkflowSettings::default(),
                metrics_collector.clone(),
            )),
            pair_selector: Arc::new(RandomPairSelector::new(dyn_store.clone())),
            leaderboard: Arc::new(Leaderboard::new(dyn_store, &RatingSettings::default())),
            metrics_collector,
        };

        (router(state), store)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_vote_endpoint() {
        let (app, store) = test_router(&["a", "b"]);

        let response = app
            .oneshot(json_request(
                "POST",
                "/wars/vote",
                json!({"winner_id": "a", "loser_id": "b"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "applied");
        assert_eq!(body["winner"]["new_rating"], 1216.0);
        assert_eq!(body["loser"]["new_rating"], 1184.0);

        let rows = store.fetch_entries(&["a".to_string()]).await.unwrap();
        assert_eq!(rows[0].rating, 1216.0);
    }

    #[tokio::test]
    async fn test_vote_error_statuses() {
        let (app, _) = test_router(&["a", "b"]);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/wars/vote",
                json!({"winner_id": "a", "loser_id": "a"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_input");

        let response = app
            .oneshot(json_request(
                "POST",
                "/wars/vote",
                json!({"winner_id": "a", "loser_id": "ghost"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_input() {
        let (app, store) = test_router(&["a", "b"]);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/wars/vote",
                json!({"winner_id": "a", "loser_id": "b", "submission_id": "not-a-uuid"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_input");
        assert!(body["message"].as_str().is_some());

        let response = app
            .oneshot(json_request("POST", "/wars/entities", json!({"name": "no id"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_input");

        let rows = store.fetch_entries(&["a".to_string()]).await.unwrap();
        assert_eq!(rows[0].matches_played, 0);
    }

    #[test]
    fn test_in_progress_maps_to_conflict() {
        let error = ApiError::from(anyhow::Error::from(WarsError::SubmissionInProgress {
            submission_id: crate::utils::generate_submission_id(),
        }));
        assert_eq!(
            error.status_and_kind(),
            (StatusCode::CONFLICT, "submission_in_progress")
        );
    }

    #[tokio::test]
    async fn test_duplicate_vote_acknowledged() {
        let (app, _) = test_router(&["a", "b"]);
        let vote = json!({
            "winner_id": "a",
            "loser_id": "b",
            "submission_id": "6f1c2d4e-8a9b-4c3d-9e7f-0a1b2c3d4e5f",
        });

        let first = app
            .clone()
            .oneshot(json_request("POST", "/wars/vote", vote.clone()))
            .await
            .unwrap();
        assert_eq!(body_json(first).await["status"], "applied");

        let second = app
            .oneshot(json_request("POST", "/wars/vote", vote))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_json(second).await["status"], "duplicate");
    }

    #[tokio::test]
    async fn test_pair_endpoint() {
        let (app, _) = test_router(&["a"]);
        let response = app
            .oneshot(Request::get("/wars/pair").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_enough_contenders");

        let (app, _) = test_router(&["a", "b"]);
        let response = app
            .oneshot(Request::get("/wars/pair").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_ne!(body["left"]["id"], body["right"]["id"]);
        assert_eq!(body["left"]["rating"], 1200.0);
    }

    #[tokio::test]
    async fn test_leaderboard_and_registration() {
        let (app, _) = test_router(&["a"]);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/wars/entities",
                json!({"id": "tokio-rs/tokio", "name": "tokio", "stars": 25000}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/wars/entities",
                json!({"id": "a", "name": "again"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(
                Request::get("/wars/leaderboard?limit=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["rank"], 1);
    }
}
