use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::progress_store::{ProgressStore, SharedProgressStore};
use crate::server_utils::{sanitize_room_id, session_user_id};
use crate::types::{CompletionRequest, ProgressUpdate};

#[derive(Clone)]
pub struct ApiState {
    pub store: SharedProgressStore,
    pub session_cookie: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoomQuery {
    #[serde(rename = "roomId")]
    pub room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveProgressBody {
    room_id: Option<String>,
    #[serde(default)]
    current_step: usize,
    #[serde(default)]
    collected_items: Vec<String>,
    #[serde(default)]
    solved_puzzles: Vec<String>,
    #[serde(default)]
    hints_used: u32,
    #[serde(default)]
    score: u32,
    #[serde(default)]
    time_elapsed: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody {
    room_id: Option<String>,
    #[serde(default)]
    final_score: u32,
    #[serde(default)]
    total_time: u64,
    #[serde(default)]
    hints_used: u32,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/game/progress",
            get(get_progress).post(save_progress).delete(delete_progress),
        )
        .route("/api/game/complete", post(complete_game))
        .with_state(state)
}

pub async fn get_progress(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<RoomQuery>,
) -> Response {
    let Some(user_id) = session_user_id(&headers, &state.session_cookie) else {
        return unauthorized();
    };
    let Some(room_id) = sanitize_room_id(query.room_id.as_deref()) else {
        return room_required();
    };
    with_store(&state, |store| {
        let progress = store.get_progress(&user_id, &room_id).cloned();
        Json(json!({ "progress": progress })).into_response()
    })
}

pub async fn save_progress(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(user_id) = session_user_id(&headers, &state.session_cookie) else {
        return unauthorized();
    };
    let body: SaveProgressBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(error) => {
            warn!(%error, "rejected progress payload");
            return (StatusCode::BAD_REQUEST, "Invalid request body").into_response();
        }
    };
    let Some(room_id) = sanitize_room_id(body.room_id.as_deref()) else {
        return room_required();
    };
    let update = ProgressUpdate {
        current_step: body.current_step,
        score: body.score,
        hints_used: body.hints_used,
        time_elapsed: body.time_elapsed,
        collected_items: body.collected_items,
        solved_puzzles: body.solved_puzzles,
    };
    with_store(&state, |store| {
        let progress = store.upsert_progress(&user_id, &room_id, &update);
        Json(json!({ "progress": progress })).into_response()
    })
}

pub async fn delete_progress(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<RoomQuery>,
) -> Response {
    let Some(user_id) = session_user_id(&headers, &state.session_cookie) else {
        return unauthorized();
    };
    let Some(room_id) = sanitize_room_id(query.room_id.as_deref()) else {
        return room_required();
    };
    with_store(&state, |store| {
        store.reset(&user_id, &room_id);
        Json(json!({ "success": true })).into_response()
    })
}

pub async fn complete_game(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(user_id) = session_user_id(&headers, &state.session_cookie) else {
        return unauthorized();
    };
    let body: CompleteBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(error) => {
            warn!(%error, "rejected completion payload");
            return (StatusCode::BAD_REQUEST, "Invalid request body").into_response();
        }
    };
    let Some(room_id) = sanitize_room_id(body.room_id.as_deref()) else {
        return room_required();
    };
    let request = CompletionRequest {
        final_score: body.final_score,
        total_time: body.total_time,
        hints_used: body.hints_used,
    };
    with_store(&state, |store| {
        let result = store.complete(&user_id, &room_id, &request);
        Json(json!({
            "success": true,
            "completion": result.completion,
            "isNewRecord": result.is_new_record,
        }))
        .into_response()
    })
}

fn with_store(state: &ApiState, apply: impl FnOnce(&mut ProgressStore) -> Response) -> Response {
    match state.store.lock() {
        Ok(mut guard) => apply(&mut *guard),
        Err(_) => {
            error!("progress store lock poisoned");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

fn room_required() -> Response {
    (StatusCode::BAD_REQUEST, "Room ID is required").into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::header::COOKIE;
    use axum::http::HeaderValue;
    use serde_json::Value;

    use super::*;

    fn state() -> ApiState {
        ApiState {
            store: ProgressStore::in_memory().into_shared(),
            session_cookie: "escape_session".to_string(),
        }
    }

    fn signed_in(user_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("escape_session={user_id}")).expect("cookie"),
        );
        headers
    }

    fn room(room_id: &str) -> Query<RoomQuery> {
        Query(RoomQuery {
            room_id: Some(room_id.to_string()),
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn requests_without_session_are_unauthorized() {
        let response = get_progress(State(state()), HeaderMap::new(), room("samsung-sds")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = save_progress(State(state()), HeaderMap::new(), Bytes::from("not json")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_room_id_is_a_bad_request() {
        let response = get_progress(
            State(state()),
            signed_in("u1"),
            Query(RoomQuery::default()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = complete_game(
            State(state()),
            signed_in("u1"),
            Bytes::from(r#"{"finalScore":100,"totalTime":10,"hintsUsed":0}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn saved_progress_is_returned_and_cleared() {
        let state = state();
        let response = get_progress(State(state.clone()), signed_in("u1"), room("samsung-sds")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["progress"], Value::Null);

        let response = save_progress(
            State(state.clone()),
            signed_in("u1"),
            Bytes::from(r#"{"roomId":"samsung-sds","currentStep":4,"score":10,"timeElapsed":61}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let saved = body_json(response).await;
        assert_eq!(saved["progress"]["currentStep"], 4);
        assert_eq!(saved["progress"]["hintsUsed"], 0);
        assert_eq!(saved["progress"]["collectedItems"], serde_json::json!([]));

        let response = get_progress(State(state.clone()), signed_in("u1"), room("samsung-sds")).await;
        assert_eq!(body_json(response).await["progress"]["timeElapsed"], 61);
        let response = get_progress(State(state.clone()), signed_in("u2"), room("samsung-sds")).await;
        assert_eq!(body_json(response).await["progress"], Value::Null);

        let response = delete_progress(State(state.clone()), signed_in("u1"), room("samsung-sds")).await;
        assert_eq!(body_json(response).await["success"], true);
        let response = get_progress(State(state), signed_in("u1"), room("samsung-sds")).await;
        assert_eq!(body_json(response).await["progress"], Value::Null);
    }

    #[tokio::test]
    async fn completion_reports_new_records() {
        let state = state();
        let first = complete_game(
            State(state.clone()),
            signed_in("u1"),
            Bytes::from(r#"{"roomId":"samsung-sds","finalScore":150,"totalTime":200,"hintsUsed":1}"#),
        )
        .await;
        let first = body_json(first).await;
        assert_eq!(first["success"], true);
        assert_eq!(first["isNewRecord"], true);
        assert_eq!(first["completion"]["totalAttempts"], 1);

        let second = complete_game(
            State(state),
            signed_in("u1"),
            Bytes::from(r#"{"roomId":"samsung-sds","finalScore":140,"totalTime":260,"hintsUsed":0}"#),
        )
        .await;
        let second = body_json(second).await;
        assert_eq!(second["isNewRecord"], false);
        assert_eq!(second["completion"]["bestTime"], 200);
        assert_eq!(second["completion"]["totalAttempts"], 2);
    }
}
