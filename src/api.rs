use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::database::repo::ResultStore;
use crate::events::{EventBus, InMemoryLibrary, MediaItem, PlaybackEvent};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ResultStore>,
    pub bus: Arc<EventBus>,
    pub library: Arc<InMemoryLibrary>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/JellyRay/health", get(health))
        .route("/JellyRay/faces", get(get_faces))
        .route("/JellyRay/playback", post(report_playback))
        .route("/JellyRay/library", post(register_item))
        .with_state(state)
}

async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "jellyray ok")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FacesQuery {
    item_id: Uuid,
    ticks: i64,
    #[serde(default = "default_padding")]
    padding_seconds: i64,
}

fn default_padding() -> i64 {
    5
}

#[derive(Debug, Serialize)]
struct FacesResponse {
    faces: Vec<FaceEntry>,
}

#[derive(Debug, Serialize)]
struct FaceEntry {
    name: String,
    confidence: f64,
}

/// Identities visible around a viewing instant, best confidence per name.
async fn get_faces(State(state): State<AppState>, Query(q): Query<FacesQuery>) -> Response {
    match state.store.query(q.item_id, q.ticks, q.padding_seconds) {
        Ok(results) => {
            let faces = results
                .into_iter()
                .map(|r| FaceEntry {
                    name: r.label,
                    confidence: r.confidence,
                })
                .collect();
            Json(FacesResponse { faces }).into_response()
        }
        Err(e) => {
            error!("Faces query failed for {}: {:#}", q.item_id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Host-facing ingress for playback-state transitions; replaces the original
/// in-process session-manager subscription.
async fn report_playback(
    State(state): State<AppState>,
    Json(event): Json<PlaybackEvent>,
) -> StatusCode {
    state.bus.publish(event);
    StatusCode::NO_CONTENT
}

async fn register_item(
    State(state): State<AppState>,
    Json(item): Json<MediaItem>,
) -> StatusCode {
    state.library.insert(item);
    StatusCode::NO_CONTENT
}
