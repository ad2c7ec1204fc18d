use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64ct::{Base64, Encoding};
use bson::{doc, Bson};
use bytes::Bytes;
use tracing::{error, instrument, warn};

use crate::{
    state::AppState,
    storage::{upload_audio, PRESIGN_TTL_SECS},
    users::{
        dto::{
            AddTestRequest, CreateUserRequest, ExamView, LatestExamResponse, OutcomeResponse,
            UserView,
        },
        model::{ActiveUser, Age, NewExam, StoreStats, WriteOutcome},
    },
};

type ApiError = (StatusCode, String);

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/createUser", post(create_user))
        .route("/addTestToUser", post(add_test_to_user))
        .route("/users", get(list_users))
        .route("/users/active", get(list_active_users))
        .route("/users/:id", get(get_user))
        .route("/users/:id/exams/latest", get(get_latest_exam))
        .route("/users/:id/snapshot", post(update_snapshot))
        .route("/users/:id/deactivate", post(deactivate_user))
        .route("/stats", get(stats))
}

fn status_for(outcome: WriteOutcome, success: StatusCode) -> StatusCode {
    match outcome {
        WriteOutcome::Success => success,
        WriteOutcome::NotFound => StatusCode::NOT_FOUND,
        WriteOutcome::Duplicate => StatusCode::CONFLICT,
        WriteOutcome::Unchanged => StatusCode::OK,
        WriteOutcome::StoreError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond(outcome: WriteOutcome, success: StatusCode) -> (StatusCode, Json<OutcomeResponse>) {
    (status_for(outcome, success), Json(outcome.into()))
}

#[instrument(skip(state, payload), fields(user_id = %payload.user_id))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<OutcomeResponse>), ApiError> {
    let user_id = payload.user_id.trim();
    if user_id.is_empty() {
        warn!("empty user id");
        return Err((StatusCode::BAD_REQUEST, "userId must be non-empty".into()));
    }

    let outcome = state
        .store
        .add_user(user_id, payload.user_name.trim(), payload.age)
        .await;
    Ok(respond(outcome, StatusCode::CREATED))
}

#[instrument(skip(state, payload), fields(user_id = %payload.user_id))]
pub async fn add_test_to_user(
    State(state): State<AppState>,
    Json(payload): Json<AddTestRequest>,
) -> Result<(StatusCode, Json<OutcomeResponse>), ApiError> {
    let user_id = payload.user_id.trim().to_string();
    if user_id.is_empty() {
        warn!("empty user id");
        return Err((StatusCode::BAD_REQUEST, "userId must be non-empty".into()));
    }

    // checked before touching object storage so unknown users leave no blobs behind
    let known = state.store.check_user(&user_id).await;
    if !known.is_success() {
        return Ok(respond(known, StatusCode::OK));
    }

    let audio_file = match payload.audio_file.as_deref().filter(|a| !a.is_empty()) {
        Some(encoded) => {
            let raw = Base64::decode_vec(strip_data_url(encoded)).map_err(|e| {
                warn!(error = %e, "invalid base64 audio");
                (StatusCode::BAD_REQUEST, "audioFile is not valid base64".to_string())
            })?;
            match &state.audio {
                Some(audio) => Some(
                    upload_audio(
                        audio.as_ref(),
                        &user_id,
                        Bytes::from(raw),
                        &payload.audio_content_type,
                    )
                    .await
                    .map_err(|e| {
                        error!(error = %e, "audio upload failed");
                        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                    })?,
                ),
                None => {
                    warn!("audio received but no audio storage configured; dropping it");
                    None
                }
            }
        }
        None => None,
    };

    let final_evaluation = bson::to_bson(&payload.final_evaluation).map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("invalid finalEvaluation: {}", e))
    })?;

    let exam = NewExam {
        time_took: payload.time_took,
        errors: Bson::Document(doc! {
            "correct": payload.correct,
            "partly": payload.partly,
            "wrong": payload.wrong,
        }),
        audio_file,
        final_evaluation,
    };

    let outcome = state.store.add_exam_to_user(&user_id, exam).await;
    if outcome.is_success() {
        let snapshot = match payload.age_years {
            Some(years) => {
                let age = Age {
                    years,
                    months: payload.age_months,
                };
                state.store.update_snapshot_with_age(&user_id, age).await
            }
            None => state.store.update_last_snapshot(&user_id).await,
        };
        if snapshot == WriteOutcome::StoreError {
            warn!("exam stored but snapshot refresh failed");
        }
    }
    Ok(respond(outcome, StatusCode::OK))
}

/// Front ends send `data:audio/webm;base64,....`; keep only the payload.
fn strip_data_url(encoded: &str) -> &str {
    match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    }
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Json<Vec<serde_json::Value>> {
    let users = state.store.get_all_users().await;
    Json(
        users
            .into_iter()
            .map(|d| Bson::Document(d).into_relaxed_extjson())
            .collect(),
    )
}

#[instrument(skip(state))]
pub async fn list_active_users(State(state): State<AppState>) -> Json<Vec<ActiveUser>> {
    Json(state.store.get_active_users().await)
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    state
        .store
        .get_user_config(&id)
        .await
        .map(|u| Json(u.into()))
        .ok_or((StatusCode::NOT_FOUND, "User not found".into()))
}

#[instrument(skip(state))]
pub async fn get_latest_exam(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LatestExamResponse>, ApiError> {
    let exam = state
        .store
        .get_latest_exam(&id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "No exams recorded".into()))?;

    let audio_url = match (&state.audio, exam.audio_file.as_deref()) {
        (Some(audio), Some(key)) => match audio.presign_get(key, PRESIGN_TTL_SECS).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, key = %key, "presign failed; returning exam without link");
                None
            }
        },
        _ => None,
    };

    Ok(Json(LatestExamResponse {
        exam: ExamView::from(exam),
        audio_url,
    }))
}

#[instrument(skip(state))]
pub async fn update_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<OutcomeResponse>) {
    respond(state.store.update_last_snapshot(&id).await, StatusCode::OK)
}

#[instrument(skip(state))]
pub async fn deactivate_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<OutcomeResponse>) {
    respond(state.store.deactivate_user(&id).await, StatusCode::OK)
}

#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Result<Json<StoreStats>, ApiError> {
    state
        .store
        .get_stats()
        .await
        .map(Json)
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "stats unavailable".into()))
}
