// HTTP route handlers for the Praxis API

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use praxis_common::{Difficulty, Verdict};
use praxis_engine::Grader;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{metrics, AppState};

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub exercise: String,
    pub source_code: String,
}

#[derive(Debug, Serialize)]
pub struct GradeResponse {
    pub exercise: String,
    pub passed: bool,
    pub verdict: Verdict,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Published exercise as the editor shell sees it; the reference
/// solution never leaves the server.
#[derive(Debug, Serialize)]
pub struct ExerciseSummary {
    pub slug: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub point_value: u32,
    pub starter_code: String,
    pub test_script: String,
}

/// POST /grade - Grade one submission against a published exercise
pub async fn grade(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GradeRequest>,
) -> Response {
    let exercise = match state.registry.get(&payload.exercise) {
        Some(exercise) => exercise.clone(),
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("unknown exercise `{}`", payload.exercise),
                }),
            )
                .into_response();
        }
    };

    metrics::record_submission(&exercise.slug);
    let slug = exercise.slug.clone();
    let grader = Grader::new(exercise, state.config.clone());

    match grader.submit(payload.source_code).await {
        Ok(Some(verdict)) => {
            metrics::record_verdict(&slug, verdict.outcome.kind(), verdict.elapsed_ms as f64);
            tracing::info!(
                exercise = %slug,
                outcome = verdict.outcome.kind(),
                elapsed_ms = verdict.elapsed_ms,
                "submission graded"
            );
            (
                StatusCode::OK,
                Json(GradeResponse {
                    exercise: slug,
                    passed: verdict.passed(),
                    verdict,
                }),
            )
                .into_response()
        }
        Ok(None) => {
            // A per-request grader has nothing to supersede it; treat a
            // dropped verdict as a pipeline defect.
            metrics::record_grader_error(&slug);
            tracing::error!(exercise = %slug, "verdict dropped for a per-request grader");
            internal_error()
        }
        Err(err) => {
            metrics::record_grader_error(&slug);
            tracing::error!(exercise = %slug, error = %err, "internal grader error");
            internal_error()
        }
    }
}

/// An internal grader error is a retry prompt, never a verdict.
fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "The grader hit an internal problem. Your code was not judged - please retry."
                .to_string(),
        }),
    )
        .into_response()
}

/// GET /exercises - Published exercises, without reference solutions
pub async fn list_exercises(State(state): State<Arc<AppState>>) -> Response {
    let exercises: Vec<ExerciseSummary> = state
        .registry
        .published()
        .iter()
        .map(|e| ExerciseSummary {
            slug: e.slug.clone(),
            title: e.title.clone(),
            difficulty: e.difficulty,
            point_value: e.point_value,
            starter_code: e.starter_code.clone(),
            test_script: e.test_script.clone(),
        })
        .collect();

    (StatusCode::OK, Json(exercises)).into_response()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub published_exercises: usize,
    pub uptime_s: u64,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            published_exercises: state.registry.len(),
            uptime_s: state.start_time.elapsed().as_secs(),
        }),
    )
        .into_response()
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics_text() -> Response {
    (StatusCode::OK, metrics::render_metrics()).into_response()
}
