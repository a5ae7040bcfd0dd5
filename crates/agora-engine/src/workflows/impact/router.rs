use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{
    ChallengeId, CompletionReport, EvidenceTier, MeasurementInput, ValidationOutcome,
};
use super::service::{CompletionStore, ImpactValidationService, ValidationError};
use crate::workflows::enrollment::domain::UserId;

/// Router builder exposing HTTP endpoints for completion reporting and the
/// monthly handprint.
pub fn impact_router<S>(service: Arc<ImpactValidationService<S>>) -> Router
where
    S: CompletionStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/challenges/:challenge_id/completions",
            post(complete_handler::<S>),
        )
        .route(
            "/api/v1/users/:user_id/handprint",
            get(handprint_handler::<S>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct CompletionRequest {
    user_id: String,
    evidence: EvidenceTier,
    #[serde(default)]
    measurements: MeasurementInput,
    #[serde(default)]
    notes: Option<String>,
}

/// Sanitized representation of a scored completion.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionView {
    pub id: String,
    pub challenge_id: String,
    pub user_id: String,
    pub evidence: &'static str,
    pub impact_amount: f64,
    pub validation_score: f64,
    pub points_earned: u32,
    pub status: &'static str,
    pub feedback: String,
}

impl From<&ValidationOutcome> for CompletionView {
    fn from(outcome: &ValidationOutcome) -> Self {
        let completion = &outcome.completion;
        Self {
            id: completion.id.0.clone(),
            challenge_id: completion.challenge_id.0.clone(),
            user_id: completion.user_id.0.clone(),
            evidence: completion.evidence.label(),
            impact_amount: completion.impact_amount,
            validation_score: completion.validation_score,
            points_earned: completion.points_earned,
            status: completion.status.label(),
            feedback: outcome.feedback.clone(),
        }
    }
}

async fn complete_handler<S>(
    State(service): State<Arc<ImpactValidationService<S>>>,
    Path(challenge_id): Path<String>,
    axum::Json(body): axum::Json<CompletionRequest>,
) -> Response
where
    S: CompletionStore + 'static,
{
    let report = CompletionReport {
        challenge_id: ChallengeId(challenge_id),
        user_id: UserId(body.user_id),
        evidence: body.evidence,
        measurements: body.measurements,
        notes: body.notes,
    };

    match service.validate(report) {
        Ok(outcome) => (
            StatusCode::CREATED,
            axum::Json(CompletionView::from(&outcome)),
        )
            .into_response(),
        Err(err) => validation_error_response(err),
    }
}

async fn handprint_handler<S>(
    State(service): State<Arc<ImpactValidationService<S>>>,
    Path(user_id): Path<String>,
) -> Response
where
    S: CompletionStore + 'static,
{
    let user = UserId(user_id);
    match service.monthly_handprint(&user, Utc::now().date_naive()) {
        Ok(handprint) => (StatusCode::OK, axum::Json(handprint)).into_response(),
        Err(err) => validation_error_response(err),
    }
}

fn validation_error_response(err: ValidationError) -> Response {
    let status = match &err {
        ValidationError::ChallengeNotFound => StatusCode::NOT_FOUND,
        ValidationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}
