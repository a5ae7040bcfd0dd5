use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::checkout::{CheckoutReference, CheckoutService, SettlementError, SettlementStore};
use super::domain::{EnrollmentDecision, EnrollmentRecord, ProgramId, UserId};
use super::repository::EnrollmentStore;
use super::service::{EnrollmentError, EnrollmentService};
use crate::workflows::notify::NotificationSink;
use crate::workflows::sponsorship::{PriceBreakdown, RuleStore};
use std::sync::Arc;

/// Shared state for the enrollment endpoints.
pub struct EnrollmentApi<S, R, N> {
    pub enrollments: Arc<EnrollmentService<S, R, N>>,
    pub checkout: Arc<CheckoutService<S, R, N>>,
}

impl<S, R, N> Clone for EnrollmentApi<S, R, N> {
    fn clone(&self) -> Self {
        Self {
            enrollments: self.enrollments.clone(),
            checkout: self.checkout.clone(),
        }
    }
}

/// Router builder exposing HTTP endpoints for enrollment and settlement.
pub fn enrollment_router<S, R, N>(api: EnrollmentApi<S, R, N>) -> Router
where
    S: EnrollmentStore + SettlementStore + 'static,
    R: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/programs/:program_id/enrollment-options",
            get(options_handler::<S, R, N>),
        )
        .route(
            "/api/v1/programs/:program_id/enrollments",
            post(enroll_handler::<S, R, N>),
        )
        .route("/api/v1/checkout", post(checkout_handler::<S, R, N>))
        .route("/api/v1/payments/confirm", post(confirm_handler::<S, R, N>))
        .route("/api/v1/payments/failed", post(failed_handler::<S, R, N>))
        .with_state(api)
}

/// Sanitized representation of an enrollment record.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentView {
    pub program_id: String,
    pub user_id: String,
    pub access: &'static str,
    pub amount_paid: u32,
    pub enrolled_at: DateTime<Utc>,
}

impl From<&EnrollmentRecord> for EnrollmentView {
    fn from(record: &EnrollmentRecord) -> Self {
        Self {
            program_id: record.program_id.0.clone(),
            user_id: record.user_id.0.clone(),
            access: record.access.label(),
            amount_paid: record.amount_paid,
            enrolled_at: record.enrolled_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct OptionsView {
    decision: EnrollmentDecision,
    breakdown: PriceBreakdown,
}

#[derive(Debug, Deserialize)]
struct OptionsQuery {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct EnrollRequest {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    program_id: String,
    user_id: String,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    reference: String,
}

async fn options_handler<S, R, N>(
    State(api): State<EnrollmentApi<S, R, N>>,
    Path(program_id): Path<String>,
    Query(query): Query<OptionsQuery>,
) -> Response
where
    S: EnrollmentStore + SettlementStore + 'static,
    R: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    let program_id = ProgramId(program_id);
    let user_id = UserId(query.user_id);
    match api.enrollments.options(&program_id, &user_id) {
        Ok((decision, breakdown)) => (
            StatusCode::OK,
            axum::Json(OptionsView {
                decision,
                breakdown,
            }),
        )
            .into_response(),
        Err(err) => enrollment_error_response(err),
    }
}

async fn enroll_handler<S, R, N>(
    State(api): State<EnrollmentApi<S, R, N>>,
    Path(program_id): Path<String>,
    axum::Json(body): axum::Json<EnrollRequest>,
) -> Response
where
    S: EnrollmentStore + SettlementStore + 'static,
    R: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    let program_id = ProgramId(program_id);
    let user_id = UserId(body.user_id);
    match api.enrollments.enroll_free(&program_id, &user_id) {
        Ok(record) => (
            StatusCode::CREATED,
            axum::Json(EnrollmentView::from(&record)),
        )
            .into_response(),
        Err(err) => enrollment_error_response(err),
    }
}

async fn checkout_handler<S, R, N>(
    State(api): State<EnrollmentApi<S, R, N>>,
    axum::Json(body): axum::Json<CheckoutRequest>,
) -> Response
where
    S: EnrollmentStore + SettlementStore + 'static,
    R: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    let program_id = ProgramId(body.program_id);
    let user_id = UserId(body.user_id);
    match api.checkout.start_checkout(
        &program_id,
        &user_id,
        &body.success_url,
        &body.cancel_url,
    ) {
        Ok(handle) => (StatusCode::OK, axum::Json(handle)).into_response(),
        Err(err) => settlement_error_response(err),
    }
}

async fn confirm_handler<S, R, N>(
    State(api): State<EnrollmentApi<S, R, N>>,
    axum::Json(body): axum::Json<ConfirmRequest>,
) -> Response
where
    S: EnrollmentStore + SettlementStore + 'static,
    R: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    let reference = CheckoutReference(body.reference);
    match api.checkout.finalize(&reference) {
        Ok(record) => (StatusCode::OK, axum::Json(EnrollmentView::from(&record))).into_response(),
        Err(err) => settlement_error_response(err),
    }
}

async fn failed_handler<S, R, N>(
    State(api): State<EnrollmentApi<S, R, N>>,
    axum::Json(body): axum::Json<ConfirmRequest>,
) -> Response
where
    S: EnrollmentStore + SettlementStore + 'static,
    R: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    let reference = CheckoutReference(body.reference);
    match api.checkout.fail(&reference) {
        Ok(()) => (StatusCode::OK, axum::Json(json!({ "status": "failed" }))).into_response(),
        Err(err) => settlement_error_response(err),
    }
}

fn enrollment_error_response(err: EnrollmentError) -> Response {
    let status = match &err {
        EnrollmentError::ProgramNotFound => StatusCode::NOT_FOUND,
        EnrollmentError::AlreadyEnrolled => StatusCode::CONFLICT,
        EnrollmentError::ProgramNotPublished
        | EnrollmentError::CapacityExceeded
        | EnrollmentError::PaymentRequired { .. }
        | EnrollmentError::Quota(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EnrollmentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": err.to_string(),
        "reason": err.reason_code(),
    });
    (status, axum::Json(payload)).into_response()
}

fn settlement_error_response(err: SettlementError) -> Response {
    let status = match &err {
        SettlementError::ProgramNotFound | SettlementError::UnknownReference => {
            StatusCode::NOT_FOUND
        }
        SettlementError::AlreadyEnrolled => StatusCode::CONFLICT,
        SettlementError::ProgramNotPublished
        | SettlementError::NothingToCharge
        | SettlementError::Quota(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SettlementError::Gateway(_) => StatusCode::BAD_GATEWAY,
        SettlementError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": err.to_string(),
        "reason": err.reason_code(),
    });
    (status, axum::Json(payload)).into_response()
}
