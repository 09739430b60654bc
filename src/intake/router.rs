use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::json;

use super::domain::{LoanSummary, RawRow, SortOrder};
use super::pipeline::{IntakeError, IntakePipeline};
use super::scoring::{ScoringError, ScoringService};
use super::store::{ApplicantStore, StoreError};

/// Router exposing form intake, CSV batch upload and the sorted listing.
pub fn loan_router<S, W>(pipeline: Arc<IntakePipeline<S, W>>) -> Router
where
    S: ScoringService + ?Sized + 'static,
    W: ApplicantStore + ?Sized + 'static,
{
    Router::new()
        .route(
            "/api/v1/loans",
            post(submit_handler::<S, W>).get(list_handler::<S, W>),
        )
        .route("/api/v1/loans/batch", post(batch_handler::<S, W>))
        .with_state(pipeline)
}

pub(crate) async fn submit_handler<S, W>(
    State(pipeline): State<Arc<IntakePipeline<S, W>>>,
    axum::Json(row): axum::Json<RawRow>,
) -> Response
where
    S: ScoringService + ?Sized + 'static,
    W: ApplicantStore + ?Sized + 'static,
{
    match pipeline.submit_one(row).await {
        Ok(record) => (StatusCode::CREATED, axum::Json(record.summary())).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn batch_handler<S, W>(
    State(pipeline): State<Arc<IntakePipeline<S, W>>>,
    body: String,
) -> Response
where
    S: ScoringService + ?Sized + 'static,
    W: ApplicantStore + ?Sized + 'static,
{
    match pipeline.submit_csv(&body).await {
        Ok(records) => {
            let summaries: Vec<LoanSummary> =
                records.iter().map(|record| record.summary()).collect();
            (StatusCode::CREATED, axum::Json(summaries)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn list_handler<S, W>(
    State(pipeline): State<Arc<IntakePipeline<S, W>>>,
    Query(order): Query<SortOrder>,
) -> Response
where
    S: ScoringService + ?Sized + 'static,
    W: ApplicantStore + ?Sized + 'static,
{
    match pipeline.list(order).await {
        Ok(summaries) => (StatusCode::OK, axum::Json(summaries)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) fn status_for(error: &IntakeError) -> StatusCode {
    match error {
        IntakeError::Csv(_) | IntakeError::Schema(_) | IntakeError::Coercion(_) => {
            StatusCode::BAD_REQUEST
        }
        IntakeError::Scoring(ScoringError::Timeout { .. })
        | IntakeError::Store(StoreError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        IntakeError::Scoring(_) | IntakeError::Store(_) => StatusCode::BAD_GATEWAY,
        IntakeError::Contract(_) => StatusCode::INTERNAL_SERVER_ERROR,
        IntakeError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(error: &IntakeError) -> Response {
    let payload = json!({
        "error": error.to_string(),
        "stage": error.stage().label(),
    });
    (status_for(error), axum::Json(payload)).into_response()
}
