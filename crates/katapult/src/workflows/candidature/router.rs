use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    Actor, AdminDecision, ApplicantContact, CandidatureId, NewCandidature, UserId, UserRole,
};
use super::evaluation::NewEvaluation;
use super::repository::CandidatureRepository;
use super::sections::CandidatureUpdate;
use super::service::{CandidatureService, CandidatureServiceError};

/// Router builder exposing the candidature lifecycle endpoints.
pub fn candidature_router<R>(service: Arc<CandidatureService<R>>) -> Router
where
    R: CandidatureRepository + 'static,
{
    Router::new()
        .route("/api/v1/candidatures", post(create_handler::<R>))
        .route(
            "/api/v1/candidatures/statistics",
            get(statistics_handler::<R>),
        )
        .route(
            "/api/v1/candidatures/:candidature_id",
            get(get_handler::<R>).patch(update_handler::<R>),
        )
        .route(
            "/api/v1/candidatures/:candidature_id/submit",
            post(submit_handler::<R>),
        )
        .route(
            "/api/v1/candidatures/:candidature_id/evaluations",
            post(evaluation_handler::<R>),
        )
        .route(
            "/api/v1/candidatures/:candidature_id/decision",
            post(decision_handler::<R>),
        )
        .with_state(service)
}

/// Body for opening a candidature. The applicant block feeds outbound email
/// and the CRM card; the remaining fields seed the form.
#[derive(Debug, Deserialize)]
pub struct CreateCandidatureRequest {
    pub applicant: ApplicantContact,
    #[serde(flatten)]
    pub seed: NewCandidature,
}

/// Body for an administrative decision.
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: AdminDecision,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

/// Acting identity from the `x-user-id` and `x-user-role` headers. The
/// authentication layer in front of this service sets both; anything without
/// a parseable user id is turned away.
fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let user_id = headers
        .get("x-user-id")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    let role = headers
        .get("x-user-role")
        .and_then(|value| value.to_str().ok())
        .map(UserRole::from_label)
        .unwrap_or(UserRole::Applicant);

    Some(Actor {
        user_id: UserId(user_id),
        role,
    })
}

fn unauthorized() -> Response {
    let payload = json!({
        "error": "missing or invalid x-user-id header",
    });
    (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
}

pub(crate) fn error_response(error: CandidatureServiceError) -> Response {
    let status = match &error {
        CandidatureServiceError::NotFound => StatusCode::NOT_FOUND,
        CandidatureServiceError::Forbidden => StatusCode::FORBIDDEN,
        CandidatureServiceError::ActiveCandidatureExists { .. }
        | CandidatureServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
        CandidatureServiceError::IncompleteCandidature { .. }
        | CandidatureServiceError::DuplicateEvaluation { .. }
        | CandidatureServiceError::Patch(_)
        | CandidatureServiceError::Scores(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CandidatureServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = match &error {
        CandidatureServiceError::ActiveCandidatureExists { existing } => json!({
            "error": error.to_string(),
            "candidature_id": existing,
        }),
        CandidatureServiceError::IncompleteCandidature {
            percentage,
            threshold,
        } => json!({
            "error": error.to_string(),
            "completion_percentage": percentage,
            "required": threshold,
        }),
        _ => json!({
            "error": error.to_string(),
        }),
    };

    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn create_handler<R>(
    State(service): State<Arc<CandidatureService<R>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CreateCandidatureRequest>,
) -> Response
where
    R: CandidatureRepository + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return unauthorized();
    };

    match service
        .create_candidature(actor, request.applicant, request.seed)
        .await
    {
        Ok(candidature) => (StatusCode::CREATED, axum::Json(candidature)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn statistics_handler<R>(
    State(service): State<Arc<CandidatureService<R>>>,
    headers: HeaderMap,
) -> Response
where
    R: CandidatureRepository + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return unauthorized();
    };

    match service.statistics(actor).await {
        Ok(statistics) => (StatusCode::OK, axum::Json(statistics)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<R>(
    State(service): State<Arc<CandidatureService<R>>>,
    headers: HeaderMap,
    Path(candidature_id): Path<u64>,
) -> Response
where
    R: CandidatureRepository + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return unauthorized();
    };

    match service
        .get_candidature(actor, CandidatureId(candidature_id))
        .await
    {
        Ok(candidature) => (StatusCode::OK, axum::Json(candidature)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler<R>(
    State(service): State<Arc<CandidatureService<R>>>,
    headers: HeaderMap,
    Path(candidature_id): Path<u64>,
    axum::Json(update): axum::Json<CandidatureUpdate>,
) -> Response
where
    R: CandidatureRepository + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return unauthorized();
    };

    match service
        .update_candidature(actor, CandidatureId(candidature_id), update)
        .await
    {
        Ok(candidature) => (StatusCode::OK, axum::Json(candidature)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<R>(
    State(service): State<Arc<CandidatureService<R>>>,
    headers: HeaderMap,
    Path(candidature_id): Path<u64>,
) -> Response
where
    R: CandidatureRepository + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return unauthorized();
    };

    match service
        .submit_candidature(actor, CandidatureId(candidature_id))
        .await
    {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn evaluation_handler<R>(
    State(service): State<Arc<CandidatureService<R>>>,
    headers: HeaderMap,
    Path(candidature_id): Path<u64>,
    axum::Json(evaluation): axum::Json<NewEvaluation>,
) -> Response
where
    R: CandidatureRepository + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return unauthorized();
    };

    match service
        .record_evaluation(actor, CandidatureId(candidature_id), evaluation)
        .await
    {
        Ok(outcome) => {
            let payload = json!({
                "evaluation": outcome.evaluation,
                "summary": outcome.evaluation.total_score(),
                "candidature": outcome.candidature,
                "warnings": outcome.warnings,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn decision_handler<R>(
    State(service): State<Arc<CandidatureService<R>>>,
    headers: HeaderMap,
    Path(candidature_id): Path<u64>,
    axum::Json(request): axum::Json<DecisionRequest>,
) -> Response
where
    R: CandidatureRepository + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return unauthorized();
    };

    match service
        .apply_admin_decision(
            actor,
            CandidatureId(candidature_id),
            request.decision,
            request.admin_notes,
        )
        .await
    {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}
