use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use super::catalog::{
    CatalogError, CourseDraft, CourseSearch, DirectoryError, InstructorDirectory,
};
use super::domain::{CourseId, OverrideRequestId, UserId};
use super::engine::EnrollmentEngine;
use super::overrides::{OverrideAction, OverrideResolution, OverrideSubmission};
use super::repository::{RecordStore, RepositoryError};
use super::service::{EnrollOutcome, EnrollmentServiceError};

/// Router exposing the enrollment engine as JSON endpoints.
pub fn enrollment_router<R, D>(engine: Arc<EnrollmentEngine<R, D>>) -> Router
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    Router::new()
        .route("/api/v1/courses", post(create_course_handler::<R, D>))
        .route("/api/v1/courses/search", get(search_handler::<R, D>))
        .route(
            "/api/v1/courses/:course_id/enrollments",
            post(enroll_handler::<R, D>),
        )
        .route(
            "/api/v1/courses/:course_id/enrollments/:student_id",
            delete(drop_handler::<R, D>),
        )
        .route(
            "/api/v1/courses/:course_id/roster",
            get(roster_handler::<R, D>),
        )
        .route(
            "/api/v1/courses/:course_id/waitlist/:student_id",
            get(position_handler::<R, D>),
        )
        .route(
            "/api/v1/students/:student_id/waitlist",
            get(waitlist_status_handler::<R, D>),
        )
        .route(
            "/api/v1/students/:student_id/enrollments",
            get(history_handler::<R, D>),
        )
        .route(
            "/api/v1/courses/:course_id/overrides",
            post(request_override_handler::<R, D>),
        )
        .route(
            "/api/v1/overrides/pending",
            get(pending_overrides_handler::<R, D>),
        )
        .route(
            "/api/v1/overrides/:request_id/resolve",
            post(resolve_override_handler::<R, D>),
        )
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchParams {
    pub(crate) student_id: u64,
    #[serde(default)]
    pub(crate) q: Option<String>,
    #[serde(default)]
    pub(crate) schedule: Option<String>,
    #[serde(default)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrollRequest {
    pub(crate) student_id: u64,
    /// Defaults to the current time.
    #[serde(default)]
    pub(crate) now: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryParams {
    #[serde(default)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverrideRequestBody {
    pub(crate) student_id: u64,
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PendingParams {
    pub(crate) reviewer_id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveBody {
    pub(crate) reviewer_id: u64,
    pub(crate) action: OverrideAction,
    #[serde(default)]
    pub(crate) today: Option<NaiveDate>,
}

fn today_or_now(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| Utc::now().date_naive())
}

pub(crate) async fn create_course_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Json(draft): Json<CourseDraft>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    match engine.catalog().create_course(draft) {
        Ok(course) => (StatusCode::CREATED, Json(course)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

pub(crate) async fn search_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Query(params): Query<SearchParams>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    let filter = CourseSearch {
        query: params.q,
        schedule: params.schedule,
    };
    match engine.catalog().search(
        UserId(params.student_id),
        &filter,
        today_or_now(params.today),
    ) {
        Ok(courses) => (StatusCode::OK, Json(courses)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

pub(crate) async fn enroll_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Path(course_id): Path<u64>,
    Json(request): Json<EnrollRequest>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    let now = request.now.unwrap_or_else(Utc::now);
    match engine
        .enrollments()
        .enroll(UserId(request.student_id), CourseId(course_id), now)
    {
        Ok(outcome) => {
            let status = match &outcome {
                EnrollOutcome::Enrolled { .. } => StatusCode::CREATED,
                EnrollOutcome::Waitlisted { .. } => StatusCode::ACCEPTED,
                EnrollOutcome::NoOp { .. } => StatusCode::OK,
                EnrollOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (status, Json(outcome)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn drop_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Path((course_id, student_id)): Path<(u64, u64)>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    match engine
        .enrollments()
        .drop_course(UserId(student_id), CourseId(course_id), Utc::now())
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn roster_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Path(course_id): Path<u64>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    match engine.enrollments().roster(CourseId(course_id)) {
        Ok(roster) => (StatusCode::OK, Json(roster)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn position_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Path((course_id, student_id)): Path<(u64, u64)>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    match engine
        .enrollments()
        .position(UserId(student_id), CourseId(course_id))
    {
        Ok(position) => {
            let payload = json!({
                "course_id": course_id,
                "student_id": student_id,
                "position": position,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn waitlist_status_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Path(student_id): Path<u64>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    match engine.enrollments().waitlist_status(UserId(student_id)) {
        Ok(standings) => (StatusCode::OK, Json(standings)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn history_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Path(student_id): Path<u64>,
    Query(params): Query<HistoryParams>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    match engine
        .enrollments()
        .history(UserId(student_id), today_or_now(params.today))
    {
        Ok(history) => (StatusCode::OK, Json(history)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn request_override_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Path(course_id): Path<u64>,
    Json(body): Json<OverrideRequestBody>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    match engine
        .overrides()
        .request(UserId(body.student_id), CourseId(course_id), body.reason)
    {
        Ok(submission) => {
            let status = match &submission {
                OverrideSubmission::Created { .. } => StatusCode::CREATED,
                OverrideSubmission::AlreadyRequested { .. } => StatusCode::OK,
            };
            (status, Json(submission)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn pending_overrides_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Query(params): Query<PendingParams>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    match engine.overrides().pending(UserId(params.reviewer_id)) {
        Ok(pending) => (StatusCode::OK, Json(pending)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn resolve_override_handler<R, D>(
    State(engine): State<Arc<EnrollmentEngine<R, D>>>,
    Path(request_id): Path<u64>,
    Json(body): Json<ResolveBody>,
) -> Response
where
    R: RecordStore + 'static,
    D: InstructorDirectory + 'static,
{
    match engine.overrides().resolve(
        OverrideRequestId(request_id),
        UserId(body.reviewer_id),
        body.action,
        today_or_now(body.today),
    ) {
        Ok(resolution) => {
            let status = match &resolution {
                OverrideResolution::NotFound { .. } => StatusCode::NOT_FOUND,
                _ => StatusCode::OK,
            };
            (status, Json(resolution)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    let payload = json!({
        "error": message,
    });
    (status, Json(payload)).into_response()
}

fn repository_status(error: &RepositoryError) -> StatusCode {
    match error {
        RepositoryError::Conflict => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn service_error_response(error: EnrollmentServiceError) -> Response {
    let status = match &error {
        EnrollmentServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        EnrollmentServiceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        EnrollmentServiceError::RoleMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EnrollmentServiceError::Repository(inner) => repository_status(inner),
    };
    error_body(status, error.to_string())
}

pub(crate) fn catalog_error_response(error: CatalogError) -> Response {
    let status = match error {
        CatalogError::Enrollment(inner) => return service_error_response(inner),
        CatalogError::DuplicateCode(_) => StatusCode::CONFLICT,
        CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::BlankField(_)
        | CatalogError::UnknownPrerequisite(_)
        | CatalogError::SelfPrerequisite(_)
        | CatalogError::PrerequisiteCycle(_)
        | CatalogError::AmbiguousInstructor { .. }
        | CatalogError::Directory(DirectoryError::BlankName) => StatusCode::UNPROCESSABLE_ENTITY,
        CatalogError::Directory(DirectoryError::Repository(ref inner))
        | CatalogError::Repository(ref inner) => repository_status(inner),
    };
    error_body(status, error.to_string())
}
