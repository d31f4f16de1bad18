use crate::access::Actor;
use crate::analyzer::report::{CompletionAnalytics, Overview, StudentReport};
use crate::catalog::{CloneOverrides, Exercise, ExerciseDraft, ExerciseFilter, ExercisePatch};
use crate::classes::{
    ClassDraft, ClassFilter, ClassPatch, CompleteClass, DuplicateClass, PlannedClass,
};
use crate::composer::{
    BlockDraft, Routine, RoutineDraft, RoutineFilter, RoutinePatch, ScheduleReadiness,
};
use crate::config::Config;
use crate::db::{CategoryRef, Database, StoreCounts};
use crate::error::{AcademyError, DomainResult};
use crate::recorder::{Completion, CompletionDraft, CompletionFilter, CompletionPatch};
use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

pub const ACTOR_HEADER: &str = "x-actor-id";

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/categories", get(categories))
        .route("/api/v1/exercises", get(exercise_list).post(exercise_create))
        .route(
            "/api/v1/exercises/:id",
            get(exercise_get)
                .patch(exercise_update)
                .delete(exercise_delete),
        )
        .route("/api/v1/exercises/:id/clone", post(exercise_clone))
        .route("/api/v1/exercises/:id/active", post(exercise_active))
        .route("/api/v1/routines", get(routine_list).post(routine_create))
        .route(
            "/api/v1/routines/:id",
            get(routine_get).patch(routine_update).delete(routine_delete),
        )
        .route("/api/v1/routines/:id/blocks", put(routine_blocks))
        .route("/api/v1/routines/:id/clone", post(routine_clone))
        .route("/api/v1/routines/:id/favorite", post(routine_favorite))
        .route("/api/v1/routines/:id/active", post(routine_active))
        .route("/api/v1/routines/:id/readiness", get(routine_readiness))
        .route(
            "/api/v1/completions",
            get(completion_list).post(completion_create),
        )
        .route(
            "/api/v1/completions/:id",
            get(completion_get)
                .patch(completion_update)
                .delete(completion_delete),
        )
        .route("/api/v1/classes", get(class_list).post(class_create))
        .route(
            "/api/v1/classes/:id",
            get(class_get).patch(class_update).delete(class_delete),
        )
        .route("/api/v1/classes/:id/duplicate", post(class_duplicate))
        .route("/api/v1/classes/:id/start", post(class_start))
        .route("/api/v1/classes/:id/cancel", post(class_cancel))
        .route("/api/v1/classes/:id/complete", post(class_complete))
        .route("/api/v1/stats/overview", get(stats_overview))
        .route("/api/v1/stats/completions", get(stats_completions))
        .route("/api/v1/stats/students/:id", get(stats_student))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    version: &'static str,
    api_port: u16,
    db_path: String,
    counts: StoreCounts,
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusPayload>> {
    let counts = with_database(&state, |database| Ok(database.counts()?)).await?;

    Ok(Json(StatusPayload {
        version: env!("CARGO_PKG_VERSION"),
        api_port: state.config.api_port,
        db_path: state.config.db_path.display().to_string(),
        counts,
    }))
}

async fn categories(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<CategoryRef>>> {
    let categories = as_actor(&state, &headers, |database, _| database.list_categories()).await?;
    Ok(Json(categories))
}

async fn exercise_list(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(filter): Query<ExerciseFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<Exercise>>> {
    let limit = state.config.list_limit(page.limit);
    let exercises = as_actor(&state, &headers, move |database, actor| {
        database.list_exercises(actor, &filter, limit)
    })
    .await?;

    Ok(Json(exercises))
}

async fn exercise_create(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(draft): Json<ExerciseDraft>,
) -> ApiResult<(StatusCode, Json<Exercise>)> {
    let exercise = as_actor(&state, &headers, move |database, actor| {
        database.create_exercise(actor, &draft)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(exercise)))
}

async fn exercise_get(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Exercise>> {
    let exercise = as_actor(&state, &headers, move |database, actor| {
        database.exercise(actor, id)
    })
    .await?;

    Ok(Json(exercise))
}

async fn exercise_delete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    as_actor(&state, &headers, move |database, actor| {
        database.delete_exercise(actor, id)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn exercise_clone(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Option<Json<CloneOverrides>>,
) -> ApiResult<(StatusCode, Json<Exercise>)> {
    let overrides = body.map(|Json(overrides)| overrides).unwrap_or_default();
    let exercise = as_actor(&state, &headers, move |database, actor| {
        database.clone_exercise(actor, id, &overrides)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(exercise)))
}

async fn exercise_update(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<ExercisePatch>,
) -> ApiResult<Json<Exercise>> {
    let exercise = as_actor(&state, &headers, move |database, actor| {
        database.update_exercise(actor, id, &patch)
    })
    .await?;

    Ok(Json(exercise))
}

async fn exercise_active(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Exercise>> {
    let exercise = as_actor(&state, &headers, move |database, actor| {
        database.toggle_exercise_active(actor, id)
    })
    .await?;

    Ok(Json(exercise))
}

async fn routine_list(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(filter): Query<RoutineFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<Routine>>> {
    let limit = state.config.list_limit(page.limit);
    let routines = as_actor(&state, &headers, move |database, actor| {
        database.list_routines(actor, &filter, limit)
    })
    .await?;

    Ok(Json(routines))
}

async fn routine_create(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(draft): Json<RoutineDraft>,
) -> ApiResult<(StatusCode, Json<Routine>)> {
    let routine = as_actor(&state, &headers, move |database, actor| {
        database.create_routine(actor, &draft)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(routine)))
}

async fn routine_get(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Routine>> {
    let routine = as_actor(&state, &headers, move |database, actor| {
        database.routine(actor, id)
    })
    .await?;

    Ok(Json(routine))
}

async fn routine_update(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<RoutinePatch>,
) -> ApiResult<Json<Routine>> {
    let routine = as_actor(&state, &headers, move |database, actor| {
        database.update_routine(actor, id, &patch)
    })
    .await?;

    Ok(Json(routine))
}

async fn routine_delete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    as_actor(&state, &headers, move |database, actor| {
        database.delete_routine(actor, id)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn routine_blocks(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(blocks): Json<Vec<BlockDraft>>,
) -> ApiResult<Json<Routine>> {
    let routine = as_actor(&state, &headers, move |database, actor| {
        database.replace_blocks(actor, id, &blocks)
    })
    .await?;

    Ok(Json(routine))
}

async fn routine_clone(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Option<Json<CloneOverrides>>,
) -> ApiResult<(StatusCode, Json<Routine>)> {
    let overrides = body.map(|Json(overrides)| overrides).unwrap_or_default();
    let routine = as_actor(&state, &headers, move |database, actor| {
        database.clone_routine(actor, id, &overrides)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(routine)))
}

async fn routine_favorite(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Routine>> {
    let routine = as_actor(&state, &headers, move |database, actor| {
        database.toggle_favorite(actor, id)
    })
    .await?;

    Ok(Json(routine))
}

async fn routine_active(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Routine>> {
    let routine = as_actor(&state, &headers, move |database, actor| {
        database.toggle_active(actor, id)
    })
    .await?;

    Ok(Json(routine))
}

async fn routine_readiness(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<ScheduleReadiness>> {
    let readiness = as_actor(&state, &headers, move |database, actor| {
        database.schedule_readiness(actor, id, Utc::now())
    })
    .await?;

    Ok(Json(readiness))
}

async fn completion_list(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(filter): Query<CompletionFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<Completion>>> {
    let limit = state.config.list_limit(page.limit);
    let completions = as_actor(&state, &headers, move |database, actor| {
        database.list_completions(actor, &filter, limit)
    })
    .await?;

    Ok(Json(completions))
}

async fn completion_create(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(draft): Json<CompletionDraft>,
) -> ApiResult<(StatusCode, Json<Completion>)> {
    let completion = as_actor(&state, &headers, move |database, actor| {
        database.record_completion(actor, &draft, Utc::now())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(completion)))
}

async fn completion_get(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Completion>> {
    let completion = as_actor(&state, &headers, move |database, actor| {
        database.completion(actor, id)
    })
    .await?;

    Ok(Json(completion))
}

async fn completion_update(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<CompletionPatch>,
) -> ApiResult<Json<Completion>> {
    let completion = as_actor(&state, &headers, move |database, actor| {
        database.update_completion(actor, id, &patch)
    })
    .await?;

    Ok(Json(completion))
}

async fn completion_delete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    as_actor(&state, &headers, move |database, actor| {
        database.delete_completion(actor, id)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn class_list(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(filter): Query<ClassFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<PlannedClass>>> {
    let limit = state.config.list_limit(page.limit);
    let classes = as_actor(&state, &headers, move |database, _| {
        database.list_classes(&filter, limit)
    })
    .await?;

    Ok(Json(classes))
}

async fn class_create(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(draft): Json<ClassDraft>,
) -> ApiResult<(StatusCode, Json<PlannedClass>)> {
    let class = as_actor(&state, &headers, move |database, actor| {
        database.create_class(actor, &draft, Local::now().naive_local())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(class)))
}

async fn class_get(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<PlannedClass>> {
    let class = as_actor(&state, &headers, move |database, _| database.class(id)).await?;
    Ok(Json(class))
}

async fn class_update(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<ClassPatch>,
) -> ApiResult<Json<PlannedClass>> {
    let class = as_actor(&state, &headers, move |database, actor| {
        database.update_class(actor, id, &patch, Local::now().naive_local())
    })
    .await?;

    Ok(Json(class))
}

async fn class_delete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    as_actor(&state, &headers, move |database, actor| {
        database.delete_class(actor, id)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn class_duplicate(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(request): Json<DuplicateClass>,
) -> ApiResult<(StatusCode, Json<PlannedClass>)> {
    let class = as_actor(&state, &headers, move |database, actor| {
        database.duplicate_class(actor, id, &request, Local::now().naive_local())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(class)))
}

async fn class_start(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<PlannedClass>> {
    let lead_minutes = state.config.class_start_lead_minutes;
    let class = as_actor(&state, &headers, move |database, actor| {
        database.start_class(actor, id, Local::now().naive_local(), lead_minutes)
    })
    .await?;

    Ok(Json(class))
}

async fn class_cancel(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<PlannedClass>> {
    let class = as_actor(&state, &headers, move |database, actor| {
        database.cancel_class(actor, id)
    })
    .await?;

    Ok(Json(class))
}

async fn class_complete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Option<Json<CompleteClass>>,
) -> ApiResult<Json<PlannedClass>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let class = as_actor(&state, &headers, move |database, actor| {
        database.complete_class(actor, id, &request, Utc::now())
    })
    .await?;

    Ok(Json(class))
}

async fn stats_overview(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<Overview>> {
    let popular_limit = state.config.popular_limit;
    let overview = as_actor(&state, &headers, move |database, actor| {
        database.overview(actor, Utc::now(), popular_limit)
    })
    .await?;

    Ok(Json(overview))
}

async fn stats_completions(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Json<CompletionAnalytics>> {
    let analytics = as_actor(&state, &headers, move |database, actor| {
        database.completion_analytics(actor, range.from, range.to)
    })
    .await?;

    Ok(Json(analytics))
}

async fn stats_student(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Json<StudentReport>> {
    let report = as_actor(&state, &headers, move |database, actor| {
        database.student_report(actor, id, range.from, range.to)
    })
    .await?;

    Ok(Json(report))
}

/// Runs `operation` against a freshly opened database on the blocking pool.
async fn with_database<T, F>(state: &ApiState, operation: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Database) -> ApiResult<T> + Send + 'static,
{
    let db_path = state.config.db_path.clone();

    tokio::task::spawn_blocking(move || {
        let mut database = Database::open(&db_path)?;
        operation(&mut database)
    })
    .await
    .context("Database task failed")?
}

async fn as_actor<T, F>(state: &ApiState, headers: &HeaderMap, operation: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Database, &Actor) -> DomainResult<T> + Send + 'static,
{
    let actor_id = actor_id(headers)?;

    with_database(state, move |database| {
        let actor = database
            .resolve_actor(actor_id)?
            .ok_or_else(|| ApiError::Unauthorized(format!("Unknown or inactive actor {actor_id}")))?;
        Ok(operation(database, &actor)?)
    })
    .await
}

fn actor_id(headers: &HeaderMap) -> ApiResult<i64> {
    let raw = headers
        .get(ACTOR_HEADER)
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {ACTOR_HEADER} header")))?;

    raw.to_str()
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("Malformed {ACTOR_HEADER} header")))
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    Domain(AcademyError),
    Unauthorized(String),
    Internal(anyhow::Error),
}

impl From<AcademyError> for ApiError {
    fn from(value: AcademyError) -> Self {
        Self::Domain(value)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

fn domain_status(error: &AcademyError) -> StatusCode {
    match error {
        AcademyError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AcademyError::NotFound(_) => StatusCode::NOT_FOUND,
        AcademyError::Conflict(_) => StatusCode::CONFLICT,
        AcademyError::Permission(_) => StatusCode::FORBIDDEN,
        AcademyError::Transaction(_) => StatusCode::SERVICE_UNAVAILABLE,
        AcademyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Domain(failure) => {
                let status = domain_status(&failure);
                match &failure {
                    AcademyError::Transaction(_) => warn!(error = %failure, "write failed"),
                    AcademyError::Storage(_) => error!(error = %failure, "stored data unreadable"),
                    _ => {}
                }

                let mut body = json!({
                    "error": failure.kind(),
                    "message": failure.to_string(),
                    "retryable": failure.is_retryable(),
                });
                if let Some(fields) = failure.fields() {
                    body["fields"] = json!(fields);
                }

                (status, Json(body)).into_response()
            }
            ApiError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized", "message": message, "retryable": false })),
            )
                .into_response(),
            ApiError::Internal(failure) => {
                error!(error = %failure, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "internal_error",
                        "message": failure.to_string(),
                        "retryable": false,
                    })),
                )
                    .into_response()
            }
        }
    }
}
