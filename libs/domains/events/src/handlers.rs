//! HTTP handlers for ingestion and sessions

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_helpers::{AppError, ErrorResponse, ValidatedJson};
use std::sync::Arc;
use tracing::instrument;

use crate::context::RequestContext;
use crate::error::EventError;
use crate::ingestion::IngestionService;
use crate::models::{
    ActiveSessionsParams, BatchReceipt, BatchRequest, Event, EventDraft, EventQuery, NewSession,
    Session, TrackReceipt,
};
use crate::repository::{EventRepository, SessionRepository};

const DEFAULT_LIST_LIMIT: u64 = 100;
const MAX_LIST_LIMIT: u64 = 1000;

pub type IngestionState<E, S> = Arc<IngestionService<E, S>>;

/// Routes mounted under `/events`
pub fn events_router<E, S>(service: IngestionState<E, S>) -> Router
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    Router::new()
        .route("/", get(list_events::<E, S>).post(track_event::<E, S>))
        .route("/batch", post(ingest_batch::<E, S>))
        .with_state(service)
}

/// Routes mounted under `/sessions`
pub fn sessions_router<E, S>(service: IngestionState<E, S>) -> Router
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    Router::new()
        .route("/", post(create_session::<E, S>))
        .route("/active", get(active_sessions::<E, S>))
        .route("/{id}/end", post(end_session::<E, S>))
        .with_state(service)
}

/// Ingest a client batch
#[utoipa::path(
    post,
    path = "/api/events/batch",
    request_body = BatchRequest,
    params(
        ("x-session-id" = Option<String>, Header, description = "Client session id"),
        ("x-user-id" = Option<String>, Header, description = "Authenticated user id"),
        ("x-platform" = Option<String>, Header, description = "Client platform"),
    ),
    responses(
        (status = 200, description = "Batch stored", body = BatchReceipt),
        (status = 400, description = "Every draft was malformed or refused by the store", body = ErrorResponse),
        (status = 413, description = "More than 500 drafts; split the batch", body = ErrorResponse),
        (status = 503, description = "Store unavailable; retry the batch", body = ErrorResponse)
    ),
    tag = "events"
)]
#[instrument(skip_all, fields(session_id = ctx.session_id.as_deref()))]
pub async fn ingest_batch<E, S>(
    State(service): State<IngestionState<E, S>>,
    ctx: RequestContext,
    ValidatedJson(request): ValidatedJson<BatchRequest>,
) -> Result<Json<BatchReceipt>, EventError>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    let receipt = service.ingest_batch(request, &ctx).await?;
    Ok(Json(receipt))
}

/// Queue a single event for the next flush
#[utoipa::path(
    post,
    path = "/api/events",
    request_body = EventDraft,
    responses(
        (status = 202, description = "Event queued", body = TrackReceipt),
        (status = 400, description = "Validation error", body = ErrorResponse)
    ),
    tag = "events"
)]
#[instrument(skip_all, fields(category = %draft.category))]
pub async fn track_event<E, S>(
    State(service): State<IngestionState<E, S>>,
    ctx: RequestContext,
    ValidatedJson(draft): ValidatedJson<EventDraft>,
) -> Result<impl IntoResponse, EventError>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    let event = service.track(draft, &ctx)?;
    let receipt = TrackReceipt {
        id: event.id,
        event_type: event.event_type,
        queued: service.queued(),
    };
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// Recent events, newest first
#[utoipa::path(
    get,
    path = "/api/events",
    params(EventQuery),
    responses(
        (status = 200, description = "Matching events", body = Vec<Event>),
        (status = 400, description = "Invalid query", body = ErrorResponse)
    ),
    tag = "events"
)]
#[instrument(skip_all)]
pub async fn list_events<E, S>(
    State(service): State<IngestionState<E, S>>,
    Query(mut query): Query<EventQuery>,
) -> Result<Json<Vec<Event>>, EventError>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    if matches!((query.start, query.end), (Some(start), Some(end)) if start > end) {
        return Err(EventError::Validation("start must not be after end".into()));
    }

    query.limit = Some(query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT));
    let events = service.store().query(&query).await?;
    Ok(Json(events))
}

/// Start a session explicitly (idempotent)
#[utoipa::path(
    post,
    path = "/api/sessions",
    request_body = NewSession,
    responses(
        (status = 201, description = "Session stored", body = Session),
        (status = 400, description = "Validation error", body = ErrorResponse)
    ),
    tag = "sessions"
)]
#[instrument(skip_all, fields(session_id = %new.session_id))]
pub async fn create_session<E, S>(
    State(service): State<IngestionState<E, S>>,
    ctx: RequestContext,
    ValidatedJson(mut new): ValidatedJson<NewSession>,
) -> Result<impl IntoResponse, EventError>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    new.user_id = new.user_id.or(ctx.user_id);
    new.user_agent = ctx.client.user_agent;
    new.ip_address = ctx.client.ip;
    if new.device.platform.is_none() {
        new.device.platform = ctx.platform;
    }

    let session = service.sessions().create_session(new).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// End a session; ending it again returns it unchanged
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/end",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Ended session", body = Session),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "sessions"
)]
#[instrument(skip_all, fields(session_id = %id))]
pub async fn end_session<E, S>(
    State(service): State<IngestionState<E, S>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, EventError>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    let session = service.sessions().end_session(&id).await?;
    Ok(Json(session))
}

/// Active sessions, optionally for one user
#[utoipa::path(
    get,
    path = "/api/sessions/active",
    params(ActiveSessionsParams),
    responses(
        (status = 200, description = "Active sessions", body = Vec<Session>)
    ),
    tag = "sessions"
)]
#[instrument(skip_all)]
pub async fn active_sessions<E, S>(
    State(service): State<IngestionState<E, S>>,
    Query(params): Query<ActiveSessionsParams>,
) -> Result<Json<Vec<Session>>, AppError>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    let sessions = service.sessions().active_sessions(params.user_id).await?;
    Ok(Json(sessions))
}
