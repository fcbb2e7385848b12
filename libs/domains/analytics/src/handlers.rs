//! HTTP handlers for the dashboard query boundary

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use axum_helpers::ErrorResponse;
use domain_events::{EventRepository, SessionRepository};
use std::sync::Arc;
use tracing::instrument;

use crate::error::AnalyticsError;
use crate::models::{
    AggregateParams, AggregateRow, Dashboard, DashboardParams, FeatureParams, FeatureUsageRow,
    RealtimeParams, RealtimeSnapshot,
};
use crate::service::AnalyticsService;

pub type AnalyticsState<E, S> = Arc<AnalyticsService<E, S>>;

/// Routes mounted under `/analytics`
pub fn analytics_router<E, S>(service: AnalyticsState<E, S>) -> Router
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    Router::new()
        .route("/dashboard", get(dashboard::<E, S>))
        .route("/realtime", get(realtime::<E, S>))
        .route("/aggregate", get(aggregate::<E, S>))
        .route("/features", get(features::<E, S>))
        .with_state(service)
}

/// Engagement, category, feature, business and live metrics for one window
#[utoipa::path(
    get,
    path = "/api/analytics/dashboard",
    params(DashboardParams),
    responses(
        (status = 200, description = "Dashboard payload", body = Dashboard),
        (status = 400, description = "Invalid period or range", body = ErrorResponse)
    ),
    tag = "analytics"
)]
#[instrument(skip_all, fields(period = params.period.as_deref()))]
pub async fn dashboard<E, S>(
    State(service): State<AnalyticsState<E, S>>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<Dashboard>, AnalyticsError>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    Ok(Json(service.dashboard(&params).await?))
}

#[utoipa::path(
    get,
    path = "/api/analytics/realtime",
    params(RealtimeParams),
    responses(
        (status = 200, description = "Live snapshot", body = RealtimeSnapshot)
    ),
    tag = "analytics"
)]
#[instrument(skip_all)]
pub async fn realtime<E, S>(
    State(service): State<AnalyticsState<E, S>>,
    Query(params): Query<RealtimeParams>,
) -> Result<Json<RealtimeSnapshot>, AnalyticsError>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    Ok(Json(service.realtime(&params).await?))
}

/// Ad-hoc grouped counts
#[utoipa::path(
    get,
    path = "/api/analytics/aggregate",
    params(AggregateParams),
    responses(
        (status = 200, description = "Groups by count, largest first", body = Vec<AggregateRow>),
        (status = 400, description = "Unknown group field or bad window", body = ErrorResponse)
    ),
    tag = "analytics"
)]
#[instrument(skip_all, fields(group_by = %params.group_by))]
pub async fn aggregate<E, S>(
    State(service): State<AnalyticsState<E, S>>,
    Query(params): Query<AggregateParams>,
) -> Result<Json<Vec<AggregateRow>>, AnalyticsError>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    Ok(Json(service.aggregate(&params).await?))
}

#[utoipa::path(
    get,
    path = "/api/analytics/features",
    params(FeatureParams),
    responses(
        (status = 200, description = "Top features", body = Vec<FeatureUsageRow>),
        (status = 400, description = "Invalid period or range", body = ErrorResponse)
    ),
    tag = "analytics"
)]
#[instrument(skip_all)]
pub async fn features<E, S>(
    State(service): State<AnalyticsState<E, S>>,
    Query(params): Query<FeatureParams>,
) -> Result<Json<Vec<FeatureUsageRow>>, AnalyticsError>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    Ok(Json(service.features(&params).await?))
}
