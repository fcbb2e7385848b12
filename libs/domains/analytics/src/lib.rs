//! Analytics Domain
//!
//! Read-only queries over the event store:
//!
//! - [`AggregationEngine`]: grouped counts, engagement, feature ranking,
//!   subscription funnel and per-user engagement scores
//! - [`RealtimeMetrics`]: 30-minute and 24-hour live counters
//! - [`AnalyticsService`]: resolves `7d`/`30d`/`90d`/`1y` or explicit windows
//!   for the `/analytics` routes

use utoipa::OpenApi;

mod directory;
mod engine;
mod error;
mod group;
pub mod handlers;
mod models;
mod range;
mod realtime;
mod service;

pub use directory::{InMemoryUserDirectory, UserDirectory};
pub use engine::{AggregationEngine, DEFAULT_FEATURE_LIMIT};
pub use error::{AnalyticsError, AnalyticsResult};
pub use group::{GroupField, NONE_KEY};
pub use handlers::analytics_router;
pub use models::{
    AggregateFilters, AggregateParams, AggregateRow, BusinessMetrics, Dashboard, DashboardParams,
    EngagementMetrics, EngagementScore, FeatureParams, FeatureUsageRow, RealtimeParams,
    RealtimeSnapshot,
};
pub use range::{DateRange, Period, resolve_window};
pub use realtime::{DEFAULT_RECENT_EVENTS, RealtimeMetrics};
pub use service::AnalyticsService;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::dashboard,
        handlers::realtime,
        handlers::aggregate,
        handlers::features,
    ),
    components(schemas(
        AggregateRow,
        BusinessMetrics,
        Dashboard,
        DateRange,
        EngagementMetrics,
        EngagementScore,
        FeatureUsageRow,
        GroupField,
        RealtimeSnapshot,
    )),
    tags(
        (name = "analytics", description = "Dashboard and realtime queries")
    )
)]
pub struct ApiDoc;
