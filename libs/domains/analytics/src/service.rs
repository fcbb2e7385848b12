use domain_events::{EventRepository, SessionRepository, SharedClock};
use tracing::instrument;

use crate::engine::{AggregationEngine, DEFAULT_FEATURE_LIMIT};
use crate::error::AnalyticsResult;
use crate::group::GroupField;
use crate::models::{
    AggregateParams, AggregateRow, Dashboard, DashboardParams, FeatureParams, FeatureUsageRow,
    RealtimeParams, RealtimeSnapshot,
};
use crate::range::{DateRange, resolve_window};
use crate::realtime::{DEFAULT_RECENT_EVENTS, RealtimeMetrics};

const MAX_FEATURE_LIMIT: usize = 100;

/// Dashboard query boundary: resolves windows against the clock and
/// delegates to the engine and realtime metrics.
pub struct AnalyticsService<E: EventRepository, S: SessionRepository> {
    engine: AggregationEngine<E, S>,
    realtime: RealtimeMetrics<E, S>,
    clock: SharedClock,
}

impl<E: EventRepository, S: SessionRepository> AnalyticsService<E, S> {
    pub fn new(
        engine: AggregationEngine<E, S>,
        realtime: RealtimeMetrics<E, S>,
        clock: SharedClock,
    ) -> Self {
        Self {
            engine,
            realtime,
            clock,
        }
    }

    pub fn engine(&self) -> &AggregationEngine<E, S> {
        &self.engine
    }

    fn window(
        &self,
        period: Option<&str>,
        start: Option<chrono::DateTime<chrono::Utc>>,
        end: Option<chrono::DateTime<chrono::Utc>>,
    ) -> AnalyticsResult<DateRange> {
        resolve_window(period, start, end, self.clock.now())
    }

    #[instrument(skip(self))]
    pub async fn dashboard(&self, params: &DashboardParams) -> AnalyticsResult<Dashboard> {
        let range = self.window(params.period.as_deref(), params.start, params.end)?;
        let (mut dashboard, realtime) = tokio::try_join!(
            self.engine.dashboard(range, params.user_id),
            self.realtime.snapshot(),
        )?;
        dashboard.realtime = Some(realtime);
        Ok(dashboard)
    }

    #[instrument(skip(self))]
    pub async fn aggregate(&self, params: &AggregateParams) -> AnalyticsResult<Vec<AggregateRow>> {
        let group_by = GroupField::parse_list(&params.group_by)?;
        let range = self.window(params.period.as_deref(), params.start, params.end)?;
        self.engine.aggregate(&group_by, range, &params.filters()).await
    }

    #[instrument(skip(self))]
    pub async fn features(&self, params: &FeatureParams) -> AnalyticsResult<Vec<FeatureUsageRow>> {
        let range = self.window(params.period.as_deref(), params.start, params.end)?;
        let limit = params
            .limit
            .unwrap_or(DEFAULT_FEATURE_LIMIT)
            .clamp(1, MAX_FEATURE_LIMIT);
        self.engine.feature_usage(range, params.user_id, limit).await
    }

    pub async fn realtime(&self, params: &RealtimeParams) -> AnalyticsResult<RealtimeSnapshot> {
        self.realtime
            .snapshot_with(params.recent.unwrap_or(DEFAULT_RECENT_EVENTS))
            .await
    }
}
