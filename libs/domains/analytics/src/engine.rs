use chrono::NaiveDate;
use domain_events::{
    Event, EventCategory, EventQuery, EventRepository, SessionQuery, SessionRepository,
    SubscriptionAction,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::directory::UserDirectory;
use crate::error::AnalyticsResult;
use crate::group::GroupField;
use crate::models::{
    AggregateFilters, AggregateRow, BusinessMetrics, Dashboard, EngagementMetrics,
    EngagementScore, FeatureUsageRow,
};
use crate::range::DateRange;

pub const DEFAULT_FEATURE_LIMIT: usize = 10;

const SCORE_SESSION_CAP: usize = 20;
const SCORE_EVENT_CAP: usize = 200;

/// Grouped and windowed queries over the event store.
///
/// Every method reads a fresh snapshot; events inserted mid-query may or may
/// not be counted. Distinct users are counted by materialising the id set.
pub struct AggregationEngine<E: EventRepository, S: SessionRepository> {
    events: Arc<E>,
    sessions: Arc<S>,
    directory: Arc<dyn UserDirectory>,
}

impl<E: EventRepository, S: SessionRepository> AggregationEngine<E, S> {
    pub fn new(events: Arc<E>, sessions: Arc<S>, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            events,
            sessions,
            directory,
        }
    }

    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    async fn events_in(&self, query: &EventQuery) -> AnalyticsResult<Vec<Event>> {
        Ok(self.events.query(query).await?)
    }

    /// Group matching events by `group_by`. An empty field list yields a single
    /// group holding every matching event.
    #[instrument(skip(self, filters), fields(start = %range.start, end = %range.end))]
    pub async fn aggregate(
        &self,
        group_by: &[GroupField],
        range: DateRange,
        filters: &AggregateFilters,
    ) -> AnalyticsResult<Vec<AggregateRow>> {
        let events = self.events_in(&filters.to_query(&range)).await?;
        Ok(group_events(group_by, &events))
    }

    pub async fn count_events(&self, range: DateRange) -> AnalyticsResult<u64> {
        Ok(self
            .events
            .count(&EventQuery::between(range.start, range.end))
            .await?)
    }

    #[instrument(skip(self), fields(start = %range.start, end = %range.end))]
    pub async fn engagement_metrics(
        &self,
        range: DateRange,
        user_id: Option<Uuid>,
    ) -> AnalyticsResult<EngagementMetrics> {
        let events = self
            .events_in(&EventQuery::between(range.start, range.end).for_user(user_id))
            .await?;
        let sessions = self
            .sessions
            .list(&SessionQuery::started_between(range.start, range.end).for_user(user_id))
            .await?;

        // Sign-ups are an org-wide figure
        let new_users = match user_id {
            Some(_) => 0,
            None => self.directory.count_new_users(&range).await?,
        };

        let active_users = events
            .iter()
            .filter_map(|e| e.user_id)
            .collect::<HashSet<_>>()
            .len();

        let durations: Vec<i64> = sessions.iter().filter_map(|s| s.duration_secs).collect();
        let avg_session_duration_secs = mean(durations.iter().map(|d| *d as f64), durations.len());

        let total_session_events: i64 = sessions.iter().map(|s| s.event_count).sum();
        let avg_events_per_session = ratio(total_session_events as f64, sessions.len());

        let bounced = sessions.iter().filter(|s| s.event_count == 1).count();

        Ok(EngagementMetrics {
            active_users,
            new_users,
            total_events: events.len() as u64,
            total_sessions: sessions.len() as u64,
            avg_session_duration_secs,
            avg_events_per_session,
            retention_rate: retention_rate(&range, &sessions),
            bounce_rate: ratio(bounced as f64, sessions.len()),
        })
    }

    /// `feature_usage` events ranked by count, top `limit`
    #[instrument(skip(self), fields(start = %range.start, end = %range.end))]
    pub async fn feature_usage(
        &self,
        range: DateRange,
        user_id: Option<Uuid>,
        limit: usize,
    ) -> AnalyticsResult<Vec<FeatureUsageRow>> {
        let query = EventQuery::between(range.start, range.end)
            .for_user(user_id)
            .with_category(EventCategory::FeatureUsage);
        let events = self.events_in(&query).await?;

        let mut features: HashMap<String, GroupAccumulator> = HashMap::new();
        for event in &events {
            let feature = event.label.clone().unwrap_or_else(|| event.action.clone());
            features.entry(feature).or_default().add(event);
        }

        let mut rows: Vec<FeatureUsageRow> = features
            .into_iter()
            .map(|(feature, acc)| FeatureUsageRow {
                feature,
                count: acc.count,
                unique_users: acc.users.len(),
                avg_time_spent: acc.value_avg(),
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.feature.cmp(&b.feature)));
        rows.truncate(limit);
        Ok(rows)
    }

    /// Subscription funnel over the window
    #[instrument(skip(self), fields(start = %range.start, end = %range.end))]
    pub async fn business_metrics(
        &self,
        range: DateRange,
        user_id: Option<Uuid>,
    ) -> AnalyticsResult<BusinessMetrics> {
        let query = EventQuery::between(range.start, range.end)
            .for_user(user_id)
            .with_category(EventCategory::Subscription);
        let events = self.events_in(&query).await?;

        let mut metrics = BusinessMetrics::default();
        for event in &events {
            let Ok(action) = event.action.parse::<SubscriptionAction>() else {
                continue;
            };
            match action {
                SubscriptionAction::PaywallViewed => metrics.paywall_views += 1,
                SubscriptionAction::TrialStarted => metrics.trials_started += 1,
                SubscriptionAction::Subscribed => {
                    metrics.subscriptions += 1;
                    metrics.revenue += event.value.unwrap_or(0.0);
                }
                SubscriptionAction::Renewed => {
                    metrics.renewals += 1;
                    metrics.revenue += event.value.unwrap_or(0.0);
                }
                SubscriptionAction::Cancelled => metrics.cancellations += 1,
            }
        }

        metrics.conversion_rate =
            ratio(metrics.subscriptions as f64, metrics.paywall_views as usize);
        metrics.churn_rate = ratio(
            metrics.cancellations as f64,
            (metrics.subscriptions + metrics.renewals) as usize,
        );
        Ok(metrics)
    }

    /// Per-user score in `[0, 100]`, highest first
    #[instrument(skip(self), fields(start = %range.start, end = %range.end))]
    pub async fn engagement_scores(&self, range: DateRange) -> AnalyticsResult<Vec<EngagementScore>> {
        let events = self
            .events_in(&EventQuery::between(range.start, range.end))
            .await?;
        let sessions = self
            .sessions
            .list(&SessionQuery::started_between(range.start, range.end))
            .await?;

        let mut days: HashMap<Uuid, HashSet<NaiveDate>> = HashMap::new();
        let mut event_counts: HashMap<Uuid, usize> = HashMap::new();
        for event in &events {
            let Some(user) = event.user_id else { continue };
            days.entry(user).or_default().insert(event.timestamp.date_naive());
            *event_counts.entry(user).or_default() += 1;
        }

        let mut session_counts: HashMap<Uuid, usize> = HashMap::new();
        for user in sessions.iter().filter_map(|s| s.user_id) {
            *session_counts.entry(user).or_default() += 1;
        }

        let day_span = range.day_span() as f64;
        let mut scores: Vec<EngagementScore> = days
            .into_iter()
            .map(|(user_id, active)| {
                let events = event_counts.get(&user_id).copied().unwrap_or(0);
                let sessions = session_counts.get(&user_id).copied().unwrap_or(0);
                let day_share = (active.len() as f64 / day_span).min(1.0);
                let raw = 50.0 * day_share
                    + 30.0 * sessions.min(SCORE_SESSION_CAP) as f64 / SCORE_SESSION_CAP as f64
                    + 20.0 * events.min(SCORE_EVENT_CAP) as f64 / SCORE_EVENT_CAP as f64;
                EngagementScore {
                    user_id,
                    score: (raw * 10.0).round() / 10.0,
                    active_days: active.len(),
                    sessions,
                    events,
                }
            })
            .collect();

        scores.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(scores)
    }

    /// Recompute scores over `range` and hand them to the user directory
    pub async fn refresh_engagement_scores(&self, range: DateRange) -> AnalyticsResult<usize> {
        let scores = self.engagement_scores(range).await?;
        self.directory.record_engagement_scores(&scores).await?;
        tracing::info!(users = scores.len(), "Engagement scores refreshed");
        Ok(scores.len())
    }

    /// Everything a dashboard or report shows for one window
    pub async fn dashboard(
        &self,
        range: DateRange,
        user_id: Option<Uuid>,
    ) -> AnalyticsResult<Dashboard> {
        let filters = AggregateFilters {
            user_id,
            ..Default::default()
        };
        let (engagement, categories, top_features, business) = tokio::try_join!(
            self.engagement_metrics(range, user_id),
            self.aggregate(&[GroupField::Category], range, &filters),
            self.feature_usage(range, user_id, DEFAULT_FEATURE_LIMIT),
            self.business_metrics(range, user_id),
        )?;

        Ok(Dashboard {
            range,
            engagement,
            categories,
            top_features,
            business,
            realtime: None,
        })
    }
}

/// Share of the first-half cohort that comes back in the second half.
///
/// The cohort is every user whose first session in the window starts in the
/// first half; a user is retained when another of their sessions starts in
/// the second half.
fn retention_rate(range: &DateRange, sessions: &[domain_events::Session]) -> f64 {
    let (first_half, second_half) = range.halves();

    let mut starts: HashMap<Uuid, Vec<chrono::DateTime<chrono::Utc>>> = HashMap::new();
    for session in sessions {
        if let Some(user) = session.user_id {
            starts.entry(user).or_default().push(session.started_at);
        }
    }

    let mut cohort = 0usize;
    let mut retained = 0usize;
    for user_starts in starts.values() {
        let Some(first) = user_starts.iter().min() else {
            continue;
        };
        if !first_half.contains(*first) {
            continue;
        }
        cohort += 1;
        if user_starts.iter().any(|at| second_half.contains(*at)) {
            retained += 1;
        }
    }

    ratio(retained as f64, cohort)
}

fn group_events(group_by: &[GroupField], events: &[Event]) -> Vec<AggregateRow> {
    let mut groups: BTreeMap<Vec<String>, GroupAccumulator> = BTreeMap::new();
    for event in events {
        let key = group_by.iter().map(|f| f.key_for(event)).collect();
        groups.entry(key).or_default().add(event);
    }

    let mut rows: Vec<(Vec<String>, AggregateRow)> = groups
        .into_iter()
        .map(|(key, acc)| {
            let group = group_by
                .iter()
                .map(ToString::to_string)
                .zip(key.iter().cloned())
                .collect();
            let row = AggregateRow {
                group,
                count: acc.count,
                value_sum: acc.value_sum,
                value_avg: acc.value_avg(),
                unique_users: acc.users.len(),
            };
            (key, row)
        })
        .collect();

    rows.sort_by(|(ka, a), (kb, b)| b.count.cmp(&a.count).then_with(|| ka.cmp(kb)));
    rows.into_iter().map(|(_, row)| row).collect()
}

#[derive(Default)]
struct GroupAccumulator {
    count: u64,
    value_sum: f64,
    valued: usize,
    users: HashSet<Uuid>,
}

impl GroupAccumulator {
    fn add(&mut self, event: &Event) {
        self.count += 1;
        if let Some(value) = event.value {
            self.value_sum += value;
            self.valued += 1;
        }
        if let Some(user) = event.user_id {
            self.users.insert(user);
        }
    }

    fn value_avg(&self) -> Option<f64> {
        (self.valued > 0).then(|| self.value_sum / self.valued as f64)
    }
}

fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

fn mean(values: impl Iterator<Item = f64>, len: usize) -> f64 {
    ratio(values.sum(), len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryUserDirectory, MockUserDirectory};
    use chrono::{DateTime, Duration, Utc};
    use domain_events::{ClientContext, MemoryEventStore, NewSession, Session};
    use serde_json::Map;
    use test_utils::TestDataBuilder;

    struct Fixture {
        store: Arc<MemoryEventStore>,
        directory: Arc<InMemoryUserDirectory>,
        engine: AggregationEngine<MemoryEventStore, MemoryEventStore>,
        data: TestDataBuilder,
    }

    fn fixture(seed: u64) -> Fixture {
        let store = Arc::new(MemoryEventStore::new());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let engine = AggregationEngine::new(store.clone(), store.clone(), directory.clone());
        Fixture {
            store,
            directory,
            engine,
            data: TestDataBuilder::new(seed),
        }
    }

    fn event(
        category: EventCategory,
        action: &str,
        user_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Event {
        Event {
            id: Uuid::now_v7(),
            user_id,
            session_id: None,
            event_type: format!("{category}_{action}"),
            category,
            action: action.into(),
            label: None,
            value: None,
            metadata: Map::new(),
            context: ClientContext::default(),
            timestamp: at,
        }
    }

    fn session(id: &str, user_id: Uuid, started_at: DateTime<Utc>, events: i64) -> Session {
        let mut session = Session::start(
            NewSession {
                session_id: id.into(),
                user_id: Some(user_id),
                ..Default::default()
            },
            started_at,
        );
        session.event_count = events;
        session
    }

    fn window(data: &TestDataBuilder) -> DateRange {
        DateRange::last_days(data.base_time(), 7)
    }

    #[tokio::test]
    async fn test_aggregate_by_category_counts_each_group() {
        let f = fixture(1);
        let at = f.data.base_time() - Duration::hours(1);
        let user = f.data.user_id();
        let mut events = Vec::new();
        for _ in 0..3 {
            events.push(event(EventCategory::Workout, "completed", Some(user), at));
        }
        for _ in 0..2 {
            events.push(event(EventCategory::Nutrition, "logged", None, at));
        }
        f.store.insert_batch(&events).await.unwrap();

        let range = window(&f.data);
        let rows = f
            .engine
            .aggregate(&[GroupField::Category], range, &AggregateFilters::default())
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].group["category"], "workout");
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[0].unique_users, 1);
        assert_eq!(rows[1].group["category"], "nutrition");
        assert_eq!(rows[1].count, 2);
        assert_eq!(rows[1].unique_users, 0);

        let total: u64 = rows.iter().map(|r| r.count).sum();
        assert_eq!(total, f.engine.count_events(range).await.unwrap());
    }

    #[tokio::test]
    async fn test_aggregate_sums_and_averages_values() {
        let f = fixture(2);
        let at = f.data.base_time() - Duration::hours(2);
        let mut with_value = event(EventCategory::Workout, "completed", None, at);
        with_value.value = Some(30.0);
        let mut other = event(EventCategory::Workout, "completed", None, at);
        other.value = Some(60.0);
        let without = event(EventCategory::Workout, "completed", None, at);
        f.store.insert_batch(&[with_value, other, without]).await.unwrap();

        let rows = f
            .engine
            .aggregate(&[GroupField::Action], window(&f.data), &AggregateFilters::default())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[0].value_sum, 90.0);
        assert_eq!(rows[0].value_avg, Some(45.0));
    }

    #[tokio::test]
    async fn test_aggregate_respects_window_and_filters() {
        let f = fixture(3);
        let inside = f.data.base_time() - Duration::days(1);
        let outside = f.data.base_time() - Duration::days(30);
        f.store
            .insert_batch(&[
                event(EventCategory::Workout, "started", None, inside),
                event(EventCategory::Workout, "completed", None, inside),
                event(EventCategory::Workout, "completed", None, outside),
            ])
            .await
            .unwrap();

        let filters = AggregateFilters {
            action: Some("completed".into()),
            ..Default::default()
        };
        let rows = f
            .engine
            .aggregate(&[GroupField::Day], window(&f.data), &filters)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 1);
        assert_eq!(rows[0].group["day"], inside.format("%Y-%m-%d").to_string());
    }

    #[tokio::test]
    async fn test_engagement_metrics_from_sessions() {
        let f = fixture(4);
        let range = window(&f.data);
        let (first_half, second_half) = range.halves();
        let returning = f.data.nth_user_id(0);
        let one_off = f.data.nth_user_id(1);

        let mut ended = session("a", returning, first_half.start + Duration::hours(1), 4);
        ended.close(ended.started_at + Duration::seconds(120));
        let back = session("b", returning, second_half.start + Duration::hours(1), 1);
        let bounce = session("c", one_off, first_half.start + Duration::hours(2), 1);
        for s in [ended, back, bounce] {
            f.store.create_if_absent(s).await.unwrap();
        }

        let at = f.data.base_time() - Duration::hours(1);
        f.store
            .insert_batch(&[
                event(EventCategory::Workout, "started", Some(returning), at),
                event(EventCategory::Navigation, "screen_view", Some(one_off), at),
                event(EventCategory::Navigation, "screen_view", None, at),
            ])
            .await
            .unwrap();
        f.directory
            .register_user(one_off, f.data.base_time() - Duration::days(2))
            .await;

        let metrics = f.engine.engagement_metrics(range, None).await.unwrap();

        assert_eq!(metrics.active_users, 2);
        assert_eq!(metrics.new_users, 1);
        assert_eq!(metrics.total_events, 3);
        assert_eq!(metrics.total_sessions, 3);
        assert_eq!(metrics.avg_session_duration_secs, 120.0);
        assert_eq!(metrics.avg_events_per_session, 2.0);
        assert_eq!(metrics.retention_rate, 0.5);
        assert!((metrics.bounce_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_engagement_metrics_empty_window_is_zero() {
        let f = fixture(5);
        let metrics = f.engine.engagement_metrics(window(&f.data), None).await.unwrap();
        assert_eq!(metrics, EngagementMetrics::default());
    }

    #[tokio::test]
    async fn test_feature_usage_ranks_and_limits() {
        let f = fixture(6);
        let at = f.data.base_time() - Duration::hours(3);
        let user = f.data.user_id();
        let mut events = Vec::new();
        for (feature, times, spent) in [("meal_scanner", 3, 10.0), ("timer", 2, 4.0), ("coach", 1, 1.0)] {
            for _ in 0..times {
                let mut e = event(EventCategory::FeatureUsage, "used", Some(user), at);
                e.label = Some(feature.into());
                e.value = Some(spent);
                events.push(e);
            }
        }
        events.push(event(EventCategory::FeatureUsage, "shared", None, at));
        f.store.insert_batch(&events).await.unwrap();

        let rows = f.engine.feature_usage(window(&f.data), None, 2).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].feature, "meal_scanner");
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[0].avg_time_spent, Some(10.0));
        assert_eq!(rows[1].feature, "timer");

        let all = f.engine.feature_usage(window(&f.data), None, 10).await.unwrap();
        let shared = all.iter().find(|r| r.feature == "shared").unwrap();
        assert_eq!(shared.avg_time_spent, None);
    }

    #[tokio::test]
    async fn test_business_metrics_funnel() {
        let f = fixture(7);
        let at = f.data.base_time() - Duration::hours(5);
        let mut events = Vec::new();
        for _ in 0..4 {
            events.push(event(EventCategory::Subscription, "paywall_viewed", None, at));
        }
        let mut subscribed = event(EventCategory::Subscription, "subscribed", None, at);
        subscribed.value = Some(59.99);
        let mut renewed = event(EventCategory::Subscription, "renewed", None, at);
        renewed.value = Some(9.99);
        events.push(subscribed);
        events.push(renewed);
        events.push(event(EventCategory::Subscription, "cancelled", None, at));
        f.store.insert_batch(&events).await.unwrap();

        let metrics = f.engine.business_metrics(window(&f.data), None).await.unwrap();

        assert_eq!(metrics.paywall_views, 4);
        assert_eq!(metrics.subscriptions, 1);
        assert_eq!(metrics.renewals, 1);
        assert!((metrics.revenue - 69.98).abs() < 1e-9);
        assert_eq!(metrics.conversion_rate, 0.25);
        assert_eq!(metrics.churn_rate, 0.5);
    }

    #[tokio::test]
    async fn test_business_metrics_without_paywall_views_has_zero_rates() {
        let f = fixture(8);
        let metrics = f.engine.business_metrics(window(&f.data), None).await.unwrap();
        assert_eq!(metrics.conversion_rate, 0.0);
        assert_eq!(metrics.churn_rate, 0.0);
    }

    #[tokio::test]
    async fn test_engagement_scores_and_refresh() {
        let f = fixture(9);
        let range = DateRange::utc_day(f.data.base_time().date_naive());
        let busy = f.data.nth_user_id(0);
        let quiet = f.data.nth_user_id(1);

        let at = range.start + Duration::hours(8);
        let mut events = Vec::new();
        for _ in 0..200 {
            events.push(event(EventCategory::Workout, "set_logged", Some(busy), at));
        }
        events.push(event(EventCategory::Navigation, "screen_view", Some(quiet), at));
        f.store.insert_batch(&events).await.unwrap();
        for n in 0..20 {
            f.store
                .create_if_absent(session(&f.data.session_id(&n.to_string()), busy, at, 10))
                .await
                .unwrap();
        }

        let scores = f.engine.engagement_scores(range).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].user_id, busy);
        assert_eq!(scores[0].score, 100.0);
        // 50 for the one active day, nothing for sessions, 20 * 1/200 for events
        assert_eq!(scores[1].score, 50.1);

        assert_eq!(f.engine.refresh_engagement_scores(range).await.unwrap(), 2);
        assert_eq!(f.directory.score_for(quiet).await.unwrap().events, 1);
    }

    #[tokio::test]
    async fn test_directory_errors_propagate() {
        let store = Arc::new(MemoryEventStore::new());
        let mut directory = MockUserDirectory::new();
        directory
            .expect_count_new_users()
            .returning(|_| Err(crate::error::AnalyticsError::Directory("offline".into())));
        let engine = AggregationEngine::new(store.clone(), store, Arc::new(directory));

        let range = DateRange::last_days(Utc::now(), 7);
        assert!(engine.engagement_metrics(range, None).await.is_err());
        // Scoped metrics do not consult the directory
        assert!(engine.engagement_metrics(range, Some(Uuid::new_v4())).await.is_ok());
    }
}
