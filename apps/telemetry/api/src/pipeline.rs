//! Builds the long-lived services over one event store and one report store.

use axum::Router;
use domain_analytics::{
    AggregationEngine, AnalyticsService, RealtimeMetrics, UserDirectory, analytics_router,
};
use domain_events::{
    EventRepository, IngestionService, SessionRepository, SessionTracker, SharedClock,
    events_router, sessions_router,
};
use domain_reports::{
    ReportGenerator, ReportJobs, ReportRecipients, ReportRepository, ReportResult,
    ReportScheduler, ReportService, reports_router,
};
use observability::metrics_middleware;
use std::sync::Arc;

use crate::config::Config;

/// Services shared by the HTTP handlers and the background loops
pub struct Pipeline<E, R>
where
    E: EventRepository + SessionRepository + 'static,
    R: ReportRepository + 'static,
{
    pub ingestion: Arc<IngestionService<E, E>>,
    pub analytics: Arc<AnalyticsService<E, E>>,
    pub reports: Arc<ReportService<R>>,
    pub generator: ReportGenerator<R>,
    pub scheduler: Arc<ReportScheduler>,
}

impl<E, R> Pipeline<E, R>
where
    E: EventRepository + SessionRepository + 'static,
    R: ReportRepository + 'static,
{
    /// Wire every component and register the default jobs. The scheduler
    /// is not started here.
    pub fn build(
        store: Arc<E>,
        report_store: Arc<R>,
        directory: Arc<dyn UserDirectory>,
        recipients: Arc<dyn ReportRecipients>,
        config: &Config,
        clock: SharedClock,
    ) -> ReportResult<Self> {
        let sessions = Arc::new(SessionTracker::new(store.clone(), clock.clone()));

        let ingestion = Arc::new(IngestionService::new(
            store.clone(),
            sessions.clone(),
            clock.clone(),
            config.ingestion.clone(),
        ));

        let analytics = Arc::new(AnalyticsService::new(
            AggregationEngine::new(store.clone(), store.clone(), directory.clone()),
            RealtimeMetrics::new(store.clone(), store.clone(), clock.clone()),
            clock.clone(),
        ));

        let engine = Arc::new(AggregationEngine::new(store.clone(), store.clone(), directory));
        let generator = ReportGenerator::new(engine.clone(), report_store, clock.clone());
        let scheduler = Arc::new(ReportScheduler::new(config.reports.timezone, clock.clone()));

        let jobs = Arc::new(ReportJobs::new(
            generator.clone(),
            engine,
            store,
            sessions,
            recipients,
            config.reports.clone(),
            clock,
        ));
        jobs.register_defaults(&scheduler)?;

        Ok(Self {
            ingestion,
            analytics,
            reports: Arc::new(ReportService::new(generator.clone(), scheduler.clone())),
            generator,
            scheduler,
        })
    }

    /// Domain routes; `create_router` mounts them under `/api`
    pub fn routes(&self) -> Router {
        Router::new()
            .nest("/events", events_router(self.ingestion.clone()))
            .nest("/sessions", sessions_router(self.ingestion.clone()))
            .nest("/analytics", analytics_router(self.analytics.clone()))
            .nest("/reports", reports_router(self.reports.clone()))
            .layer(axum::middleware::from_fn(metrics_middleware))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::ApiDoc;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum_helpers::create_router;
    use chrono::{TimeZone, Utc};
    use core_config::server::ServerConfig;
    use domain_events::{ManualClock, MemoryEventStore, SESSION_ID_HEADER};
    use domain_analytics::InMemoryUserDirectory;
    use domain_reports::{InMemoryReportRepository, StaticRecipients};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app() -> (Router, Pipeline<MemoryEventStore, InMemoryReportRepository>) {
        app_with_directory(Arc::new(InMemoryUserDirectory::new()))
    }

    fn app_with_directory(
        directory: Arc<dyn UserDirectory>,
    ) -> (Router, Pipeline<MemoryEventStore, InMemoryReportRepository>) {
        let config = temp_env::with_var_unset("DATABASE_URL", || Config::from_env().unwrap());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap(),
        ));
        let pipeline = Pipeline::build(
            Arc::new(MemoryEventStore::new()),
            Arc::new(InMemoryReportRepository::new()),
            directory,
            Arc::new(StaticRecipients::default()),
            &config,
            clock,
        )
        .unwrap();
        let router = create_router::<ApiDoc>(pipeline.routes(), &ServerConfig::default()).unwrap();
        (router, pipeline)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_batch_is_visible_to_realtime() {
        let (app, _pipeline) = app();

        let batch = json!({
            "events": [
                { "category": "workout", "action": "started", "label": "run" },
                { "category": "workout", "action": "completed", "value": 32.5 },
                { "category": "bogus", "action": "x" },
            ],
            "device": { "platform": "ios", "app_version": "3.2.0" },
        });
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/events/batch")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(SESSION_ID_HEADER, "s-1")
                    .body(Body::from(batch.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = json_body(response).await;
        assert_eq!(receipt["accepted"], 2);
        assert_eq!(receipt["rejected"], 1);

        let response = app
            .oneshot(
                Request::get("/api/analytics/realtime")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = json_body(response).await;
        assert_eq!(snapshot["active_sessions"], 1);
        assert_eq!(snapshot["recent_events"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_default_jobs_are_listed() {
        let (app, pipeline) = app();
        assert_eq!(pipeline.scheduler.job_names().len(), 6);

        let response = app
            .oneshot(Request::get("/api/reports/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let jobs = json_body(response).await;
        assert_eq!(jobs.as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_dashboard_reads_the_injected_directory() {
        let directory = Arc::new(InMemoryUserDirectory::new());
        directory
            .register_user(
                uuid::Uuid::new_v4(),
                Utc.with_ymd_and_hms(2026, 3, 8, 9, 0, 0).unwrap(),
            )
            .await;
        let (app, _pipeline) = app_with_directory(directory);

        let response = app
            .oneshot(
                Request::get("/api/analytics/dashboard?period=7d")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let dashboard = json_body(response).await;
        assert_eq!(dashboard["engagement"]["new_users"], 1);
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (app, _pipeline) = app();
        let response = app
            .oneshot(Request::get("/api/workouts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_client_buffer_delivers_to_api() {
        use domain_events::SystemClock;
        use event_buffer::{
            BufferConfig, ClientEventBuffer, DeviceInfo, EventCategory, EventDraft, HttpTransport,
            MemoryPendingStore,
        };

        let config = temp_env::with_var_unset("DATABASE_URL", || Config::from_env().unwrap());
        let store = Arc::new(MemoryEventStore::new());
        let pipeline = Pipeline::build(
            store.clone(),
            Arc::new(InMemoryReportRepository::new()),
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(StaticRecipients::default()),
            &config,
            SystemClock::shared(),
        )
        .unwrap();
        let router = create_router::<ApiDoc>(pipeline.routes(), &ServerConfig::default()).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });

        let buffer_config = BufferConfig::new(format!("http://{addr}"));
        let transport = Arc::new(HttpTransport::new(&buffer_config).unwrap());
        let buffer = ClientEventBuffer::new(
            buffer_config,
            transport,
            Arc::new(MemoryPendingStore::new()),
        )
        .with_device(DeviceInfo {
            platform: Some("android".into()),
            ..DeviceInfo::default()
        });

        buffer.track(EventDraft::new(EventCategory::Nutrition, "logged").with_value(540.0));
        buffer.track(EventDraft::new(EventCategory::Navigation, "screen_view").with_label("home"));
        assert_eq!(
            buffer.flush_and_wait().await,
            event_buffer::FlushOutcome::Sent(2)
        );
        assert_eq!(buffer.queued(), 0);

        assert_eq!(store.len().await, 2);
        let sessions = pipeline
            .ingestion
            .sessions()
            .active_sessions(None)
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, buffer.session_id());
    }
}
