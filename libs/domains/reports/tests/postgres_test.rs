//! Integration tests for the Postgres report repository
//!
//! These use a real PostgreSQL via testcontainers and need Docker:
//! `cargo test -p domain_reports -- --ignored`

use chrono::Duration;
use domain_analytics::DateRange;
use domain_reports::*;
use serde_json::json;
use test_utils::{TestDataBuilder, TestDatabase, assertions::*};

fn weekly(builder: &TestDataBuilder) -> NewReport {
    NewReport::new(
        ReportType::Weekly,
        DateRange::last_days(builder.base_time(), 7),
    )
    .for_user(builder.user_id())
    .with_format(ReportFormat::Csv)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_report_reaches_one_terminal_status() {
    let db = TestDatabase::new().await;
    let repository = PgReportRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("pg_report_lifecycle");
    let now = builder.base_time();

    let created = repository
        .create(Report::start(weekly(&builder), now))
        .await
        .unwrap();
    assert_eq!(created.status, ReportStatus::Generating);

    assert!(
        repository
            .complete(created.id, json!({"event_count": 4}), now)
            .await
            .unwrap()
    );
    assert!(!repository.fail(created.id, "late".into(), now).await.unwrap());

    let stored = assert_some(repository.get(created.id).await.unwrap(), "stored report");
    assert_uuid_eq(stored.id, created.id, "report id");
    assert_eq!(stored.status, ReportStatus::Completed);
    assert_eq!(stored.format, ReportFormat::Csv);
    assert_eq!(stored.user_id, Some(builder.user_id()));
    assert_eq!(stored.payload, Some(json!({"event_count": 4})));
    assert_eq!(stored.error_message, None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_list_and_retention() {
    let db = TestDatabase::new().await;
    let repository = PgReportRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("pg_report_list");
    let now = builder.base_time();

    let old = repository
        .create(Report::start(weekly(&builder), now - Duration::days(400)))
        .await
        .unwrap();
    for minutes in 0..3 {
        repository
            .create(Report::start(weekly(&builder), now + Duration::minutes(minutes)))
            .await
            .unwrap();
    }
    repository.fail(old.id, "boom".into(), now).await.unwrap();

    let page = repository
        .list(&ReportFilter {
            status: Some(ReportStatus::Generating),
            limit: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert!(page.items[0].created_at > page.items[1].created_at);

    let deleted = repository
        .delete_created_before(now - Duration::days(365))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(repository.get(old.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_stale_generating_reports_are_failed() {
    let db = TestDatabase::new().await;
    let repository = PgReportRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("pg_report_stale");
    let now = builder.base_time();

    let stale = repository
        .create(Report::start(weekly(&builder), now - Duration::hours(3)))
        .await
        .unwrap();
    let fresh = repository
        .create(Report::start(weekly(&builder), now))
        .await
        .unwrap();

    let failed = repository
        .fail_generating_before(now - Duration::hours(1), "abandoned".into(), now)
        .await
        .unwrap();
    assert_eq!(failed, 1);

    let stale = assert_some(repository.get(stale.id).await.unwrap(), "stale report");
    assert_eq!(stale.status, ReportStatus::Failed);
    assert_eq!(stale.error_message.as_deref(), Some("abandoned"));
    let fresh = assert_some(repository.get(fresh.id).await.unwrap(), "fresh report");
    assert_eq!(fresh.status, ReportStatus::Generating);
}
