use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ReportResult;
use crate::models::{Report, ReportFilter, ReportPage, ReportStatus};

/// Persistence for report records
///
/// `complete` and `fail` only apply to reports still `generating`; they
/// return whether the transition happened.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(&self, report: Report) -> ReportResult<Report>;

    async fn get(&self, id: Uuid) -> ReportResult<Option<Report>>;

    /// Newest first, payloads stripped
    async fn list(&self, filter: &ReportFilter) -> ReportResult<ReportPage>;

    async fn complete(&self, id: Uuid, payload: Value, at: DateTime<Utc>) -> ReportResult<bool>;

    async fn fail(&self, id: Uuid, message: String, at: DateTime<Utc>) -> ReportResult<bool>;

    /// Fail every report still `generating` with `created_at < cutoff`
    async fn fail_generating_before(
        &self,
        cutoff: DateTime<Utc>,
        message: String,
        at: DateTime<Utc>,
    ) -> ReportResult<u64>;

    /// Delete reports with `created_at < cutoff`
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> ReportResult<u64>;
}

/// In-memory report store (development and tests)
#[derive(Debug, Default)]
pub struct InMemoryReportRepository {
    reports: RwLock<HashMap<Uuid, Report>>,
}

impl InMemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn transition(
        &self,
        id: Uuid,
        next: ReportStatus,
        apply: impl FnOnce(&mut Report),
    ) -> ReportResult<bool> {
        let mut reports = self.reports.write().await;
        match reports.get_mut(&id) {
            Some(report) if report.status.can_transition_to(next) => {
                apply(report);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn create(&self, report: Report) -> ReportResult<Report> {
        self.reports.write().await.insert(report.id, report.clone());
        Ok(report)
    }

    async fn get(&self, id: Uuid) -> ReportResult<Option<Report>> {
        Ok(self.reports.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &ReportFilter) -> ReportResult<ReportPage> {
        let reports = self.reports.read().await;
        let mut matched: Vec<&Report> = reports.values().filter(|r| filter.matches(r)).collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let limit = filter.page_size();
        let items = matched
            .iter()
            .skip(filter.offset as usize)
            .take(limit as usize)
            .map(|r| Report {
                payload: None,
                ..(*r).clone()
            })
            .collect();

        Ok(ReportPage {
            items,
            total: matched.len() as u64,
            limit,
            offset: filter.offset,
        })
    }

    async fn complete(&self, id: Uuid, payload: Value, at: DateTime<Utc>) -> ReportResult<bool> {
        self.transition(id, ReportStatus::Completed, |r| r.complete(payload, at))
            .await
    }

    async fn fail(&self, id: Uuid, message: String, at: DateTime<Utc>) -> ReportResult<bool> {
        self.transition(id, ReportStatus::Failed, |r| r.fail(message, at))
            .await
    }

    async fn fail_generating_before(
        &self,
        cutoff: DateTime<Utc>,
        message: String,
        at: DateTime<Utc>,
    ) -> ReportResult<u64> {
        let mut reports = self.reports.write().await;
        let mut failed = 0;
        for report in reports.values_mut() {
            if report.status == ReportStatus::Generating && report.created_at < cutoff {
                report.fail(message.clone(), at);
                failed += 1;
            }
        }
        Ok(failed)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> ReportResult<u64> {
        let mut reports = self.reports.write().await;
        let before = reports.len();
        reports.retain(|_, r| r.created_at >= cutoff);
        Ok((before - reports.len()) as u64)
    }
}
