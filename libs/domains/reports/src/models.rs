use chrono::{DateTime, Utc};
use domain_analytics::DateRange;
use sea_orm::{DbErr, DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use strum::Display;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Cadence or origin of a report
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "report_type")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportType {
    #[sea_orm(string_value = "daily")]
    Daily,
    #[sea_orm(string_value = "weekly")]
    Weekly,
    #[sea_orm(string_value = "monthly")]
    Monthly,
    #[sea_orm(string_value = "custom")]
    Custom,
}

/// `generating` moves exactly once to `completed` or `failed`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "report_status")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportStatus {
    #[sea_orm(string_value = "generating")]
    Generating,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Generating)
    }

    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (ReportStatus::Generating, ReportStatus::Completed)
                | (ReportStatus::Generating, ReportStatus::Failed)
        )
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "report_format")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    #[sea_orm(string_value = "json")]
    Json,
    #[sea_orm(string_value = "csv")]
    Csv,
}

// `DeriveActiveEnum` already provides `TryFrom<&str>` over the stored values
impl FromStr for ReportType {
    type Err = DbErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl FromStr for ReportStatus {
    type Err = DbErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl FromStr for ReportFormat {
    type Err = DbErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

/// A materialised aggregation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Report {
    pub id: Uuid,
    pub report_type: ReportType,
    pub name: String,
    /// Absent for org-wide reports
    pub user_id: Option<Uuid>,
    pub range: DateRange,
    #[schema(value_type = Option<Object>)]
    pub payload: Option<Value>,
    pub generated_at: Option<DateTime<Utc>>,
    /// `scheduler`, `cli`, `api` or a user id
    pub generated_by: String,
    pub format: ReportFormat,
    pub status: ReportStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn start(new: NewReport, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            report_type: new.report_type,
            name: new.name,
            user_id: new.user_id,
            range: new.range,
            payload: None,
            generated_at: None,
            generated_by: new.generated_by,
            format: new.format,
            status: ReportStatus::Generating,
            error_message: None,
            created_at,
        }
    }

    pub fn complete(&mut self, payload: Value, at: DateTime<Utc>) {
        self.payload = Some(payload);
        self.generated_at = Some(at);
        self.status = ReportStatus::Completed;
    }

    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) {
        self.error_message = Some(message.into());
        self.generated_at = Some(at);
        self.status = ReportStatus::Failed;
    }
}

/// Everything fixed at creation time
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub report_type: ReportType,
    pub name: String,
    pub user_id: Option<Uuid>,
    pub range: DateRange,
    pub format: ReportFormat,
    pub generated_by: String,
}

impl NewReport {
    pub fn new(report_type: ReportType, range: DateRange) -> Self {
        Self {
            name: default_name(report_type, &range, None),
            report_type,
            user_id: None,
            range,
            format: ReportFormat::Json,
            generated_by: "scheduler".into(),
        }
    }

    pub fn for_user(mut self, user_id: Uuid) -> Self {
        self.name = default_name(self.report_type, &self.range, Some(user_id));
        self.user_id = Some(user_id);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn generated_by(mut self, actor: impl Into<String>) -> Self {
        self.generated_by = actor.into();
        self
    }
}

fn default_name(report_type: ReportType, range: &DateRange, user_id: Option<Uuid>) -> String {
    let base = format!(
        "{} report {}..{}",
        report_type,
        range.start.format("%Y-%m-%d"),
        range.end.format("%Y-%m-%d")
    );
    match user_id {
        Some(user) => format!("{base} for {user}"),
        None => base,
    }
}

/// `POST /reports`
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct GenerateReportRequest {
    pub report_type: ReportType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub format: ReportFormat,
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
}

/// Returned immediately by `POST /reports`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportAccepted {
    pub id: Uuid,
    pub status: ReportStatus,
}

/// Query filters for listing reports
#[derive(Debug, Clone, PartialEq, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportFilter {
    pub report_type: Option<ReportType>,
    pub status: Option<ReportStatus>,
    pub user_id: Option<Uuid>,
    /// Reports created at or after this instant
    pub created_from: Option<DateTime<Utc>>,
    /// Reports created at or before this instant
    pub created_to: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

pub const MAX_PAGE_SIZE: u64 = 100;

fn default_limit() -> u64 {
    20
}

impl Default for ReportFilter {
    fn default() -> Self {
        Self {
            report_type: None,
            status: None,
            user_id: None,
            created_from: None,
            created_to: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        self.report_type.is_none_or(|t| report.report_type == t)
            && self.status.is_none_or(|s| report.status == s)
            && self.user_id.is_none_or(|u| report.user_id == Some(u))
            && self.created_from.is_none_or(|t| report.created_at >= t)
            && self.created_to.is_none_or(|t| report.created_at <= t)
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`
    pub fn page_size(&self) -> u64 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

/// `GET /reports/{id}/download`
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadParams {
    /// Defaults to the format the report was requested in
    pub format: Option<ReportFormat>,
}

/// One page of report metadata, newest first. Payloads are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReportPage {
    pub items: Vec<Report>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn range() -> DateRange {
        let end = Utc.with_ymd_and_hms(2026, 3, 9, 23, 59, 59).unwrap();
        DateRange::new(end - Duration::days(1), end).unwrap()
    }

    #[test]
    fn test_status_transitions_are_terminal_once() {
        use ReportStatus::*;
        assert!(Generating.can_transition_to(Completed));
        assert!(Generating.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Generating.can_transition_to(Generating));
        assert!(Completed.is_terminal() && Failed.is_terminal() && !Generating.is_terminal());
    }

    #[test]
    fn test_new_report_naming() {
        let user = Uuid::new_v4();
        let report = NewReport::new(ReportType::Weekly, range()).for_user(user);
        assert!(report.name.starts_with("weekly report 2026-03-08..2026-03-09"));
        assert!(report.name.ends_with(&user.to_string()));
        assert_eq!(report.generated_by, "scheduler");
    }

    #[test]
    fn test_report_starts_generating() {
        let now = Utc::now();
        let report = Report::start(NewReport::new(ReportType::Daily, range()), now);
        assert_eq!(report.status, ReportStatus::Generating);
        assert_eq!(report.created_at, now);
        assert!(report.payload.is_none() && report.generated_at.is_none());
    }

    #[test]
    fn test_filter_defaults_and_clamp() {
        let filter: ReportFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter, ReportFilter::default());
        assert_eq!(ReportFilter { limit: 0, ..Default::default() }.page_size(), 1);
        assert_eq!(ReportFilter { limit: 5000, ..Default::default() }.page_size(), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_type_and_format_strings() {
        assert_eq!(ReportType::Monthly.to_string(), "monthly");
        assert_eq!("csv".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
        assert_eq!(serde_json::to_value(ReportStatus::Failed).unwrap(), "failed");
    }
}
