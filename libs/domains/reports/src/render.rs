//! Download rendering for completed reports.
//!
//! CSV output flattens the payload into `metric,value` rows keyed by dotted
//! paths, e.g. `engagement.active_users` or `categories.0.count`.

use serde_json::Value;

use crate::error::{ReportError, ReportResult};
use crate::models::{Report, ReportFormat, ReportStatus};

pub struct Rendered {
    pub content_type: &'static str,
    pub file_name: String,
    pub body: Vec<u8>,
}

pub fn render(report: &Report, format: ReportFormat) -> ReportResult<Rendered> {
    let payload = match (&report.status, &report.payload) {
        (ReportStatus::Completed, Some(payload)) => payload,
        _ => {
            return Err(ReportError::NotReady {
                id: report.id,
                status: report.status,
            });
        }
    };

    match format {
        ReportFormat::Json => Ok(Rendered {
            content_type: "application/json",
            file_name: format!("report-{}.json", report.id),
            body: serde_json::to_vec_pretty(payload)
                .map_err(|e| ReportError::Render(e.to_string()))?,
        }),
        ReportFormat::Csv => Ok(Rendered {
            content_type: "text/csv",
            file_name: format!("report-{}.csv", report.id),
            body: to_csv(payload)?,
        }),
    }
}

fn to_csv(payload: &Value) -> ReportResult<Vec<u8>> {
    let mut rows = Vec::new();
    flatten("", payload, &mut rows);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["metric", "value"])
        .map_err(|e| ReportError::Render(e.to_string()))?;
    for (metric, value) in rows {
        writer
            .write_record([metric, value])
            .map_err(|e| ReportError::Render(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| ReportError::Render(e.to_string()))
}

fn flatten(prefix: &str, value: &Value, rows: &mut Vec<(String, String)>) {
    let key = |child: &str| {
        if prefix.is_empty() {
            child.to_string()
        } else {
            format!("{prefix}.{child}")
        }
    };

    match value {
        Value::Object(map) => {
            for (name, child) in map {
                flatten(&key(name), child, rows);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten(&key(&index.to_string()), child, rows);
            }
        }
        Value::Null => rows.push((prefix.to_string(), String::new())),
        Value::String(s) => rows.push((prefix.to_string(), s.clone())),
        other => rows.push((prefix.to_string(), other.to_string())),
    }
}
