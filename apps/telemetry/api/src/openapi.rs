//! OpenAPI documentation configuration

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Telemetry API",
        version = "0.1.0",
        description = "Event ingestion, client sessions, dashboard analytics and reports for the fitness app"
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    )
)]
struct BaseDoc;

/// Combined documentation of the event, analytics and report domains.
///
/// Domain handlers already declare their full `/api/...` paths, so the
/// domain documents are merged rather than nested.
pub struct ApiDoc;

impl OpenApi for ApiDoc {
    fn openapi() -> utoipa::openapi::OpenApi {
        let mut doc = BaseDoc::openapi();
        doc.merge(domain_events::ApiDoc::openapi());
        doc.merge(domain_analytics::ApiDoc::openapi());
        doc.merge(domain_reports::ApiDoc::openapi());
        doc
    }
}
