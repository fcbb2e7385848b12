//! Events Domain
//!
//! Stores telemetry events and client sessions, and ingests events in batches:
//!
//! ```text
//! client batch ──► POST /events/batch ──► ingest_batch ──┬─► EventRepository
//!                                                        └─► SessionTracker
//! server code ───► track ──► queue ──► run loop ──► flush ──► EventRepository
//! ```
//!
//! Two stores implement both repository traits: [`MemoryEventStore`] and the
//! sea-orm backed [`PgEventStore`].

use utoipa::OpenApi;

mod clock;
mod config;
mod context;
pub mod entity;
mod error;
pub mod handlers;
mod ingestion;
mod memory;
mod models;
mod postgres;
mod repository;
mod sessions;
mod tracking;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::IngestionConfig;
pub use context::{PLATFORM_HEADER, RequestContext, SESSION_ID_HEADER, USER_ID_HEADER};
pub use error::{EventError, EventResult};
pub use handlers::{events_router, sessions_router};
pub use ingestion::{FlushOutcome, IngestionService};
pub use memory::MemoryEventStore;
pub use models::{
    ActiveSessionsParams, BatchReceipt, BatchRequest, ClientContext, DeviceInfo, Event,
    EventCategory, EventDraft, EventQuery, MAX_BATCH_EVENTS, NewSession, Session, SessionQuery,
    TrackReceipt,
};
pub use postgres::PgEventStore;
pub use repository::{EventRepository, SessionRepository};
pub use sessions::SessionTracker;
pub use tracking::{
    ErrorDetails, NutritionDetails, SubscriptionAction, SubscriptionDetails, WorkoutDetails,
};

/// OpenAPI documentation for the ingestion and session endpoints
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::ingest_batch,
        handlers::track_event,
        handlers::list_events,
        handlers::create_session,
        handlers::end_session,
        handlers::active_sessions,
    ),
    components(schemas(
        BatchRequest,
        BatchReceipt,
        ClientContext,
        DeviceInfo,
        Event,
        EventCategory,
        EventDraft,
        NewSession,
        Session,
        TrackReceipt,
    )),
    tags(
        (name = "events", description = "Event ingestion"),
        (name = "sessions", description = "Client session lifecycle")
    )
)]
pub struct ApiDoc;
