//! Client Event Buffer
//!
//! In-process telemetry queue for the event-producing side:
//!
//! ```text
//! track ──► queue ──┬──► PendingStore (newest 100, survives restarts)
//!                   └──► flush (timer | batch_size) ──► BatchTransport ──► POST /api/events/batch
//! ```
//!
//! Delivery failures never reach the caller. A failed flush keeps the queue
//! and marks the buffer offline until [`ClientEventBuffer::set_online`]
//! reports connectivity again.
//!
//! # Example
//!
//! ```rust,ignore
//! use event_buffer::*;
//!
//! let config = BufferConfig::from_env()?;
//! let transport = Arc::new(HttpTransport::new(&config)?);
//! let pending: Arc<dyn PendingStore> = match &config.pending_path {
//!     Some(path) => Arc::new(FilePendingStore::new(path)),
//!     None => Arc::new(MemoryPendingStore::new()),
//! };
//! let buffer = ClientEventBuffer::start(config, transport, pending, DeviceInfo::default()).await;
//! buffer.track(EventDraft::new(EventCategory::Workout, "started").with_label("run"));
//! ```

mod buffer;
mod config;
mod error;
mod pending;
mod transport;

pub use buffer::{ClientEventBuffer, FlushOutcome};
pub use config::BufferConfig;
pub use error::{BufferError, BufferResult};
pub use pending::{FilePendingStore, MemoryPendingStore, PendingStore};
pub use transport::{BATCH_PATH, BatchTransport, HttpTransport, OutgoingBatch};

pub use domain_events::{DeviceInfo, EventCategory, EventDraft};
