use async_trait::async_trait;
use domain_events::{
    BatchReceipt, DeviceInfo, EventDraft, PLATFORM_HEADER, SESSION_ID_HEADER, USER_ID_HEADER,
};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use uuid::Uuid;

use crate::config::BufferConfig;
use crate::error::{BufferError, BufferResult};

pub const BATCH_PATH: &str = "/api/events/batch";

/// One flush worth of drafts plus the headers that scope it
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingBatch {
    pub events: Vec<EventDraft>,
    pub device: DeviceInfo,
    pub session_id: String,
    pub user_id: Option<Uuid>,
}

/// Delivers a batch to the ingestion boundary
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send(&self, batch: &OutgoingBatch) -> BufferResult<BatchReceipt>;
}

#[derive(Serialize)]
struct BatchBody<'a> {
    events: &'a [EventDraft],
    device: &'a DeviceInfo,
}

/// `POST {endpoint}/api/events/batch` over reqwest
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(config: &BufferConfig) -> BufferResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}{}", config.endpoint.trim_end_matches('/'), BATCH_PATH),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn send(&self, batch: &OutgoingBatch) -> BufferResult<BatchReceipt> {
        let mut request = self
            .client
            .post(&self.url)
            .header(SESSION_ID_HEADER, &batch.session_id)
            .json(&BatchBody {
                events: &batch.events,
                device: &batch.device,
            });
        if let Some(user_id) = batch.user_id {
            request = request.header(USER_ID_HEADER, user_id.to_string());
        }
        if let Some(platform) = &batch.device.platform {
            request = request.header(PLATFORM_HEADER, platform);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<BatchReceipt>().await?);
        }

        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(BufferError::TooLarge {
                events: batch.events.len(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        if is_permanent(status) {
            Err(BufferError::Rejected {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(BufferError::Transport(format!("ingestion answered {status}: {body}")))
        }
    }
}

/// 4xx means the batch itself is bad, except timeouts, throttling and a
/// batch that only needs splitting
fn is_permanent(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
        && status != StatusCode::PAYLOAD_TOO_LARGE
}
