//! Per-request caller context.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use axum_helpers::{AppError, ClientInfo, header_str};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const PLATFORM_HEADER: &str = "x-platform";

/// Who is calling: the authenticated user (injected upstream by the auth
/// layer), the client session and the client's network details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub platform: Option<String>,
    pub client: ClientInfo,
}

impl RequestContext {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let user_id = header_str(headers, USER_ID_HEADER)
            .map(|raw| {
                Uuid::parse_str(raw)
                    .map_err(|_| AppError::BadRequest(format!("{USER_ID_HEADER} must be a UUID")))
            })
            .transpose()?;

        let session_id = header_str(headers, SESSION_ID_HEADER).map(String::from);
        if session_id.as_ref().is_some_and(|s| s.len() > 128) {
            return Err(AppError::BadRequest(format!(
                "{SESSION_ID_HEADER} exceeds 128 characters"
            )));
        }

        Ok(Self {
            user_id,
            session_id,
            platform: header_str(headers, PLATFORM_HEADER).map(String::from),
            client: ClientInfo::from_headers(headers),
        })
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
