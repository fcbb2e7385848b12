//! Request extractors shared by the domain routers.

pub mod client_info;
pub mod validated_json;

pub use client_info::{ClientInfo, extract_ip_from_headers, extract_user_agent, header_str};
pub use validated_json::ValidatedJson;
