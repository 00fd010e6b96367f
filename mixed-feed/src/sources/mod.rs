pub mod facebook;
pub mod github_releases;
pub mod instagram_user;
pub mod pinterest_board;
pub mod twitter;

pub use facebook::{FacebookPageFeed, FacebookUserFeed};
pub use github_releases::GithubReleasesFeed;
pub use instagram_user::InstagramUserFeed;
pub use pinterest_board::PinterestBoardFeed;
pub use twitter::{SearchQuery, TwitterSearchFeed, TwitterStatusFeed};

use crate::fetcher::{Transport, TransportRequest};
use crate::types::{MediaImage, RawItem, RawPayload};
use serde_json::Value;
use tracing::warn;

/// Runs the request and pulls the item list out of the response body.
///
/// `list_path` names the envelope field holding the list (`"data"`,
/// `"statuses"`); `None` means the body itself is the list. Every failure is
/// folded into an error payload.
pub(crate) async fn request_list(
    transport: &dyn Transport,
    request: &TransportRequest,
    platform: &str,
    list_path: Option<&str>,
) -> RawPayload {
    let response = match transport.get(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!("{} request to {} failed: {}", platform, request.endpoint, e);
            return RawPayload::error(e.to_string());
        }
    };

    if !response.is_success() {
        let message = describe_error_body(response.status, &response.body);
        warn!("{} returned HTTP {}: {}", platform, response.status, message);
        return RawPayload::error(message);
    }

    let list = match list_path {
        Some(path) => RawItem::new(response.body).get(path).cloned(),
        None => Some(response.body),
    };

    match list {
        Some(list @ Value::Array(_)) => RawPayload(list),
        Some(Value::Object(map)) if map.contains_key("error") => RawPayload(Value::Object(map)),
        _ => {
            warn!("{} response from {} has no item list", platform, request.endpoint);
            RawPayload::error(format!("unexpected {} response shape", platform))
        }
    }
}

/// Error bodies follow a few conventions: `{"error": {"message"}}`,
/// `{"error": "..."}`, `{"errors": [{"code", "message"}]}` and
/// `{"message": "..."}`.
pub(crate) fn describe_error_body(status: u16, body: &Value) -> String {
    let body = RawItem::new(body.clone());

    if let Some(message) = body.str_at("error.message") {
        return message.to_string();
    }
    if let Some(message) = body.str_at("error") {
        return message.to_string();
    }

    let errors: Vec<String> = body
        .items_at("errors")
        .iter()
        .filter_map(|error| {
            let message = error.str_at("message")?;
            Some(match error.string_at("code") {
                Some(code) => format!("[{}] {}", code, message),
                None => message.to_string(),
            })
        })
        .collect();
    if !errors.is_empty() {
        return errors.join("\n");
    }

    if let Some(message) = body.str_at("message") {
        return message.to_string();
    }

    format!("HTTP {}", status)
}

/// Reads `{url, height, width}`-shaped image objects; `url_field` differs
/// between platforms (`src` vs `url`).
pub(crate) fn image_at(item: &RawItem, path: &str, url_field: &str) -> Option<MediaImage> {
    let url = item.str_at(&format!("{}.{}", path, url_field))?;
    let dimension = |name: &str| {
        item.u64_at(&format!("{}.{}", path, name))
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    };
    Some(MediaImage {
        url: url.to_string(),
        size: (dimension("height"), dimension("width")),
    })
}
