//! Normalization of feed API responses.
//!
//! The feed endpoint has shipped several response shapes over time. They
//! all reduce to a list of images plus a continuation flag:
//!
//! | Shape | Images | Continuation |
//! |-------|--------|--------------|
//! | current | `data.items` | `pagination.hasMore` |
//! | v2 | `data.images` | `data.hasMore` |
//! | v1 | `items` | `hasMore` |
//! | search-style | `images` | `hasMore` |
//!
//! When no explicit flag is present, `pagination.page < pagination.totalPages`
//! decides; failing that there are no more pages.

use imagefeed_search::types::{coerce_bool, parse_images};
use imagefeed_search::Image;
use serde::Serialize;
use serde_json::Value;

use crate::error::{FeedError, Result};

/// One page of feed content after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedPage {
    pub images: Vec<Image>,
    pub has_more: bool,
}

const IMAGE_PATHS: [&[&str]; 4] = [
    &["data", "items"],
    &["data", "images"],
    &["items"],
    &["images"],
];

const HAS_MORE_PATHS: [&[&str]; 4] = [
    &["pagination", "hasMore"],
    &["data", "pagination", "hasMore"],
    &["data", "hasMore"],
    &["hasMore"],
];

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.get(key))
}

/// Reduce any known feed response shape to a [`FeedPage`].
///
/// # Errors
///
/// Returns [`FeedError::Envelope`] if the response reports `success: false`
/// or carries no image list, and a validation error if an image is
/// malformed.
pub fn normalize_feed_response(raw: &Value) -> Result<FeedPage> {
    if !raw.is_object() {
        return Err(FeedError::Envelope("feed response must be a JSON object".into()));
    }

    if raw.get("success").and_then(coerce_bool) == Some(false) {
        let reason = ["error", "message"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(Value::as_str))
            .unwrap_or("no reason given");
        return Err(FeedError::Envelope(format!("feed request failed: {reason}")));
    }

    let images = IMAGE_PATHS
        .iter()
        .find_map(|path| lookup(raw, path).and_then(Value::as_array))
        .ok_or_else(|| FeedError::Envelope("feed response has no image list".into()))?;
    let images = parse_images(images)?;

    let has_more = HAS_MORE_PATHS
        .iter()
        .find_map(|path| lookup(raw, path).and_then(coerce_bool))
        .or_else(|| page_before_last(raw))
        .unwrap_or(false);

    Ok(FeedPage { images, has_more })
}

fn page_before_last(raw: &Value) -> Option<bool> {
    let pagination = raw
        .get("pagination")
        .or_else(|| lookup(raw, &["data", "pagination"]))?;
    let page = pagination.get("page")?.as_u64()?;
    let total = pagination.get("totalPages")?.as_u64()?;
    Some(page < total)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn current_shape() {
        let page = normalize_feed_response(&json!({
            "success": true,
            "data": {"items": [{"id": 1}, {"id": 2}]},
            "pagination": {"hasMore": true, "page": 1}
        }))
        .unwrap();
        assert_eq!(page.images.len(), 2);
        assert_eq!(page.images[0].id, "1");
        assert!(page.has_more);
    }

    #[test]
    fn v2_shape() {
        let page = normalize_feed_response(&json!({
            "data": {"images": [{"id": "a"}], "hasMore": "false"}
        }))
        .unwrap();
        assert_eq!(page.images[0].id, "a");
        assert!(!page.has_more);
    }

    #[test]
    fn top_level_items_shape() {
        let page = normalize_feed_response(&json!({"items": [{"id": "x"}], "hasMore": 1})).unwrap();
        assert_eq!(page.images.len(), 1);
        assert!(page.has_more);
    }

    #[test]
    fn search_style_shape() {
        let page = normalize_feed_response(&json!({"images": [], "hasMore": false})).unwrap();
        assert!(page.images.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn total_pages_decides_when_flag_missing() {
        let more = normalize_feed_response(&json!({
            "images": [{"id": "a"}],
            "pagination": {"page": 2, "totalPages": 3}
        }))
        .unwrap();
        assert!(more.has_more);

        let last = normalize_feed_response(&json!({
            "images": [{"id": "a"}],
            "pagination": {"page": 3, "totalPages": 3}
        }))
        .unwrap();
        assert!(!last.has_more);
    }

    #[test]
    fn missing_flag_means_no_more() {
        let page = normalize_feed_response(&json!({"images": [{"id": "a"}]})).unwrap();
        assert!(!page.has_more);
    }

    #[test]
    fn unsuccessful_response_is_envelope_error() {
        let err = normalize_feed_response(&json!({"success": false, "error": "rate limited"}))
            .unwrap_err();
        assert!(matches!(err, FeedError::Envelope(_)));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn missing_images_is_envelope_error() {
        let err = normalize_feed_response(&json!({"data": {}})).unwrap_err();
        assert!(matches!(err, FeedError::Envelope(_)));
    }

    #[test]
    fn malformed_image_is_validation_error() {
        let err = normalize_feed_response(&json!({"images": [{"id": ""}]})).unwrap_err();
        assert_eq!(err.kind(), imagefeed_search::ErrorKind::Validation);
        assert!(matches!(err, FeedError::Search(_)));
    }
}
