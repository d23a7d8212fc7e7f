//! Core types for gallery images and fetched result pages.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::SearchError;

/// A generated image as it appears in the gallery feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Backend identifier. Numeric ids are normalised to their decimal text.
    #[serde(deserialize_with = "deserialize_image_id")]
    pub id: String,
    /// Where the rendered image can be downloaded.
    #[serde(default, alias = "imageUrl", alias = "image_url")]
    pub url: String,
    /// The prompt the image was generated from.
    #[serde(default)]
    pub prompt: String,
    /// Whether the image is visible in the public feed.
    #[serde(default, alias = "is_public")]
    pub is_public: bool,
    /// Free-form tags attached by the owner.
    #[serde(default)]
    pub tags: Vec<String>,
}

fn deserialize_image_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Text(text) => Ok(text),
        RawId::Number(number) => Ok(number.to_string()),
    }
}

/// A validated page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    pub images: Vec<Image>,
    /// Continuation flag as reported by the backend, if it reported one.
    pub has_more: Option<bool>,
}

impl SearchPage {
    /// Validate a raw page payload.
    ///
    /// The payload must be an object with an `images` array whose entries
    /// each carry a non-empty `id`. `hasMore` is optional; when present it
    /// must be coercible to a boolean (see [`coerce_bool`]).
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Validation`] describing the first problem found.
    pub fn from_payload(payload: &Value) -> Result<Self, SearchError> {
        let object = payload
            .as_object()
            .ok_or_else(|| SearchError::Validation("page payload must be a JSON object".into()))?;

        let images = object
            .get("images")
            .ok_or_else(|| SearchError::Validation("page payload has no images collection".into()))?
            .as_array()
            .ok_or_else(|| SearchError::Validation("images must be an array".into()))?;

        let has_more = match object.get("hasMore") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(coerce_bool(raw).ok_or_else(|| {
                SearchError::Validation(format!("hasMore is not a boolean: {raw}"))
            })?),
        };

        Ok(Self {
            images: parse_images(images)?,
            has_more,
        })
    }

    /// Continuation flag with a missing value treated as "no more pages".
    pub fn has_more_or_default(&self) -> bool {
        self.has_more.unwrap_or(false)
    }
}

/// Parse a JSON array of image objects.
///
/// # Errors
///
/// Returns [`SearchError::Validation`] if any entry is not an image or has
/// an empty id.
pub fn parse_images(raw: &[Value]) -> Result<Vec<Image>, SearchError> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            let image: Image = serde_json::from_value(value.clone())
                .map_err(|e| SearchError::Validation(format!("image {index}: {e}")))?;
            if image.id.trim().is_empty() {
                return Err(SearchError::Validation(format!("image {index}: empty id")));
            }
            Ok(image)
        })
        .collect()
}

/// Best-effort boolean coercion for loosely-typed backend flags.
///
/// Accepts JSON booleans, the numbers `0` and `1`, and the strings
/// `"true"`, `"false"`, `"1"` and `"0"` (case-insensitive).
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_f64() {
            Some(n) if n == 0.0 => Some(false),
            Some(n) if n == 1.0 => Some(true),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Result tallies shown next to the search box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCounts {
    pub total: usize,
    pub public: usize,
    pub private: usize,
    /// How many results actually made it on screen after client-side filtering.
    pub visible: usize,
}

impl SearchCounts {
    /// Tally total/public/private for a batch of images. `visible` starts at 0.
    pub fn from_images(images: &[Image]) -> Self {
        let public = images.iter().filter(|image| image.is_public).count();
        Self {
            total: images.len(),
            public,
            private: images.len() - public,
            visible: 0,
        }
    }

    /// Add another batch's counts to these.
    pub fn absorb(&mut self, other: SearchCounts) {
        self.total += other.total;
        self.public += other.public;
        self.private += other.private;
        self.visible += other.visible;
    }
}
