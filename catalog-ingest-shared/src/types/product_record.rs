//! Product records as they arrive on the input log.
//!
//! Records are JSON objects, one per message. Only `id` and `name` are
//! required; every field the pipeline does not know about is preserved in
//! [`ProductRecord::extra`] so that it reaches the index untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A structural problem with a record that no amount of retrying can fix.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordDefect {
    #[error("Malformed record payload: {0}")]
    Malformed(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Reference to a product image.
///
/// `url` is either a path relative to the deployment's image root or a
/// remote `http(s)` URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

impl ProductImage {
    /// Whether the image points at a remote location instead of a local file.
    pub fn is_remote(&self) -> bool {
        let url = self.url.to_ascii_lowercase();
        url.starts_with("http://") || url.starts_with("https://")
    }
}

/// A product document read from the input log.
///
/// # Fields
///
/// - `id`: Unique identifier, used as the index document key
/// - `name`: Display name (primary search field)
/// - `description`: Free text, empty when absent
/// - `category`, `price`, `attributes`: Optional catalog metadata
/// - `image`: Optional image reference
/// - `text_embedding` / `image_embedding`: Filled in by the pipeline
/// - `extra`: Any other field present on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ProductImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_embedding: Option<Vec<f32>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProductRecord {
    /// Create a record with only the required fields set.
    ///
    /// # Example
    ///
    /// ```
    /// use catalog_ingest_shared::ProductRecord;
    ///
    /// let record = ProductRecord::new("P1", "Test").with_description("desc");
    /// assert!(record.validate().is_ok());
    /// ```
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: None,
            price: None,
            attributes: BTreeMap::new(),
            image: None,
            text_embedding: None,
            image_embedding: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(ProductImage {
            url: url.into(),
            alt_text: None,
        });
        self
    }

    /// Parse and validate a raw JSON payload.
    ///
    /// Both a payload that is not a JSON object with the required fields and
    /// a parsed record failing [`validate`](Self::validate) are reported as
    /// a [`RecordDefect`].
    pub fn from_json(payload: &[u8]) -> Result<Self, RecordDefect> {
        let record: ProductRecord = serde_json::from_slice(payload)
            .map_err(|e| RecordDefect::Malformed(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// Check the invariants a record must hold before it enters the pipeline.
    pub fn validate(&self) -> Result<(), RecordDefect> {
        if self.id.trim().is_empty() {
            return Err(RecordDefect::MissingField("id"));
        }
        if self.name.trim().is_empty() {
            return Err(RecordDefect::MissingField("name"));
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err(RecordDefect::InvalidField {
                    field: "price",
                    reason: format!("{} is not a non-negative amount", price),
                });
            }
        }
        Ok(())
    }

    /// The text that is sent to the embedding dependency.
    pub fn embedding_text(&self) -> String {
        let description = self.description.trim();
        if description.is_empty() {
            self.name.trim().to_string()
        } else {
            format!("{} {}", self.name.trim(), description)
        }
    }

    /// The record without any embeddings attached, as it is resubmitted.
    pub fn without_embeddings(mut self) -> Self {
        self.text_embedding = None;
        self.image_embedding = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_record() {
        let payload = json!({"id": "P1", "name": "Test", "description": "desc"});
        let record = ProductRecord::from_json(payload.to_string().as_bytes()).unwrap();

        assert_eq!(record.id, "P1");
        assert_eq!(record.name, "Test");
        assert_eq!(record.description, "desc");
        assert!(record.image.is_none());
        assert!(record.extra.is_empty());
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let payload = json!({
            "id": "P2",
            "name": "Boots",
            "brand": "Acme",
            "subcategory": "footwear",
            "image": {"url": "data/images/p2.png"}
        });
        let record = ProductRecord::from_json(payload.to_string().as_bytes()).unwrap();

        assert_eq!(record.extra.get("brand"), Some(&json!("Acme")));
        assert_eq!(record.extra.get("subcategory"), Some(&json!("footwear")));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["brand"], json!("Acme"));
        assert_eq!(back["image"]["url"], json!("data/images/p2.png"));
        assert!(back.get("text_embedding").is_none());
    }

    #[test]
    fn test_missing_required_field_is_malformed() {
        let result = ProductRecord::from_json(br#"{"name": "No id"}"#);
        assert!(matches!(result, Err(RecordDefect::Malformed(_))));

        let result = ProductRecord::from_json(b"not json at all");
        assert!(matches!(result, Err(RecordDefect::Malformed(_))));
    }

    #[test]
    fn test_blank_fields_are_rejected() {
        let result = ProductRecord::from_json(br#"{"id": "  ", "name": "x"}"#);
        assert_eq!(result, Err(RecordDefect::MissingField("id")));

        let result = ProductRecord::from_json(br#"{"id": "P3", "name": ""}"#);
        assert_eq!(result, Err(RecordDefect::MissingField("name")));
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let record = ProductRecord::new("P4", "Lamp").with_price(-1.0);
        assert!(matches!(
            record.validate(),
            Err(RecordDefect::InvalidField { field: "price", .. })
        ));
    }

    #[test]
    fn test_embedding_text() {
        let record = ProductRecord::new("P5", "Lamp").with_description("  warm light ");
        assert_eq!(record.embedding_text(), "Lamp warm light");

        let record = ProductRecord::new("P6", "Desk");
        assert_eq!(record.embedding_text(), "Desk");
    }

    #[test]
    fn test_remote_image_detection() {
        let local = ProductImage {
            url: "data/images/p1.png".to_string(),
            alt_text: None,
        };
        let remote = ProductImage {
            url: "HTTPS://cdn.example.com/p1.png".to_string(),
            alt_text: None,
        };
        assert!(!local.is_remote());
        assert!(remote.is_remote());
    }
}
