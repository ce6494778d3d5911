//! Document types for the search index.
//!
//! This module defines the document structure that is written to the search
//! engine: the product record with both embeddings attached and a marker for
//! where each embedding came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::embedding::{Embedding, EmbeddingSource};
use crate::types::product_record::ProductRecord;

/// Document representation for the search index.
///
/// The record fields are flattened into the top level of the document, so the
/// indexed JSON looks like the input record plus `text_embedding`,
/// `image_embedding`, the two source markers and `indexed_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductDocument {
    #[serde(flatten)]
    pub record: ProductRecord,
    pub text_embedding_source: EmbeddingSource,
    pub image_embedding_source: EmbeddingSource,
    pub indexed_at: DateTime<Utc>,
}

impl ProductDocument {
    /// Attach both embeddings to a record.
    pub fn new(mut record: ProductRecord, text: Embedding, image: Embedding) -> Self {
        record.text_embedding = Some(text.vector);
        record.image_embedding = Some(image.vector);
        Self {
            record,
            text_embedding_source: text.source,
            image_embedding_source: image.source,
            indexed_at: Utc::now(),
        }
    }

    /// The index document key.
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Swap in a new text embedding, keeping the marker in step.
    pub fn set_text_embedding(&mut self, embedding: Embedding) {
        self.record.text_embedding = Some(embedding.vector);
        self.text_embedding_source = embedding.source;
    }

    /// Swap in a new image embedding, keeping the marker in step.
    pub fn set_image_embedding(&mut self, embedding: Embedding) {
        self.record.image_embedding = Some(embedding.vector);
        self.image_embedding_source = embedding.source;
    }

    /// Whether either vector is a placeholder that should be backfilled.
    pub fn has_fallback_embedding(&self) -> bool {
        self.text_embedding_source == EmbeddingSource::Fallback
            || self.image_embedding_source == EmbeddingSource::Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_flattens_record() {
        let mut record = ProductRecord::new("P1", "Test").with_description("desc");
        record.extra.insert("brand".to_string(), json!("Acme"));

        let doc = ProductDocument::new(
            record,
            Embedding::real(vec![0.6, 0.8]),
            Embedding::fallback(vec![1.0, 0.0, 0.0]),
        );
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["id"], json!("P1"));
        assert_eq!(value["brand"], json!("Acme"));
        assert_eq!(value["text_embedding_source"], json!("real"));
        assert_eq!(value["image_embedding_source"], json!("fallback"));
        assert_eq!(value["image_embedding"].as_array().unwrap().len(), 3);
        assert!(value.get("record").is_none());
        assert!(doc.has_fallback_embedding());
    }

    #[test]
    fn test_document_deserializes_from_index_source() {
        let source = json!({
            "id": "P9",
            "name": "Chair",
            "subcategory": "seating",
            "text_embedding": [1.0, 0.0],
            "image_embedding": [0.0, 1.0],
            "text_embedding_source": "fallback",
            "image_embedding_source": "real",
            "indexed_at": "2024-01-01T00:00:00Z"
        });
        let doc: ProductDocument = serde_json::from_value(source).unwrap();

        assert_eq!(doc.id(), "P9");
        assert_eq!(doc.text_embedding_source, EmbeddingSource::Fallback);
        assert_eq!(doc.record.extra.get("subcategory"), Some(&json!("seating")));
        assert!(!doc.record.extra.contains_key("indexed_at"));
    }

    #[test]
    fn test_replacing_embeddings_clears_fallback() {
        let mut doc = ProductDocument::new(
            ProductRecord::new("P1", "Test"),
            Embedding::fallback(vec![1.0, 0.0]),
            Embedding::real(vec![0.0, 1.0]),
        );

        doc.set_text_embedding(Embedding::real(vec![0.6, 0.8]));

        assert_eq!(doc.record.text_embedding, Some(vec![0.6, 0.8]));
        assert_eq!(doc.text_embedding_source, EmbeddingSource::Real);
        assert!(!doc.has_fallback_embedding());
    }

    #[test]
    fn test_absent_image_is_not_backfillable() {
        let doc = ProductDocument::new(
            ProductRecord::new("P2", "No picture"),
            Embedding::real(vec![0.6, 0.8]),
            Embedding::absent(vec![0.0, 1.0]),
        );

        assert!(!doc.has_fallback_embedding());
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["image_embedding_source"], json!("absent"));
    }
}
