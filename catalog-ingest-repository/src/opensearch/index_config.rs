//! OpenSearch index configuration and mappings.
//!
//! This module defines the index settings and mappings for the product search index.

use catalog_ingest_shared::EmbeddingDims;
use serde_json::{json, Value};

/// Configuration for the search index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// The alias name for the search index (used for all operations).
    pub alias: String,
    /// The version number for the index (e.g., 0 for "products_v0").
    pub version: u32,
    /// Dimensions of the text and image vector fields.
    pub dims: EmbeddingDims,
}

impl IndexConfig {
    /// Create a new index configuration with the default vector dimensions.
    pub fn new(alias: impl Into<String>, version: u32) -> Self {
        Self {
            alias: alias.into(),
            version,
            dims: EmbeddingDims::default(),
        }
    }

    pub fn with_dims(mut self, dims: EmbeddingDims) -> Self {
        self.dims = dims;
        self
    }

    /// The concrete index the alias points at.
    pub fn versioned_index_name(&self) -> String {
        get_versioned_index_name(Some(self.version))
    }
}

/// The base name of the search index (without version).
pub const INDEX_NAME: &str = "products";

/// Get the versioned index name (e.g., "products_v0").
pub fn get_versioned_index_name(version: Option<u32>) -> String {
    let v = version.unwrap_or(0);
    format!("{}_v{}", INDEX_NAME, v)
}

/// Get the index settings and mappings for the product search index.
///
/// The configuration includes:
/// - **knn_vector**: Fixed-dimension fields for the text and image embeddings
/// - **Keyword fields**: Product id, category and the embedding source markers
/// - **Text fields**: Name and description for full-text search
///
/// Records may carry arbitrary extra fields, which are mapped dynamically.
pub fn get_index_settings(dims: EmbeddingDims) -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1,
            "index": {
                "knn": true
            }
        },
        "mappings": {
            "properties": {
                "id": {
                    "type": "keyword"
                },
                "name": {
                    "type": "text",
                    "fields": {
                        "raw": {
                            "type": "keyword"
                        }
                    }
                },
                "description": {
                    "type": "text"
                },
                "category": {
                    "type": "keyword"
                },
                "price": {
                    "type": "float"
                },
                "attributes": {
                    "type": "object"
                },
                "image": {
                    "properties": {
                        "url": {
                            "type": "keyword",
                            "index": false
                        },
                        "alt_text": {
                            "type": "text"
                        }
                    }
                },
                "text_embedding": {
                    "type": "knn_vector",
                    "dimension": dims.text
                },
                "image_embedding": {
                    "type": "knn_vector",
                    "dimension": dims.image
                },
                "text_embedding_source": {
                    "type": "keyword"
                },
                "image_embedding_source": {
                    "type": "keyword"
                },
                "indexed_at": {
                    "type": "date"
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_settings_structure() {
        let settings = get_index_settings(EmbeddingDims::default());
        let properties = &settings["mappings"]["properties"];

        assert_eq!(settings["settings"]["index"]["knn"], true);
        assert_eq!(properties["id"]["type"], "keyword");
        assert_eq!(properties["text_embedding"]["type"], "knn_vector");
        assert_eq!(properties["text_embedding"]["dimension"], 384);
        assert_eq!(properties["image_embedding"]["dimension"], 512);
        assert_eq!(properties["text_embedding_source"]["type"], "keyword");
        assert_eq!(properties["image_embedding_source"]["type"], "keyword");
    }

    #[test]
    fn test_custom_dims_reach_mappings() {
        let settings = get_index_settings(EmbeddingDims {
            text: 768,
            image: 1024,
        });

        assert_eq!(
            settings["mappings"]["properties"]["text_embedding"]["dimension"],
            768
        );
        assert_eq!(
            settings["mappings"]["properties"]["image_embedding"]["dimension"],
            1024
        );
    }

    #[test]
    fn test_versioned_index_name() {
        assert_eq!(get_versioned_index_name(None), "products_v0");
        assert_eq!(get_versioned_index_name(Some(2)), "products_v2");
        assert_eq!(IndexConfig::new("products", 3).versioned_index_name(), "products_v3");
    }
}
