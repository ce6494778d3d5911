//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use catalog_ingest_shared::ProductDocument;
use opensearch::{
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsAliasParts, IndicesExistsParts, IndicesPutAliasParts},
    IndexParts, OpenSearch, SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::index_config::{get_index_settings, IndexConfig};

/// OpenSearch provider implementation.
///
/// # Example
///
/// ```ignore
/// use catalog_ingest_repository::opensearch::IndexConfig;
/// let config = IndexConfig::new("products", 0);
/// let provider = OpenSearchProvider::new("http://localhost:9200", config).await?;
/// provider.ensure_index_exists().await?;
///
/// // Writing the same product twice overwrites the first document
/// provider.upsert_product(&document).await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - The index configuration containing alias, version and vector dims
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            alias = %index_config.alias,
            version = index_config.version,
            text_dims = index_config.dims.text,
            image_dims = index_config.dims.image,
            "Created OpenSearch provider"
        );

        Ok(Self {
            client,
            index_config,
        })
    }

    /// Query matching any document with at least one fallback embedding.
    fn fallback_query(limit: usize) -> Value {
        json!({
            "size": limit,
            "query": {
                "bool": {
                    "should": [
                        { "term": { "text_embedding_source": "fallback" } },
                        { "term": { "image_embedding_source": "fallback" } }
                    ],
                    "minimum_should_match": 1
                }
            }
        })
    }

    /// Pull `_source` documents out of a search response body.
    ///
    /// Hits that do not deserialize into a `ProductDocument` are skipped.
    fn parse_hits(body: &Value) -> Result<Vec<ProductDocument>, SearchIndexError> {
        let hits = body["hits"]["hits"]
            .as_array()
            .ok_or_else(|| SearchIndexError::parse("response has no hits array"))?;

        let mut documents = Vec::with_capacity(hits.len());
        for hit in hits {
            match serde_json::from_value::<ProductDocument>(hit["_source"].clone()) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    warn!(
                        doc_id = %hit["_id"],
                        error = %e,
                        "Skipping document that does not match the product schema"
                    );
                }
            }
        }
        Ok(documents)
    }

    async fn create_index(&self, index_name: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index_name))
            .body(get_index_settings(self.index_config.dims))
            .send()
            .await
            .map_err(|e| SearchIndexError::index_creation(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            // Another process may have created it between our check and create
            if error_body.contains("resource_already_exists_exception") {
                debug!(index = %index_name, "Index created concurrently");
                return Ok(());
            }
            error!(status = %status, body = %error_body, "Create index request failed");
            return Err(SearchIndexError::index_creation(format!(
                "Create index failed with status {}: {}",
                status, error_body
            )));
        }

        info!(index = %index_name, "Created search index");
        Ok(())
    }

    async fn ensure_alias(&self, index_name: &str) -> Result<(), SearchIndexError> {
        let alias = self.index_config.alias.as_str();
        let response = self
            .client
            .indices()
            .exists_alias(IndicesExistsAliasParts::Name(&[alias]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().is_success() {
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .put_alias(IndicesPutAliasParts::IndexName(&[index_name], alias))
            .send()
            .await
            .map_err(|e| SearchIndexError::index_creation(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Put alias request failed");
            return Err(SearchIndexError::index_creation(format!(
                "Put alias failed with status {}: {}",
                status, error_body
            )));
        }

        info!(index = %index_name, alias = %alias, "Created index alias");
        Ok(())
    }
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
        let index_name = self.index_config.versioned_index_name();

        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index_name.as_str()]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            self.create_index(&index_name).await?;
        } else if !response.status_code().is_success() {
            return Err(SearchIndexError::connection(format!(
                "Index existence check returned status {}",
                response.status_code()
            )));
        }

        self.ensure_alias(&index_name).await
    }

    /// Write the full document with the index API.
    ///
    /// The index API replaces any existing document with the same id, so a
    /// record processed twice ends up as one document holding the latest content.
    async fn upsert_product(&self, document: &ProductDocument) -> Result<(), SearchIndexError> {
        let body = serde_json::to_value(document)
            .map_err(|e| SearchIndexError::serialization(e.to_string()))?;

        let response = self
            .client
            .index(IndexParts::IndexId(&self.index_config.alias, document.id()))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Index request failed");
            return Err(SearchIndexError::index(format!(
                "Index failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(
            doc_id = %document.id(),
            text_source = %document.text_embedding_source,
            image_source = %document.image_embedding_source,
            "Document indexed"
        );
        Ok(())
    }

    async fn find_fallback_products(
        &self,
        limit: usize,
    ) -> Result<Vec<ProductDocument>, SearchIndexError> {
        let alias = self.index_config.alias.as_str();
        let response = self
            .client
            .search(SearchParts::Index(&[alias]))
            .body(Self::fallback_query(limit))
            .send()
            .await
            .map_err(|e| SearchIndexError::search(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Search request failed");
            return Err(SearchIndexError::search(format!(
                "Search failed with status {}: {}",
                status, error_body
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        Self::parse_hits(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_ingest_shared::EmbeddingSource;

    #[test]
    fn test_fallback_query_matches_either_marker() {
        let query = OpenSearchProvider::fallback_query(25);

        assert_eq!(query["size"], 25);
        let should = query["query"]["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(should[0]["term"]["text_embedding_source"], "fallback");
        assert_eq!(should[1]["term"]["image_embedding_source"], "fallback");
        assert_eq!(query["query"]["bool"]["minimum_should_match"], 1);
    }

    #[test]
    fn test_parse_hits() {
        let body = json!({
            "hits": {
                "hits": [
                    {
                        "_id": "P1",
                        "_source": {
                            "id": "P1",
                            "name": "Lamp",
                            "text_embedding": [1.0, 0.0],
                            "image_embedding": [0.0, 1.0],
                            "text_embedding_source": "fallback",
                            "image_embedding_source": "real",
                            "indexed_at": "2024-05-01T12:00:00Z"
                        }
                    },
                    {
                        "_id": "broken",
                        "_source": { "unexpected": true }
                    }
                ]
            }
        });

        let docs = OpenSearchProvider::parse_hits(&body).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id(), "P1");
        assert_eq!(docs[0].text_embedding_source, EmbeddingSource::Fallback);
    }

    #[test]
    fn test_parse_hits_without_hits_array() {
        let result = OpenSearchProvider::parse_hits(&json!({"error": "boom"}));
        assert!(matches!(result, Err(SearchIndexError::ParseError(_))));
    }
}
