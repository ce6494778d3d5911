//! Embedding vectors and their provenance.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dimension of text embeddings in the default deployment.
pub const DEFAULT_TEXT_EMBEDDING_DIMS: usize = 384;

/// Dimension of image embeddings in the default deployment.
pub const DEFAULT_IMAGE_EMBEDDING_DIMS: usize = 512;

/// Where an embedding vector came from.
///
/// Fallback vectors are random placeholders with no semantic meaning. They are
/// persisted alongside the document so they can be found and replaced later.
/// Absent marks a placeholder for input that does not exist or cannot be
/// read, so there is nothing a later run could embed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingSource {
    Real,
    Fallback,
    Absent,
}

impl EmbeddingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingSource::Real => "real",
            EmbeddingSource::Fallback => "fallback",
            EmbeddingSource::Absent => "absent",
        }
    }
}

impl fmt::Display for EmbeddingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vector together with its [`EmbeddingSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub source: EmbeddingSource,
}

impl Embedding {
    pub fn real(vector: Vec<f32>) -> Self {
        Self {
            vector,
            source: EmbeddingSource::Real,
        }
    }

    pub fn fallback(vector: Vec<f32>) -> Self {
        Self {
            vector,
            source: EmbeddingSource::Fallback,
        }
    }

    /// A placeholder that no later run can replace.
    pub fn absent(vector: Vec<f32>) -> Self {
        Self {
            vector,
            source: EmbeddingSource::Absent,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == EmbeddingSource::Fallback
    }

    pub fn dims(&self) -> usize {
        self.vector.len()
    }
}

/// Deployment-wide vector dimensions, one per index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingDims {
    pub text: usize,
    pub image: usize,
}

impl Default for EmbeddingDims {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT_EMBEDDING_DIMS,
            image: DEFAULT_IMAGE_EMBEDDING_DIMS,
        }
    }
}
