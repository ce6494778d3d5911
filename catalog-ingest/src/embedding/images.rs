use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use catalog_ingest_shared::ProductImage;

/// Turns a record's image reference into a payload for the embedding service.
///
/// Image URLs are paths relative to a local root directory. Remote URLs and
/// paths escaping the root are not resolvable.
#[derive(Debug, Clone)]
pub struct ImageResolver {
    root: PathBuf,
}

impl ImageResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Local file backing `image`, if there can be one.
    pub fn path_for(&self, image: &ProductImage) -> Option<PathBuf> {
        if image.is_remote() {
            return None;
        }

        let relative = Path::new(image.url.trim().trim_start_matches('/'));
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Read `image` and encode it as base64, or `None` if it is unavailable.
    pub async fn load_base64(&self, image: &ProductImage) -> Option<String> {
        let Some(path) = self.path_for(image) else {
            debug!(url = %image.url, "Image is not resolvable locally");
            return None;
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(STANDARD.encode(bytes)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read image file");
                None
            }
        }
    }
}
