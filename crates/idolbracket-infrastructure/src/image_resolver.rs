use anyhow::Context;
use async_trait::async_trait;
use idolbracket_core::error::{BracketError, Result};
use idolbracket_core::idol::ImageResolver;
use std::path::{Component, Path, PathBuf};

/// Serves idol pictures from a local directory, keyed by their path relative to
/// `root`.
pub struct DirectoryImageResolver {
    root: PathBuf,
}

impl DirectoryImageResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Joins `image_ref` onto the root, refusing anything that could leave it.
    fn locate(&self, image_ref: &str) -> Result<PathBuf> {
        let relative = Path::new(image_ref);
        let contained = !image_ref.is_empty() && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(BracketError::catalog_fetch(format!("invalid image reference {image_ref:?}")));
        }
        Ok(self.root.join(relative))
    }

    async fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("reading image {}", path.display()))
    }
}

#[async_trait]
impl ImageResolver for DirectoryImageResolver {
    async fn resolve(&self, image_ref: &str) -> Result<Vec<u8>> {
        let path = self.locate(image_ref)?;
        Self::read(&path)
            .await
            .map_err(|e| BracketError::catalog_fetch(format!("{e:#}")))
    }

    fn hash(&self, bytes: &[u8]) -> Result<String> {
        Ok(blake3::hash(bytes).to_hex().to_string())
    }
}
