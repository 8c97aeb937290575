//! Catalog collaborator traits.
//!
//! The catalog rows and the image bytes live outside the engine. These traits
//! are the narrow contracts the rebuild consumes.

use super::model::Gender;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One stored image record: a single picture of one idol.
///
/// Several rows share an idol identity when that idol has several pictures.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IdolRow {
    pub group: String,
    pub name: String,
    pub gender: Gender,
    pub image_ref: String,
}

/// Source-of-truth records for contestants.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetches every catalog row.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<IdolRow>)`: All rows, in storage order
    /// - `Err(_)`: The store could not be read; the refresh is abandoned and the
    ///   previously published snapshot stays in place
    async fn fetch_all(&self) -> Result<Vec<IdolRow>>;
}

/// Resolves image references to bytes and fingerprints them.
///
/// Only the catalog rebuild calls this; rounds reuse images already recorded in
/// a bracket's image index.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(&self, image_ref: &str) -> Result<Vec<u8>>;

    fn hash(&self, bytes: &[u8]) -> Result<String>;
}
