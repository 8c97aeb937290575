//! Catalog services: the published idol snapshot, its rebuild, and the
//! periodic refresh.

mod cache;
mod rebuild;
mod refresh_loop;

pub use cache::{CatalogCache, CatalogSnapshot, RefreshReport, RefreshSource};
pub use rebuild::{CatalogMerger, RebuildOutput, rebuild};
pub use refresh_loop::spawn_refresh_loop;
