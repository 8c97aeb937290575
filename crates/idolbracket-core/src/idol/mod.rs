//! Idol domain module.
//!
//! - `model`: contestants (`Idol`, `IdolImage`), identity (`IdolKey`) and gender filters
//! - `repository`: catalog collaborator traits (`CatalogStore`, `ImageResolver`)

mod model;
mod repository;

pub use model::{Gender, GenderFilter, Idol, IdolImage, IdolKey, loose_eq, normalize};
pub use repository::{CatalogStore, IdolRow, ImageResolver};
