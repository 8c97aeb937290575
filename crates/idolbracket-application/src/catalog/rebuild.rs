//! Bounded-concurrency catalog rebuild.
//!
//! Workers resolve and hash one row each and send the result over a channel. A
//! single collector owns the merge, so no shared list needs a lock.

use idolbracket_core::error::{BracketError, Result};
use idolbracket_core::idol::{Idol, IdolImage, IdolKey, IdolRow, ImageResolver};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

/// Output of one rebuild pass.
#[derive(Debug, Default)]
pub struct RebuildOutput {
    pub idols: Vec<Idol>,
    /// Rows dropped because they could not be resolved or hashed.
    pub failed: usize,
}

/// Folds resolved rows into idols.
///
/// The result does not depend on the order rows are merged in: idols come out
/// sorted by identity, images sorted by object name, and conflicting spellings of
/// the same identity settle on the smallest one.
#[derive(Debug, Default)]
pub struct CatalogMerger {
    idols: HashMap<IdolKey, Idol>,
}

impl CatalogMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, row: &IdolRow, image: IdolImage) {
        let key = IdolKey::new(&row.name, &row.group);
        match self.idols.get_mut(&key) {
            Some(existing) => {
                let incoming = (&row.name, &row.group, row.gender.to_string());
                let current = (&existing.name, &existing.group, existing.gender.to_string());
                if incoming < current {
                    existing.name = row.name.clone();
                    existing.group = row.group.clone();
                    existing.gender = row.gender;
                }
                existing.images.push(image);
            }
            None => {
                let idol = Idol::new(row.name.clone(), row.group.clone(), row.gender).with_image(image);
                self.idols.insert(key, idol);
            }
        }
    }

    pub fn finish(self) -> Vec<Idol> {
        let mut entries: Vec<(IdolKey, Idol)> = self.idols.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
            .into_iter()
            .map(|(_, mut idol)| {
                idol.images.sort_by(|a, b| a.object_name.cmp(&b.object_name));
                idol
            })
            .collect()
    }
}

/// Resolves and hashes one row.
async fn resolve_row(resolver: &dyn ImageResolver, row: &IdolRow) -> Result<IdolImage> {
    let bytes = resolver.resolve(&row.image_ref).await?;
    let hash = resolver.hash(&bytes)?;
    Ok(IdolImage::with_bytes(row.image_ref.clone(), hash, bytes))
}

/// Rebuilds the catalog from `rows` with at most `worker_cap` rows in flight.
///
/// A row that fails to resolve or hash is logged and dropped; it never fails the
/// whole rebuild.
pub async fn rebuild(rows: Vec<IdolRow>, resolver: Arc<dyn ImageResolver>, worker_cap: usize) -> RebuildOutput {
    let worker_cap = worker_cap.max(1);
    let total = rows.len();
    let (tx, mut rx) = mpsc::channel::<(IdolRow, Result<IdolImage>)>(worker_cap);
    let semaphore = Arc::new(Semaphore::new(worker_cap));

    let dispatcher = tokio::spawn(async move {
        for row in rows {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let tx = tx.clone();
            let resolver = resolver.clone();
            tokio::spawn(async move {
                let result = resolve_row(resolver.as_ref(), &row).await;
                drop(permit);
                let _ = tx.send((row, result)).await;
            });
        }
    });

    let mut merger = CatalogMerger::new();
    let mut failed = 0;
    let mut received = 0;
    while let Some((row, result)) = rx.recv().await {
        received += 1;
        match result {
            Ok(image) => merger.merge(&row, image),
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    image_ref = %row.image_ref,
                    group = %row.group,
                    name = %row.name,
                    "Dropping catalog row: {}",
                    e
                );
            }
        }
    }

    if let Err(e) = dispatcher.await {
        tracing::error!("Catalog rebuild dispatcher failed: {}", e);
    }
    if received < total {
        // A worker panicked before reporting back.
        let lost = total - received;
        failed += lost;
        tracing::warn!(lost, "Catalog rebuild lost rows to panicked workers");
    }

    RebuildOutput {
        idols: merger.finish(),
        failed,
    }
}

/// Converts a store failure into the catalog error category.
pub(crate) fn fetch_failure(e: BracketError) -> BracketError {
    match e {
        BracketError::CatalogFetch(_) => e,
        other => BracketError::catalog_fetch(other.to_string()),
    }
}
