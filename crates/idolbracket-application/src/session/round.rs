use crate::catalog::CatalogCache;
use idolbracket_core::error::{BracketError, Result};
use idolbracket_core::session::{Bracket, BracketSummary, Contestant, StatsRecorder};
use std::sync::Arc;

/// Builds both sides of the current round with their bracket-stable pictures.
pub(crate) fn contestants(bracket: &mut Bracket) -> Result<(Contestant, Contestant)> {
    let (left, right) = bracket
        .current_round()
        .map(|(l, r)| (l.clone(), r.clone()))
        .ok_or(BracketError::InvalidSlot {
            queue_len: bracket.remaining(),
        })?;
    let mut rng = rand::thread_rng();
    let left_image = bracket.image_for(&left, &mut rng);
    let right_image = bracket.image_for(&right, &mut rng);
    Ok((
        Contestant {
            idol: left,
            image: left_image,
        },
        Contestant {
            idol: right,
            image: right_image,
        },
    ))
}

/// Fills in picture bytes that were not resolved yet.
///
/// A picture that cannot be resolved is logged and presented by reference only.
pub(crate) async fn load_pictures(catalog: &CatalogCache, contestants: [&mut Contestant; 2]) {
    for contestant in contestants {
        let Some(image) = contestant.image.as_ref() else {
            continue;
        };
        if image.bytes().is_some() {
            continue;
        }
        let Some(shared) = contestant
            .idol
            .images
            .iter()
            .find(|candidate| candidate.object_name == image.object_name)
        else {
            continue;
        };
        match catalog.image_bytes(shared).await {
            Ok(_) => contestant.image = Some(shared.clone()),
            Err(e) => tracing::warn!(
                idol = %contestant.idol,
                object_name = %shared.object_name,
                "Failed to resolve picture: {}",
                e
            ),
        }
    }
}

/// Hands a finished bracket to the stats recorder without waiting for it.
pub(crate) fn record_in_background(stats: Arc<dyn StatsRecorder>, summary: BracketSummary) {
    tokio::spawn(async move {
        if let Err(e) = stats.record_result(&summary).await {
            tracing::error!(
                game_type = %summary.game_type,
                channel_id = %summary.channel_id,
                "Failed to record bracket result: {}",
                e
            );
        }
    });
}
