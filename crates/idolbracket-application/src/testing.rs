//! Hand-written collaborator mocks shared by the unit tests.

use async_trait::async_trait;
use crate::catalog::CatalogCache;
use crate::registry::GameRegistry;
use idolbracket_core::config::GameConfig;
use idolbracket_core::error::{BracketError, Result};
use idolbracket_core::idol::{CatalogStore, Gender, Idol, IdolImage, IdolRow, ImageResolver};
use idolbracket_core::session::{
    Bracket, BracketSummary, ChatTransport, Contestant, MessageHandle, RoundSlot, SessionKey, StatsRecorder,
    VoteCounts,
};
use idolbracket_core::side_channel::PersistenceSideChannel;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// `idols` identities with `images_per_idol` rows each; even indexes are girls.
pub fn rows(idols: usize, images_per_idol: usize) -> Vec<IdolRow> {
    let mut out = Vec::with_capacity(idols * images_per_idol);
    for i in 0..idols {
        for j in 0..images_per_idol {
            out.push(IdolRow {
                group: "Group".to_string(),
                name: format!("Idol {i}"),
                gender: if i % 2 == 0 { Gender::Girl } else { Gender::Boy },
                image_ref: format!("idol{i}-img{j}"),
            });
        }
    }
    out
}

pub fn idols(count: usize, gender: Gender) -> Vec<Arc<Idol>> {
    (0..count)
        .map(|i| {
            Arc::new(
                Idol::new(format!("Member {i}"), "Band", gender)
                    .with_image(IdolImage::new(format!("m{i}-a"), "ha"))
                    .with_image(IdolImage::new(format!("m{i}-b"), "hb")),
            )
        })
        .collect()
}

pub fn bracket(size: usize) -> Bracket {
    Bracket::new(idols(size, Gender::Girl)).unwrap()
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Clone)]
pub struct MockCatalogStore {
    rows: Arc<Vec<IdolRow>>,
    fetches: Arc<AtomicUsize>,
    fail_next: Arc<AtomicBool>,
}

impl MockCatalogStore {
    pub fn new(rows: Vec<IdolRow>) -> Self {
        Self {
            rows: Arc::new(rows),
            fetches: Arc::new(AtomicUsize::new(0)),
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogStore for MockCatalogStore {
    async fn fetch_all(&self) -> Result<Vec<IdolRow>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BracketError::internal("store offline"));
        }
        Ok(self.rows.as_ref().clone())
    }
}

/// Resolves any reference except ones containing "broken".
#[derive(Default)]
pub struct MockResolver {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockResolver {
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageResolver for MockResolver {
    async fn resolve(&self, image_ref: &str) -> Result<Vec<u8>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if image_ref.contains("broken") {
            return Err(BracketError::catalog_fetch(format!("missing object {image_ref}")));
        }
        Ok(image_ref.as_bytes().to_vec())
    }

    fn hash(&self, bytes: &[u8]) -> Result<String> {
        Ok(format!("{:x}", bytes.iter().map(|b| *b as u64).sum::<u64>()))
    }
}

// ============================================================================
// Side-channel
// ============================================================================

#[derive(Default)]
pub struct MemorySideChannel {
    values: Mutex<HashMap<String, (Vec<u8>, Option<Duration>)>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemorySideChannel {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.values.lock().unwrap().get(key).and_then(|(_, ttl)| *ttl)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BracketError::persistence("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersistenceSideChannel for MemorySideChannel {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.values.lock().unwrap().get(key).map(|(v, _)| v.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values.lock().unwrap().insert(key.to_string(), (value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// Transport and stats
// ============================================================================

#[derive(Debug, Clone)]
pub struct PresentedRound {
    pub key: SessionKey,
    pub handle: MessageHandle,
    pub left: String,
    pub right: String,
    pub left_image: Option<String>,
    /// Both pictures arrived with their bytes.
    pub has_pictures: bool,
    pub remaining: usize,
}

/// Records everything and answers vote reads from a script; an empty script
/// reads as a tie.
#[derive(Default)]
pub struct MockTransport {
    next_id: AtomicUsize,
    presented: Mutex<Vec<PresentedRound>>,
    dismissed: Mutex<Vec<MessageHandle>>,
    random_marks: Mutex<Vec<RoundSlot>>,
    winners: Mutex<Vec<(SessionKey, Option<usize>)>>,
    votes: Mutex<VecDeque<VoteCounts>>,
    fail_presents: AtomicUsize,
    fail_reads: AtomicUsize,
}

impl MockTransport {
    pub fn script_votes(&self, votes: impl IntoIterator<Item = (u32, u32)>) {
        let mut queue = self.votes.lock().unwrap();
        for (left, right) in votes {
            queue.push_back(VoteCounts {
                left,
                right,
                voters: vec![format!("voter-{left}-{right}")],
            });
        }
    }

    pub fn fail_next_presents(&self, count: usize) {
        self.fail_presents.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.fail_reads.store(count, Ordering::SeqCst);
    }

    pub fn presented(&self) -> Vec<PresentedRound> {
        self.presented.lock().unwrap().clone()
    }

    pub fn last_round(&self) -> Option<PresentedRound> {
        self.presented.lock().unwrap().last().cloned()
    }

    pub fn dismissed(&self) -> Vec<MessageHandle> {
        self.dismissed.lock().unwrap().clone()
    }

    pub fn random_marks(&self) -> usize {
        self.random_marks.lock().unwrap().len()
    }

    pub fn winners(&self) -> Vec<(SessionKey, Option<usize>)> {
        self.winners.lock().unwrap().clone()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn present_round(
        &self,
        key: &SessionKey,
        left: &Contestant,
        right: &Contestant,
        remaining: usize,
    ) -> Result<MessageHandle> {
        if Self::take_failure(&self.fail_presents) {
            return Err(BracketError::transport("send failed"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = MessageHandle {
            channel_id: key.channel_id().to_string(),
            message_id: format!("m{id}"),
        };
        self.presented.lock().unwrap().push(PresentedRound {
            key: key.clone(),
            handle: handle.clone(),
            left: left.idol.to_string(),
            right: right.idol.to_string(),
            left_image: left.image.as_ref().map(|i| i.object_name.clone()),
            has_pictures: [left, right]
                .iter()
                .all(|c| c.image.as_ref().is_some_and(|i| i.bytes().is_some())),
            remaining,
        });
        Ok(handle)
    }

    async fn read_vote_counts(&self, _message: &MessageHandle) -> Result<VoteCounts> {
        if Self::take_failure(&self.fail_reads) {
            return Err(BracketError::transport("read failed"));
        }
        Ok(self.votes.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn dismiss(&self, message: &MessageHandle) -> Result<()> {
        self.dismissed.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn mark_random_decision(&self, _message: &MessageHandle, winner: RoundSlot) -> Result<()> {
        self.random_marks.lock().unwrap().push(winner);
        Ok(())
    }

    async fn announce_winner(
        &self,
        key: &SessionKey,
        _summary: &BracketSummary,
        bracket: Option<Vec<Arc<Idol>>>,
    ) -> Result<()> {
        self.winners
            .lock()
            .unwrap()
            .push((key.clone(), bracket.map(|slots| slots.len())));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingStats {
    results: Mutex<Vec<BracketSummary>>,
    fail: AtomicBool,
}

impl RecordingStats {
    pub fn failing() -> Self {
        Self {
            results: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    pub fn results(&self) -> Vec<BracketSummary> {
        self.results.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatsRecorder for RecordingStats {
    async fn record_result(&self, summary: &BracketSummary) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BracketError::internal("stats database offline"));
        }
        self.results.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

/// Lets spawned fire-and-forget tasks run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// A catalog already holding `per_gender` girls and as many boys.
pub async fn seeded_catalog(per_gender: usize) -> Arc<CatalogCache> {
    let catalog = CatalogCache::new(
        Arc::new(MockCatalogStore::new(Vec::new())),
        Arc::new(MockResolver::default()),
        Arc::new(MemorySideChannel::default()),
        4,
        Duration::from_secs(60),
    );
    let mut all = Vec::new();
    for gender in [Gender::Girl, Gender::Boy] {
        for i in 0..per_gender {
            all.push(
                Idol::new(format!("{gender} {i}"), "Seeded", gender)
                    .with_image(IdolImage::new(format!("{gender}{i}-a"), "ha"))
                    .with_image(IdolImage::new(format!("{gender}{i}-b"), "hb")),
            );
        }
    }
    catalog.publish(all).await;
    Arc::new(catalog)
}

/// Shared collaborators for service tests.
pub struct Harness {
    pub registry: Arc<GameRegistry>,
    pub catalog: Arc<CatalogCache>,
    pub transport: Arc<MockTransport>,
    pub stats: Arc<RecordingStats>,
    pub config: Arc<GameConfig>,
}

impl Harness {
    pub async fn new(config: GameConfig) -> Self {
        Self {
            registry: Arc::new(GameRegistry::default()),
            catalog: seeded_catalog(40).await,
            transport: Arc::new(MockTransport::default()),
            stats: Arc::new(RecordingStats::default()),
            config: Arc::new(config),
        }
    }
}

/// Defaults with the single-player pause switched off.
pub fn quick_config() -> GameConfig {
    GameConfig {
        single_round_pause_ms: 0,
        ..GameConfig::default()
    }
}
