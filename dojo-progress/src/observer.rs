//! Aggregate observer
//!
//! Keeps a solved count and percentage for a fixed set of items fresh by
//! listening to the [`ChangeBus`]. Every relevant event triggers a full
//! recount through the cache, which answers repeated reads from its mirror.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::{ChangeBus, ChangeEvent};
use crate::cache::ProgressCache;

/// Derived progress over a set of items; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateState {
    pub solved_count: usize,
    pub total: usize,
    pub percentage: u32,
    /// False until the first recount finished
    pub is_loaded: bool,
}

impl AggregateState {
    /// Placeholder shown before the first recount
    pub fn loading(total: usize) -> Self {
        Self {
            solved_count: 0,
            total,
            percentage: 0,
            is_loaded: false,
        }
    }

    pub fn loaded(solved_count: usize, total: usize) -> Self {
        Self {
            solved_count,
            total,
            percentage: percentage(solved_count, total),
            is_loaded: true,
        }
    }
}

/// `round(100 * solved / total)`, and 0 when there is nothing to solve
pub fn percentage(solved_count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let solved = solved_count.min(total) as u64;
    let total = total as u64;
    ((200 * solved + total) / (2 * total)) as u32
}

/// Whether `event` may change the count for `item_ids` in `course_id`
///
/// Unknown scope is always relevant.
pub fn is_relevant(event: &ChangeEvent, course_id: &str, item_ids: &HashSet<String>) -> bool {
    if event
        .course_id
        .as_deref()
        .is_some_and(|course| course != course_id)
    {
        return false;
    }

    if !event.has_item_info() {
        return true;
    }

    event.touched_items().any(|item_id| item_ids.contains(item_id))
}

/// Live solved count for one course's items
///
/// Dropping the observer (or calling [`shutdown`](Self::shutdown)) stops it;
/// no recount is published afterwards.
pub struct AggregateObserver {
    course_id: String,
    state: watch::Receiver<AggregateState>,
    recomputes: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl AggregateObserver {
    /// Subscribes to `bus` and starts observing
    ///
    /// Must be called from within a tokio runtime. The first recount is
    /// deferred to the spawned task, so the state starts out as
    /// [`AggregateState::loading`].
    pub fn spawn(
        course_id: impl Into<String>,
        item_ids: Vec<String>,
        cache: Arc<ProgressCache>,
        bus: &ChangeBus,
    ) -> Self {
        let course_id = course_id.into();
        let (tx, state) = watch::channel(AggregateState::loading(item_ids.len()));
        let recomputes = Arc::new(AtomicU64::new(0));
        let alive = Arc::new(AtomicBool::new(true));

        // Subscribe before spawning so no event emitted from here on is missed
        let events = bus.subscribe();
        let worker = Worker {
            tracked: item_ids.iter().cloned().collect(),
            course_id: course_id.clone(),
            item_ids: item_ids.into(),
            cache,
            tx,
            recomputes: Arc::clone(&recomputes),
            alive: Arc::clone(&alive),
        };
        let task = tokio::spawn(worker.run(events));

        Self {
            course_id,
            state,
            recomputes,
            alive,
            task,
        }
    }

    pub fn course_id(&self) -> &str {
        &self.course_id
    }

    /// Current snapshot
    pub fn state(&self) -> AggregateState {
        *self.state.borrow()
    }

    /// Receiver notified after every later recount
    ///
    /// The current state counts as seen, so `changed()` waits for the next
    /// recount (or fails once the observer stops).
    pub fn subscribe(&self) -> watch::Receiver<AggregateState> {
        let mut rx = self.state.clone();
        rx.borrow_and_update();
        rx
    }

    /// Number of recounts published so far
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.load(Ordering::SeqCst)
    }

    /// Waits for the first recount
    pub async fn wait_until_loaded(&self) -> AggregateState {
        let mut state = self.state.clone();
        match state.wait_for(|s| s.is_loaded).await {
            Ok(loaded) => *loaded,
            Err(_) => self.state(),
        }
    }

    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

impl Drop for AggregateObserver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    course_id: String,
    item_ids: Arc<[String]>,
    tracked: HashSet<String>,
    cache: Arc<ProgressCache>,
    tx: watch::Sender<AggregateState>,
    recomputes: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
}

impl Worker {
    async fn run(self, mut events: tokio::sync::broadcast::Receiver<ChangeEvent>) {
        // Let the caller render the loading state first
        tokio::task::yield_now().await;
        self.recompute().await;

        loop {
            match events.recv().await {
                Ok(event) => {
                    if is_relevant(&event, &self.course_id, &self.tracked) {
                        self.recompute().await;
                    } else {
                        debug!("Observer for {} skipped {:?}", self.course_id, event);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(
                        "Observer for {} missed {} change event(s), recounting",
                        self.course_id, missed
                    );
                    self.recompute().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Recounts on the blocking pool, since a cache miss reads the store
    async fn recompute(&self) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }

        let cache = Arc::clone(&self.cache);
        let course_id = self.course_id.clone();
        let item_ids = Arc::clone(&self.item_ids);
        let counted = tokio::task::spawn_blocking(move || {
            item_ids
                .iter()
                .filter(|item_id| cache.is_solved(&course_id, item_id))
                .count()
        })
        .await;

        let solved = match counted {
            Ok(solved) => solved,
            Err(e) => {
                warn!("Recount for {} failed: {}", self.course_id, e);
                return;
            }
        };

        if !self.alive.load(Ordering::SeqCst) {
            return;
        }

        self.recomputes.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send_replace(AggregateState::loaded(solved, self.item_ids.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ExternalChange;
    use crate::keys::KeyScheme;
    use crate::store::{KeyValueStore, MemoryStore};
    use std::time::Duration;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn setup() -> (MemoryStore, Arc<ProgressCache>, ChangeBus) {
        let store = MemoryStore::new();
        let bus = ChangeBus::new();
        let cache = Arc::new(ProgressCache::new(
            Arc::new(store.clone()),
            KeyScheme::default(),
            bus.clone(),
        ));
        (store, cache, bus)
    }

    /// Waits until at least `at_least` recounts happened, then lets any
    /// queued events drain and reports the final count
    async fn settle(observer: &AggregateObserver, at_least: u64) -> u64 {
        let mut rx = observer.subscribe();
        tokio::time::timeout(Duration::from_secs(1), async {
            while observer.recompute_count() < at_least {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("observer did not recount in time");

        // Recounts run on the blocking pool; give stray ones time to land
        tokio::time::sleep(Duration::from_millis(20)).await;
        observer.recompute_count()
    }

    #[test]
    fn test_percentage_arithmetic() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(3, 3), 100);
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(AggregateState::loaded(0, 0).percentage, 0);
    }

    #[test]
    fn test_relevance_filter() {
        let tracked: HashSet<String> = ids(&["a", "b"]).into_iter().collect();

        assert!(is_relevant(&ChangeEvent::broad(), "X", &tracked));
        assert!(!is_relevant(&ChangeEvent::item("Y", "a"), "X", &tracked));
        assert!(is_relevant(&ChangeEvent::unscoped_item("a"), "X", &tracked));
        assert!(!is_relevant(&ChangeEvent::unscoped_item("z"), "X", &tracked));
        assert!(is_relevant(&ChangeEvent::items("X", ids(&["c", "b"])), "X", &tracked));
        assert!(!is_relevant(&ChangeEvent::items("X", ids(&["c", "d"])), "X", &tracked));

        let course_only = ChangeEvent {
            course_id: Some("X".to_string()),
            ..ChangeEvent::default()
        };
        assert!(is_relevant(&course_only, "X", &tracked));
        assert!(is_relevant(&ChangeEvent::items("X", vec![]), "X", &tracked));
    }

    #[tokio::test]
    async fn test_starts_loading_then_loads() {
        let (_store, cache, bus) = setup();
        cache.mark_solved("course-a", "p2");

        let observer = AggregateObserver::spawn("course-a", ids(&["p1", "p2"]), cache, &bus);
        assert_eq!(observer.state(), AggregateState::loading(2));

        let loaded = observer.wait_until_loaded().await;
        assert_eq!(loaded, AggregateState::loaded(1, 2));
        assert_eq!(loaded.percentage, 50);
        assert_eq!(observer.recompute_count(), 1);
    }

    #[tokio::test]
    async fn test_recounts_only_on_relevant_events() {
        let (_store, cache, bus) = setup();
        let observer = AggregateObserver::spawn("X", ids(&["a", "b"]), cache, &bus);
        assert_eq!(settle(&observer, 1).await, 1);

        bus.emit(ChangeEvent::item("Y", "a"));
        bus.emit(ChangeEvent::unscoped_item("a"));
        assert_eq!(settle(&observer, 2).await, 2);

        bus.emit(ChangeEvent::items("X", ids(&["c", "d"])));
        bus.emit(ChangeEvent::items("X", ids(&["c", "b"])));
        assert_eq!(settle(&observer, 3).await, 3);
    }

    #[tokio::test]
    async fn test_tracks_solved_items() {
        let (_store, cache, bus) = setup();
        let observer =
            AggregateObserver::spawn("course-a", ids(&["p1", "p2"]), Arc::clone(&cache), &bus);
        assert_eq!(observer.wait_until_loaded().await, AggregateState::loaded(0, 2));

        cache.mark_solved("course-a", "p1");
        settle(&observer, 2).await;
        assert_eq!(observer.state(), AggregateState::loaded(1, 2));

        // Other courses and untracked items do not move the count
        cache.mark_solved("course-b", "p2");
        cache.mark_solved("course-a", "p9");
        cache.mark_many_solved("course-a", &["p1", "p2"]);
        settle(&observer, 3).await;
        assert_eq!(observer.state(), AggregateState::loaded(2, 2));
        assert_eq!(observer.recompute_count(), 3);
    }

    #[tokio::test]
    async fn test_external_change_is_picked_up() {
        let (store, cache, bus) = setup();
        let observer =
            AggregateObserver::spawn("course-a", ids(&["p1"]), Arc::clone(&cache), &bus);
        observer.wait_until_loaded().await;

        store.set("dojo:course-a:p1:status", "solved");
        cache.apply_external_change(&ExternalChange::new(
            "dojo:course-a:p1:status",
            Some("solved".to_string()),
        ));

        settle(&observer, 2).await;
        assert_eq!(observer.state(), AggregateState::loaded(1, 1));
    }

    #[tokio::test]
    async fn test_empty_item_set() {
        let (_store, cache, bus) = setup();
        let observer = AggregateObserver::spawn("course-a", vec![], cache, &bus);

        assert_eq!(observer.wait_until_loaded().await, AggregateState::loaded(0, 0));
    }

    #[tokio::test]
    async fn test_lagged_receiver_recounts() {
        let store = MemoryStore::new();
        let bus = ChangeBus::with_capacity(1);
        let cache = Arc::new(ProgressCache::new(
            Arc::new(store),
            KeyScheme::default(),
            bus.clone(),
        ));
        let observer = AggregateObserver::spawn("c", ids(&["a", "b"]), Arc::clone(&cache), &bus);

        cache.mark_solved("c", "a");
        cache.mark_solved("c", "b");
        cache.mark_solved("c", "zz");

        observer.wait_until_loaded().await;
        settle(&observer, 2).await;
        assert_eq!(observer.state(), AggregateState::loaded(2, 2));
    }

    #[tokio::test]
    async fn test_shutdown_before_first_recount() {
        let (_store, cache, bus) = setup();
        let observer = AggregateObserver::spawn("c", ids(&["a"]), cache, &bus);
        let mut rx = observer.subscribe();

        observer.shutdown();

        let changed = tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("sender should be dropped");
        assert!(changed.is_err());
        assert!(!rx.borrow().is_loaded);
        assert_eq!(observer.recompute_count(), 0);
    }

    /// Memory store whose reads stall the calling thread
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl KeyValueStore for SlowStore {
        fn get(&self, key: &str) -> Option<String> {
            std::thread::sleep(self.delay);
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) {
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn test_slow_store_does_not_stall_runtime() {
        let bus = ChangeBus::new();
        let store = SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(100),
        };
        let cache = Arc::new(ProgressCache::new(
            Arc::new(store),
            KeyScheme::default(),
            bus.clone(),
        ));
        let observer = AggregateObserver::spawn("c", ids(&["a", "b"]), cache, &bus);

        // Let the worker start its recount
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(started.elapsed() < Duration::from_millis(90));

        assert_eq!(observer.wait_until_loaded().await, AggregateState::loaded(0, 2));
    }

    #[tokio::test]
    async fn test_subscriber_waits_for_next_recount() {
        let (_store, cache, bus) = setup();
        let observer = AggregateObserver::spawn("c", ids(&["a"]), Arc::clone(&cache), &bus);
        observer.wait_until_loaded().await;

        let mut rx = observer.subscribe();
        assert!(!rx.has_changed().unwrap());

        cache.mark_solved("c", "a");
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow(), AggregateState::loaded(1, 1));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let (_store, cache, bus) = setup();
        let observer = AggregateObserver::spawn("c", ids(&["a"]), Arc::clone(&cache), &bus);
        observer.wait_until_loaded().await;
        assert_eq!(bus.subscriber_count(), 1);

        let mut rx = observer.subscribe();
        drop(observer);

        let changed = tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("sender should be dropped");
        assert!(changed.is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
