//! Three-state view lifecycle around a single snapshot load.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::filter::filter_expiring_today;
use crate::loader::{DataLoader, DocumentFetcher, LoadError};
use crate::market::{Market, MarketCollection};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Loading,
    Ready {
        markets: Vec<Market>,
        evaluated_at: DateTime<Utc>,
    },
    Failed {
        error: LoadError,
    },
}

impl ViewState {
    /// Completion transition: filter on success, carry the error on failure.
    pub fn from_load(result: Result<MarketCollection, LoadError>, now: DateTime<Utc>) -> Self {
        match result {
            Ok(collection) => ViewState::Ready {
                markets: filter_expiring_today(&collection, now),
                evaluated_at: now,
            },
            Err(error) => ViewState::Failed { error },
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ViewState::Loading)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ViewState::Loading => "loading",
            ViewState::Ready { .. } => "ready",
            ViewState::Failed { .. } => "failed",
        }
    }
}

pub trait ViewStateSource: Send + Sync + 'static {
    fn state(&self) -> ViewState;
    fn reload(&self);
}

/// Fixed-state source for routes that do not need a live load.
pub struct InMemoryViewStateSource {
    inner: RwLock<ViewState>,
    reloads: AtomicUsize,
}

impl InMemoryViewStateSource {
    pub fn new(state: ViewState) -> Self {
        Self {
            inner: RwLock::new(state),
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn replace_state(&self, state: ViewState) {
        let mut guard = self
            .inner
            .write()
            .expect("in-memory view state lock should not be poisoned");
        *guard = state;
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl ViewStateSource for InMemoryViewStateSource {
    fn state(&self) -> ViewState {
        self.inner
            .read()
            .expect("in-memory view state lock should not be poisoned")
            .clone()
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Owns one load session at a time. A completion is applied only if the
/// controller is still alive and no newer session has started.
pub struct ViewController<F: DocumentFetcher> {
    shared: Arc<Shared<F>>,
}

struct Shared<F> {
    loader: DataLoader<F>,
    clock: Clock,
    state: RwLock<ViewState>,
    generation: AtomicU64,
    disposed: AtomicBool,
    task: Mutex<Option<SessionTask>>,
}

struct SessionTask {
    generation: u64,
    handle: JoinHandle<()>,
}

impl<F: DocumentFetcher> ViewController<F> {
    /// Enters `Loading` and starts the load. Must be called inside a tokio runtime.
    pub fn spawn(loader: DataLoader<F>, clock: Clock) -> Self {
        let shared = Arc::new(Shared {
            loader,
            clock,
            state: RwLock::new(ViewState::Loading),
            generation: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            task: Mutex::new(None),
        });
        start_session(&shared);
        Self { shared }
    }

    pub fn state(&self) -> ViewState {
        self.shared
            .state
            .read()
            .expect("view state lock should not be poisoned")
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Starts a fresh session; any in-flight load from the old one is dropped.
    pub fn reload(&self) {
        start_session(&self.shared);
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    pub fn teardown(&self) {
        let pending = {
            let _state = self
                .shared
                .state
                .write()
                .expect("view state lock should not be poisoned");
            if self.shared.disposed.swap(true, Ordering::SeqCst) {
                return;
            }
            self.shared
                .task
                .lock()
                .expect("view task lock should not be poisoned")
                .take()
        };
        if let Some(pending) = pending {
            pending.handle.abort();
        }

        info!(
            component = "view",
            event = "view.teardown",
            generation = self.generation()
        );
    }
}

impl<F: DocumentFetcher> Drop for ViewController<F> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<F: DocumentFetcher> ViewStateSource for ViewController<F> {
    fn state(&self) -> ViewState {
        ViewController::state(self)
    }

    fn reload(&self) {
        ViewController::reload(self)
    }
}

/// Bumps the generation, spawns the load and swaps the task slot under the
/// state write guard, so sessions start strictly one after another and never
/// after teardown.
fn start_session<F: DocumentFetcher>(shared: &Arc<Shared<F>>) {
    let mut state = shared
        .state
        .write()
        .expect("view state lock should not be poisoned");
    if shared.disposed.load(Ordering::SeqCst) {
        return;
    }

    *state = ViewState::Loading;
    let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

    let task_shared = Arc::clone(shared);
    let handle = tokio::spawn(async move {
        let result = task_shared.loader.load().await;
        task_shared.complete(generation, result);
    });

    let mut slot = shared
        .task
        .lock()
        .expect("view task lock should not be poisoned");
    match slot.take() {
        Some(previous) if previous.generation > generation => {
            handle.abort();
            *slot = Some(previous);
        }
        Some(previous) => {
            previous.handle.abort();
            *slot = Some(SessionTask { generation, handle });
        }
        None => *slot = Some(SessionTask { generation, handle }),
    }
}

impl<F> Shared<F> {
    fn complete(&self, generation: u64, result: Result<MarketCollection, LoadError>) {
        let mut state = self
            .state
            .write()
            .expect("view state lock should not be poisoned");

        let current = self.generation.load(Ordering::SeqCst);
        if self.disposed.load(Ordering::SeqCst) || current != generation {
            debug!(
                component = "view",
                event = "view.load.stale",
                generation,
                current_generation = current
            );
            return;
        }

        let next = ViewState::from_load(result, (self.clock)());
        let market_count = match &next {
            ViewState::Ready { markets, .. } => markets.len(),
            _ => 0,
        };
        info!(
            component = "view",
            event = "view.load.applied",
            generation,
            state = next.label(),
            market_count
        );
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{FetchedDocument, LoaderConfig};
    use chrono::TimeZone;
    use std::sync::Barrier;
    use std::time::Duration;

    struct DelayedFetcher {
        delay_ms: u64,
        body: &'static str,
    }

    impl DocumentFetcher for DelayedFetcher {
        async fn fetch(&self) -> Result<FetchedDocument, LoadError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(FetchedDocument::ok(self.body))
        }
    }

    const ONE_TODAY: &str = r#"{"props":{"pageProps":{"initialState":{"markets":{
        "a":{"id":"a","question":"today","endDate":"2024-03-15T12:00:00Z"},
        "b":{"id":"b","question":"tomorrow","endDate":"2024-03-16T12:00:00Z"}
    }}}}}"#;

    fn fixed_clock() -> Clock {
        Arc::new(|| Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap())
    }

    fn controller(delay_ms: u64) -> ViewController<DelayedFetcher> {
        let loader = DataLoader::new(
            DelayedFetcher {
                delay_ms,
                body: ONE_TODAY,
            },
            &LoaderConfig::default(),
        );
        ViewController::spawn(loader, fixed_clock())
    }

    async fn wait_for_terminal(ctl: &ViewController<DelayedFetcher>) -> ViewState {
        for _ in 0..200 {
            let state = ctl.state();
            if state.is_terminal() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("controller never left Loading");
    }

    #[test]
    fn from_load_filters_on_success_and_keeps_error_on_failure() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let markets = vec![
            Market::new("a", "q").with_end_date("2024-03-15T23:59:00Z"),
            Market::new("b", "q").with_end_date("2024-03-16T00:00:01Z"),
        ];

        match ViewState::from_load(Ok(markets), now) {
            ViewState::Ready {
                markets,
                evaluated_at,
            } => {
                assert_eq!(markets.len(), 1);
                assert_eq!(markets[0].id, "a");
                assert_eq!(evaluated_at, now);
            }
            other => panic!("expected ready, got {other:?}"),
        }

        assert_eq!(
            ViewState::from_load(Err(LoadError::HttpStatus(500)), now),
            ViewState::Failed {
                error: LoadError::HttpStatus(500)
            }
        );
    }

    #[tokio::test]
    async fn starts_loading_then_becomes_ready() {
        let ctl = controller(20);
        assert_eq!(ctl.state(), ViewState::Loading);

        match wait_for_terminal(&ctl).await {
            ViewState::Ready { markets, .. } => {
                assert_eq!(markets.len(), 1);
                assert_eq!(markets[0].id, "a");
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn teardown_discards_pending_result() {
        let ctl = controller(50);
        ctl.teardown();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(ctl.is_torn_down());
        assert_eq!(ctl.state(), ViewState::Loading);
    }

    #[tokio::test]
    async fn stale_completion_is_ignored_after_teardown() {
        let ctl = controller(10_000);
        let generation = ctl.generation();
        ctl.teardown();

        ctl.shared.complete(generation, Ok(Vec::new()));
        assert_eq!(ctl.state(), ViewState::Loading);
    }

    #[tokio::test]
    async fn completion_from_previous_session_is_ignored() {
        let ctl = controller(10_000);
        let old_generation = ctl.generation();
        ctl.reload();
        assert_eq!(ctl.generation(), old_generation + 1);

        ctl.shared
            .complete(old_generation, Err(LoadError::Unknown("late".to_string())));
        assert_eq!(ctl.state(), ViewState::Loading);

        ctl.shared.complete(ctl.generation(), Ok(Vec::new()));
        assert!(matches!(ctl.state(), ViewState::Ready { markets, .. } if markets.is_empty()));
    }

    #[tokio::test]
    async fn reload_after_ready_reenters_loading() {
        let ctl = controller(5);
        assert!(wait_for_terminal(&ctl).await.is_terminal());

        ctl.reload();
        assert_eq!(ctl.state(), ViewState::Loading);
        assert!(wait_for_terminal(&ctl).await.is_terminal());
    }

    #[tokio::test]
    async fn reload_after_teardown_is_a_no_op() {
        let ctl = controller(5);
        ctl.teardown();
        let generation = ctl.generation();
        ctl.reload();
        assert_eq!(ctl.generation(), generation);
    }

    fn pending_generation(ctl: &ViewController<DelayedFetcher>) -> Option<u64> {
        ctl.shared
            .task
            .lock()
            .expect("view task lock should not be poisoned")
            .as_ref()
            .map(|task| task.generation)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reloads_always_settle() {
        let runtime = tokio::runtime::Handle::current();

        for _ in 0..200 {
            let ctl = controller(1);
            let barrier = Barrier::new(4);

            std::thread::scope(|scope| {
                for _ in 0..4 {
                    scope.spawn(|| {
                        let _enter = runtime.enter();
                        barrier.wait();
                        ctl.reload();
                    });
                }
            });

            assert_eq!(pending_generation(&ctl), Some(ctl.generation()));
            assert!(matches!(
                wait_for_terminal(&ctl).await,
                ViewState::Ready { .. }
            ));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reload_racing_teardown_never_starts_a_session_afterwards() {
        let runtime = tokio::runtime::Handle::current();

        for _ in 0..200 {
            let ctl = controller(10_000);
            let barrier = Barrier::new(2);

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    let _enter = runtime.enter();
                    barrier.wait();
                    ctl.reload();
                });
                scope.spawn(|| {
                    barrier.wait();
                    ctl.teardown();
                });
            });

            assert!(ctl.is_torn_down());
            assert_eq!(pending_generation(&ctl), None);

            let generation = ctl.generation();
            let state = ctl.state();
            ctl.reload();
            tokio::time::sleep(Duration::from_millis(2)).await;
            assert_eq!(ctl.generation(), generation);
            assert_eq!(ctl.state(), state);
        }
    }

    #[test]
    fn in_memory_source_counts_reloads() {
        let source = InMemoryViewStateSource::new(ViewState::Loading);
        source.reload();
        source.reload();
        assert_eq!(source.reload_count(), 2);
        assert_eq!(source.state(), ViewState::Loading);
    }
}
