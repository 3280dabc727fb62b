use shared::{CompiledQuery, Frame, SearchRequest, SearchSettings};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::backend::{BackendError, RetrievalBackend};
use crate::notify::Notifier;
use crate::query::{QueryError, QueryModalitySet, ValidationError, validate_compiled};
use crate::results::{ResultSet, ResultStore};
use crate::settings::SettingsStore;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    InFlight { token: Uuid },
}

#[derive(Debug)]
pub enum SearchOutcome {
    Completed(Arc<ResultSet>),
    /// Another search was outstanding; nothing happened.
    Dropped,
}

/// Returns the controller to `Idle` when the owning call finishes or is
/// dropped, but only if it still owns the in-flight slot.
struct InFlightGuard {
    state: Arc<watch::Sender<SearchState>>,
    token: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let token = self.token;
        self.state.send_if_modified(|state| {
            if *state == (SearchState::InFlight { token }) {
                *state = SearchState::Idle;
                true
            } else {
                false
            }
        });
    }
}

/// Owns the single outstanding search and republishes its results.
#[derive(Clone)]
pub struct SearchController {
    backend: Arc<dyn RetrievalBackend>,
    settings: SettingsStore,
    results: ResultStore,
    notifier: Notifier,
    state: Arc<watch::Sender<SearchState>>,
}

impl SearchController {
    pub fn new(
        backend: Arc<dyn RetrievalBackend>,
        settings: SettingsStore,
        results: ResultStore,
        notifier: Notifier,
    ) -> Self {
        let (state, _) = watch::channel(SearchState::Idle);
        Self {
            backend,
            settings,
            results,
            notifier,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> SearchState {
        *self.state.borrow()
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state(), SearchState::InFlight { .. })
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    fn try_begin(&self) -> Option<InFlightGuard> {
        let token = Uuid::new_v4();
        let acquired = self.state.send_if_modified(|state| match state {
            SearchState::Idle => {
                *state = SearchState::InFlight { token };
                true
            }
            SearchState::InFlight { .. } => false,
        });
        acquired.then(|| InFlightGuard {
            state: Arc::clone(&self.state),
            token,
        })
    }

    /// Validates, compiles and dispatches the modality set with the current
    /// settings. Validation errors leave every store untouched.
    pub async fn search(&self, modalities: &QueryModalitySet) -> Result<SearchOutcome, SearchError> {
        self.reject_invalid(modalities.validate())?;

        let Some(_guard) = self.try_begin() else {
            log::info!("Search already in flight, dropping request");
            return Ok(SearchOutcome::Dropped);
        };
        self.results.clear();

        let settings = self.settings.get();
        let query = match modalities.compile().await {
            Ok(query) => query,
            Err(e) => {
                log::error!("Failed to compile query: {}", e);
                self.notifier.failure("Search", format!("Search failed: {}", e));
                return Err(e.into());
            }
        };
        self.dispatch(query, settings).await
    }

    /// Dispatches an already compiled query.
    pub async fn execute(
        &self,
        query: CompiledQuery,
        settings: SearchSettings,
    ) -> Result<SearchOutcome, SearchError> {
        self.reject_invalid(validate_compiled(&query))?;

        let Some(_guard) = self.try_begin() else {
            log::info!("Search already in flight, dropping request");
            return Ok(SearchOutcome::Dropped);
        };
        self.results.clear();
        self.dispatch(query, settings).await
    }

    fn reject_invalid(&self, checked: Result<(), ValidationError>) -> Result<(), SearchError> {
        checked.map_err(|e| {
            log::warn!("Search rejected: {}", e);
            self.notifier.failure("Search", e.to_string());
            SearchError::Query(QueryError::Validation(e))
        })
    }

    async fn dispatch(
        &self,
        query: CompiledQuery,
        settings: SearchSettings,
    ) -> Result<SearchOutcome, SearchError> {
        let request = SearchRequest {
            query,
            search_params: settings,
        };

        match self.backend.search(&request).await {
            Ok(frames) => {
                log::info!("Search returned {} frames", frames.len());
                self.results.replace(frames);
                Ok(SearchOutcome::Completed(self.results.snapshot()))
            }
            Err(e) => {
                log::error!("Search request failed: {}", e);
                self.notifier.failure("Search", format!("Search failed: {}", e));
                Err(e.into())
            }
        }
    }

    /// Every frame of one video. Leaves the result store alone.
    pub async fn explore(&self, video_id: &str) -> Result<Vec<Frame>, SearchError> {
        self.backend.explore(video_id).await.map_err(|e| {
            log::error!("Explore of video {} failed: {}", video_id, e);
            self.notifier
                .failure("Explore", format!("Exploring video {} failed: {}", video_id, e));
            SearchError::Backend(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationLevel;
    use crate::query::{Modality, ModalityValue};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn frame(video_id: &str, frame_id: &str) -> Frame {
        Frame {
            video_id: video_id.into(),
            frame_id: frame_id.into(),
            score: 0.2,
            timestamp: 3.0,
            objects: vec![],
            dominant_colors: vec![],
            text: vec![],
        }
    }

    /// Answers each search once the gate is opened.
    struct GatedBackend {
        gate: Notify,
        calls: AtomicUsize,
        frames: Vec<Frame>,
        fail: bool,
    }

    impl GatedBackend {
        fn new(frames: Vec<Frame>) -> Arc<Self> {
            Arc::new(Self {
                gate: Notify::new(),
                calls: AtomicUsize::new(0),
                frames,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                gate: Notify::new(),
                calls: AtomicUsize::new(0),
                frames: vec![],
                fail: true,
            })
        }
    }

    #[async_trait]
    impl RetrievalBackend for GatedBackend {
        async fn search(&self, _request: &SearchRequest) -> Result<Vec<Frame>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            if self.fail {
                return Err(BackendError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(self.frames.clone())
        }

        async fn explore(&self, video_id: &str) -> Result<Vec<Frame>, BackendError> {
            if self.fail {
                return Err(BackendError::Status {
                    status: 404,
                    body: video_id.into(),
                });
            }
            Ok(self.frames.clone())
        }
    }

    fn controller(backend: Arc<GatedBackend>) -> SearchController {
        SearchController::new(
            backend,
            SettingsStore::default(),
            ResultStore::new(),
            Notifier::new(),
        )
    }

    fn color_query() -> CompiledQuery {
        CompiledQuery {
            color_query: Some([47, 119, 150]),
            ..Default::default()
        }
    }

    async fn wait_in_flight(controller: &SearchController) {
        let mut rx = controller.subscribe_state();
        rx.wait_for(|s| matches!(s, SearchState::InFlight { .. }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_second_call_while_in_flight_is_dropped() {
        let backend = GatedBackend::new(vec![frame("A", "frame_1"), frame("B", "frame_1")]);
        let controller = controller(Arc::clone(&backend));

        let first = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .execute(color_query(), SearchSettings::default())
                    .await
            }
        });
        wait_in_flight(&controller).await;

        let second = controller
            .execute(color_query(), SearchSettings::default())
            .await
            .unwrap();
        assert!(matches!(second, SearchOutcome::Dropped));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        backend.gate.notify_one();
        let outcome = first.await.unwrap().unwrap();
        match outcome {
            SearchOutcome::Completed(set) => {
                assert_eq!(set.frames.len(), 2);
                assert_eq!(set.videos.len(), 2);
            }
            SearchOutcome::Dropped => panic!("first search should complete"),
        }
        assert_eq!(controller.state(), SearchState::Idle);
    }

    #[tokio::test]
    async fn test_results_cleared_at_dispatch() {
        let backend = GatedBackend::new(vec![frame("C", "frame_2")]);
        let controller = controller(Arc::clone(&backend));
        controller.results().replace(vec![frame("OLD", "frame_1")]);

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .execute(color_query(), SearchSettings::default())
                    .await
            }
        });
        wait_in_flight(&controller).await;
        assert!(controller.results().snapshot().is_empty());

        backend.gate.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(controller.results().snapshot().frames[0].video_id, "C");
    }

    #[tokio::test]
    async fn test_failure_leaves_results_empty_and_releases_guard() {
        let backend = GatedBackend::failing();
        let controller = controller(Arc::clone(&backend));
        controller.results().replace(vec![frame("OLD", "frame_1")]);
        let mut notifications = controller.notifier.subscribe();

        backend.gate.notify_one();
        let err = controller
            .execute(color_query(), SearchSettings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Backend(BackendError::Status { status: 500, .. })));
        assert!(controller.results().snapshot().is_empty());
        assert!(!controller.is_busy());
        let note = notifications.recv().await.unwrap();
        assert_eq!(note.level, NotificationLevel::Failure);
        assert!(note.message.starts_with("Search failed"));
    }

    #[tokio::test]
    async fn test_validation_error_makes_no_call_and_keeps_results() {
        let backend = GatedBackend::new(vec![]);
        let controller = controller(Arc::clone(&backend));
        controller.results().replace(vec![frame("KEEP", "frame_1")]);
        let mut notifications = controller.notifier.subscribe();

        let mut modalities = QueryModalitySet::new();
        modalities.reset();
        let err = controller.search(&modalities).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Query(QueryError::Validation(ValidationError::EmptyQuery))
        ));

        modalities
            .set_modality(true, ModalityValue::Text("  ".into()))
            .unwrap();
        assert!(controller.search(&modalities).await.is_err());

        let empty = notifications.recv().await.unwrap();
        assert_eq!(empty.level, NotificationLevel::Failure);
        assert_eq!(empty.message, ValidationError::EmptyQuery.to_string());
        let missing = notifications.recv().await.unwrap();
        assert_eq!(
            missing.message,
            ValidationError::MissingRequiredValue(Modality::Text).to_string()
        );

        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.results().snapshot().frames.len(), 1);
        assert_eq!(controller.state(), SearchState::Idle);
    }

    #[tokio::test]
    async fn test_execute_rejects_empty_or_blank_compiled_query() {
        let backend = GatedBackend::new(vec![frame("NEW", "frame_1")]);
        let controller = controller(Arc::clone(&backend));
        controller.results().replace(vec![frame("KEEP", "frame_1")]);
        backend.gate.notify_one();

        let err = controller
            .execute(CompiledQuery::default(), SearchSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SearchError::Query(QueryError::Validation(ValidationError::EmptyQuery))
        ));

        let blank_text = CompiledQuery {
            text_query: Some("   ".into()),
            ..Default::default()
        };
        let err = controller
            .execute(blank_text, SearchSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SearchError::Query(QueryError::Validation(
                ValidationError::MissingRequiredValue(Modality::Text)
            ))
        ));

        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.results().snapshot().frames[0].video_id, "KEEP");
        assert_eq!(controller.state(), SearchState::Idle);
    }

    #[tokio::test]
    async fn test_search_uses_current_settings() {
        let backend = GatedBackend::new(vec![frame("A", "frame_1")]);
        let controller = controller(Arc::clone(&backend));
        let mut modalities = QueryModalitySet::new();
        modalities
            .set_modality(true, ModalityValue::Text("a dog on a beach".into()))
            .unwrap();

        backend.gate.notify_one();
        let outcome = controller.search(&modalities).await.unwrap();
        assert!(matches!(outcome, SearchOutcome::Completed(_)));
        assert_eq!(controller.results().snapshot().videos[0].video_id, "A");
    }

    #[tokio::test]
    async fn test_cancelled_search_releases_guard() {
        let backend = GatedBackend::new(vec![]);
        let controller = controller(Arc::clone(&backend));

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .execute(color_query(), SearchSettings::default())
                    .await
            }
        });
        wait_in_flight(&controller).await;

        pending.abort();
        let _ = pending.await;
        assert_eq!(controller.state(), SearchState::Idle);
    }

    #[tokio::test]
    async fn test_explore_does_not_touch_results() {
        let backend = GatedBackend::new(vec![frame("V", "frame_1"), frame("V", "frame_2")]);
        let controller = controller(Arc::clone(&backend));
        controller.results().replace(vec![frame("KEEP", "frame_1")]);

        let frames = controller.explore("V").await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(controller.results().snapshot().frames[0].video_id, "KEEP");
    }
}
