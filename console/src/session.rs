use shared::SubmissionResult;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dres::{DresError, EvaluationService};
use crate::notify::Notifier;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not logged in to DRES")]
    SessionUnavailable,
    #[error("A DRES login is already in progress")]
    LoginInProgress,
    #[error(transparent)]
    Dres(#[from] DresError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationSession {
    pub session_id: String,
    pub evaluation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggingIn,
    LoggedIn {
        session: EvaluationSession,
        /// Submissions awaiting an answer from DRES.
        pending_submissions: usize,
    },
}

impl SessionState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, SessionState::LoggedIn { .. })
    }

    pub fn is_submission_pending(&self) -> bool {
        matches!(self, SessionState::LoggedIn { pending_submissions, .. } if *pending_submissions > 0)
    }
}

/// Falls back to `LoggedOut` if a login attempt ends without reaching
/// `LoggedIn`, including when its future is dropped.
struct LoginGuard {
    state: Arc<watch::Sender<SessionState>>,
}

impl Drop for LoginGuard {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if *state == SessionState::LoggingIn {
                *state = SessionState::LoggedOut;
                true
            } else {
                false
            }
        });
    }
}

struct PendingSubmission {
    state: Arc<watch::Sender<SessionState>>,
}

impl PendingSubmission {
    fn begin(state: &Arc<watch::Sender<SessionState>>) -> Self {
        state.send_if_modified(|s| match s {
            SessionState::LoggedIn { pending_submissions, .. } => {
                *pending_submissions += 1;
                true
            }
            _ => false,
        });
        Self {
            state: Arc::clone(state),
        }
    }
}

impl Drop for PendingSubmission {
    fn drop(&mut self) {
        self.state.send_if_modified(|s| match s {
            SessionState::LoggedIn { pending_submissions, .. } if *pending_submissions > 0 => {
                *pending_submissions -= 1;
                true
            }
            _ => false,
        });
    }
}

/// Tracks the DRES session and submits answers on behalf of the user.
#[derive(Clone)]
pub struct SessionManager {
    service: Arc<dyn EvaluationService>,
    notifier: Notifier,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionManager {
    pub fn new(service: Arc<dyn EvaluationService>, notifier: Notifier) -> Self {
        let (state, _) = watch::channel(SessionState::LoggedOut);
        Self {
            service,
            notifier,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.borrow().is_logged_in()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_session(&self) -> Option<EvaluationSession> {
        match &*self.state.borrow() {
            SessionState::LoggedIn { session, .. } => Some(session.clone()),
            _ => None,
        }
    }

    /// Runs the startup login in the background.
    pub fn spawn_login(&self) -> JoinHandle<Result<(), SessionError>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.login().await })
    }

    /// Authenticates and resolves the active evaluation. Both calls must
    /// succeed before a session is recorded.
    pub async fn login(&self) -> Result<(), SessionError> {
        let mut already_logged_in = false;
        let begun = self.state.send_if_modified(|state| match state {
            SessionState::LoggedOut => {
                *state = SessionState::LoggingIn;
                true
            }
            SessionState::LoggedIn { .. } => {
                already_logged_in = true;
                false
            }
            SessionState::LoggingIn => false,
        });
        if already_logged_in {
            return Ok(());
        }
        if !begun {
            return Err(SessionError::LoginInProgress);
        }
        let _guard = LoginGuard {
            state: Arc::clone(&self.state),
        };

        log::info!("Logging in to DRES");
        match self.open_session().await {
            Ok(session) => {
                log::info!("DRES session ready for evaluation {}", session.evaluation_id);
                let message = format!("Logged in, evaluation {}", session.evaluation_id);
                self.state.send_replace(SessionState::LoggedIn {
                    session,
                    pending_submissions: 0,
                });
                self.notifier.success("DRES", message);
                Ok(())
            }
            Err(e) => {
                log::error!("DRES login failed: {}", e);
                self.state.send_replace(SessionState::LoggedOut);
                self.notifier.failure("DRES", format!("Login failed: {}", e));
                Err(e.into())
            }
        }
    }

    async fn open_session(&self) -> Result<EvaluationSession, DresError> {
        let session_id = self.service.login().await?;
        let evaluation = self.service.active_evaluation(&session_id).await?;
        Ok(EvaluationSession {
            session_id,
            evaluation_id: evaluation.id,
        })
    }

    /// Submits one answer. Refused locally unless logged in.
    pub async fn submit(
        &self,
        video_id: &str,
        timestamp_secs: f64,
    ) -> Result<SubmissionResult, SessionError> {
        let Some(session) = self.current_session() else {
            log::warn!("Submission of video {} refused, not logged in", video_id);
            self.notifier
                .failure("Submission", "Not logged in to DRES, nothing was sent");
            return Err(SessionError::SessionUnavailable);
        };

        let _pending = PendingSubmission::begin(&self.state);
        self.notifier.info(
            "Submission Sent",
            format!("VideoId: {} @ {:.2}sec", video_id, timestamp_secs),
        );

        let result = self
            .service
            .submit(
                &session.session_id,
                &session.evaluation_id,
                video_id,
                timestamp_secs,
            )
            .await;

        match result {
            Ok(result) => {
                log::info!("Submission of video {} judged {}", video_id, result.outcome);
                if result.is_correct() {
                    self.notifier.success("Result", result.description.clone());
                } else {
                    self.notifier.failure("Result", result.description.clone());
                }
                Ok(result)
            }
            Err(e) => {
                log::error!("Submission of video {} failed: {}", video_id, e);
                self.notifier
                    .failure("Result", format!("Submission failed: {}", e));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationLevel;
    use async_trait::async_trait;
    use shared::{EvaluationInfo, SubmissionOutcome};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeDres {
        fail_login: bool,
        fail_evaluation: bool,
        outcome: Option<SubmissionOutcome>,
        login_gate: Option<Notify>,
        logins: AtomicUsize,
        submissions: Mutex<Vec<(String, String, String, f64)>>,
    }

    #[async_trait]
    impl EvaluationService for FakeDres {
        async fn login(&self) -> Result<String, DresError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.login_gate {
                gate.notified().await;
            }
            if self.fail_login {
                return Err(DresError::Rejected("bad credentials".into()));
            }
            Ok("session-1".into())
        }

        async fn active_evaluation(&self, _session_id: &str) -> Result<EvaluationInfo, DresError> {
            if self.fail_evaluation {
                return Err(DresError::NoActiveEvaluation);
            }
            Ok(EvaluationInfo {
                id: "eval-7".into(),
                name: Some("VBS".into()),
                status: Some("ACTIVE".into()),
            })
        }

        async fn submit(
            &self,
            session_id: &str,
            evaluation_id: &str,
            video_id: &str,
            timestamp_secs: f64,
        ) -> Result<SubmissionResult, DresError> {
            self.submissions.lock().unwrap().push((
                session_id.into(),
                evaluation_id.into(),
                video_id.into(),
                timestamp_secs,
            ));
            match &self.outcome {
                Some(outcome) => Ok(SubmissionResult {
                    outcome: outcome.clone(),
                    description: format!("{}", outcome),
                }),
                None => Err(DresError::Status {
                    status: 401,
                    body: "session expired".into(),
                }),
            }
        }
    }

    fn manager(fake: Arc<FakeDres>) -> SessionManager {
        SessionManager::new(fake, Notifier::new())
    }

    #[tokio::test]
    async fn test_login_success() {
        let fake = Arc::new(FakeDres::default());
        let manager = manager(Arc::clone(&fake));
        let mut notes = manager.notifier.subscribe();

        manager.login().await.unwrap();

        assert_eq!(
            manager.state(),
            SessionState::LoggedIn {
                session: EvaluationSession {
                    session_id: "session-1".into(),
                    evaluation_id: "eval-7".into(),
                },
                pending_submissions: 0,
            }
        );
        assert_eq!(notes.recv().await.unwrap().level, NotificationLevel::Success);

        // A second attempt is a no-op.
        manager.login().await.unwrap();
        assert_eq!(fake.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_login_notification_follows_state_change() {
        let manager = manager(Arc::new(FakeDres::default()));
        let mut notes = manager.notifier.subscribe();

        let observer = tokio::spawn({
            let manager = manager.clone();
            async move {
                let note = notes.recv().await.unwrap();
                (note.level, manager.is_logged_in())
            }
        });
        manager.login().await.unwrap();

        let (level, logged_in) = observer.await.unwrap();
        assert_eq!(level, NotificationLevel::Success);
        assert!(logged_in);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_login_failure_notification_follows_state_change() {
        let manager = manager(Arc::new(FakeDres {
            fail_evaluation: true,
            ..Default::default()
        }));
        let mut notes = manager.notifier.subscribe();

        let observer = tokio::spawn({
            let manager = manager.clone();
            async move {
                let note = notes.recv().await.unwrap();
                (note.level, manager.state())
            }
        });
        assert!(manager.login().await.is_err());

        let (level, state) = observer.await.unwrap();
        assert_eq!(level, NotificationLevel::Failure);
        assert_eq!(state, SessionState::LoggedOut);
    }

    #[tokio::test]
    async fn test_login_failure_stays_logged_out() {
        let fake = Arc::new(FakeDres {
            fail_login: true,
            ..Default::default()
        });
        let manager = manager(fake);
        let mut notes = manager.notifier.subscribe();

        assert!(manager.login().await.is_err());
        assert_eq!(manager.state(), SessionState::LoggedOut);
        assert_eq!(notes.recv().await.unwrap().level, NotificationLevel::Failure);
    }

    #[tokio::test]
    async fn test_evaluation_lookup_failure_records_no_partial_session() {
        let fake = Arc::new(FakeDres {
            fail_evaluation: true,
            ..Default::default()
        });
        let manager = manager(fake);

        let err = manager.login().await.unwrap_err();
        assert!(matches!(err, SessionError::Dres(DresError::NoActiveEvaluation)));
        assert_eq!(manager.state(), SessionState::LoggedOut);
        assert!(!manager.is_logged_in());
    }

    #[tokio::test]
    async fn test_concurrent_login_is_refused() {
        let fake = Arc::new(FakeDres {
            login_gate: Some(Notify::new()),
            ..Default::default()
        });
        let manager = manager(Arc::clone(&fake));

        let first = manager.spawn_login();
        let mut rx = manager.subscribe();
        rx.wait_for(|s| *s == SessionState::LoggingIn).await.unwrap();

        assert!(matches!(
            manager.login().await,
            Err(SessionError::LoginInProgress)
        ));

        if let Some(gate) = &fake.login_gate {
            gate.notify_one();
        }
        first.await.unwrap().unwrap();
        assert!(manager.is_logged_in());
        assert_eq!(fake.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_login_returns_to_logged_out() {
        let fake = Arc::new(FakeDres {
            login_gate: Some(Notify::new()),
            ..Default::default()
        });
        let manager = manager(fake);

        let pending = manager.spawn_login();
        let mut rx = manager.subscribe();
        rx.wait_for(|s| *s == SessionState::LoggingIn).await.unwrap();
        pending.abort();
        let _ = pending.await;

        assert_eq!(manager.state(), SessionState::LoggedOut);
    }

    #[tokio::test]
    async fn test_submit_while_logged_out_makes_no_call() {
        let fake = Arc::new(FakeDres {
            outcome: Some(SubmissionOutcome::Correct),
            ..Default::default()
        });
        let manager = manager(Arc::clone(&fake));

        let err = manager.submit("00184", 12.5).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionUnavailable));
        assert!(fake.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_sends_session_and_reports_outcome() {
        let fake = Arc::new(FakeDres {
            outcome: Some(SubmissionOutcome::Correct),
            ..Default::default()
        });
        let manager = manager(Arc::clone(&fake));
        manager.login().await.unwrap();
        let mut notes = manager.notifier.subscribe();

        let result = manager.submit("00184", 12.345).await.unwrap();
        assert!(result.is_correct());
        assert_eq!(
            fake.submissions.lock().unwrap()[0],
            (
                "session-1".to_string(),
                "eval-7".to_string(),
                "00184".to_string(),
                12.345
            )
        );

        let sent = notes.recv().await.unwrap();
        assert_eq!(sent.title, "Submission Sent");
        assert_eq!(sent.message, "VideoId: 00184 @ 12.35sec");
        let verdict = notes.recv().await.unwrap();
        assert_eq!(verdict.title, "Result");
        assert_eq!(verdict.level, NotificationLevel::Success);
        assert!(!manager.state().is_submission_pending());
    }

    #[tokio::test]
    async fn test_wrong_and_failed_submissions_keep_session() {
        let fake = Arc::new(FakeDres {
            outcome: Some(SubmissionOutcome::Wrong),
            ..Default::default()
        });
        let manager = manager(fake);
        manager.login().await.unwrap();
        let mut notes = manager.notifier.subscribe();

        let result = manager.submit("00001", 1.0).await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::Wrong);
        notes.recv().await.unwrap();
        assert_eq!(notes.recv().await.unwrap().level, NotificationLevel::Failure);

        let expired = manager_with_expired_session().await;
        assert!(matches!(
            expired.submit("00001", 1.0).await,
            Err(SessionError::Dres(DresError::Status { status: 401, .. }))
        ));
        // No re-login is attempted.
        assert!(expired.is_logged_in());
        assert!(manager.is_logged_in());
    }

    async fn manager_with_expired_session() -> SessionManager {
        let manager = manager(Arc::new(FakeDres::default()));
        manager.login().await.unwrap();
        manager
    }
}
