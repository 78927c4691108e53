//! Sessions keyed by conversation identity, each behind its own lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::AppError;
use crate::session::{PageOutcome, SelectionOutcome, Session, StartOutcome};
use crate::video::VideoSource;

type SharedSession = Arc<Mutex<Session>>;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions.lock().get(id).cloned()
    }

    /// Removes `id` only if it still maps to `session`; a newer session
    /// started in the meantime is left alone.
    fn remove_if_current(&self, id: &str, session: &SharedSession) {
        let mut map = self.sessions.lock();
        if map.get(id).is_some_and(|s| Arc::ptr_eq(s, session)) {
            map.remove(id);
        }
    }

    /// Analyzes `video` for conversation `id`. Any previous session of that
    /// conversation is torn down first.
    pub fn start(
        &self,
        id: &str,
        video: Box<dyn VideoSource>,
        work_dir: PathBuf,
        config: &EngineConfig,
    ) -> Result<StartOutcome, AppError> {
        let previous = self.sessions.lock().remove(id);
        if let Some(previous) = previous {
            log::info!(
                target: "sharp_frames::registry",
                "Replacing session {}",
                id
            );
            previous.lock().teardown();
        }

        let (outcome, session) = Session::start(id, video, work_dir, config)?;
        if let Some(session) = session {
            let replaced = self
                .sessions
                .lock()
                .insert(id.to_string(), Arc::new(Mutex::new(session)));
            if let Some(replaced) = replaced {
                replaced.lock().teardown();
            }
        }
        Ok(outcome)
    }

    /// `Ok(None)` when the conversation has no session.
    pub fn show_page(&self, id: &str, page: usize) -> Result<Option<PageOutcome>, AppError> {
        let Some(shared) = self.get(id) else {
            return Ok(None);
        };
        let result = shared.lock().show_page(page);
        match result {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                log::error!(
                    target: "sharp_frames::registry",
                    "Session {} failed on page {}: {}",
                    id,
                    page,
                    e
                );
                shared.lock().teardown();
                self.remove_if_current(id, &shared);
                Err(e)
            }
        }
    }

    /// `None` when the conversation has no session. A delivered selection
    /// ends the session.
    pub fn resolve_selection(&self, id: &str, text: &str) -> Option<SelectionOutcome> {
        let shared = self.get(id)?;
        let outcome = shared.lock().resolve_selection(text);
        if matches!(outcome, SelectionOutcome::Delivered(_)) {
            self.remove_if_current(id, &shared);
        }
        Some(outcome)
    }

    /// Tears down the session of `id`. Returns whether one existed.
    pub fn clear(&self, id: &str) -> bool {
        let removed = self.sessions.lock().remove(id);
        match removed {
            Some(session) => {
                session.lock().teardown();
                true
            }
            None => false,
        }
    }

    pub fn clear_all(&self) {
        let drained: Vec<SharedSession> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in drained {
            session.lock().teardown();
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EmptyReason;
    use crate::test_support::SyntheticVideo;

    fn video(sharp_count: u64) -> Box<SyntheticVideo> {
        Box::new(SyntheticVideo::with_sharp_frames(
            sharp_count * 20,
            24,
            24,
            |i| i % 20 == 5,
        ))
    }

    #[test]
    fn ready_session_is_registered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = SessionRegistry::new();
        let outcome = registry
            .start("a", video(3), dir.path().join("a"), &EngineConfig::default())
            .expect("start");
        assert!(matches!(outcome, StartOutcome::Ready { .. }));
        assert!(registry.contains("a"));
    }

    #[test]
    fn empty_result_is_not_registered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = SessionRegistry::new();
        let outcome = registry
            .start("a", video(0), dir.path().join("a"), &EngineConfig::default())
            .expect("start");
        assert!(matches!(outcome, StartOutcome::NoCandidates { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn restart_replaces_and_cleans_previous_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first_dir = dir.path().join("first");
        let registry = SessionRegistry::new();
        registry
            .start("a", video(3), first_dir.clone(), &EngineConfig::default())
            .expect("start");
        assert!(first_dir.exists());

        registry
            .start("a", video(2), dir.path().join("second"), &EngineConfig::default())
            .expect("restart");
        assert!(!first_dir.exists());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sessions_are_independent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = SessionRegistry::new();
        let config = EngineConfig::default();
        registry.start("a", video(3), dir.path().join("a"), &config).expect("a");
        registry.start("b", video(3), dir.path().join("b"), &config).expect("b");

        let outcome = registry.resolve_selection("a", "1").expect("session a");
        assert!(matches!(outcome, SelectionOutcome::Delivered(_)));
        assert!(!registry.contains("a"));
        assert!(registry.contains("b"));
        assert!(matches!(
            registry.show_page("b", 0).expect("page"),
            Some(PageOutcome::Shown(_))
        ));
    }

    #[test]
    fn unknown_conversation_has_no_session() {
        let registry = SessionRegistry::new();
        assert!(registry.show_page("nobody", 0).expect("page").is_none());
        assert!(registry.resolve_selection("nobody", "1").is_none());
        assert!(!registry.clear("nobody"));
    }

    #[test]
    fn invalid_selection_keeps_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = SessionRegistry::new();
        registry
            .start("a", video(3), dir.path().join("a"), &EngineConfig::default())
            .expect("start");
        let outcome = registry.resolve_selection("a", "").expect("session");
        assert!(matches!(outcome, SelectionOutcome::Invalid { .. }));
        assert!(registry.contains("a"));
        assert_eq!(
            registry.show_page("a", 5).expect("page"),
            Some(PageOutcome::Empty {
                reason: EmptyReason::BeyondEnd
            })
        );
    }

    #[test]
    fn clear_removes_work_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let work_dir = dir.path().join("a");
        let registry = SessionRegistry::new();
        registry
            .start("a", video(3), work_dir.clone(), &EngineConfig::default())
            .expect("start");
        assert!(registry.clear("a"));
        assert!(!work_dir.exists());
        assert!(registry.is_empty());
    }
}
