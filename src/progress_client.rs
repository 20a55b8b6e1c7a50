use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::types::{
    CompletionOutcome, CompletionRequest, PersistedProgress, ProgressUpdate,
};

/// Remote store the engine checkpoints into.
pub trait ProgressBackend {
    fn load_progress(&mut self, room_id: &str)
        -> Result<Option<PersistedProgress>, PersistenceError>;

    fn save_progress(
        &mut self,
        room_id: &str,
        update: &ProgressUpdate,
    ) -> Result<PersistedProgress, PersistenceError>;

    fn complete_game(
        &mut self,
        room_id: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionOutcome, PersistenceError>;

    fn reset_progress(&mut self, room_id: &str) -> Result<(), PersistenceError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Step, score or hint count changed; restarts the quiet window.
    State,
    /// Elapsed seconds ticked; arms the window only when idle.
    Time,
}

/// Debounced, init-gated persistence on top of a [`ProgressBackend`].
pub struct ProgressClient<B> {
    backend: B,
    room_id: String,
    debounce_ms: u64,
    initialized: bool,
    suspended: bool,
    pending_due_ms: Option<u64>,
    is_saving: bool,
    is_completing: bool,
    last_saved: Option<ProgressUpdate>,
    last_error: Option<PersistenceError>,
}

impl<B: ProgressBackend> ProgressClient<B> {
    pub fn new(backend: B, room_id: &str, debounce_ms: u64) -> Self {
        Self {
            backend,
            room_id: room_id.to_string(),
            debounce_ms,
            initialized: false,
            suspended: false,
            pending_due_ms: None,
            is_saving: false,
            is_completing: false,
            last_saved: None,
            last_error: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving
    }

    pub fn is_completing(&self) -> bool {
        self.is_completing
    }

    pub fn last_error(&self) -> Option<&PersistenceError> {
        self.last_error.as_ref()
    }

    pub fn pending_due_ms(&self) -> Option<u64> {
        self.pending_due_ms
    }

    /// Loads saved progress; the client becomes initialized only on success.
    pub fn load(&mut self) -> Result<Option<PersistedProgress>, PersistenceError> {
        match self.backend.load_progress(&self.room_id) {
            Ok(progress) => {
                self.initialized = true;
                self.suspended = false;
                Ok(progress)
            }
            Err(error) => {
                self.record_error(&error);
                Err(error)
            }
        }
    }

    pub fn note_change(&mut self, kind: ChangeKind, now_ms: u64) {
        if !self.initialized || self.suspended {
            return;
        }
        let due = now_ms + self.debounce_ms;
        self.pending_due_ms = match kind {
            ChangeKind::State => Some(due),
            ChangeKind::Time => Some(self.pending_due_ms.unwrap_or(due)),
        };
    }

    pub fn cancel_pending(&mut self) {
        self.pending_due_ms = None;
    }

    /// Runs the debounced save when its quiet window has elapsed.
    pub fn flush_due(
        &mut self,
        now_ms: u64,
        update: &ProgressUpdate,
    ) -> Option<Result<(), PersistenceError>> {
        let due = self.pending_due_ms?;
        if now_ms < due {
            return None;
        }
        self.pending_due_ms = None;
        if !worth_saving(update) || self.last_saved.as_ref() == Some(update) {
            return None;
        }
        Some(self.save_now(update))
    }

    /// Immediate save used when the player walks away mid-session.
    pub fn save_on_leave(&mut self, update: &ProgressUpdate) -> Option<Result<(), PersistenceError>> {
        self.pending_due_ms = None;
        if !self.initialized || self.suspended || !worth_saving(update) {
            return None;
        }
        Some(self.save_now(update))
    }

    pub fn complete(
        &mut self,
        request: &CompletionRequest,
    ) -> Result<CompletionOutcome, PersistenceError> {
        self.pending_due_ms = None;
        self.is_completing = true;
        let result = self.backend.complete_game(&self.room_id, request);
        self.is_completing = false;
        if let Err(error) = &result {
            self.record_error(error);
        }
        result
    }

    pub fn reset(&mut self) -> Result<(), PersistenceError> {
        self.pending_due_ms = None;
        let result = self.backend.reset_progress(&self.room_id);
        match &result {
            Ok(()) => self.last_saved = None,
            Err(error) => self.record_error(error),
        }
        result
    }

    fn save_now(&mut self, update: &ProgressUpdate) -> Result<(), PersistenceError> {
        self.is_saving = true;
        let result = self.backend.save_progress(&self.room_id, update);
        self.is_saving = false;
        match result {
            Ok(saved) => {
                debug!(
                    room_id = %self.room_id,
                    step = saved.current_step,
                    score = saved.score,
                    "progress saved"
                );
                self.last_saved = Some(update.clone());
                self.last_error = None;
                Ok(())
            }
            Err(error) => {
                self.record_error(&error);
                Err(error)
            }
        }
    }

    fn record_error(&mut self, error: &PersistenceError) {
        warn!(room_id = %self.room_id, %error, "progress request failed");
        if *error == PersistenceError::Unauthenticated {
            self.suspended = true;
            self.pending_due_ms = None;
        }
        self.last_error = Some(error.clone());
    }
}

fn worth_saving(update: &ProgressUpdate) -> bool {
    update.current_step > 0
}


#[cfg(test)]
mod tests {
    use super::fake::FakeBackend;
    use super::*;

    fn update(step: usize, score: u32) -> ProgressUpdate {
        ProgressUpdate {
            current_step: step,
            score,
            ..ProgressUpdate::default()
        }
    }

    fn client() -> ProgressClient<FakeBackend> {
        ProgressClient::new(FakeBackend::default(), "room", 1_000)
    }

    #[test]
    fn changes_before_initialization_never_save() {
        let mut client = client();
        client.note_change(ChangeKind::State, 0);
        assert_eq!(client.pending_due_ms(), None);
        assert!(client.flush_due(5_000, &update(3, 10)).is_none());
        assert!(client.save_on_leave(&update(3, 10)).is_none());
        assert!(client.backend().saves.is_empty());
    }

    #[test]
    fn rapid_changes_coalesce_into_one_save() {
        let mut client = client();
        client.load().expect("load");
        client.note_change(ChangeKind::State, 0);
        client.note_change(ChangeKind::State, 400);
        client.note_change(ChangeKind::State, 800);
        assert!(client.flush_due(1_500, &update(2, 10)).is_none());
        assert!(matches!(client.flush_due(1_800, &update(2, 10)), Some(Ok(()))));
        assert_eq!(client.backend().saves.len(), 1);
        assert!(client.flush_due(5_000, &update(2, 10)).is_none());
    }

    #[test]
    fn time_changes_do_not_postpone_an_armed_window() {
        let mut client = client();
        client.load().expect("load");
        client.note_change(ChangeKind::Time, 0);
        client.note_change(ChangeKind::Time, 900);
        assert_eq!(client.pending_due_ms(), Some(1_000));
        client.note_change(ChangeKind::State, 900);
        assert_eq!(client.pending_due_ms(), Some(1_900));
    }

    #[test]
    fn first_step_and_identical_payloads_are_not_saved() {
        let mut client = client();
        client.load().expect("load");
        client.note_change(ChangeKind::State, 0);
        assert!(client.flush_due(1_000, &update(0, 0)).is_none());

        client.note_change(ChangeKind::State, 1_000);
        assert!(client.flush_due(2_000, &update(1, 0)).is_some());
        client.note_change(ChangeKind::Time, 2_000);
        assert!(client.flush_due(3_000, &update(1, 0)).is_none());
        assert_eq!(client.backend().saves.len(), 1);
    }

    #[test]
    fn transport_failure_is_retried_by_next_window() {
        let mut client = client();
        client
            .backend_mut()
            .save_errors
            .push_back(PersistenceError::Transport("502".to_string()));
        client.load().expect("load");
        client.note_change(ChangeKind::State, 0);
        assert!(matches!(
            client.flush_due(1_000, &update(2, 0)),
            Some(Err(PersistenceError::Transport(_)))
        ));
        assert!(!client.is_saving());

        client.note_change(ChangeKind::Time, 1_000);
        assert!(matches!(client.flush_due(2_000, &update(2, 0)), Some(Ok(()))));
        assert_eq!(client.backend().saves.len(), 1);
        assert!(client.last_error().is_none());
    }

    #[test]
    fn unauthenticated_suspends_autosave() {
        let mut client = client();
        client
            .backend_mut()
            .save_errors
            .push_back(PersistenceError::Unauthenticated);
        client.load().expect("load");
        client.note_change(ChangeKind::State, 0);
        assert!(matches!(
            client.flush_due(1_000, &update(2, 0)),
            Some(Err(PersistenceError::Unauthenticated))
        ));
        client.note_change(ChangeKind::State, 1_000);
        assert_eq!(client.pending_due_ms(), None);
    }

    #[test]
    fn failed_load_keeps_client_uninitialized() {
        let mut client = client();
        client.backend_mut().load_error = Some(PersistenceError::Transport("down".to_string()));
        assert!(client.load().is_err());
        assert!(!client.is_initialized());
        client.note_change(ChangeKind::State, 0);
        assert_eq!(client.pending_due_ms(), None);
    }

    #[test]
    fn leave_save_runs_immediately_after_progress() {
        let mut client = client();
        client.load().expect("load");
        client.note_change(ChangeKind::State, 0);
        assert!(client.save_on_leave(&update(0, 0)).is_none());
        assert!(matches!(client.save_on_leave(&update(4, 10)), Some(Ok(()))));
        assert_eq!(client.pending_due_ms(), None);
        assert_eq!(client.backend().saves, vec![update(4, 10)]);
    }
}
