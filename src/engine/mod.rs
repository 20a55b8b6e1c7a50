use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::constants::{
    ANSWER_EVALUATION_DELAY_MS, ANSWER_FEEDBACK_DELAY_MS, COMPLETION_THRESHOLD_SECS,
    FAST_COMPLETION_BONUS, LEAVE_AFTER_COMPLETE_MS, QUESTION_AWARD, SAVE_DEBOUNCE_MS,
    SLOW_COMPLETION_BONUS, STORY_ADVANCE_DELAY_MS,
};
use crate::error::{EngineError, PersistenceError};
use crate::navigator::Navigator;
use crate::normalizer::{is_correct_choice, is_correct_free_text, is_submittable};
use crate::progress_client::{ChangeKind, ProgressBackend, ProgressClient};
use crate::script::StoryScript;
use crate::timer::{format_clock, Clock, GameTimer};
use crate::types::{
    AnswerState, ChoiceSelection, CompletionOutcome, CompletionRequest, GameEvent, GameSnapshot,
    ProgressUpdate, SoundCue, StepKind, StepView, StoryStep,
};

mod scheduler;
mod session;
mod utils;

pub use self::scheduler::{Concern, ScheduledTransition, Scheduler, Transition, TransitionToken};
pub use self::session::GameSession;

use self::utils::floor_counter;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub story_advance_delay_ms: u64,
    pub answer_evaluation_delay_ms: u64,
    pub answer_feedback_delay_ms: u64,
    pub leave_after_complete_ms: u64,
    pub save_debounce_ms: u64,
    pub question_award: u32,
    pub completion_threshold_secs: u64,
    pub fast_completion_bonus: u32,
    pub slow_completion_bonus: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            story_advance_delay_ms: STORY_ADVANCE_DELAY_MS,
            answer_evaluation_delay_ms: ANSWER_EVALUATION_DELAY_MS,
            answer_feedback_delay_ms: ANSWER_FEEDBACK_DELAY_MS,
            leave_after_complete_ms: LEAVE_AFTER_COMPLETE_MS,
            save_debounce_ms: SAVE_DEBOUNCE_MS,
            question_award: QUESTION_AWARD,
            completion_threshold_secs: COMPLETION_THRESHOLD_SECS,
            fast_completion_bonus: FAST_COMPLETION_BONUS,
            slow_completion_bonus: SLOW_COMPLETION_BONUS,
        }
    }
}

impl EngineConfig {
    pub fn completion_bonus(&self, elapsed_secs: u64) -> u32 {
        if elapsed_secs < self.completion_threshold_secs {
            return self.fast_completion_bonus;
        }
        self.slow_completion_bonus
    }
}

/// Story-step state machine for one player in one room.
///
/// User actions apply synchronously. Delayed effects are queued on the
/// [`Scheduler`] and applied by [`GameEngine::poll`]; each one is bound to the
/// step visit that scheduled it and is dropped if the session has moved on.
pub struct GameEngine<B: ProgressBackend> {
    config: EngineConfig,
    script: Arc<StoryScript>,
    navigator: Navigator,
    timer: GameTimer,
    progress: ProgressClient<B>,
    scheduler: Scheduler,
    session: GameSession,
    awarded: HashSet<String>,
    events: Vec<GameEvent>,
    completed: bool,
    torn_down: bool,
}

impl<B: ProgressBackend> GameEngine<B> {
    pub fn new(
        script: Arc<StoryScript>,
        backend: B,
        clock: Arc<dyn Clock>,
        room_id: &str,
        config: EngineConfig,
    ) -> Self {
        let progress = ProgressClient::new(backend, room_id, config.save_debounce_ms);
        let mut engine = Self {
            config,
            navigator: Navigator::new(Arc::clone(&script)),
            script,
            timer: GameTimer::new(clock),
            progress,
            scheduler: Scheduler::new(),
            session: GameSession::default(),
            awarded: HashSet::new(),
            events: Vec::new(),
            completed: false,
            torn_down: false,
        };
        engine.enter_step(0);
        engine
    }

    pub fn room_id(&self) -> &str {
        self.progress.room_id()
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn current_step(&self) -> &StoryStep {
        self.script.step_at(self.session.current_step_index)
    }

    pub fn timer(&self) -> &GameTimer {
        &self.timer
    }

    pub fn progress(&self) -> &ProgressClient<B> {
        &self.progress
    }

    pub fn is_initialized(&self) -> bool {
        self.progress.is_initialized()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn pending_transitions(&self) -> usize {
        self.scheduler.len()
    }

    /// Loads saved progress once and starts the clock. Auto-save stays off
    /// until this succeeds.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        if self.torn_down || self.progress.is_initialized() {
            return Ok(());
        }
        match self.progress.load() {
            Ok(Some(saved)) => {
                let index = self.navigator.clamp(saved.current_step);
                self.session.score = saved.score;
                self.session.hints_used = saved.hints_used;
                // Solved steps were already paid for before the save.
                self.awarded = saved.solved_puzzles.iter().cloned().collect();
                self.session.solved_puzzles = saved.solved_puzzles;
                self.session.collected_items = saved.collected_items;
                self.timer.start_from(saved.time_elapsed);
                self.scheduler.cancel_all();
                self.enter_step(index);
                info!(
                    room_id = %self.room_id(),
                    step_id = %self.current_step().id,
                    score = saved.score,
                    "restored saved progress"
                );
            }
            Ok(None) => {
                self.timer.start();
                info!(room_id = %self.room_id(), "starting new game");
            }
            Err(error) => {
                self.note_persistence_error(&error);
                if !self.timer.is_started() {
                    self.timer.start();
                }
                return Err(error.into());
            }
        }
        Ok(())
    }

    /// Called by the typewriter display once a step's text is fully shown.
    pub fn text_complete(&mut self, step_id: &str) {
        if self.torn_down {
            return;
        }
        let script = Arc::clone(&self.script);
        let step = script.step_at(self.session.current_step_index);
        if step.id != step_id {
            debug!(step_id, current = %step.id, "ignoring text completion for another step");
            return;
        }
        if self.session.text_completed {
            return;
        }
        self.session.text_completed = true;

        match step.kind {
            StepKind::Story => {
                let transition = match &step.next_id {
                    Some(target) => Transition::JumpTo(target.clone()),
                    None => {
                        let index = self.session.current_step_index;
                        if self.navigator.next(index) == index {
                            return;
                        }
                        Transition::Advance
                    }
                };
                let delay = step
                    .advance_delay_ms
                    .unwrap_or(self.config.story_advance_delay_ms);
                self.schedule(Concern::StoryAdvance, delay, transition);
            }
            StepKind::Question | StepKind::Choice | StepKind::Success | StepKind::Failure => {
                self.session.interaction_visible = true;
            }
        }
    }

    pub fn set_answer_draft(&mut self, text: &str) {
        if self.torn_down || self.current_step().kind != StepKind::Question {
            return;
        }
        if matches!(
            self.session.answer_state,
            AnswerState::Evaluating | AnswerState::Correct
        ) {
            return;
        }
        self.session.answer_draft = text.to_string();
    }

    pub fn submit_answer(&mut self) {
        if self.torn_down {
            return;
        }
        let script = Arc::clone(&self.script);
        let step = script.step_at(self.session.current_step_index);
        if step.kind != StepKind::Question || !self.session.interaction_visible {
            return;
        }
        if self.session.answer_state != AnswerState::Idle
            || !is_submittable(&self.session.answer_draft)
        {
            return;
        }

        let canonical = step.correct_answer.as_deref().unwrap_or_default();
        let correct =
            is_correct_free_text(&self.session.answer_draft, canonical, &step.accepted_answers);
        self.session.answer_state = AnswerState::Evaluating;
        self.sound(SoundCue::Click);
        self.schedule(
            Concern::AnswerEvaluation,
            self.config.answer_evaluation_delay_ms,
            Transition::EvaluateAnswer { correct },
        );
    }

    pub fn select_choice(&mut self, key: &str) {
        if self.torn_down {
            return;
        }
        let script = Arc::clone(&self.script);
        let step = script.step_at(self.session.current_step_index);
        let Some(choice) = step.choice.as_ref() else {
            return;
        };
        if !self.session.interaction_visible || self.session.choice_selection.is_locked {
            return;
        }
        let Some(key) = choice.options.canonical_key(key) else {
            debug!(step_id = %step.id, key, "ignoring selection outside the choice set");
            return;
        };

        self.session.choice_selection = ChoiceSelection {
            selected_key: Some(key.clone()),
            is_locked: true,
            locked_at_ms: self.timer.now_ms(),
        };
        self.session.interaction_visible = false;
        self.sound(SoundCue::Click);
        self.schedule(
            Concern::ChoiceResolution,
            choice.resolution.delay_for(&key),
            Transition::ResolveChoice { key },
        );
    }

    /// Returns from a failure step to the step it was reached from.
    pub fn retry(&mut self) -> Result<(), EngineError> {
        if self.torn_down {
            return Ok(());
        }
        let script = Arc::clone(&self.script);
        let step = script.step_at(self.session.current_step_index);
        if step.kind != StepKind::Failure {
            return Ok(());
        }
        let Some(retry_id) = step.retry_id.as_deref() else {
            return Ok(());
        };
        let index = self.navigator.jump_to_id(retry_id)?;
        self.go_to(index);
        Ok(())
    }

    /// Reveals the current step's hint; each step visit counts once.
    pub fn use_hint(&mut self) {
        if self.torn_down || self.session.hint_revealed || self.current_step().hint.is_none() {
            return;
        }
        self.session.hint_revealed = true;
        self.session.hints_used += 1;
        self.note_state_change();
    }

    pub fn pause(&mut self) {
        self.timer.pause();
    }

    pub fn resume(&mut self) {
        self.timer.resume();
    }

    pub fn complete_game(&mut self) -> Result<Option<CompletionOutcome>, EngineError> {
        if self.torn_down || self.completed || self.progress.is_completing() {
            return Ok(None);
        }
        let step_id = self.current_step().id.clone();
        if self.current_step().kind != StepKind::Success {
            return Err(EngineError::NotOnSuccessStep(step_id));
        }

        let total_time = self.timer.elapsed_secs();
        let final_score = self.session.score + self.config.completion_bonus(total_time);
        let request = CompletionRequest {
            final_score,
            total_time,
            hints_used: self.session.hints_used,
        };

        let outcome = match self.progress.complete(&request) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.note_persistence_error(&error);
                return Err(error.into());
            }
        };

        self.timer.stop();
        self.completed = true;
        self.session.score = final_score;
        self.sound(SoundCue::Success);
        self.events.push(GameEvent::Completed {
            final_score,
            total_time,
            is_new_record: outcome.is_new_record,
        });
        info!(
            room_id = %self.room_id(),
            final_score,
            total_time,
            is_new_record = outcome.is_new_record,
            "game completed"
        );
        self.schedule(
            Concern::LeaveGame,
            self.config.leave_after_complete_ms,
            Transition::Leave,
        );
        Ok(Some(outcome))
    }

    /// Discards saved progress and starts over from the first step.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        if self.torn_down {
            return Ok(());
        }
        self.scheduler.cancel_all();
        let result = self.progress.reset();
        if let Err(error) = &result {
            self.note_persistence_error(error);
        }

        self.session = GameSession {
            visit: self.session.visit,
            ..GameSession::default()
        };
        self.awarded.clear();
        self.completed = false;
        self.timer.start();
        self.enter_step(0);
        result.map_err(EngineError::from)
    }

    /// Tears the session down, saving first when the player made progress.
    pub fn leave(&mut self) {
        if self.torn_down {
            return;
        }
        if !self.completed {
            let update = self.progress_update();
            if let Some(Err(error)) = self.progress.save_on_leave(&update) {
                self.note_persistence_error(&error);
            }
        }
        self.teardown();
    }

    /// Applies every transition due by now, then runs the debounced save.
    pub fn poll(&mut self) -> Result<(), EngineError> {
        if self.torn_down {
            return Ok(());
        }
        let now_ms = self.timer.now_ms();
        while let Some(scheduled) = self.scheduler.pop_due(now_ms) {
            self.fire(scheduled)?;
            if self.torn_down {
                return Ok(());
            }
        }

        if self.timer.is_running() && self.timer.take_second_change().is_some() {
            self.progress.note_change(ChangeKind::Time, now_ms);
        }
        let update = self.progress_update();
        if let Some(Err(error)) = self.progress.flush_due(now_ms, &update) {
            self.note_persistence_error(&error);
        }
        Ok(())
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> GameSnapshot {
        let step = self.current_step();
        let time_elapsed = self.timer.elapsed_secs();
        let elevator_floor = step.choice.as_ref().and_then(|choice| {
            floor_counter(choice, &self.session.choice_selection, self.timer.now_ms())
        });
        let revealed_hint = if self.session.hint_revealed {
            step.hint.clone()
        } else {
            None
        };

        GameSnapshot {
            room_id: self.room_id().to_string(),
            step_index: self.session.current_step_index,
            step: StepView::from(step),
            score: self.session.score,
            hints_used: self.session.hints_used,
            time_elapsed,
            formatted_time: format_clock(time_elapsed),
            interaction_visible: self.session.interaction_visible,
            answer_draft: self.session.answer_draft.clone(),
            answer_state: self.session.answer_state,
            choice_selection: self.session.choice_selection.clone(),
            elevator_floor,
            revealed_hint,
            is_initialized: self.progress.is_initialized(),
            is_saving: self.progress.is_saving(),
            is_completing: self.progress.is_completing(),
            is_completed: self.completed,
            events: if include_events {
                std::mem::take(&mut self.events)
            } else {
                Vec::new()
            },
        }
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn progress_update(&self) -> ProgressUpdate {
        ProgressUpdate {
            current_step: self.session.current_step_index,
            score: self.session.score,
            hints_used: self.session.hints_used,
            time_elapsed: self.timer.elapsed_secs(),
            collected_items: self.session.collected_items.clone(),
            solved_puzzles: self.session.solved_puzzles.clone(),
        }
    }

    fn fire(&mut self, scheduled: ScheduledTransition) -> Result<(), EngineError> {
        let current_id = &self.current_step().id;
        if scheduled.visit != self.session.visit || scheduled.step_id != *current_id {
            debug!(
                step_id = %scheduled.step_id,
                concern = ?scheduled.concern,
                "dropping stale transition"
            );
            return Ok(());
        }

        match scheduled.transition {
            Transition::Advance => {
                let index = self.navigator.next(self.session.current_step_index);
                if index != self.session.current_step_index {
                    self.go_to(index);
                }
            }
            Transition::JumpTo(target) => {
                let index = self.navigator.jump_to_id(&target)?;
                self.go_to(index);
            }
            Transition::EvaluateAnswer { correct } => self.finish_evaluation(correct),
            Transition::ClearIncorrect => {
                if self.session.answer_state == AnswerState::Incorrect {
                    self.session.answer_state = AnswerState::Idle;
                }
            }
            Transition::ResolveChoice { key } => self.resolve_choice(&key)?,
            Transition::Leave => self.teardown(),
        }
        Ok(())
    }

    fn finish_evaluation(&mut self, correct: bool) {
        let script = Arc::clone(&self.script);
        let step = script.step_at(self.session.current_step_index);
        if !correct {
            self.session.answer_state = AnswerState::Incorrect;
            self.sound(SoundCue::Error);
            self.schedule(
                Concern::AnswerFeedback,
                self.config.answer_feedback_delay_ms,
                Transition::ClearIncorrect,
            );
            return;
        }

        self.session.answer_state = AnswerState::Correct;
        self.sound(SoundCue::Success);
        self.session.mark_solved(&step.id);
        self.award(&step.id, self.config.question_award);
        let transition = match &step.next_id {
            Some(target) => Transition::JumpTo(target.clone()),
            None => Transition::Advance,
        };
        self.schedule(
            Concern::AnswerFeedback,
            self.config.answer_feedback_delay_ms,
            transition,
        );
    }

    fn resolve_choice(&mut self, key: &str) -> Result<(), EngineError> {
        let script = Arc::clone(&self.script);
        let step = script.step_at(self.session.current_step_index);
        let Some(choice) = step.choice.as_ref() else {
            return Ok(());
        };
        self.session.choice_selection = ChoiceSelection::default();

        let configured = step.correct_answer.as_deref().unwrap_or_default();
        let correct_key = choice
            .options
            .canonical_key(configured)
            .unwrap_or_else(|| configured.to_string());
        let target = if is_correct_choice(key, &correct_key) {
            self.sound(SoundCue::Success);
            self.session.mark_solved(&step.id);
            self.award(&step.id, choice.award);
            &choice.success_id
        } else {
            self.sound(SoundCue::Error);
            choice
                .failure_intermediate_id
                .as_ref()
                .unwrap_or(&choice.failure_id)
        };
        let index = self.navigator.jump_to_id(target)?;
        self.go_to(index);
        Ok(())
    }

    /// Awards are granted once per step for the whole session.
    fn award(&mut self, step_id: &str, amount: u32) {
        if !self.awarded.insert(step_id.to_string()) {
            debug!(step_id, "award already granted");
            return;
        }
        self.session.score += amount;
        self.events.push(GameEvent::ScoreAwarded {
            step_id: step_id.to_string(),
            amount,
            total: self.session.score,
        });
        self.note_state_change();
    }

    fn go_to(&mut self, index: usize) {
        self.scheduler.cancel_all();
        self.enter_step(index);
        self.note_state_change();
    }

    fn enter_step(&mut self, index: usize) {
        self.session.enter(index);
        let step_id = self.script.step_at(index).id.clone();
        debug!(room_id = %self.room_id(), step_id = %step_id, index, "entered step");
        self.events.push(GameEvent::StepEntered { step_id, index });
    }

    fn schedule(&mut self, concern: Concern, delay_ms: u64, transition: Transition) {
        let due_at_ms = self.timer.now_ms() + delay_ms;
        let step_id = self.current_step().id.clone();
        self.scheduler.schedule(
            concern,
            &step_id,
            self.session.visit,
            due_at_ms,
            transition,
        );
    }

    fn teardown(&mut self) {
        self.scheduler.cancel_all();
        self.progress.cancel_pending();
        self.timer.stop();
        self.torn_down = true;
        self.events.push(GameEvent::LeaveRequested);
    }

    fn note_state_change(&mut self) {
        let now_ms = self.timer.now_ms();
        self.progress.note_change(ChangeKind::State, now_ms);
    }

    fn note_persistence_error(&mut self, error: &PersistenceError) {
        if *error == PersistenceError::Unauthenticated {
            self.events.push(GameEvent::LoginRequired);
        }
    }

    fn sound(&mut self, cue: SoundCue) {
        self.events.push(GameEvent::Sound { cue });
    }
}
