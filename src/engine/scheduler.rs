/// What a pending transition is for. At most one transition per concern is
/// outstanding; scheduling a second one replaces the first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Concern {
    StoryAdvance,
    AnswerEvaluation,
    AnswerFeedback,
    ChoiceResolution,
    LeaveGame,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Advance,
    JumpTo(String),
    EvaluateAnswer { correct: bool },
    ClearIncorrect,
    ResolveChoice { key: String },
    Leave,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransitionToken(u64);

/// A transition bound to the step visit it was scheduled from.
#[derive(Clone, Debug)]
pub struct ScheduledTransition {
    pub token: TransitionToken,
    pub concern: Concern,
    pub step_id: String,
    pub visit: u64,
    pub due_at_ms: u64,
    pub transition: Transition,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    next_token: u64,
    pending: Vec<ScheduledTransition>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(
        &mut self,
        concern: Concern,
        step_id: &str,
        visit: u64,
        due_at_ms: u64,
        transition: Transition,
    ) -> TransitionToken {
        self.cancel(concern);
        self.next_token += 1;
        let token = TransitionToken(self.next_token);
        self.pending.push(ScheduledTransition {
            token,
            concern,
            step_id: step_id.to_string(),
            visit,
            due_at_ms,
            transition,
        });
        token
    }

    pub fn cancel(&mut self, concern: Concern) -> bool {
        let before = self.pending.len();
        self.pending.retain(|entry| entry.concern != concern);
        self.pending.len() != before
    }

    pub fn cancel_token(&mut self, token: TransitionToken) -> bool {
        let before = self.pending.len();
        self.pending.retain(|entry| entry.token != token);
        self.pending.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, concern: Concern) -> bool {
        self.pending.iter().any(|entry| entry.concern == concern)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.pending.iter().map(|entry| entry.due_at_ms).min()
    }

    /// Removes and returns the earliest transition due at `now_ms`; ties fire
    /// in scheduling order.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<ScheduledTransition> {
        let position = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.due_at_ms <= now_ms)
            .min_by_key(|(_, entry)| (entry.due_at_ms, entry.token))
            .map(|(index, _)| index)?;
        Some(self.pending.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_transitions_fire_in_expiry_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Concern::StoryAdvance, "a", 1, 300, Transition::Advance);
        scheduler.schedule(Concern::AnswerFeedback, "a", 1, 100, Transition::ClearIncorrect);
        scheduler.schedule(
            Concern::ChoiceResolution,
            "a",
            1,
            100,
            Transition::ResolveChoice {
                key: "x".to_string(),
            },
        );

        assert!(scheduler.pop_due(50).is_none());
        let first = scheduler.pop_due(1_000).expect("first");
        let second = scheduler.pop_due(1_000).expect("second");
        let third = scheduler.pop_due(1_000).expect("third");
        assert_eq!(first.concern, Concern::AnswerFeedback);
        assert_eq!(second.concern, Concern::ChoiceResolution);
        assert_eq!(third.concern, Concern::StoryAdvance);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn rescheduling_a_concern_supersedes_the_previous_one() {
        let mut scheduler = Scheduler::new();
        let old = scheduler.schedule(
            Concern::ChoiceResolution,
            "elevator",
            1,
            2_000,
            Transition::ResolveChoice {
                key: "3".to_string(),
            },
        );
        scheduler.schedule(
            Concern::ChoiceResolution,
            "elevator",
            1,
            3_000,
            Transition::ResolveChoice {
                key: "6".to_string(),
            },
        );
        assert_eq!(scheduler.len(), 1);
        assert!(!scheduler.cancel_token(old));
        let fired = scheduler.pop_due(5_000).expect("resolution");
        assert_eq!(
            fired.transition,
            Transition::ResolveChoice {
                key: "6".to_string()
            }
        );
    }

    #[test]
    fn cancelled_transitions_never_fire() {
        let mut scheduler = Scheduler::new();
        let token = scheduler.schedule(Concern::StoryAdvance, "a", 1, 10, Transition::Advance);
        scheduler.schedule(Concern::LeaveGame, "end", 1, 10, Transition::Leave);
        assert!(scheduler.cancel_token(token));
        assert!(scheduler.cancel(Concern::LeaveGame));
        assert!(!scheduler.cancel(Concern::LeaveGame));
        assert!(scheduler.pop_due(u64::MAX).is_none());

        scheduler.schedule(Concern::StoryAdvance, "a", 2, 10, Transition::Advance);
        scheduler.cancel_all();
        assert_eq!(scheduler.next_due_ms(), None);
        assert!(!scheduler.is_pending(Concern::StoryAdvance));
    }
}
