use crate::types::{AnswerState, ChoiceSelection};

/// Mutable per-game state owned by one engine.
#[derive(Clone, Debug)]
pub struct GameSession {
    pub current_step_index: usize,
    pub score: u32,
    pub hints_used: u32,
    pub answer_draft: String,
    pub answer_state: AnswerState,
    pub choice_selection: ChoiceSelection,
    pub interaction_visible: bool,
    pub hint_revealed: bool,
    pub solved_puzzles: Vec<String>,
    pub collected_items: Vec<String>,
    pub(super) text_completed: bool,
    pub(super) visit: u64,
}

impl Default for GameSession {
    fn default() -> Self {
        Self {
            current_step_index: 0,
            score: 0,
            hints_used: 0,
            answer_draft: String::new(),
            answer_state: AnswerState::Idle,
            choice_selection: ChoiceSelection::default(),
            interaction_visible: false,
            hint_revealed: false,
            solved_puzzles: Vec::new(),
            collected_items: Vec::new(),
            text_completed: false,
            visit: 0,
        }
    }
}

impl GameSession {
    /// Clears everything scoped to a single visit of a step.
    pub(super) fn enter(&mut self, index: usize) {
        self.current_step_index = index;
        self.answer_draft.clear();
        self.answer_state = AnswerState::Idle;
        self.choice_selection = ChoiceSelection::default();
        self.interaction_visible = false;
        self.hint_revealed = false;
        self.text_completed = false;
        self.visit += 1;
    }

    pub(super) fn mark_solved(&mut self, step_id: &str) {
        if !self.solved_puzzles.iter().any(|id| id == step_id) {
            self.solved_puzzles.push(step_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entering_a_step_clears_visit_state_but_keeps_totals() {
        let mut session = GameSession {
            score: 30,
            hints_used: 2,
            answer_draft: "draft".to_string(),
            answer_state: AnswerState::Incorrect,
            interaction_visible: true,
            hint_revealed: true,
            ..GameSession::default()
        };
        session.choice_selection.is_locked = true;
        session.enter(4);

        assert_eq!(session.current_step_index, 4);
        assert_eq!(session.score, 30);
        assert_eq!(session.hints_used, 2);
        assert!(session.answer_draft.is_empty());
        assert_eq!(session.answer_state, AnswerState::Idle);
        assert!(!session.choice_selection.is_locked);
        assert!(!session.interaction_visible);
        assert!(!session.hint_revealed);
        assert_eq!(session.visit, 1);
    }

    #[test]
    fn solved_puzzles_are_recorded_once() {
        let mut session = GameSession::default();
        session.mark_solved("elevator-selection");
        session.mark_solved("elevator-selection");
        assert_eq!(session.solved_puzzles, vec!["elevator-selection"]);
    }
}
