use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Story,
    Question,
    Choice,
    Success,
    Failure,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub key: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChoiceSet {
    Keys { options: Vec<ChoiceOption> },
    NumericRange { min: i64, max: i64 },
}

impl ChoiceSet {
    pub fn contains(&self, key: &str) -> bool {
        self.canonical_key(key).is_some()
    }

    /// The stored form of a selection. Numeric keys are compared by value,
    /// so "06" and "+6" both become "6".
    pub fn canonical_key(&self, key: &str) -> Option<String> {
        match self {
            ChoiceSet::Keys { options } => options
                .iter()
                .find(|option| option.key == key)
                .map(|option| option.key.clone()),
            ChoiceSet::NumericRange { min, max } => key
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|value| (*min..=*max).contains(value))
                .map(|value| value.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ChoiceSet::Keys { options } => options.is_empty(),
            ChoiceSet::NumericRange { min, max } => max < min,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionDelay {
    Fixed {
        ms: u64,
    },
    /// Numeric choices animate from `origin` to the selected value.
    Travel {
        origin: i64,
        #[serde(rename = "perUnitMs")]
        per_unit_ms: u64,
        #[serde(rename = "baseMs")]
        base_ms: u64,
    },
}

impl ResolutionDelay {
    pub fn delay_for(&self, key: &str) -> u64 {
        match *self {
            ResolutionDelay::Fixed { ms } => ms,
            ResolutionDelay::Travel {
                origin,
                per_unit_ms,
                base_ms,
            } => match key.parse::<i64>() {
                Ok(value) => (value - origin).unsigned_abs() * per_unit_ms + base_ms,
                Err(_) => base_ms,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceConfig {
    pub options: ChoiceSet,
    pub resolution: ResolutionDelay,
    pub award: u32,
    pub success_id: String,
    pub failure_id: String,
    /// Story beat shown before `failure_id` on a losing selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_intermediate_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryStep {
    pub id: String,
    pub kind: StepKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    /// Alternative spellings accepted for a question step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accepted_answers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<ChoiceConfig>,
    /// Story: jump target after the text instead of the linear next step.
    /// Question: follow-up step after a correct answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advance_delay_ms: Option<u64>,
    /// Failure: step the player returns to on retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_id: Option<String>,
}

impl StoryStep {
    pub fn story(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: StepKind::Story,
            text: text.to_string(),
            image: None,
            question: None,
            correct_answer: None,
            accepted_answers: Vec::new(),
            hint: None,
            choice: None,
            next_id: None,
            advance_delay_ms: None,
            retry_id: None,
        }
    }

    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_image(mut self, image: &str) -> Self {
        self.image = Some(image.to_string());
        self
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }

    pub fn with_next(mut self, next_id: &str) -> Self {
        self.next_id = Some(next_id.to_string());
        self
    }

    pub fn with_advance_delay(mut self, delay_ms: u64) -> Self {
        self.advance_delay_ms = Some(delay_ms);
        self
    }

    pub fn question(id: &str, text: &str, question: &str, correct_answer: &str) -> Self {
        let mut step = Self::story(id, text).with_kind(StepKind::Question);
        step.question = Some(question.to_string());
        step.correct_answer = Some(correct_answer.to_string());
        step
    }

    pub fn with_accepted_answers(mut self, answers: &[&str]) -> Self {
        self.accepted_answers = answers.iter().map(|answer| answer.to_string()).collect();
        self
    }

    pub fn choice(id: &str, text: &str, correct_key: &str, choice: ChoiceConfig) -> Self {
        let mut step = Self::story(id, text).with_kind(StepKind::Choice);
        step.correct_answer = Some(correct_key.to_string());
        step.choice = Some(choice);
        step
    }

    pub fn failure(id: &str, text: &str, retry_id: &str) -> Self {
        let mut step = Self::story(id, text).with_kind(StepKind::Failure);
        step.retry_id = Some(retry_id.to_string());
        step
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
    Idle,
    Evaluating,
    Correct,
    Incorrect,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChoiceSelection {
    #[serde(rename = "selectedKey")]
    pub selected_key: Option<String>,
    #[serde(rename = "isLocked")]
    pub is_locked: bool,
    #[serde(skip)]
    pub locked_at_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    Click,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    Sound {
        cue: SoundCue,
    },
    StepEntered {
        #[serde(rename = "stepId")]
        step_id: String,
        index: usize,
    },
    ScoreAwarded {
        #[serde(rename = "stepId")]
        step_id: String,
        amount: u32,
        total: u32,
    },
    LoginRequired,
    Completed {
        #[serde(rename = "finalScore")]
        final_score: u32,
        #[serde(rename = "totalTime")]
        total_time: u64,
        #[serde(rename = "isNewRecord")]
        is_new_record: bool,
    },
    LeaveRequested,
}

/// Client-facing projection of a step; answers are never included.
#[derive(Clone, Debug, Serialize)]
pub struct StepView {
    pub id: String,
    pub kind: StepKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<ChoiceSet>,
}

impl From<&StoryStep> for StepView {
    fn from(step: &StoryStep) -> Self {
        Self {
            id: step.id.clone(),
            kind: step.kind,
            text: step.text.clone(),
            image: step.image.clone(),
            question: step.question.clone(),
            choices: step.choice.as_ref().map(|choice| choice.options.clone()),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct GameSnapshot {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "stepIndex")]
    pub step_index: usize,
    pub step: StepView,
    pub score: u32,
    #[serde(rename = "hintsUsed")]
    pub hints_used: u32,
    #[serde(rename = "timeElapsed")]
    pub time_elapsed: u64,
    #[serde(rename = "formattedTime")]
    pub formatted_time: String,
    #[serde(rename = "interactionVisible")]
    pub interaction_visible: bool,
    #[serde(rename = "answerDraft")]
    pub answer_draft: String,
    #[serde(rename = "answerState")]
    pub answer_state: AnswerState,
    #[serde(rename = "choiceSelection")]
    pub choice_selection: ChoiceSelection,
    #[serde(rename = "elevatorFloor", skip_serializing_if = "Option::is_none")]
    pub elevator_floor: Option<i64>,
    #[serde(rename = "revealedHint", skip_serializing_if = "Option::is_none")]
    pub revealed_hint: Option<String>,
    #[serde(rename = "isInitialized")]
    pub is_initialized: bool,
    #[serde(rename = "isSaving")]
    pub is_saving: bool,
    #[serde(rename = "isCompleting")]
    pub is_completing: bool,
    #[serde(rename = "isCompleted")]
    pub is_completed: bool,
    pub events: Vec<GameEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedProgress {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "currentStep")]
    pub current_step: usize,
    pub score: u32,
    #[serde(rename = "hintsUsed")]
    pub hints_used: u32,
    #[serde(rename = "timeElapsed")]
    pub time_elapsed: u64,
    #[serde(rename = "collectedItems", default)]
    pub collected_items: Vec<String>,
    #[serde(rename = "solvedPuzzles", default)]
    pub solved_puzzles: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(rename = "currentStep")]
    pub current_step: usize,
    pub score: u32,
    #[serde(rename = "hintsUsed")]
    pub hints_used: u32,
    #[serde(rename = "timeElapsed")]
    pub time_elapsed: u64,
    #[serde(rename = "collectedItems", default)]
    pub collected_items: Vec<String>,
    #[serde(rename = "solvedPuzzles", default)]
    pub solved_puzzles: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(rename = "finalScore")]
    pub final_score: u32,
    #[serde(rename = "totalTime")]
    pub total_time: u64,
    #[serde(rename = "hintsUsed")]
    pub hints_used: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "bestTime")]
    pub best_time: u64,
    #[serde(rename = "bestScore")]
    pub best_score: u32,
    #[serde(rename = "totalAttempts")]
    pub total_attempts: u32,
    #[serde(rename = "hintsUsed")]
    pub hints_used: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub completion: CompletionRecord,
    #[serde(rename = "isNewRecord")]
    pub is_new_record: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_range_accepts_only_in_range_integers() {
        let set = ChoiceSet::NumericRange { min: 1, max: 30 };
        assert!(set.contains("1"));
        assert!(set.contains("30"));
        assert!(!set.contains("0"));
        assert!(!set.contains("31"));
        assert!(!set.contains("six"));
    }

    #[test]
    fn numeric_keys_are_canonicalized_by_value() {
        let set = ChoiceSet::NumericRange { min: 1, max: 30 };
        assert_eq!(set.canonical_key("06").as_deref(), Some("6"));
        assert_eq!(set.canonical_key("+6").as_deref(), Some("6"));
        assert_eq!(set.canonical_key(" 12 ").as_deref(), Some("12"));
        assert_eq!(set.canonical_key("031"), None);

        let keys = ChoiceSet::Keys {
            options: vec![ChoiceOption {
                key: "pink".to_string(),
                label: "Pink".to_string(),
            }],
        };
        assert_eq!(keys.canonical_key("pink").as_deref(), Some("pink"));
        assert_eq!(keys.canonical_key("Pink"), None);
    }

    #[test]
    fn travel_delay_is_proportional_to_distance() {
        let delay = ResolutionDelay::Travel {
            origin: 1,
            per_unit_ms: 200,
            base_ms: 1_000,
        };
        assert_eq!(delay.delay_for("1"), 1_000);
        assert_eq!(delay.delay_for("6"), 2_000);
        assert_eq!(delay.delay_for("oops"), 1_000);
        assert_eq!(ResolutionDelay::Fixed { ms: 2_000 }.delay_for("pink"), 2_000);
    }

    #[test]
    fn step_view_hides_answers() {
        let step = StoryStep::question("q", "text", "prompt?", "secret");
        let json = serde_json::to_string(&StepView::from(&step)).expect("serialize");
        assert!(!json.contains("secret"));
        assert!(json.contains("prompt?"));
    }

    #[test]
    fn story_step_deserializes_from_camel_case_json() {
        let raw = r#"{
  "id": "umbrella-problem",
  "kind": "choice",
  "text": "pick one",
  "correctAnswer": "pink",
  "choice": {
    "options": {"type": "keys", "options": [{"key": "pink", "label": "Pink"}]},
    "resolution": {"type": "fixed", "ms": 2000},
    "award": 15,
    "successId": "umbrella-success",
    "failureId": "umbrella-failure",
    "failureIntermediateId": "umbrella-monster-encounter"
  }
}"#;
        let step: StoryStep = serde_json::from_str(raw).expect("parse step");
        assert_eq!(step.kind, StepKind::Choice);
        let choice = step.choice.expect("choice config");
        assert_eq!(
            choice.failure_intermediate_id.as_deref(),
            Some("umbrella-monster-encounter")
        );
        assert!(step.accepted_answers.is_empty());
    }
}
