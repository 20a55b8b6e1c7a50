use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::ScriptError;
use crate::types::{ChoiceSet, ResolutionDelay, StepKind, StoryStep};

mod samsung_sds;

pub use self::samsung_sds::samsung_sds_steps;

#[derive(Debug, Deserialize)]
struct ScriptFile {
    steps: Vec<StoryStep>,
}

/// Validated, immutable step catalogue with O(1) id lookup.
#[derive(Clone, Debug)]
pub struct StoryScript {
    steps: Vec<StoryStep>,
    index_by_id: HashMap<String, usize>,
}

impl StoryScript {
    pub fn new(steps: Vec<StoryStep>) -> Result<Self, ScriptError> {
        if steps.is_empty() {
            return Err(ScriptError::EmptyScript);
        }

        let mut index_by_id = HashMap::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            if index_by_id.insert(step.id.clone(), index).is_some() {
                return Err(ScriptError::DuplicateStepId(step.id.clone()));
            }
        }

        let script = Self { steps, index_by_id };
        for step in &script.steps {
            script.validate_step(step)?;
        }
        Ok(script)
    }

    pub fn samsung_sds() -> Result<Self, ScriptError> {
        Self::new(samsung_sds_steps())
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ScriptError> {
        let file: ScriptFile = serde_json::from_str(raw)?;
        Self::new(file.steps)
    }

    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let raw = fs::read_to_string(path)?;
        let script = Self::from_json_str(&raw)?;
        info!(path = %path.display(), steps = script.len(), "story script loaded");
        Ok(script)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Indices outside the script clamp to the last step.
    pub fn step_at(&self, index: usize) -> &StoryStep {
        &self.steps[index.min(self.steps.len() - 1)]
    }

    pub fn index_of_id(&self, id: &str) -> Result<usize, ScriptError> {
        self.index_by_id
            .get(id)
            .copied()
            .ok_or_else(|| ScriptError::UnknownStepId(id.to_string()))
    }

    pub fn steps(&self) -> &[StoryStep] {
        &self.steps
    }

    fn require_target(&self, id: &str) -> Result<(), ScriptError> {
        self.index_of_id(id).map(|_| ())
    }

    fn validate_step(&self, step: &StoryStep) -> Result<(), ScriptError> {
        let invalid = |reason: &str| ScriptError::InvalidStep {
            id: step.id.clone(),
            reason: reason.to_string(),
        };

        if let Some(next_id) = &step.next_id {
            self.require_target(next_id)?;
        }

        match step.kind {
            StepKind::Story | StepKind::Success => {}
            StepKind::Question => {
                let Some(answer) = &step.correct_answer else {
                    return Err(invalid("question step needs a correct answer"));
                };
                if answer.trim().is_empty() {
                    return Err(invalid("question step has an empty correct answer"));
                }
            }
            StepKind::Choice => {
                let Some(choice) = &step.choice else {
                    return Err(invalid("choice step needs a choice config"));
                };
                if choice.options.is_empty() {
                    return Err(invalid("choice step has no options"));
                }
                let Some(correct_key) = &step.correct_answer else {
                    return Err(invalid("choice step needs a correct key"));
                };
                if !choice.options.contains(correct_key) {
                    return Err(invalid("correct key is not one of the options"));
                }
                if matches!(choice.resolution, ResolutionDelay::Travel { .. })
                    && !matches!(choice.options, ChoiceSet::NumericRange { .. })
                {
                    return Err(invalid("travel resolution needs a numeric range"));
                }
                self.require_target(&choice.success_id)?;
                self.require_target(&choice.failure_id)?;
                if let Some(intermediate_id) = &choice.failure_intermediate_id {
                    self.require_target(intermediate_id)?;
                }
            }
            StepKind::Failure => {
                let Some(retry_id) = &step.retry_id else {
                    return Err(invalid("failure step needs a retry target"));
                };
                self.require_target(retry_id)?;
            }
        }
        Ok(())
    }
}
