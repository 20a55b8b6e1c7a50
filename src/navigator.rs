use std::sync::Arc;

use crate::error::ScriptError;
use crate::script::StoryScript;

#[derive(Clone, Debug)]
pub struct Navigator {
    script: Arc<StoryScript>,
}

impl Navigator {
    pub fn new(script: Arc<StoryScript>) -> Self {
        Self { script }
    }

    pub fn script(&self) -> &StoryScript {
        &self.script
    }

    /// Linear advance; stays on the last step instead of running off the end.
    pub fn next(&self, current: usize) -> usize {
        let last = self.script.len() - 1;
        current.saturating_add(1).min(last)
    }

    pub fn jump_to_id(&self, id: &str) -> Result<usize, ScriptError> {
        self.script.index_of_id(id)
    }

    /// Bounds a persisted index before it is used as the current step.
    pub fn clamp(&self, index: usize) -> usize {
        index.min(self.script.len() - 1)
    }
}
