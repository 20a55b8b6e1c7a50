use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("story script has no steps")]
    EmptyScript,

    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("unknown step id: {0}")]
    UnknownStepId(String),

    #[error("invalid step '{id}': {reason}")]
    InvalidStep { id: String, reason: String },

    #[error("failed to read story script: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse story script: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("login required")]
    Unauthenticated,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl PersistenceError {
    /// Transient failures are retried by the next debounced save.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PersistenceError::Transport(_))
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("current step '{0}' is not the terminal success step")]
    NotOnSuccessStep(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
