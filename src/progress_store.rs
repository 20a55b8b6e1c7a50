use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PersistenceError, StoreError};
use crate::progress_client::ProgressBackend;
use crate::types::{
    CompletionOutcome, CompletionRecord, CompletionRequest, PersistedProgress, ProgressUpdate,
};

const STORE_VERSION: u8 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameProgressRecord {
    pub id: String,
    pub user_id: String,
    pub room_id: String,
    pub current_step: usize,
    #[serde(default)]
    pub collected_items: Vec<String>,
    #[serde(default)]
    pub solved_puzzles: Vec<String>,
    pub hints_used: u32,
    pub score: u32,
    pub time_elapsed: u64,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub start_time: DateTime<Utc>,
    pub last_save_time: DateTime<Utc>,
}

impl GameProgressRecord {
    pub fn to_persisted(&self) -> PersistedProgress {
        PersistedProgress {
            room_id: self.room_id.clone(),
            current_step: self.current_step,
            score: self.score,
            hints_used: self.hints_used,
            time_elapsed: self.time_elapsed,
            collected_items: self.collected_items.clone(),
            solved_puzzles: self.solved_puzzles.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCompletionRecord {
    pub id: String,
    pub user_id: String,
    pub room_id: String,
    pub best_time: u64,
    pub total_attempts: u32,
    pub hints_used: u32,
    pub score: u32,
    pub completed_at: DateTime<Utc>,
}

impl RoomCompletionRecord {
    pub fn to_completion_record(&self) -> CompletionRecord {
        CompletionRecord {
            room_id: self.room_id.clone(),
            best_time: self.best_time,
            best_score: self.score,
            total_attempts: self.total_attempts,
            hints_used: self.hints_used,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionResult {
    pub completion: RoomCompletionRecord,
    pub is_new_record: bool,
}

#[derive(Serialize)]
struct ProgressStoreFile<'a> {
    version: u8,
    progress: &'a [GameProgressRecord],
    completions: &'a [RoomCompletionRecord],
}

#[derive(Deserialize)]
struct ProgressStoreFileRaw {
    version: u8,
    #[serde(default)]
    progress: Vec<serde_json::Value>,
    #[serde(default)]
    completions: Vec<serde_json::Value>,
}

/// Per-user game progress and best-of completion records, persisted to a
/// JSON file after every write.
pub struct ProgressStore {
    file_path: Option<PathBuf>,
    progress: Vec<GameProgressRecord>,
    completions: Vec<RoomCompletionRecord>,
}

pub type SharedProgressStore = Arc<Mutex<ProgressStore>>;

impl ProgressStore {
    pub fn new(file_path: PathBuf) -> Self {
        let (progress, completions) = load_records(&file_path);
        info!(
            path = %file_path.display(),
            progress = progress.len(),
            completions = completions.len(),
            "progress store loaded"
        );
        Self {
            file_path: Some(file_path),
            progress,
            completions,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            file_path: None,
            progress: Vec::new(),
            completions: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedProgressStore {
        Arc::new(Mutex::new(self))
    }

    /// The single in-progress record for a user in a room.
    pub fn get_progress(&self, user_id: &str, room_id: &str) -> Option<&GameProgressRecord> {
        self.progress
            .iter()
            .find(|record| is_active_for(record, user_id, room_id))
    }

    pub fn get_completion(&self, user_id: &str, room_id: &str) -> Option<&RoomCompletionRecord> {
        self.completions
            .iter()
            .find(|record| record.user_id == user_id && record.room_id == room_id)
    }

    pub fn upsert_progress(
        &mut self,
        user_id: &str,
        room_id: &str,
        update: &ProgressUpdate,
    ) -> GameProgressRecord {
        let now = Utc::now();
        let record = match self
            .progress
            .iter_mut()
            .find(|record| is_active_for(record, user_id, room_id))
        {
            Some(existing) => {
                existing.current_step = update.current_step;
                existing.collected_items = update.collected_items.clone();
                existing.solved_puzzles = update.solved_puzzles.clone();
                existing.hints_used = update.hints_used;
                existing.score = update.score;
                existing.time_elapsed = update.time_elapsed;
                existing.last_save_time = now;
                existing.clone()
            }
            None => {
                let created = GameProgressRecord {
                    id: new_record_id(),
                    user_id: user_id.to_string(),
                    room_id: room_id.to_string(),
                    current_step: update.current_step,
                    collected_items: update.collected_items.clone(),
                    solved_puzzles: update.solved_puzzles.clone(),
                    hints_used: update.hints_used,
                    score: update.score,
                    time_elapsed: update.time_elapsed,
                    is_completed: false,
                    completed_at: None,
                    start_time: now,
                    last_save_time: now,
                };
                self.progress.push(created.clone());
                created
            }
        };
        self.save();
        record
    }

    /// Closes the active run and folds it into the room's completion record.
    /// Best time and best score improve independently; hints follow the
    /// best-time run and every completion counts as an attempt.
    pub fn complete(
        &mut self,
        user_id: &str,
        room_id: &str,
        request: &CompletionRequest,
    ) -> CompletionResult {
        let now = Utc::now();
        for record in self
            .progress
            .iter_mut()
            .filter(|record| is_active_for(record, user_id, room_id))
        {
            record.is_completed = true;
            record.completed_at = Some(now);
            record.score = request.final_score;
            record.time_elapsed = request.total_time;
            record.hints_used = request.hints_used;
            record.last_save_time = now;
        }

        let existing = self
            .completions
            .iter_mut()
            .find(|record| record.user_id == user_id && record.room_id == room_id);
        let result = match existing {
            Some(current) => {
                let better_time = request.total_time < current.best_time;
                let better_score = request.final_score > current.score;
                if better_time {
                    current.best_time = request.total_time;
                    current.hints_used = request.hints_used;
                }
                if better_score {
                    current.score = request.final_score;
                }
                current.total_attempts += 1;
                current.completed_at = now;
                CompletionResult {
                    completion: current.clone(),
                    is_new_record: better_time || better_score,
                }
            }
            None => {
                let created = RoomCompletionRecord {
                    id: new_record_id(),
                    user_id: user_id.to_string(),
                    room_id: room_id.to_string(),
                    best_time: request.total_time,
                    total_attempts: 1,
                    hints_used: request.hints_used,
                    score: request.final_score,
                    completed_at: now,
                };
                self.completions.push(created.clone());
                CompletionResult {
                    completion: created,
                    is_new_record: true,
                }
            }
        };

        info!(
            user_id,
            room_id,
            best_time = result.completion.best_time,
            attempts = result.completion.total_attempts,
            is_new_record = result.is_new_record,
            "room completion recorded"
        );
        self.save();
        result
    }

    /// Drops the in-progress record; completed runs are kept.
    pub fn reset(&mut self, user_id: &str, room_id: &str) -> bool {
        let before = self.progress.len();
        self.progress
            .retain(|record| !is_active_for(record, user_id, room_id));
        let removed = self.progress.len() != before;
        if removed {
            self.save();
        }
        removed
    }

    fn save(&self) {
        let Some(path) = self.file_path.as_deref() else {
            return;
        };
        if let Err(error) = self.write_to(path) {
            warn!(path = %path.display(), %error, "failed to persist progress store");
        }
    }

    fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = ProgressStoreFile {
            version: STORE_VERSION,
            progress: &self.progress,
            completions: &self.completions,
        };
        let text = serde_json::to_string_pretty(&payload)?;
        // Readers only ever see a complete file.
        let staging = staging_path(path);
        fs::write(&staging, text)?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}

/// [`ProgressBackend`] for one player, backed by the shared store.
#[derive(Clone)]
pub struct StoreBackend {
    store: SharedProgressStore,
    user_id: Option<String>,
}

impl StoreBackend {
    pub fn new(store: SharedProgressStore, user_id: Option<String>) -> Self {
        Self { store, user_id }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn with_store<T>(
        &self,
        apply: impl FnOnce(&mut ProgressStore, &str) -> T,
    ) -> Result<T, PersistenceError> {
        let user_id = self
            .user_id
            .as_deref()
            .ok_or(PersistenceError::Unauthenticated)?;
        let mut guard = self
            .store
            .lock()
            .map_err(|_| PersistenceError::Transport("progress store lock poisoned".to_string()))?;
        Ok(apply(&mut *guard, user_id))
    }
}

impl ProgressBackend for StoreBackend {
    fn load_progress(
        &mut self,
        room_id: &str,
    ) -> Result<Option<PersistedProgress>, PersistenceError> {
        self.with_store(|store, user_id| {
            store
                .get_progress(user_id, room_id)
                .map(GameProgressRecord::to_persisted)
        })
    }

    fn save_progress(
        &mut self,
        room_id: &str,
        update: &ProgressUpdate,
    ) -> Result<PersistedProgress, PersistenceError> {
        self.with_store(|store, user_id| {
            store
                .upsert_progress(user_id, room_id, update)
                .to_persisted()
        })
    }

    fn complete_game(
        &mut self,
        room_id: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionOutcome, PersistenceError> {
        self.with_store(|store, user_id| {
            let result = store.complete(user_id, room_id, request);
            CompletionOutcome {
                completion: result.completion.to_completion_record(),
                is_new_record: result.is_new_record,
            }
        })
    }

    fn reset_progress(&mut self, room_id: &str) -> Result<(), PersistenceError> {
        self.with_store(|store, user_id| {
            store.reset(user_id, room_id);
        })
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn is_active_for(record: &GameProgressRecord, user_id: &str, room_id: &str) -> bool {
    !record.is_completed && record.user_id == user_id && record.room_id == room_id
}

fn new_record_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

fn load_records(path: &Path) -> (Vec<GameProgressRecord>, Vec<RoomCompletionRecord>) {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read progress store");
            }
            return (Vec::new(), Vec::new());
        }
    };
    let parsed = match serde_json::from_str::<ProgressStoreFileRaw>(&text) {
        Ok(value) if value.version == STORE_VERSION => value,
        Ok(value) => {
            warn!(path = %path.display(), version = value.version, "unsupported progress store version");
            return (Vec::new(), Vec::new());
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse progress store");
            return (Vec::new(), Vec::new());
        }
    };

    let mut progress: Vec<GameProgressRecord> = Vec::new();
    for raw in parsed.progress {
        let record: GameProgressRecord = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping invalid progress record");
                continue;
            }
        };
        if record.user_id.trim().is_empty() || record.room_id.trim().is_empty() {
            continue;
        }
        if record.is_completed {
            progress.push(record);
            continue;
        }
        // One active run per user and room: keep the most recently saved.
        match progress
            .iter_mut()
            .find(|current| is_active_for(current, &record.user_id, &record.room_id))
        {
            Some(current) if current.last_save_time < record.last_save_time => *current = record,
            Some(_) => {}
            None => progress.push(record),
        }
    }

    let mut completions: HashMap<(String, String), RoomCompletionRecord> = HashMap::new();
    for raw in parsed.completions {
        let record: RoomCompletionRecord = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping invalid completion record");
                continue;
            }
        };
        if record.user_id.trim().is_empty() || record.room_id.trim().is_empty() {
            continue;
        }
        let key = (record.user_id.clone(), record.room_id.clone());
        match completions.get_mut(&key) {
            Some(current) => {
                if record.best_time < current.best_time {
                    current.best_time = record.best_time;
                    current.hints_used = record.hints_used;
                }
                current.score = current.score.max(record.score);
                current.total_attempts += record.total_attempts;
                current.completed_at = current.completed_at.max(record.completed_at);
            }
            None => {
                completions.insert(key, record);
            }
        }
    }

    let mut completions: Vec<RoomCompletionRecord> = completions.into_values().collect();
    completions.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
    (progress, completions)
}
