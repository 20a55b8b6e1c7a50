use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use escape_room_server::constants::{DEFAULT_ROOM_ID, TICK_MS};
use escape_room_server::engine::{EngineConfig, GameEngine};
use escape_room_server::progress_store::{ProgressStore, StoreBackend};
use escape_room_server::script::StoryScript;
use escape_room_server::timer::{format_detailed, ManualClock};
use escape_room_server::types::{ChoiceSet, CompletionRecord, GameEvent, StepKind, StoryStep};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MAX_TICKS: u64 = 20 * 60 * 15;

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays a story script headlessly and prints a JSON summary")]
struct Cli {
    /// JSON story script; the built-in room is used when omitted.
    #[arg(long)]
    script: Option<PathBuf>,
    #[arg(long)]
    room_id: Option<String>,
    /// Pick a losing option once at every choice step before winning.
    #[arg(long)]
    wrong_first: bool,
    /// Reveal every available hint.
    #[arg(long)]
    hints: bool,
    #[arg(long, default_value_t = TICK_MS)]
    tick_ms: u64,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
struct Strategy {
    wrong_first: bool,
    hints: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PlayerAction {
    Wait,
    Answer(String),
    Choose(String),
    Retry,
    Complete,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaythroughSummary {
    room_id: String,
    completed: bool,
    final_score: u32,
    total_time: u64,
    formatted_time: String,
    hints_used: u32,
    steps_visited: usize,
    failures: usize,
    ticks: u64,
    is_new_record: Option<bool>,
    completion: Option<CompletionRecord>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let script = match &cli.script {
        Some(path) => StoryScript::load(path)
            .with_context(|| format!("failed to load story script {}", path.display()))?,
        None => StoryScript::samsung_sds().context("built-in story script is invalid")?,
    };
    let room_id = cli
        .room_id
        .clone()
        .unwrap_or_else(|| DEFAULT_ROOM_ID.to_string());
    let strategy = Strategy {
        wrong_first: cli.wrong_first,
        hints: cli.hints,
    };

    let summary = play(script, &room_id, &strategy, cli.tick_ms.max(1))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(path) = cli.summary_out.as_ref() {
        write_summary(path, &summary)
            .with_context(|| format!("failed to write summary {}", path.display()))?;
    }
    if !summary.completed {
        bail!("playthrough did not reach the success step");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn play(
    script: StoryScript,
    room_id: &str,
    strategy: &Strategy,
    tick_ms: u64,
) -> anyhow::Result<PlaythroughSummary> {
    let clock = ManualClock::new(0);
    let store = ProgressStore::in_memory().into_shared();
    let backend = StoreBackend::new(store, Some("playthrough".to_string()));
    let mut engine = GameEngine::new(
        Arc::new(script),
        backend,
        Arc::new(clock.clone()),
        room_id,
        EngineConfig::default(),
    );
    engine.initialize()?;

    let mut lost_at: HashSet<String> = HashSet::new();
    let mut steps_visited = 0usize;
    let mut failures = 0usize;
    let mut completion: Option<CompletionRecord> = None;
    let mut is_new_record = None;
    let mut ticks = 0u64;

    while !engine.is_torn_down() {
        ticks += 1;
        if ticks > MAX_TICKS {
            warn!(ticks, "tick safety limit exceeded");
            break;
        }

        let step = engine.current_step().clone();
        engine.text_complete(&step.id);
        if strategy.hints && step.hint.is_some() {
            engine.use_hint();
        }
        match choose_action(&step, strategy, &lost_at) {
            PlayerAction::Wait => {}
            PlayerAction::Answer(answer) => {
                engine.set_answer_draft(&answer);
                engine.submit_answer();
            }
            PlayerAction::Choose(key) => {
                if !engine.session().choice_selection.is_locked {
                    if Some(key.as_str()) != step.correct_answer.as_deref() {
                        lost_at.insert(step.id.clone());
                    }
                    engine.select_choice(&key);
                }
            }
            PlayerAction::Retry => {
                failures += 1;
                engine.retry()?;
            }
            PlayerAction::Complete => {
                if !engine.is_completed() {
                    if let Some(outcome) = engine.complete_game()? {
                        is_new_record = Some(outcome.is_new_record);
                        completion = Some(outcome.completion);
                    }
                }
            }
        }

        clock.advance(tick_ms);
        engine.poll()?;
        steps_visited += engine
            .drain_events()
            .iter()
            .filter(|event| matches!(event, GameEvent::StepEntered { .. }))
            .count();
    }

    let session = engine.session();
    let total_time = engine.timer().elapsed_secs();
    info!(
        room_id,
        score = session.score,
        total_time,
        failures,
        "playthrough finished"
    );
    Ok(PlaythroughSummary {
        room_id: room_id.to_string(),
        completed: engine.is_completed(),
        final_score: session.score,
        total_time,
        formatted_time: format_detailed(total_time),
        hints_used: session.hints_used,
        steps_visited,
        failures,
        ticks,
        is_new_record,
        completion,
    })
}

fn choose_action(step: &StoryStep, strategy: &Strategy, lost_at: &HashSet<String>) -> PlayerAction {
    match step.kind {
        StepKind::Story => PlayerAction::Wait,
        StepKind::Question => step
            .correct_answer
            .clone()
            .map(PlayerAction::Answer)
            .unwrap_or(PlayerAction::Wait),
        StepKind::Choice => {
            let Some(correct) = step.correct_answer.clone() else {
                return PlayerAction::Wait;
            };
            if strategy.wrong_first && !lost_at.contains(&step.id) {
                if let Some(wrong) = step
                    .choice
                    .as_ref()
                    .and_then(|choice| losing_key(&choice.options, &correct))
                {
                    return PlayerAction::Choose(wrong);
                }
            }
            PlayerAction::Choose(correct)
        }
        StepKind::Failure => PlayerAction::Retry,
        StepKind::Success => PlayerAction::Complete,
    }
}

fn losing_key(options: &ChoiceSet, correct: &str) -> Option<String> {
    match options {
        ChoiceSet::Keys { options } => options
            .iter()
            .find(|option| option.key != correct)
            .map(|option| option.key.clone()),
        ChoiceSet::NumericRange { min, max } => [*max, *min]
            .into_iter()
            .map(|value| value.to_string())
            .find(|value| value != correct),
    }
}

fn write_summary(path: &Path, summary: &PlaythroughSummary) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, text)?;
    Ok(())
}
