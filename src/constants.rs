pub const TICK_MS: u64 = 100;

pub const DEFAULT_ROOM_ID: &str = "samsung-sds";

pub const SAVE_DEBOUNCE_MS: u64 = 1_000;

pub const STORY_ADVANCE_DELAY_MS: u64 = 2_000;
pub const DOOM_ADVANCE_DELAY_MS: u64 = 3_000;
pub const ANSWER_EVALUATION_DELAY_MS: u64 = 1_000;
pub const ANSWER_FEEDBACK_DELAY_MS: u64 = 2_000;
pub const CHOICE_RESOLUTION_DELAY_MS: u64 = 2_000;
pub const LEAVE_AFTER_COMPLETE_MS: u64 = 3_000;

pub const ELEVATOR_ORIGIN_FLOOR: i64 = 1;
pub const ELEVATOR_TOP_FLOOR: i64 = 30;
pub const ELEVATOR_TARGET_FLOOR: i64 = 6;
pub const ELEVATOR_FLOOR_STEP_MS: u64 = 200;
pub const ELEVATOR_BASE_DELAY_MS: u64 = 1_000;

pub const QUESTION_AWARD: u32 = 10;
pub const ELEVATOR_AWARD: u32 = 20;
pub const CHOICE_AWARD: u32 = 15;

pub const COMPLETION_THRESHOLD_SECS: u64 = 300;
pub const FAST_COMPLETION_BONUS: u32 = 100;
pub const SLOW_COMPLETION_BONUS: u32 = 50;
