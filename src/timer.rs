use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Millisecond time source. Elapsed time is always derived from two readings
/// of the clock, never from counting ticks.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock; clones share the same reading.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct GameTimer {
    clock: Arc<dyn Clock>,
    origin_ms: Option<u64>,
    offset_ms: u64,
    paused_at_ms: Option<u64>,
    stopped_at_ms: Option<u64>,
    last_reported_secs: Option<u64>,
}

impl GameTimer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            origin_ms: None,
            offset_ms: 0,
            paused_at_ms: None,
            stopped_at_ms: None,
            last_reported_secs: None,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn start(&mut self) {
        self.start_from(0);
    }

    /// Starts the timer as if `elapsed_secs` had already passed.
    pub fn start_from(&mut self, elapsed_secs: u64) {
        self.origin_ms = Some(self.clock.now_ms());
        self.offset_ms = elapsed_secs.saturating_mul(1_000);
        self.paused_at_ms = None;
        self.stopped_at_ms = None;
        self.last_reported_secs = None;
    }

    pub fn pause(&mut self) {
        if self.is_running() {
            self.paused_at_ms = Some(self.clock.now_ms());
        }
    }

    pub fn resume(&mut self) {
        if self.stopped_at_ms.is_some() {
            return;
        }
        let Some(paused_at) = self.paused_at_ms.take() else {
            return;
        };
        let paused_for = self.clock.now_ms().saturating_sub(paused_at);
        if let Some(origin) = self.origin_ms.as_mut() {
            *origin += paused_for;
        }
    }

    /// Freezes the reading; the last elapsed value stays available.
    pub fn stop(&mut self) {
        if self.origin_ms.is_none() || self.stopped_at_ms.is_some() {
            return;
        }
        let frozen_at = self.paused_at_ms.unwrap_or_else(|| self.clock.now_ms());
        self.stopped_at_ms = Some(frozen_at);
    }

    pub fn is_started(&self) -> bool {
        self.origin_ms.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.origin_ms.is_some() && self.paused_at_ms.is_none() && self.stopped_at_ms.is_none()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at_ms.is_some() && self.stopped_at_ms.is_none()
    }

    pub fn elapsed_ms(&self) -> u64 {
        let Some(origin) = self.origin_ms else {
            return self.offset_ms;
        };
        let reference = self
            .stopped_at_ms
            .or(self.paused_at_ms)
            .unwrap_or_else(|| self.clock.now_ms());
        self.offset_ms + reference.saturating_sub(origin)
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_ms() / 1_000
    }

    /// Returns the elapsed seconds when they changed since the last call.
    pub fn take_second_change(&mut self) -> Option<u64> {
        let secs = self.elapsed_secs();
        if self.last_reported_secs == Some(secs) {
            return None;
        }
        self.last_reported_secs = Some(secs);
        Some(secs)
    }

    pub fn time_bonus(&self, target_secs: u64) -> u64 {
        time_bonus(target_secs, self.elapsed_secs())
    }

    pub fn should_show_time_hint(&self, hint_times: &[u64]) -> bool {
        let elapsed = self.elapsed_secs();
        hint_times.iter().any(|time| elapsed >= *time)
    }
}

/// Ten points per second under the target; zero at or beyond it.
pub fn time_bonus(target_secs: u64, elapsed_secs: u64) -> u64 {
    target_secs.saturating_sub(elapsed_secs) * 10
}

pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn format_detailed(secs: u64) -> String {
    let hours = secs / 3_600;
    let mins = (secs % 3_600) / 60;
    let rest = secs % 60;
    if hours > 0 {
        format!("{hours}시간 {mins}분 {rest}초")
    } else if mins > 0 {
        format!("{mins}분 {rest}초")
    } else {
        format!("{rest}초")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer() -> (ManualClock, GameTimer) {
        let clock = ManualClock::new(10_000);
        let timer = GameTimer::new(Arc::new(clock.clone()));
        (clock, timer)
    }

    #[test]
    fn elapsed_follows_wall_clock_without_ticks() {
        let (clock, mut timer) = timer();
        assert_eq!(timer.elapsed_ms(), 0);
        timer.start();
        clock.advance(61_500);
        assert_eq!(timer.elapsed_secs(), 61);
    }

    #[test]
    fn pause_freezes_and_resume_skips_paused_duration() {
        let (clock, mut timer) = timer();
        timer.start();
        clock.advance(5_000);
        let before = timer.elapsed_ms();
        timer.pause();
        assert_eq!(timer.elapsed_ms(), before);

        clock.advance(30_000);
        assert_eq!(timer.elapsed_ms(), before);

        timer.resume();
        assert_eq!(timer.elapsed_ms(), before);
        clock.advance(2_000);
        assert_eq!(timer.elapsed_ms(), before + 2_000);
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let (clock, mut timer) = timer();
        timer.start();
        clock.advance(1_000);
        timer.pause();
        clock.advance(1_000);
        timer.pause();
        clock.advance(1_000);
        timer.resume();
        timer.resume();
        clock.advance(1_000);
        assert_eq!(timer.elapsed_ms(), 2_000);
    }

    #[test]
    fn stop_keeps_last_elapsed_value() {
        let (clock, mut timer) = timer();
        timer.start();
        clock.advance(42_000);
        timer.stop();
        clock.advance(100_000);
        assert_eq!(timer.elapsed_secs(), 42);
        assert!(!timer.is_running());

        timer.resume();
        clock.advance(1_000);
        assert_eq!(timer.elapsed_secs(), 42);
    }

    #[test]
    fn stop_while_paused_keeps_paused_value() {
        let (clock, mut timer) = timer();
        timer.start();
        clock.advance(3_000);
        timer.pause();
        clock.advance(7_000);
        timer.stop();
        assert_eq!(timer.elapsed_ms(), 3_000);
    }

    #[test]
    fn start_from_resumes_persisted_elapsed_time() {
        let (clock, mut timer) = timer();
        timer.start_from(90);
        clock.advance(10_000);
        assert_eq!(timer.elapsed_secs(), 100);

        timer.start();
        assert_eq!(timer.elapsed_secs(), 0);
    }

    #[test]
    fn second_changes_are_reported_once() {
        let (clock, mut timer) = timer();
        timer.start();
        assert_eq!(timer.take_second_change(), Some(0));
        clock.advance(400);
        assert_eq!(timer.take_second_change(), None);
        clock.advance(3_700);
        assert_eq!(timer.take_second_change(), Some(4));
    }

    #[test]
    fn time_bonus_is_non_increasing_and_never_negative() {
        let mut previous = u64::MAX;
        for elapsed in 0..400 {
            let bonus = time_bonus(300, elapsed);
            assert!(bonus <= previous);
            previous = bonus;
        }
        assert_eq!(time_bonus(300, 0), 3_000);
        assert_eq!(time_bonus(300, 250), 500);
        assert_eq!(time_bonus(300, 300), 0);
        assert_eq!(time_bonus(300, 301), 0);
    }

    #[test]
    fn time_hint_appears_after_first_threshold() {
        let (clock, mut timer) = timer();
        timer.start();
        assert!(!timer.should_show_time_hint(&[60, 120]));
        clock.advance(60_000);
        assert!(timer.should_show_time_hint(&[60, 120]));
        assert!(!timer.should_show_time_hint(&[]));
    }

    #[test]
    fn formatting_matches_display_conventions() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(125), "02:05");
        assert_eq!(format_detailed(5), "5초");
        assert_eq!(format_detailed(125), "2분 5초");
        assert_eq!(format_detailed(3_725), "1시간 2분 5초");
    }
}
