// crates/sync-types/src/clock.rs
//
// The presentation clock (spec.md §4.7) — the pivot A/V sync is measured
// against. `clock_sync` is the wall-clock instant at which media-time 0
// "plays"; `media_time_now() == wall_now() - clock_sync`.
//
// Written only by play/pause/stop, read by the pull APIs — a single
// `Instant`-based snapshot, no lock needed beyond what the caller already
// holds for the rest of Player state.

use std::time::{Duration, Instant};

use crate::stream::PlayerState;

/// `clock_sync` is naturally modeled as "now minus an offset" rather than a
/// raw wall-clock instant, since `Instant` has no epoch to subtract a media
/// timestamp from directly. `offset` plays the role of spec.md's
/// `clock_sync`: media-time-now = `wall_now().duration_since(epoch) - offset`
/// is awkward with `Instant`, so instead we track `anchor: Instant` (the
/// instant media-time 0 played) directly — equivalent, simpler to reason
/// about, and still satisfies "clock_sync is monotonically non-decreasing
/// within a single playing segment" (spec.md §8) since `anchor` only moves
/// forward, by exactly the paused duration, on `play()` after a pause.
pub struct PresentationClock {
    anchor: Instant,
    pause_start: Option<Instant>,
    state: PlayerState,
}

impl PresentationClock {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
            pause_start: None,
            state: PlayerState::Stopped,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// `play()`: spec.md §4.7 — from `Stopped`, anchor media-time 0 at now;
    /// from `Paused`, shift the anchor forward by the paused duration so
    /// elapsed media time is preserved.
    pub fn play(&mut self) {
        match self.state {
            PlayerState::Playing => return,
            PlayerState::Stopped => {
                self.anchor = Instant::now();
            }
            PlayerState::Paused => {
                if let Some(pause_start) = self.pause_start.take() {
                    self.anchor += Instant::now().saturating_duration_since(pause_start);
                }
            }
        }
        self.state = PlayerState::Playing;
    }

    /// `pause()`: only valid from `Playing`.
    pub fn pause(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        self.pause_start = Some(Instant::now());
        self.state = PlayerState::Paused;
    }

    /// `stop()`: no anchor adjustment — the next `play()` restarts at
    /// media-time 0.
    pub fn stop(&mut self) {
        self.state = PlayerState::Stopped;
        self.pause_start = None;
    }

    /// Rebase the clock so `media_time_now()` reads exactly `t` right now.
    /// Used by `seek` (SPEC_FULL.md §4.12) — the synchronous-seek resolution
    /// of spec.md §9's open question.
    pub fn rebase_to(&mut self, t: f64) {
        let now = Instant::now();
        self.anchor = now
            .checked_sub(Duration::from_secs_f64(t.max(0.0)))
            .unwrap_or(now);
        if self.state == PlayerState::Paused {
            self.pause_start = Some(now);
        }
    }

    /// media-time-now = wall_now() - clock_sync. Meaningless (and unused by
    /// callers) outside `Playing`, but always well-defined.
    pub fn media_time_now(&self) -> f64 {
        let reference = match self.pause_start {
            Some(p) => p,
            None => Instant::now(),
        };
        reference.saturating_duration_since(self.anchor).as_secs_f64()
    }

    /// `get_player_position`: spec.md §6 returns `clock_sync` itself, here
    /// expressed as the anchor's age — the wall-clock distance since media
    /// time 0 played, which is what a host actually wants to observe.
    pub fn position(&self) -> f64 {
        self.media_time_now()
    }
}

impl Default for PresentationClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn play_then_pause_then_play_preserves_media_time() {
        let mut clock = PresentationClock::new();
        clock.play();
        sleep(Duration::from_millis(30));
        let before = clock.media_time_now();
        clock.pause();
        sleep(Duration::from_millis(50));
        clock.play();
        let after = clock.media_time_now();
        assert!((after - before).abs() < 0.05, "before={before} after={after}");
    }

    #[test]
    fn stop_restarts_at_media_time_zero() {
        let mut clock = PresentationClock::new();
        clock.play();
        sleep(Duration::from_millis(20));
        clock.stop();
        clock.play();
        assert!(clock.media_time_now() < 0.05);
    }

    #[test]
    fn rebase_to_lands_on_requested_time() {
        let mut clock = PresentationClock::new();
        clock.play();
        clock.rebase_to(12.5);
        assert!((clock.media_time_now() - 12.5).abs() < 0.01);
    }
}
