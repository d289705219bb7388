//! SM-2 scheduling for flashcard reviews.
//!
//! Quality is rated 0-5. Ratings of 3 and above count as a successful recall and grow the
//! interval; anything lower resets the card to a one-day interval. The ease factor is
//! adjusted on every review and never drops below [`MIN_EASE_FACTOR`].

use chrono::{DateTime, Duration, Utc};

use crate::models::{CardSchedulingState, MIN_EASE_FACTOR};

/// Lowest quality that counts as a successful recall.
pub const PASSING_QUALITY: i32 = 3;

/// Longest interval a card can be scheduled out, in days (about 100 years).
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Default)]
pub struct Sm2Scheduler;

impl Sm2Scheduler {
    pub fn new() -> Self {
        Self
    }

    /// Computes the state that follows rating `state` with `quality` at `now`.
    ///
    /// Quality is not range-checked; any integer yields a valid state.
    pub fn compute_next_review(
        &self,
        state: &CardSchedulingState,
        quality: i32,
        now: DateTime<Utc>,
    ) -> CardSchedulingState {
        let (interval, repetitions) = if quality >= PASSING_QUALITY {
            let interval = match state.repetitions {
                0 => 1,
                1 => 6,
                _ => (f64::from(state.interval) * state.ease_factor)
                    .round()
                    .min(f64::from(MAX_INTERVAL_DAYS)) as u32,
            };
            (interval.min(MAX_INTERVAL_DAYS), state.repetitions.saturating_add(1))
        } else {
            (1, 0)
        };

        let ease_factor = Self::next_ease_factor(state.ease_factor, quality);

        CardSchedulingState {
            card_id: state.card_id.clone(),
            ease_factor,
            interval,
            repetitions,
            next_review_at: now
                .checked_add_signed(Duration::days(i64::from(interval)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            last_reviewed_at: Some(now),
        }
    }

    // EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02)), floored at 1.3
    fn next_ease_factor(ease_factor: f64, quality: i32) -> f64 {
        let distance = 5.0 - f64::from(quality);
        let delta = 0.1 - distance * (0.08 + distance * 0.02);
        (ease_factor + delta).max(MIN_EASE_FACTOR)
    }
}
