//! Gesture feedback sink
//!
//! The detector reports motion cues and the final result through this
//! trait; playing sounds is up to the implementor.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait GestureFeedback: Send + Sync {
    /// Significant motion on one axis; `delta` sign gives the direction
    /// (positive = up / right).
    fn directional(&self, is_vertical: bool, delta: f64);

    /// A gesture was classified.
    fn confirmation(&self, is_yes: bool);
}

/// Discards every cue.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeedback;

impl GestureFeedback for NoFeedback {
    fn directional(&self, _is_vertical: bool, _delta: f64) {}

    fn confirmation(&self, _is_yes: bool) {}
}

const MIN_TIME_BETWEEN_SOUNDS: Duration = Duration::from_millis(150);
const MIN_TIME_BETWEEN_DIRECTION: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
struct CueTimes {
    vertical: Option<Instant>,
    up: Option<Instant>,
    down: Option<Instant>,
    horizontal: Option<Instant>,
    left: Option<Instant>,
    right: Option<Instant>,
}

fn within(last: Option<Instant>, now: Instant, window: Duration) -> bool {
    last.is_some_and(|t| now.saturating_duration_since(t) < window)
}

/// Rate-limits directional cues: one per axis every 150 ms and one per
/// direction every 200 ms. Confirmations always pass through.
pub struct ThrottledFeedback<F: GestureFeedback> {
    inner: F,
    times: Mutex<CueTimes>,
}

impl<F: GestureFeedback> ThrottledFeedback<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            times: Mutex::new(CueTimes::default()),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Returns whether the cue was forwarded
    pub fn directional_at(&self, is_vertical: bool, delta: f64, now: Instant) -> bool {
        let mut times = self
            .times
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let positive = delta > 0.0;

        let (axis, same_direction) = if is_vertical {
            let direction = if positive { times.up } else { times.down };
            (times.vertical, direction)
        } else {
            let direction = if positive { times.right } else { times.left };
            (times.horizontal, direction)
        };

        if within(axis, now, MIN_TIME_BETWEEN_SOUNDS) {
            tracing::trace!("Skipping directional cue, axis debounce");
            return false;
        }
        if within(same_direction, now, MIN_TIME_BETWEEN_DIRECTION) {
            tracing::trace!("Skipping directional cue, direction debounce");
            return false;
        }

        match (is_vertical, positive) {
            (true, true) => times.up = Some(now),
            (true, false) => times.down = Some(now),
            (false, true) => times.right = Some(now),
            (false, false) => times.left = Some(now),
        }
        if is_vertical {
            times.vertical = Some(now);
        } else {
            times.horizontal = Some(now);
        }
        drop(times);

        self.inner.directional(is_vertical, delta);
        true
    }
}

impl<F: GestureFeedback> GestureFeedback for ThrottledFeedback<F> {
    fn directional(&self, is_vertical: bool, delta: f64) {
        self.directional_at(is_vertical, delta, Instant::now());
    }

    fn confirmation(&self, is_yes: bool) {
        self.inner.confirmation(is_yes);
    }
}
