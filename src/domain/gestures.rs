//! Head gesture detection
//!
//! Classifies a nod ("yes") or a shake ("no") from the horizontal/vertical
//! motion fields of the head-tracking stream. Samples are smoothed, direction
//! reversals above a variance-scaled threshold become extrema, and a periodic
//! check scores the most recent extrema on amplitude, rhythm, alternation and
//! isolation from the other axis.

use crate::domain::feedback::GestureFeedback;
use crate::domain::settings::GestureSettings;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadGesture {
    /// Vertical nod
    Yes,
    /// Horizontal shake
    No,
}

impl HeadGesture {
    pub fn is_yes(&self) -> bool {
        matches!(self, Self::Yes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// A local peak or trough of the smoothed series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    pub index: u64,
    pub value: f64,
    pub timestamp: Instant,
}

/// Significant per-sample motion, used for directional feedback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionCue {
    pub axis: Axis,
    pub delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Out of range, nothing changed
    Rejected,
    Accepted(Option<MotionCue>),
}

#[derive(Debug)]
struct AxisTrack {
    smoothing: VecDeque<f64>,
    history: VecDeque<f64>,
    increasing: Option<bool>,
    peaks: VecDeque<Extremum>,
    troughs: VecDeque<Extremum>,
    previous_raw: f64,
}

impl AxisTrack {
    fn new(settings: &GestureSettings) -> Self {
        Self {
            smoothing: std::iter::repeat(0.0)
                .take(settings.smoothing_window)
                .collect(),
            history: VecDeque::with_capacity(settings.history_size),
            increasing: None,
            peaks: VecDeque::new(),
            troughs: VecDeque::new(),
            previous_raw: 0.0,
        }
    }

    fn smooth(&mut self, value: f64, window: usize) -> f64 {
        self.smoothing.push_back(value);
        while self.smoothing.len() > window {
            self.smoothing.pop_front();
        }
        self.smoothing.iter().sum::<f64>() / self.smoothing.len() as f64
    }

    fn push_history(&mut self, value: f64, limit: usize) {
        self.history.push_back(value);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    fn extrema_count(&self) -> usize {
        self.peaks.len() + self.troughs.len()
    }

    /// Peaks and troughs merged in sample order
    fn extrema(&self) -> Vec<Extremum> {
        let mut all: Vec<Extremum> = self.peaks.iter().chain(self.troughs.iter()).copied().collect();
        all.sort_by_key(|e| e.index);
        all
    }

    fn recent_mean_abs(&self, count: usize) -> f64 {
        let skip = self.history.len().saturating_sub(count);
        let values: Vec<f64> = self.history.iter().skip(skip).map(|v| v.abs()).collect();
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Synchronous detection state for one session.
#[derive(Debug)]
pub struct GestureEngine {
    settings: GestureSettings,
    horizontal: AxisTrack,
    vertical: AxisTrack,
    sample_index: u64,
    last_extremum_at: Option<Instant>,
    intervals: VecDeque<Duration>,
}

impl GestureEngine {
    pub fn new(settings: GestureSettings) -> Self {
        Self {
            horizontal: AxisTrack::new(&settings),
            vertical: AxisTrack::new(&settings),
            settings,
            sample_index: 0,
            last_extremum_at: None,
            intervals: VecDeque::new(),
        }
    }

    /// Drop all buffers, extrema and interval history
    pub fn reset(&mut self) {
        self.horizontal = AxisTrack::new(&self.settings);
        self.vertical = AxisTrack::new(&self.settings);
        self.sample_index = 0;
        self.last_extremum_at = None;
        self.intervals.clear();
    }

    fn track(&self, axis: Axis) -> &AxisTrack {
        match axis {
            Axis::Horizontal => &self.horizontal,
            Axis::Vertical => &self.vertical,
        }
    }

    pub fn extrema_count(&self, axis: Axis) -> usize {
        self.track(axis).extrema_count()
    }

    pub fn extrema(&self, axis: Axis) -> Vec<Extremum> {
        self.track(axis).extrema()
    }

    pub fn history_len(&self) -> usize {
        self.vertical.history.len()
    }

    pub fn ingest(&mut self, horizontal: f64, vertical: f64, now: Instant) -> SampleOutcome {
        let limit = self.settings.max_valid_orientation;
        if horizontal.abs() > limit || vertical.abs() > limit {
            debug!(
                "Ignoring likely calibration data: h={}, v={}",
                horizontal, vertical
            );
            return SampleOutcome::Rejected;
        }

        let cue = self.motion_cue(horizontal, vertical);
        self.horizontal.previous_raw = horizontal;
        self.vertical.previous_raw = vertical;

        let window = self.settings.smoothing_window;
        let history = self.settings.history_size;
        let smooth_horizontal = self.horizontal.smooth(horizontal, window);
        let smooth_vertical = self.vertical.smooth(vertical, window);
        self.horizontal.push_history(smooth_horizontal, history);
        self.vertical.push_history(smooth_vertical, history);
        self.sample_index += 1;

        self.detect_peaks_and_troughs(now);

        SampleOutcome::Accepted(cue)
    }

    fn motion_cue(&self, horizontal: f64, vertical: f64) -> Option<MotionCue> {
        let horizontal_delta = horizontal - self.horizontal.previous_raw;
        let vertical_delta = vertical - self.vertical.previous_raw;
        let threshold = self.settings.immediate_feedback_threshold;

        let significant_horizontal = horizontal_delta.abs() > threshold;
        let significant_vertical = vertical_delta.abs() > threshold;

        if significant_horizontal
            && (!significant_vertical || horizontal_delta.abs() >= vertical_delta.abs())
        {
            debug!("Significant HORIZONTAL movement: {}", horizontal_delta);
            Some(MotionCue {
                axis: Axis::Horizontal,
                delta: horizontal_delta,
            })
        } else if significant_vertical {
            debug!("Significant VERTICAL movement: {}", vertical_delta);
            Some(MotionCue {
                axis: Axis::Vertical,
                delta: vertical_delta,
            })
        } else {
            None
        }
    }

    fn detect_peaks_and_troughs(&mut self, now: Instant) {
        if self.horizontal.history.len() < 4 || self.vertical.history.len() < 4 {
            return;
        }
        for axis in [Axis::Horizontal, Axis::Vertical] {
            if let Some(extremum_time) = self.process_direction_change(axis, now) {
                self.record_interval(extremum_time);
            }
        }
    }

    /// Update the direction flag of one axis; returns the timestamp of a newly
    /// recorded extremum.
    fn process_direction_change(&mut self, axis: Axis, now: Instant) -> Option<Instant> {
        let settings = &self.settings;
        // The extremum is the previous sample
        let index = self.sample_index.saturating_sub(2);
        let track = match axis {
            Axis::Horizontal => &mut self.horizontal,
            Axis::Vertical => &mut self.vertical,
        };

        let len = track.history.len();
        let current = track.history[len - 1];
        let prev = track.history[len - 2];
        let last_four: Vec<f64> = track.history.iter().skip(len - 4).copied().collect();

        let threshold = settings
            .min_direction_change
            .max(settings.direction_change_sensitivity.min(variance(&last_four) / 3.0));
        let increasing = track.increasing.unwrap_or(current > prev);

        let mut recorded = None;
        let extremum = Extremum {
            index,
            value: prev,
            timestamp: now,
        };

        if increasing && current < prev - threshold {
            if prev.abs() > settings.peak_threshold {
                track.peaks.push_back(extremum);
                while track.peaks.len() > settings.history_size {
                    track.peaks.pop_front();
                }
                recorded = Some(now);
            }
            track.increasing = Some(false);
        } else if !increasing && current > prev + threshold {
            if prev.abs() > settings.peak_threshold {
                track.troughs.push_back(extremum);
                while track.troughs.len() > settings.history_size {
                    track.troughs.pop_front();
                }
                recorded = Some(now);
            }
            track.increasing = Some(true);
        } else {
            track.increasing = Some(increasing);
        }

        if recorded.is_some() {
            debug!("{:?} extremum {:.1} at sample {}", axis, prev, index);
        }
        recorded
    }

    fn record_interval(&mut self, at: Instant) {
        if let Some(last) = self.last_extremum_at {
            self.intervals.push_back(at.saturating_duration_since(last));
            while self.intervals.len() > self.settings.interval_history {
                self.intervals.pop_front();
            }
        }
        self.last_extremum_at = Some(at);
    }

    /// Fast motion is more jitter prone and must show more extrema.
    pub fn required_extremes(&self) -> usize {
        if self.intervals.is_empty() {
            return self.settings.min_required_extremes;
        }
        let millis: Vec<f64> = self
            .intervals
            .iter()
            .map(|d| d.as_nanos() as f64 / 1_000_000.0)
            .collect();
        if mean(&millis) < self.settings.fast_movement_threshold_ms {
            self.settings.max_required_extremes
        } else {
            self.settings.min_required_extremes
        }
    }

    fn rhythm_consistency(&self) -> f64 {
        if self.intervals.len() < 2 {
            return 0.0;
        }
        let seconds: Vec<f64> = self.intervals.iter().map(|d| d.as_secs_f64()).collect();
        let mean_interval = mean(&seconds);
        if mean_interval == 0.0 {
            return 0.0;
        }
        let deviations: Vec<f64> = seconds
            .iter()
            .map(|i| (i / mean_interval - 1.0).powi(2))
            .collect();
        let consistency =
            1.0 - (mean(&deviations) / self.settings.rhythm_consistency_threshold).min(1.0);
        consistency.max(0.0)
    }

    /// Confidence that the recent extrema on `axis` form a deliberate gesture
    pub fn confidence(&self, axis: Axis) -> f64 {
        let required = self.required_extremes();
        let extrema = self.track(axis).extrema();
        if extrema.len() < required || required == 0 {
            return 0.0;
        }
        let recent = &extrema[extrema.len() - required..];

        let amplitudes: Vec<f64> = recent.iter().map(|e| e.value.abs()).collect();
        let amplitude = mean(&amplitudes);
        let amplitude_factor = (amplitude / self.settings.amplitude_reference).min(1.0);

        let rhythm_factor = self.rhythm_consistency();

        let alternating = recent
            .windows(2)
            .all(|pair| (pair[0].value > 0.0) != (pair[1].value > 0.0));
        let alternation_factor = if alternating { 1.0 } else { 0.5 };

        let other = match axis {
            Axis::Horizontal => &self.vertical,
            Axis::Vertical => &self.horizontal,
        };
        let other_amplitude = other.recent_mean_abs(recent.len() * 2);
        let isolation_factor = (amplitude / (other_amplitude + 0.1) * 1.2).min(1.0);

        amplitude_factor * 0.4 + rhythm_factor * 0.2 + alternation_factor * 0.2 + isolation_factor * 0.2
    }

    /// Vertical is checked first.
    pub fn evaluate(&self) -> Option<HeadGesture> {
        let required = self.required_extremes();
        let min_confidence = self.settings.min_confidence;

        for (axis, gesture) in [(Axis::Vertical, HeadGesture::Yes), (Axis::Horizontal, HeadGesture::No)] {
            if self.extrema_count(axis) < required {
                continue;
            }
            let confidence = self.confidence(axis);
            debug!(
                "{:?} motion confidence: {:.2} (need {})",
                axis, confidence, min_confidence
            );
            if confidence >= min_confidence {
                info!(
                    "{:?} gesture detected (confidence: {:.2}, extremes: {}/{})",
                    gesture,
                    confidence,
                    self.extrema_count(axis),
                    required
                );
                return Some(gesture);
            }
        }
        None
    }
}

/// Switches the device's head-tracking stream on and off. Called while the
/// detector's session lock is held, so implementations must only queue bytes
/// and never call back into the detector.
pub trait HeadTrackingControl: Send + Sync {
    fn start_stream(&self);
    fn stop_stream(&self);
}

pub type GestureCallback = Box<dyn FnOnce(bool) + Send + 'static>;

struct Shared {
    engine: GestureEngine,
    /// Id of the active session
    session: Option<u64>,
}

/// Runs at most one detection session at a time; samples come from the
/// frame reader while a background task evaluates every few milliseconds.
pub struct GestureDetector {
    shared: Arc<Mutex<Shared>>,
    next_session: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
    control: Arc<dyn HeadTrackingControl>,
    feedback: Arc<dyn GestureFeedback>,
    evaluation_interval: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GestureDetector {
    pub fn new(
        settings: GestureSettings,
        control: Arc<dyn HeadTrackingControl>,
        feedback: Arc<dyn GestureFeedback>,
    ) -> Self {
        let evaluation_interval = Duration::from_millis(settings.evaluation_interval_ms.max(1));
        Self {
            shared: Arc::new(Mutex::new(Shared {
                engine: GestureEngine::new(settings),
                session: None,
            })),
            next_session: AtomicU64::new(1),
            task: Mutex::new(None),
            control,
            feedback,
            evaluation_interval,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared).session.is_some()
    }

    /// Start a session. Does nothing while one is already running or when
    /// called outside a tokio runtime.
    pub fn start_detection<F>(&self, do_not_stop: bool, on_gesture: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot start gesture detection without a runtime: {}", e);
                return;
            }
        };

        let session = {
            let mut shared = lock(&self.shared);
            if shared.session.is_some() {
                return;
            }
            let session = self.next_session.fetch_add(1, Ordering::Relaxed);
            shared.session = Some(session);
            shared.engine.reset();
            info!("Starting gesture detection...");
            self.control.start_stream();
            session
        };

        let task = runtime.spawn(run_session(
            self.shared.clone(),
            session,
            self.evaluation_interval,
            do_not_stop,
            self.control.clone(),
            self.feedback.clone(),
            Box::new(on_gesture),
        ));

        if let Some(previous) = lock(&self.task).replace(task) {
            previous.abort();
        }
    }

    /// End the current session, if any. Never blocks on the evaluation task.
    pub fn stop_detection(&self, do_not_stop: bool) {
        {
            let mut shared = lock(&self.shared);
            if shared.session.take().is_none() {
                return;
            }
            shared.engine.reset();
            info!("Stopping gesture detection");
            if !do_not_stop {
                self.control.stop_stream();
            }
        }

        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }

    /// Feed one motion sample. Ignored when no session is running.
    pub fn process_sample(&self, horizontal: i32, vertical: i32) {
        self.process_sample_at(horizontal, vertical, Instant::now());
    }

    pub fn process_sample_at(&self, horizontal: i32, vertical: i32, now: Instant) {
        let outcome = {
            let mut shared = lock(&self.shared);
            if shared.session.is_none() {
                return;
            }
            shared.engine.ingest(horizontal as f64, vertical as f64, now)
        };

        if let SampleOutcome::Accepted(Some(cue)) = outcome {
            self.feedback
                .directional(cue.axis == Axis::Vertical, cue.delta);
        }
    }

    /// Inspect the engine of the running session
    pub fn with_engine<R>(&self, f: impl FnOnce(&GestureEngine) -> R) -> R {
        f(&lock(&self.shared).engine)
    }
}

impl Drop for GestureDetector {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

async fn run_session(
    shared: Arc<Mutex<Shared>>,
    session: u64,
    period: Duration,
    do_not_stop: bool,
    control: Arc<dyn HeadTrackingControl>,
    feedback: Arc<dyn GestureFeedback>,
    on_gesture: GestureCallback,
) {
    loop {
        tokio::time::sleep(period).await;

        let gesture = {
            let mut shared = lock(&shared);
            if shared.session != Some(session) {
                return;
            }
            let gesture = shared.engine.evaluate();
            if gesture.is_some() {
                shared.session = None;
                shared.engine.reset();
                if !do_not_stop {
                    control.stop_stream();
                }
            }
            gesture
        };

        // The stream is already stopped, so the callback may start a new session
        if let Some(gesture) = gesture {
            feedback.confirmation(gesture.is_yes());
            on_gesture(gesture.is_yes());
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feedback::tests::RecordingFeedback;
    use crate::domain::feedback::NoFeedback;
    use std::f64::consts::PI;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    const STEP: Duration = Duration::from_millis(25);

    /// `cycles` periods of a 500 ms sine sampled every 25 ms
    fn sine(amplitude: f64, cycles: usize) -> Vec<f64> {
        (0..cycles * 20)
            .map(|k| amplitude * (2.0 * PI * k as f64 / 20.0).sin())
            .collect()
    }

    fn feed(engine: &mut GestureEngine, samples: &[(f64, f64)]) {
        let t0 = Instant::now();
        for (k, (h, v)) in samples.iter().enumerate() {
            engine.ingest(*h, *v, t0 + STEP * k as u32);
        }
    }

    #[test]
    fn test_vertical_nod_is_yes() {
        let mut engine = GestureEngine::new(GestureSettings::default());
        let samples: Vec<(f64, f64)> = sine(800.0, 4).into_iter().map(|v| (0.0, v)).collect();
        feed(&mut engine, &samples);

        assert!(engine.extrema_count(Axis::Vertical) >= 4);
        assert_eq!(engine.extrema_count(Axis::Horizontal), 0);
        // Extrema every 250 ms count as fast motion
        assert_eq!(engine.required_extremes(), 4);
        assert!(engine.confidence(Axis::Vertical) >= 0.7);
        assert_eq!(engine.evaluate(), Some(HeadGesture::Yes));
    }

    #[test]
    fn test_horizontal_shake_is_no() {
        let mut engine = GestureEngine::new(GestureSettings::default());
        let samples: Vec<(f64, f64)> = sine(800.0, 4).into_iter().map(|h| (h, 0.0)).collect();
        feed(&mut engine, &samples);

        assert_eq!(engine.extrema_count(Axis::Vertical), 0);
        assert_eq!(engine.evaluate(), Some(HeadGesture::No));
    }

    #[test]
    fn test_extrema_alternate_and_increase() {
        let mut engine = GestureEngine::new(GestureSettings::default());
        let samples: Vec<(f64, f64)> = sine(800.0, 4).into_iter().map(|v| (0.0, v)).collect();
        feed(&mut engine, &samples);

        let extrema = engine.extrema(Axis::Vertical);
        for pair in extrema.windows(2) {
            assert!(pair[0].index < pair[1].index);
            assert!((pair[0].value > 0.0) != (pair[1].value > 0.0));
            assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::from_millis(250));
        }
        assert!(extrema.iter().all(|e| e.value.abs() > 400.0));
    }

    #[test]
    fn test_extremum_index_points_at_turning_sample() {
        let mut engine = GestureEngine::new(GestureSettings::default());
        let samples: Vec<(f64, f64)> = sine(800.0, 1).into_iter().map(|v| (0.0, v)).collect();
        feed(&mut engine, &samples);

        // Reversal is seen at sample 9, the peak itself is sample 8
        let first = engine.extrema(Axis::Vertical)[0];
        assert_eq!(first.index, 8);
        assert!(first.value > 600.0 && first.value < 650.0);
    }

    /// Same waveform as `sine`, but samples `step` apart in time
    fn feed_spaced(engine: &mut GestureEngine, samples: &[f64], step: Duration) {
        let t0 = Instant::now();
        for (k, v) in samples.iter().enumerate() {
            engine.ingest(0.0, *v, t0 + step * k as u32);
        }
    }

    #[test]
    fn test_slow_nod_needs_three_extrema() {
        let mut engine = GestureEngine::new(GestureSettings::default());
        // Extrema every 10 samples, 400 ms apart
        let samples = sine(800.0, 2);
        feed_spaced(&mut engine, &samples[..30], Duration::from_millis(40));

        assert_eq!(engine.extrema_count(Axis::Vertical), 3);
        assert_eq!(engine.required_extremes(), 3);
        assert_eq!(engine.evaluate(), Some(HeadGesture::Yes));
    }

    #[test]
    fn test_three_hundred_ms_counts_as_slow() {
        let samples = sine(800.0, 2);

        let mut engine = GestureEngine::new(GestureSettings::default());
        feed_spaced(&mut engine, &samples[..30], Duration::from_millis(30));
        assert_eq!(engine.extrema_count(Axis::Vertical), 3);
        assert_eq!(engine.required_extremes(), 3);
        assert_eq!(engine.evaluate(), Some(HeadGesture::Yes));

        // Just under the boundary a fourth extremum is required
        let mut engine = GestureEngine::new(GestureSettings::default());
        feed_spaced(&mut engine, &samples[..30], Duration::from_millis(29));
        assert_eq!(engine.extrema_count(Axis::Vertical), 3);
        assert_eq!(engine.required_extremes(), 4);
        assert_eq!(engine.evaluate(), None);
    }

    #[test]
    fn test_low_amplitude_jitter_never_classifies() {
        let mut engine = GestureEngine::new(GestureSettings::default());
        let jitter: Vec<(f64, f64)> = (0..200)
            .map(|k| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                (sign * 300.0, -sign * 300.0)
            })
            .collect();
        feed(&mut engine, &jitter);
        assert_eq!(engine.extrema_count(Axis::Horizontal), 0);
        assert_eq!(engine.extrema_count(Axis::Vertical), 0);
        assert_eq!(engine.evaluate(), None);

        let mut engine = GestureEngine::new(GestureSettings::default());
        let small: Vec<(f64, f64)> = sine(350.0, 6).into_iter().map(|v| (v, v)).collect();
        feed(&mut engine, &small);
        assert_eq!(engine.evaluate(), None);
    }

    #[test]
    fn test_out_of_range_sample_is_dropped() {
        let mut engine = GestureEngine::new(GestureSettings::default());
        let samples: Vec<(f64, f64)> = sine(800.0, 1).into_iter().map(|v| (0.0, v)).collect();
        feed(&mut engine, &samples);

        let history = engine.history_len();
        let vertical = engine.extrema(Axis::Vertical);
        let horizontal = engine.extrema(Axis::Horizontal);

        assert_eq!(
            engine.ingest(9000.0, 0.0, Instant::now()),
            SampleOutcome::Rejected
        );
        assert_eq!(
            engine.ingest(0.0, -6001.0, Instant::now()),
            SampleOutcome::Rejected
        );
        assert_eq!(engine.history_len(), history);
        assert_eq!(engine.extrema(Axis::Vertical), vertical);
        assert_eq!(engine.extrema(Axis::Horizontal), horizontal);
    }

    #[test]
    fn test_motion_cue_prefers_larger_axis() {
        let mut engine = GestureEngine::new(GestureSettings::default());
        let now = Instant::now();
        assert_eq!(
            engine.ingest(700.0, 0.0, now),
            SampleOutcome::Accepted(Some(MotionCue {
                axis: Axis::Horizontal,
                delta: 700.0
            }))
        );
        assert_eq!(
            engine.ingest(0.0, -900.0, now),
            SampleOutcome::Accepted(Some(MotionCue {
                axis: Axis::Vertical,
                delta: -900.0
            }))
        );
        assert_eq!(engine.ingest(100.0, -800.0, now), SampleOutcome::Accepted(None));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut engine = GestureEngine::new(GestureSettings::default());
        let samples = vec![(10.0, 10.0); 250];
        feed(&mut engine, &samples);
        assert_eq!(engine.history_len(), 100);
        engine.reset();
        assert_eq!(engine.history_len(), 0);
    }

    #[derive(Default)]
    struct CountingControl {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl HeadTrackingControl for CountingControl {
        fn start_stream(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn stop_stream(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Keeps the order of stream commands
    #[derive(Default)]
    struct CommandLog {
        commands: Mutex<Vec<&'static str>>,
    }

    impl HeadTrackingControl for CommandLog {
        fn start_stream(&self) {
            self.commands.lock().unwrap().push("start");
        }
        fn stop_stream(&self) {
            self.commands.lock().unwrap().push("stop");
        }
    }

    fn detector(control: Arc<CountingControl>, feedback: Arc<RecordingFeedback>) -> GestureDetector {
        GestureDetector::new(GestureSettings::default(), control, feedback)
    }

    #[test]
    fn test_stop_without_session_is_noop() {
        let control = Arc::new(CountingControl::default());
        let detector = detector(control.clone(), Arc::new(RecordingFeedback::default()));

        detector.stop_detection(false);
        detector.stop_detection(false);
        detector.process_sample(100, 100);

        assert!(!detector.is_running());
        assert_eq!(control.stops.load(Ordering::SeqCst), 0);
        assert_eq!(detector.with_engine(|e| e.history_len()), 0);
    }

    #[test]
    fn test_start_outside_runtime_is_noop() {
        let control = Arc::new(CountingControl::default());
        let detector = GestureDetector::new(
            GestureSettings::default(),
            control.clone(),
            Arc::new(NoFeedback),
        );
        detector.start_detection(false, |_| {});
        assert!(!detector.is_running());
        assert_eq!(control.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_session_emits_yes_and_ends() {
        let control = Arc::new(CountingControl::default());
        let feedback = Arc::new(RecordingFeedback::default());
        let detector = detector(control.clone(), feedback.clone());
        let (tx, rx) = oneshot::channel();

        detector.start_detection(false, move |is_yes| {
            let _ = tx.send(is_yes);
        });
        // Second start while running is ignored
        detector.start_detection(false, |_| panic!("second session must not run"));
        assert!(detector.is_running());
        assert_eq!(control.starts.load(Ordering::SeqCst), 1);

        let t0 = Instant::now();
        for (k, v) in sine(800.0, 4).into_iter().enumerate() {
            detector.process_sample_at(0, v as i32, t0 + STEP * k as u32);
        }

        let result = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("gesture not detected in time")
            .unwrap();
        assert!(result);
        assert_eq!(*feedback.confirmations.lock().unwrap(), vec![true]);

        assert!(!detector.is_running());
        assert_eq!(control.stops.load(Ordering::SeqCst), 1);
        assert_eq!(detector.with_engine(|e| e.history_len()), 0);

        // Stopping after the session ended is harmless
        detector.stop_detection(false);
        assert_eq!(control.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_do_not_stop_skips_stop_command() {
        let control = Arc::new(CountingControl::default());
        let detector = detector(control.clone(), Arc::new(RecordingFeedback::default()));
        let (tx, rx) = oneshot::channel();

        detector.start_detection(true, move |is_yes| {
            let _ = tx.send(is_yes);
        });
        let t0 = Instant::now();
        for (k, h) in sine(800.0, 4).into_iter().enumerate() {
            detector.process_sample_at(h as i32, 0, t0 + STEP * k as u32);
        }

        let result = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("gesture not detected in time")
            .unwrap();
        assert!(!result);
        assert!(!detector.is_running());
        assert_eq!(control.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restart_from_callback_keeps_stream_on() {
        let control = Arc::new(CommandLog::default());
        let detector = Arc::new(GestureDetector::new(
            GestureSettings::default(),
            control.clone(),
            Arc::new(NoFeedback),
        ));
        let (tx, rx) = oneshot::channel();

        let chained = detector.clone();
        detector.start_detection(false, move |is_yes| {
            chained.start_detection(false, |_| {});
            let _ = tx.send(is_yes);
        });

        let t0 = Instant::now();
        for (k, v) in sine(800.0, 4).into_iter().enumerate() {
            detector.process_sample_at(0, v as i32, t0 + STEP * k as u32);
        }

        let result = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("gesture not detected in time")
            .unwrap();
        assert!(result);
        assert!(detector.is_running());
        assert_eq!(
            *control.commands.lock().unwrap(),
            vec!["start", "stop", "start"]
        );

        detector.stop_detection(false);
        assert_eq!(control.commands.lock().unwrap().last(), Some(&"stop"));
    }

    #[tokio::test]
    async fn test_stop_cancels_session() {
        let control = Arc::new(CountingControl::default());
        let detector = detector(control.clone(), Arc::new(RecordingFeedback::default()));
        let (tx, mut rx) = oneshot::channel();

        detector.start_detection(false, move |is_yes| {
            let _ = tx.send(is_yes);
        });
        detector.process_sample(0, 500);
        detector.stop_detection(false);
        detector.stop_detection(false);

        assert!(!detector.is_running());
        assert_eq!(control.stops.load(Ordering::SeqCst), 1);
        assert_eq!(detector.with_engine(|e| e.history_len()), 0);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(rx.try_recv().is_err());
    }
}
