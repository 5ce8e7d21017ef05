//! Head Orientation Processor
//!
//! Turns the raw orientation and acceleration fields of head-tracking frames
//! into pitch/yaw relative to a neutral pose captured at session start.

use crate::domain::models::{Acceleration, Orientation};
use crate::domain::settings::HeadTrackingSettings;
use tokio::sync::watch;

/// Raw orientation triple as read from the frame
pub type RawOrientation = (i32, i32, i32);

pub struct HeadOrientationProcessor {
    settings: HeadTrackingSettings,

    // Neutral pose, offset already applied
    o1_neutral: i32,
    o2_neutral: i32,
    o3_neutral: i32,

    // Calibration state
    calibration_samples: Vec<RawOrientation>,
    is_calibrated: bool,

    orientation_tx: watch::Sender<Orientation>,
    acceleration_tx: watch::Sender<Acceleration>,
}

impl HeadOrientationProcessor {
    pub fn new(settings: HeadTrackingSettings) -> Self {
        let (orientation_tx, _) = watch::channel(Orientation::default());
        let (acceleration_tx, _) = watch::channel(Acceleration::default());
        Self {
            calibration_samples: Vec::with_capacity(settings.calibration_samples),
            settings,
            o1_neutral: 0,
            o2_neutral: 0,
            o3_neutral: 0,
            is_calibrated: false,
            orientation_tx,
            acceleration_tx,
        }
    }

    pub fn subscribe_orientation(&self) -> watch::Receiver<Orientation> {
        self.orientation_tx.subscribe()
    }

    pub fn subscribe_acceleration(&self) -> watch::Receiver<Acceleration> {
        self.acceleration_tx.subscribe()
    }

    pub fn is_calibrated(&self) -> bool {
        self.is_calibrated
    }

    /// Get calibration progress (0.0 to 1.0)
    pub fn calibration_progress(&self) -> f32 {
        if self.is_calibrated {
            return 1.0;
        }
        self.calibration_samples.len() as f32 / self.settings.calibration_samples.max(1) as f32
    }

    pub fn neutral(&self) -> RawOrientation {
        (self.o1_neutral, self.o2_neutral, self.o3_neutral)
    }

    /// Read orientation (offsets 43-48) and acceleration (51-54) from a
    /// head-tracking frame and process them. Short frames are ignored.
    pub fn process_packet(&mut self, packet: &[u8]) -> Option<(Orientation, Acceleration)> {
        if packet.len() < 55 {
            tracing::debug!("Head tracking frame too short: {} bytes", packet.len());
            return None;
        }
        let o1 = bytes_to_int(packet[43], packet[44]);
        let o2 = bytes_to_int(packet[45], packet[46]);
        let o3 = bytes_to_int(packet[47], packet[48]);
        let horizontal_accel = bytes_to_int(packet[51], packet[52]);
        let vertical_accel = bytes_to_int(packet[53], packet[54]);

        self.process_sample((o1, o2, o3), horizontal_accel, vertical_accel)
    }

    /// Feed one sample. Returns `None` while the neutral pose is still being
    /// collected; the sample that completes calibration already yields output.
    pub fn process_sample(
        &mut self,
        raw: RawOrientation,
        horizontal_accel: i32,
        vertical_accel: i32,
    ) -> Option<(Orientation, Acceleration)> {
        if !self.is_calibrated {
            self.calibration_samples.push(raw);
            if self.calibration_samples.len() < self.settings.calibration_samples {
                return None;
            }
            self.finish_calibration();
        }

        let orientation = self.calculate_orientation(raw);
        let acceleration = Acceleration {
            vertical: vertical_accel as f32,
            horizontal: horizontal_accel as f32,
        };

        self.orientation_tx.send_replace(orientation);
        self.acceleration_tx.send_replace(acceleration);

        Some((orientation, acceleration))
    }

    /// Back to uncalibrated, outputs reset to zero
    pub fn reset(&mut self) {
        self.calibration_samples.clear();
        self.is_calibrated = false;
        self.orientation_tx.send_replace(Orientation::default());
        self.acceleration_tx.send_replace(Acceleration::default());
        tracing::info!("Head tracking calibration reset");
    }

    fn finish_calibration(&mut self) {
        let offset = self.settings.orientation_offset;
        let count = self.calibration_samples.len() as f64;
        let mean = |axis: fn(&RawOrientation) -> i32| -> i32 {
            let sum: f64 = self
                .calibration_samples
                .iter()
                .map(|s| (axis(s) + offset) as f64)
                .sum();
            // Round half up
            (sum / count + 0.5).floor() as i32
        };

        self.o1_neutral = mean(|s| s.0);
        self.o2_neutral = mean(|s| s.1);
        self.o3_neutral = mean(|s| s.2);

        self.is_calibrated = true;
        self.calibration_samples.clear();

        tracing::info!(
            "Head tracking calibration complete. Neutral: ({}, {}, {})",
            self.o1_neutral,
            self.o2_neutral,
            self.o3_neutral
        );
    }

    fn calculate_orientation(&self, (o1, o2, o3): RawOrientation) -> Orientation {
        let offset = self.settings.orientation_offset;
        let divisor = self.settings.normalization_divisor;

        let _o1_norm = (o1 + offset) - self.o1_neutral;
        let o2_norm = (o2 + offset) - self.o2_neutral;
        let o3_norm = (o3 + offset) - self.o3_neutral;

        let pitch = (o2_norm + o3_norm) as f32 / 2.0 / divisor * 180.0;
        let yaw = (o2_norm - o3_norm) as f32 / 2.0 / divisor * 180.0;

        Orientation { pitch, yaw }
    }
}

/// Little-endian pair, high byte signed
fn bytes_to_int(low: u8, high: u8) -> i32 {
    i16::from_le_bytes([low, high]) as i32
}
