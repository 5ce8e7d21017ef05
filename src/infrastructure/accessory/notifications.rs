//! Notification Decoders
//!
//! Each decoder recognizes one notification kind by exact frame length and a
//! fixed prefix, then extracts its fields from fixed offsets. Frames that no
//! decoder recognizes are `Unrecognized` (handshake acks, metadata, ...) and
//! are dropped without error.
//!
//! # Battery Frame Structure (22 bytes)
//!
//! ```text
//! [0-5]   : Header 04 00 04 00 04 00
//! [6]     : Component count
//! [7-11]  : First pod   (component tag, ?, level, status, ?)
//! [12-16] : Second pod  (component tag, ?, level, status, ?)
//! [17-21] : Case        (component tag, ?, level, status, ?)
//! ```

use super::packets::notification::*;
use crate::domain::models::{
    BatteryComponent, BatteryReading, BatterySnapshot, BatteryStatus,
    ConversationalAwarenessLevel, EarDetectionStatus, NoiseControlStatus,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    EarDetection,
    NoiseControl,
    Battery,
    ConversationalAwareness,
    HeadTracking,
    Unrecognized,
}

/// A decoded notification, ready to apply to device state.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    EarDetection(EarDetectionStatus),
    NoiseControl(NoiseControlStatus),
    Battery(BatterySnapshot),
    ConversationalAwareness(ConversationalAwarenessLevel),
}

/// Length is checked before the prefix compare.
fn matches_frame(frame: &[u8], len: usize, prefix: &[u8]) -> bool {
    frame.len() == len && frame.starts_with(prefix)
}

#[derive(Debug, Default)]
pub struct EarDetectionDecoder {
    status: EarDetectionStatus,
}

impl EarDetectionDecoder {
    pub fn matches(&self, frame: &[u8]) -> bool {
        matches_frame(frame, EAR_DETECTION_LEN, &EAR_DETECTION_PREFIX)
    }

    pub fn apply(&mut self, frame: &[u8]) -> EarDetectionStatus {
        self.status = EarDetectionStatus::new(frame[6], frame[7]);
        self.status
    }

    pub fn status(&self) -> EarDetectionStatus {
        self.status
    }
}

#[derive(Debug, Default)]
pub struct NoiseControlDecoder {
    status: NoiseControlStatus,
}

impl NoiseControlDecoder {
    pub fn matches(&self, frame: &[u8]) -> bool {
        matches_frame(frame, NOISE_CONTROL_LEN, &NOISE_CONTROL_PREFIX)
    }

    pub fn apply(&mut self, frame: &[u8]) -> NoiseControlStatus {
        self.status = NoiseControlStatus::from_wire(frame[7]);
        self.status
    }

    pub fn status(&self) -> NoiseControlStatus {
        self.status
    }
}

/// Holds the last reading of each slot; the case slot keeps its previous
/// component and level while it stays disconnected.
#[derive(Debug)]
pub struct BatteryDecoder {
    first: BatteryReading,
    second: BatteryReading,
    case: BatteryReading,
}

impl Default for BatteryDecoder {
    fn default() -> Self {
        Self {
            first: BatteryReading::disconnected(BatteryComponent::Left),
            second: BatteryReading::disconnected(BatteryComponent::Right),
            case: BatteryReading::disconnected(BatteryComponent::Case),
        }
    }
}

impl BatteryDecoder {
    pub fn matches(&self, frame: &[u8]) -> bool {
        matches_frame(frame, BATTERY_LEN, &BATTERY_PREFIX)
    }

    pub fn apply(&mut self, frame: &[u8]) -> BatterySnapshot {
        self.first = read_slot(frame, 7);
        self.second = read_slot(frame, 12);

        let case = read_slot(frame, 17);
        self.case = if case.status == BatteryStatus::Disconnected
            && self.case.status == BatteryStatus::Disconnected
        {
            BatteryReading::new(self.case.component, self.case.level, case.status)
        } else {
            case
        };

        self.snapshot()
    }

    /// Left pod first, right second, case last, whatever the wire order.
    pub fn snapshot(&self) -> BatterySnapshot {
        let (left, right) = if self.first.component == BatteryComponent::Left {
            (self.first, self.second)
        } else {
            (self.second, self.first)
        };
        BatterySnapshot {
            left,
            right,
            case: self.case,
        }
    }
}

fn read_slot(frame: &[u8], offset: usize) -> BatteryReading {
    BatteryReading::new(
        BatteryComponent::from_wire(frame[offset]),
        frame[offset + 2],
        BatteryStatus::from_wire(frame[offset + 3]),
    )
}

#[derive(Debug, Default)]
pub struct ConversationalAwarenessDecoder {
    level: ConversationalAwarenessLevel,
}

impl ConversationalAwarenessDecoder {
    pub fn matches(&self, frame: &[u8]) -> bool {
        matches_frame(
            frame,
            CONVERSATION_AWARENESS_LEN,
            &CONVERSATION_AWARENESS_PREFIX,
        )
    }

    pub fn apply(&mut self, frame: &[u8]) -> ConversationalAwarenessLevel {
        self.level = ConversationalAwarenessLevel(frame[9]);
        self.level
    }

    pub fn level(&self) -> ConversationalAwarenessLevel {
        self.level
    }
}

pub fn is_head_tracking_frame(frame: &[u8]) -> bool {
    frame.len() >= HEAD_TRACKING_MIN_LEN
        && (frame.starts_with(&HEAD_TRACKING_PREFIX) || frame.starts_with(&HEAD_TRACKING_ALT_PREFIX))
}

/// Horizontal and vertical fields of a head-tracking frame (offsets 51-54,
/// little-endian signed).
pub fn head_motion_fields(frame: &[u8]) -> Option<(i16, i16)> {
    let bytes = frame.get(51..55)?;
    Some((
        i16::from_le_bytes([bytes[0], bytes[1]]),
        i16::from_le_bytes([bytes[2], bytes[3]]),
    ))
}

/// All state decoders, consulted in a fixed order.
#[derive(Debug, Default)]
pub struct NotificationDecoder {
    pub ear_detection: EarDetectionDecoder,
    pub noise_control: NoiseControlDecoder,
    pub battery: BatteryDecoder,
    pub conversational_awareness: ConversationalAwarenessDecoder,
}

impl NotificationDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, frame: &[u8]) -> NotificationKind {
        if self.ear_detection.matches(frame) {
            NotificationKind::EarDetection
        } else if self.noise_control.matches(frame) {
            NotificationKind::NoiseControl
        } else if self.battery.matches(frame) {
            NotificationKind::Battery
        } else if self.conversational_awareness.matches(frame) {
            NotificationKind::ConversationalAwareness
        } else if is_head_tracking_frame(frame) {
            NotificationKind::HeadTracking
        } else {
            NotificationKind::Unrecognized
        }
    }

    /// Decode a state notification. Head-tracking and unrecognized frames
    /// yield `None`.
    pub fn decode(&mut self, frame: &[u8]) -> Option<Notification> {
        let notification = match self.classify(frame) {
            NotificationKind::EarDetection => {
                Notification::EarDetection(self.ear_detection.apply(frame))
            }
            NotificationKind::NoiseControl => {
                Notification::NoiseControl(self.noise_control.apply(frame))
            }
            NotificationKind::Battery => Notification::Battery(self.battery.apply(frame)),
            NotificationKind::ConversationalAwareness => Notification::ConversationalAwareness(
                self.conversational_awareness.apply(frame),
            ),
            NotificationKind::HeadTracking | NotificationKind::Unrecognized => return None,
        };
        debug!("Decoded notification: {:?}", notification);
        Some(notification)
    }
}
