//! Device State
//!
//! Aggregated snapshot of one connected device. Written only by the session's
//! frame reader; every change is pushed to subscribers as a [`DeviceEvent`].

use crate::domain::models::{
    BatterySnapshot, ConversationalAwarenessLevel, DeviceEvent, EarDetectionStatus,
    NoiseControlMode, NoiseControlStatus,
};
use tokio::sync::mpsc;

/// Immutable copy handed to readers (UI, widgets, ...).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceSnapshot {
    pub battery: BatterySnapshot,
    pub noise_control: NoiseControlStatus,
    pub ear_detection: EarDetectionStatus,
    pub conversational_awareness: ConversationalAwarenessLevel,
}

#[derive(Debug, Default)]
pub struct DeviceState {
    snapshot: DeviceSnapshot,
    subscribers: Vec<mpsc::UnboundedSender<DeviceEvent>>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Dropping the receiver unsubscribes it.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot
    }

    pub fn battery(&self) -> BatterySnapshot {
        self.snapshot.battery
    }

    pub fn noise_control(&self) -> NoiseControlStatus {
        self.snapshot.noise_control
    }

    /// Current listening mode, `None` while the device reports an unknown byte
    pub fn noise_control_mode(&self) -> Option<NoiseControlMode> {
        self.snapshot.noise_control.mode
    }

    pub fn ear_detection(&self) -> EarDetectionStatus {
        self.snapshot.ear_detection
    }

    pub fn conversational_awareness(&self) -> ConversationalAwarenessLevel {
        self.snapshot.conversational_awareness
    }

    pub fn set_battery(&mut self, battery: BatterySnapshot) {
        self.snapshot.battery = battery;
        self.publish(DeviceEvent::Battery(battery));
    }

    pub fn set_noise_control(&mut self, status: NoiseControlStatus) {
        self.snapshot.noise_control = status;
        self.publish(DeviceEvent::NoiseControl(status));
    }

    pub fn set_ear_detection(&mut self, status: EarDetectionStatus) {
        let previous = self.snapshot.ear_detection;
        self.snapshot.ear_detection = status;
        self.publish(DeviceEvent::EarDetection {
            previous,
            current: status,
        });
    }

    pub fn set_conversational_awareness(&mut self, level: ConversationalAwarenessLevel) {
        self.snapshot.conversational_awareness = level;
        self.publish(DeviceEvent::ConversationalAwareness(level));
    }

    fn publish(&mut self, event: DeviceEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BatteryStatus;

    #[test]
    fn test_defaults() {
        let state = DeviceState::new();
        assert_eq!(state.noise_control_mode(), Some(NoiseControlMode::Off));
        assert!(state.ear_detection().both_in_ear());
        assert_eq!(state.battery().case.status, BatteryStatus::Disconnected);
        assert_eq!(state.conversational_awareness().0, 0);
    }

    #[test]
    fn test_events_fan_out_to_every_subscriber() {
        let mut state = DeviceState::new();
        let mut first = state.subscribe();
        let mut second = state.subscribe();

        state.set_noise_control(NoiseControlStatus::from_wire(3));

        let expected = DeviceEvent::NoiseControl(NoiseControlStatus::from_wire(3));
        assert_eq!(first.try_recv().unwrap(), expected);
        assert_eq!(second.try_recv().unwrap(), expected);
        assert_eq!(
            state.noise_control_mode(),
            Some(NoiseControlMode::Transparency)
        );
    }

    #[test]
    fn test_ear_event_carries_previous_status() {
        let mut state = DeviceState::new();
        let mut rx = state.subscribe();

        state.set_ear_detection(EarDetectionStatus::new(0x00, 0x01));

        assert_eq!(
            rx.try_recv().unwrap(),
            DeviceEvent::EarDetection {
                previous: EarDetectionStatus::default(),
                current: EarDetectionStatus::new(0x00, 0x01),
            }
        );
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let mut state = DeviceState::new();
        let rx = state.subscribe();
        let mut kept = state.subscribe();
        drop(rx);

        state.set_conversational_awareness(ConversationalAwarenessLevel(1));

        assert_eq!(state.subscribers.len(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
