//! Accessory Service Module
//!
//! Single reader of one device's inbound frames. Applies decoded notifications
//! to the device state, routes head-tracking telemetry and queues outbound
//! commands for the transport.

use crate::domain::device_state::DeviceState;
use crate::domain::feedback::GestureFeedback;
use crate::domain::gestures::{GestureDetector, HeadTrackingControl};
use crate::domain::head_tracking::HeadOrientationProcessor;
use crate::domain::models::{Acceleration, DeviceEvent, Orientation};
use crate::domain::settings::Settings;
use crate::infrastructure::accessory::notifications::{
    head_motion_fields, Notification, NotificationDecoder, NotificationKind,
};
use crate::infrastructure::accessory::packets::{
    format_hex, ControlCommand, SessionCommand, INIT_SEQUENCE,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Outbound half of the transport. Sends never block.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl CommandSender {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }

    /// Returns false once the transport has gone away
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        trace!("-> {}", format_hex(&bytes));
        if self.tx.send(bytes).is_err() {
            warn!("Transport closed, dropping outbound command");
            return false;
        }
        true
    }

    pub fn send_session(&self, command: SessionCommand) -> bool {
        debug!("Sending {:?}", command);
        self.send(command.as_bytes().to_vec())
    }
}

impl HeadTrackingControl for CommandSender {
    fn start_stream(&self) {
        self.send_session(SessionCommand::StartHeadTracking);
    }

    fn stop_stream(&self) {
        self.send_session(SessionCommand::StopHeadTracking);
    }
}

/// Coordinates decoding and state for one connected device
pub struct AccessoryService {
    decoder: NotificationDecoder,
    state: DeviceState,
    head_tracking: HeadOrientationProcessor,
    head_tracking_active: bool,
    gestures: GestureDetector,
    commands: Arc<CommandSender>,
    log_raw_frames: bool,
}

impl AccessoryService {
    pub fn new(
        settings: &Settings,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        feedback: Arc<dyn GestureFeedback>,
    ) -> Self {
        let commands = Arc::new(CommandSender::new(outbound));
        Self {
            decoder: NotificationDecoder::new(),
            state: DeviceState::new(),
            head_tracking: HeadOrientationProcessor::new(settings.head_tracking.clone()),
            head_tracking_active: false,
            gestures: GestureDetector::new(settings.gesture.clone(), commands.clone(), feedback),
            commands,
            log_raw_frames: settings.debug_raw_frame_logging,
        }
    }

    pub fn device_state(&self) -> &DeviceState {
        &self.state
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        self.state.subscribe()
    }

    pub fn subscribe_orientation(&self) -> watch::Receiver<Orientation> {
        self.head_tracking.subscribe_orientation()
    }

    pub fn subscribe_acceleration(&self) -> watch::Receiver<Acceleration> {
        self.head_tracking.subscribe_acceleration()
    }

    pub fn head_tracking(&self) -> &HeadOrientationProcessor {
        &self.head_tracking
    }

    pub fn is_head_tracking(&self) -> bool {
        self.head_tracking_active
    }

    pub fn gestures(&self) -> &GestureDetector {
        &self.gestures
    }

    /// Queue the connection handshake
    pub fn initialize(&self) {
        info!("Sending accessory init sequence");
        for command in INIT_SEQUENCE {
            self.commands.send_session(*command);
        }
    }

    pub fn send_command(&self, command: ControlCommand) -> bool {
        info!("Sending control command: {:?}", command);
        self.commands.send(command.to_bytes())
    }

    /// Ask for telemetry and recalibrate on the next frames
    pub fn start_head_tracking(&mut self) {
        self.head_tracking.reset();
        self.head_tracking_active = true;
        self.commands.start_stream();
    }

    pub fn stop_head_tracking(&mut self) {
        if !self.head_tracking_active {
            return;
        }
        self.head_tracking_active = false;
        self.head_tracking.reset();
        self.commands.stop_stream();
    }

    /// The callback gets `true` for a nod and `false` for a shake.
    pub fn start_gesture_detection<F>(&self, do_not_stop: bool, on_gesture: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.gestures.start_detection(do_not_stop, on_gesture);
    }

    pub fn stop_gesture_detection(&self, do_not_stop: bool) {
        self.gestures.stop_detection(do_not_stop);
    }

    /// Classify one inbound frame and apply it
    pub fn handle_frame(&mut self, frame: &[u8]) -> NotificationKind {
        if self.log_raw_frames {
            trace!("<- {}", format_hex(frame));
        }

        let kind = self.decoder.classify(frame);
        match kind {
            NotificationKind::HeadTracking => self.handle_head_tracking(frame),
            NotificationKind::Unrecognized => {
                debug!("Unrecognized frame ({} bytes)", frame.len());
            }
            _ => {
                if let Some(notification) = self.decoder.decode(frame) {
                    self.apply(notification);
                }
            }
        }
        kind
    }

    /// Drain frames until the transport closes the channel
    pub async fn run(&mut self, mut frames: mpsc::UnboundedReceiver<Vec<u8>>) {
        info!("Accessory session started");
        while let Some(frame) = frames.recv().await {
            self.handle_frame(&frame);
        }
        info!("Accessory session ended");
    }

    fn apply(&mut self, notification: Notification) {
        match notification {
            Notification::EarDetection(status) => {
                let previous = self.state.ear_detection();
                if previous != status {
                    info!("Ear detection: {:?} -> {:?}", previous.states(), status.states());
                }
                self.state.set_ear_detection(status);
            }
            Notification::NoiseControl(status) => {
                info!("Noise control mode: {}", status.name());
                self.state.set_noise_control(status);
            }
            Notification::Battery(battery) => {
                debug!(
                    "Battery: L {}% R {}% case {}%",
                    battery.left.level, battery.right.level, battery.case.level
                );
                self.state.set_battery(battery);
            }
            Notification::ConversationalAwareness(level) => {
                debug!(
                    "Conversational awareness: {} ({:?})",
                    level.0,
                    level.speech_activity()
                );
                self.state.set_conversational_awareness(level);
            }
        }
    }

    fn handle_head_tracking(&mut self, frame: &[u8]) {
        if self.head_tracking_active {
            self.head_tracking.process_packet(frame);
        }
        if self.gestures.is_running() {
            if let Some((horizontal, vertical)) = head_motion_fields(frame) {
                self.gestures
                    .process_sample(horizontal as i32, vertical as i32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feedback::NoFeedback;
    use crate::domain::models::{BatteryStatus, NoiseControlMode};
    use crate::infrastructure::accessory::packets::notification::HEAD_TRACKING_PREFIX;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn service() -> (AccessoryService, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = AccessoryService::new(&Settings::default(), tx, Arc::new(NoFeedback));
        (service, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut sent = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            sent.push(bytes);
        }
        sent
    }

    fn head_tracking_frame(horizontal: i16, vertical: i16) -> Vec<u8> {
        let mut frame = vec![0u8; 80];
        frame[..12].copy_from_slice(&HEAD_TRACKING_PREFIX);
        frame[51..53].copy_from_slice(&horizontal.to_le_bytes());
        frame[53..55].copy_from_slice(&vertical.to_le_bytes());
        frame
    }

    #[test]
    fn test_initialize_queues_handshake_in_order() {
        let (service, mut rx) = service();
        service.initialize();

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], SessionCommand::Handshake.as_bytes());
        assert_eq!(sent[1], SessionCommand::SetSpecificFeatures.as_bytes());
        assert_eq!(sent[2], SessionCommand::RequestNotifications.as_bytes());
    }

    #[test]
    fn test_send_command() {
        let (service, mut rx) = service();
        assert!(service.send_command(ControlCommand::SetNoiseControl(NoiseControlMode::Adaptive)));
        assert_eq!(
            drain(&mut rx),
            vec![vec![0x04, 0x00, 0x04, 0x00, 0x09, 0x00, 0x0d, 0x04, 0x00, 0x00, 0x00]]
        );
    }

    #[test]
    fn test_send_after_transport_closed() {
        let (service, rx) = service();
        drop(rx);
        assert!(!service.send_command(ControlCommand::SetConversationalAwareness(true)));
    }

    #[test]
    fn test_frames_update_state_and_notify() {
        let (mut service, _rx) = service();
        let mut events = service.subscribe();

        let battery = [
            0x04, 0x00, 0x04, 0x00, 0x04, 0x00, 0x03, 0x04, 0x01, 0x5a, 0x02, 0x01, 0x02, 0x01,
            0x55, 0x01, 0x01, 0x08, 0x01, 0x32, 0x01, 0x01,
        ];
        assert_eq!(service.handle_frame(&battery), NotificationKind::Battery);

        let snapshot = service.device_state().battery();
        assert_eq!(snapshot.left.level, 90);
        assert_eq!(snapshot.right.status, BatteryStatus::Charging);
        assert_eq!(snapshot.case.level, 50);
        assert!(matches!(events.try_recv(), Ok(DeviceEvent::Battery(_))));

        let noise = [0x04, 0x00, 0x04, 0x00, 0x09, 0x00, 0x0d, 0x02, 0x00, 0x00, 0x00];
        assert_eq!(service.handle_frame(&noise), NotificationKind::NoiseControl);
        assert_eq!(
            service.device_state().noise_control_mode(),
            Some(NoiseControlMode::NoiseCancellation)
        );

        let ear = [0x04, 0x00, 0x04, 0x00, 0x06, 0x00, 0x01, 0x00];
        assert_eq!(service.handle_frame(&ear), NotificationKind::EarDetection);
        assert!(!service.device_state().ear_detection().both_in_ear());
    }

    #[test]
    fn test_unrecognized_frame_is_dropped() {
        let (mut service, _rx) = service();
        let mut events = service.subscribe();
        let before = service.device_state().snapshot();

        // Right prefix, wrong length
        let frame = [0x04, 0x00, 0x04, 0x00, 0x09, 0x00, 0x0d, 0x02, 0x00, 0x00];
        assert_eq!(service.handle_frame(&frame), NotificationKind::Unrecognized);
        assert_eq!(service.handle_frame(&[]), NotificationKind::Unrecognized);

        assert_eq!(service.device_state().snapshot(), before);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_head_tracking_lifecycle() {
        let (mut service, mut rx) = service();
        let orientation = service.subscribe_orientation();

        // Telemetry before start is not processed
        let frame = head_tracking_frame(10, 20);
        assert_eq!(service.handle_frame(&frame), NotificationKind::HeadTracking);
        assert_eq!(service.head_tracking().calibration_progress(), 0.0);

        service.start_head_tracking();
        assert_eq!(drain(&mut rx), vec![SessionCommand::StartHeadTracking.as_bytes().to_vec()]);

        for _ in 0..10 {
            service.handle_frame(&frame);
        }
        assert!(service.head_tracking().is_calibrated());
        assert_eq!(*orientation.borrow(), Orientation::default());

        service.stop_head_tracking();
        service.stop_head_tracking();
        assert_eq!(drain(&mut rx), vec![SessionCommand::StopHeadTracking.as_bytes().to_vec()]);
        assert!(!service.head_tracking().is_calibrated());
    }

    #[tokio::test]
    async fn test_gesture_session_over_frames() {
        let (mut service, mut rx) = service();
        let (tx, result) = oneshot::channel();

        service.start_gesture_detection(false, move |is_yes| {
            let _ = tx.send(is_yes);
        });
        assert!(service.gestures().is_running());

        for k in 0..80 {
            let angle = 2.0 * std::f64::consts::PI * k as f64 / 20.0;
            let vertical = (800.0 * angle.sin()) as i16;
            service.handle_frame(&head_tracking_frame(0, vertical));
        }

        let is_yes = tokio::time::timeout(Duration::from_secs(2), result)
            .await
            .expect("gesture not detected in time")
            .unwrap();
        assert!(is_yes);
        assert!(!service.gestures().is_running());
        assert_eq!(
            drain(&mut rx),
            vec![
                SessionCommand::StartHeadTracking.as_bytes().to_vec(),
                SessionCommand::StopHeadTracking.as_bytes().to_vec(),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_drains_until_closed() {
        let (mut service, _rx) = service();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        frames_tx
            .send(vec![0x04, 0x00, 0x04, 0x00, 0x09, 0x00, 0x0d, 0x03, 0x00, 0x00, 0x00])
            .unwrap();
        frames_tx.send(vec![0x01, 0x02]).unwrap();
        drop(frames_tx);

        service.run(frames_rx).await;
        assert_eq!(
            service.device_state().noise_control_mode(),
            Some(NoiseControlMode::Transparency)
        );
    }
}
