//! Accessory Protocol Packet Catalog
//!
//! Fixed byte sequences for the session handshake, settings frames and the
//! prefixes used to recognize incoming notifications. These are binary
//! contracts with the earbuds firmware and must not change.
//!
//! # Settings Frame Structure (11 bytes)
//!
//! ```text
//! [0-3]   : Packet prefix   04 00 04 00
//! [4-5]   : Settings opcode 09 00
//! [6]     : Setting / capability id
//! [7-10]  : Parameter, then suffix bytes up to 4 bytes
//! ```

use crate::domain::models::NoiseControlMode;
use thiserror::Error;

pub const PREFIX: [u8; 4] = [0x04, 0x00, 0x04, 0x00];
pub const SETTINGS: [u8; 2] = [0x09, 0x00];
pub const SUFFIX: [u8; 3] = [0x00, 0x00, 0x00];

/// Width of the parameter field that follows the setting id
pub const SETTINGS_PARAM_LEN: usize = 4;

pub const HANDSHAKE: [u8; 16] = [
    0x00, 0x00, 0x04, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

pub const SET_SPECIFIC_FEATURES: [u8; 14] = [
    0x04, 0x00, 0x04, 0x00, 0x4d, 0x00, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

pub const REQUEST_NOTIFICATIONS: [u8; 10] =
    [0x04, 0x00, 0x04, 0x00, 0x0f, 0x00, 0xff, 0xff, 0xff, 0xff];

pub const START_HEAD_TRACKING: [u8; 28] = [
    0x04, 0x00, 0x04, 0x00, 0x17, 0x00, 0x00, 0x00, 0x10, 0x00, 0x10, 0x00, 0x08, 0xA1, 0x02, 0x42,
    0x0B, 0x08, 0x0E, 0x10, 0x02, 0x1A, 0x05, 0x01, 0x40, 0x9C, 0x00, 0x00,
];

pub const STOP_HEAD_TRACKING: [u8; 29] = [
    0x04, 0x00, 0x04, 0x00, 0x17, 0x00, 0x00, 0x00, 0x10, 0x00, 0x11, 0x00, 0x08, 0x7E, 0x10, 0x02,
    0x42, 0x0B, 0x08, 0x4E, 0x10, 0x02, 0x1A, 0x05, 0x01, 0x00, 0x00, 0x00, 0x00,
];

/// Capability and setting identifiers
pub mod capability {
    pub const EAR_DETECTION: u8 = 0x06;
    pub const NOISE_CANCELLATION: u8 = 0x0d;
    pub const PRESS_SPEED: u8 = 0x17;
    pub const PRESS_AND_HOLD_DURATION: u8 = 0x18;
    pub const LONG_PRESS_MODES: u8 = 0x1a;
    pub const ONE_POD_NOISE_CANCELLATION: u8 = 0x1b;
    pub const TONE_VOLUME: u8 = 0x1f;
    pub const VOLUME_SWIPE_SPEED: u8 = 0x23;
    pub const VOLUME_CONTROL: u8 = 0x25;
    pub const CONVERSATION_AWARENESS: u8 = 0x28;
    pub const ADAPTIVE_STRENGTH: u8 = 0x2e;
    pub const OFF_LISTENING_MODE: u8 = 0x34;
}

/// Notification prefixes and exact frame lengths
pub mod notification {
    use super::{capability, PREFIX, SETTINGS};

    pub const EAR_DETECTION_PREFIX: [u8; 5] =
        [PREFIX[0], PREFIX[1], PREFIX[2], PREFIX[3], capability::EAR_DETECTION];
    pub const EAR_DETECTION_LEN: usize = 8;

    pub const NOISE_CONTROL_PREFIX: [u8; 7] = [
        PREFIX[0],
        PREFIX[1],
        PREFIX[2],
        PREFIX[3],
        SETTINGS[0],
        SETTINGS[1],
        capability::NOISE_CANCELLATION,
    ];
    pub const NOISE_CONTROL_LEN: usize = 11;

    pub const BATTERY_PREFIX: [u8; 6] = [0x04, 0x00, 0x04, 0x00, 0x04, 0x00];
    pub const BATTERY_LEN: usize = 22;

    pub const CONVERSATION_AWARENESS_PREFIX: [u8; 8] =
        [0x04, 0x00, 0x04, 0x00, 0x4b, 0x00, 0x02, 0x00];
    pub const CONVERSATION_AWARENESS_LEN: usize = 10;

    pub const HEAD_TRACKING_PREFIX: [u8; 12] = [
        0x04, 0x00, 0x04, 0x00, 0x17, 0x00, 0x00, 0x00, 0x10, 0x00, 0x45, 0x00,
    ];
    pub const HEAD_TRACKING_ALT_PREFIX: [u8; 12] = [
        0x04, 0x00, 0x04, 0x00, 0x17, 0x00, 0x00, 0x00, 0x10, 0x00, 0x44, 0x00,
    ];
    pub const HEAD_TRACKING_MIN_LEN: usize = 80;
}

/// Session-level commands with fixed payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Opens the accessory protocol channel
    Handshake,
    /// Unlocks conversational awareness and adaptive features
    SetSpecificFeatures,
    /// Subscribes to every notification type
    RequestNotifications,
    StartHeadTracking,
    StopHeadTracking,
}

impl SessionCommand {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Handshake => &HANDSHAKE,
            Self::SetSpecificFeatures => &SET_SPECIFIC_FEATURES,
            Self::RequestNotifications => &REQUEST_NOTIFICATIONS,
            Self::StartHeadTracking => &START_HEAD_TRACKING,
            Self::StopHeadTracking => &STOP_HEAD_TRACKING,
        }
    }
}

/// Commands sent right after the transport connects, in order
pub const INIT_SEQUENCE: &[SessionCommand] = &[
    SessionCommand::Handshake,
    SessionCommand::SetSpecificFeatures,
    SessionCommand::RequestNotifications,
];

/// Modes cycled through by a long press on the stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LongPressModes {
    pub off: bool,
    pub transparency: bool,
    pub adaptive: bool,
    pub noise_cancellation: bool,
}

impl LongPressModes {
    pub fn mode_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.off {
            byte |= 0x01;
        }
        if self.transparency {
            byte |= 0x02;
        }
        if self.adaptive {
            byte |= 0x04;
        }
        if self.noise_cancellation {
            byte |= 0x08;
        }
        byte
    }
}

/// Settings writes understood by the earbuds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    SetNoiseControl(NoiseControlMode),
    SetConversationalAwareness(bool),
    /// Allow "Off" in the listening-mode cycle
    SetOffListeningMode(bool),
    /// Adaptive transparency strength
    SetAdaptiveStrength(u8),
    /// 0 default, 1 slower, 2 slowest
    SetPressSpeed(u8),
    /// 0 default, 1 slower, 2 slowest
    SetPressAndHoldDuration(u8),
    /// 0 default, 1 longer, 2 longest
    SetVolumeSwipeSpeed(u8),
    SetOnePodNoiseCancellation(bool),
    SetVolumeControl(bool),
    SetToneVolume(u8),
    SetLongPressModes(LongPressModes),
}

impl ControlCommand {
    pub fn setting_id(&self) -> u8 {
        match self {
            Self::SetNoiseControl(_) => capability::NOISE_CANCELLATION,
            Self::SetConversationalAwareness(_) => capability::CONVERSATION_AWARENESS,
            Self::SetOffListeningMode(_) => capability::OFF_LISTENING_MODE,
            Self::SetAdaptiveStrength(_) => capability::ADAPTIVE_STRENGTH,
            Self::SetPressSpeed(_) => capability::PRESS_SPEED,
            Self::SetPressAndHoldDuration(_) => capability::PRESS_AND_HOLD_DURATION,
            Self::SetVolumeSwipeSpeed(_) => capability::VOLUME_SWIPE_SPEED,
            Self::SetOnePodNoiseCancellation(_) => capability::ONE_POD_NOISE_CANCELLATION,
            Self::SetVolumeControl(_) => capability::VOLUME_CONTROL,
            Self::SetToneVolume(_) => capability::TONE_VOLUME,
            Self::SetLongPressModes(_) => capability::LONG_PRESS_MODES,
        }
    }

    fn parameter(&self) -> Vec<u8> {
        match self {
            Self::SetNoiseControl(mode) => vec![mode.wire_tag()],
            Self::SetConversationalAwareness(enabled)
            | Self::SetOffListeningMode(enabled)
            | Self::SetOnePodNoiseCancellation(enabled)
            | Self::SetVolumeControl(enabled) => vec![toggle_byte(*enabled)],
            Self::SetAdaptiveStrength(value)
            | Self::SetPressSpeed(value)
            | Self::SetPressAndHoldDuration(value)
            | Self::SetVolumeSwipeSpeed(value) => vec![*value],
            Self::SetToneVolume(volume) => vec![*volume, 0x50],
            Self::SetLongPressModes(modes) => vec![modes.mode_byte()],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        build_command(self.setting_id(), &self.parameter())
    }
}

fn toggle_byte(enabled: bool) -> u8 {
    if enabled {
        0x01
    } else {
        0x02
    }
}

/// Build a settings frame: prefix, settings opcode, setting id, the parameter
/// and as much of the suffix as fills the 4-byte field. Parameters are at
/// least one byte; longer ones are kept whole.
pub fn build_command(setting_id: u8, param: &[u8]) -> Vec<u8> {
    let suffix_len = SETTINGS_PARAM_LEN
        .saturating_sub(param.len())
        .min(SUFFIX.len());
    let mut frame = Vec::with_capacity(PREFIX.len() + SETTINGS.len() + 1 + SETTINGS_PARAM_LEN);
    frame.extend_from_slice(&PREFIX);
    frame.extend_from_slice(&SETTINGS);
    frame.push(setting_id);
    frame.extend_from_slice(param);
    frame.extend_from_slice(&SUFFIX[..suffix_len]);
    frame
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("invalid hex byte '{0}'")]
    InvalidHexByte(String),
}

/// Parse a whitespace separated hex dump such as `"04 00 04 00"`.
/// Unseparated runs of pairs (`"04000400"`) are accepted too.
pub fn parse_hex_frame(text: &str) -> Result<Vec<u8>, FrameError> {
    let mut bytes = Vec::new();
    for token in text.split_whitespace() {
        if token.len() % 2 != 0 {
            return Err(FrameError::InvalidHexByte(token.to_string()));
        }
        for i in (0..token.len()).step_by(2) {
            let pair = token
                .get(i..i + 2)
                .ok_or_else(|| FrameError::InvalidHexByte(token.to_string()))?;
            let byte = u8::from_str_radix(pair, 16)
                .map_err(|_| FrameError::InvalidHexByte(pair.to_string()))?;
            bytes.push(byte);
        }
    }
    if bytes.is_empty() {
        return Err(FrameError::Empty);
    }
    Ok(bytes)
}

pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
