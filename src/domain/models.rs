use serde::{Deserialize, Serialize};

/// Battery component tag as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatteryComponent {
    Left,
    Right,
    Case,
    /// Tag not known to this decoder, preserved as received
    Other(u8),
}

impl BatteryComponent {
    pub const LEFT_TAG: u8 = 4;
    pub const RIGHT_TAG: u8 = 2;
    pub const CASE_TAG: u8 = 8;

    pub fn from_wire(tag: u8) -> Self {
        match tag {
            Self::LEFT_TAG => Self::Left,
            Self::RIGHT_TAG => Self::Right,
            Self::CASE_TAG => Self::Case,
            other => Self::Other(other),
        }
    }

    pub fn wire_tag(&self) -> u8 {
        match self {
            Self::Left => Self::LEFT_TAG,
            Self::Right => Self::RIGHT_TAG,
            Self::Case => Self::CASE_TAG,
            Self::Other(tag) => *tag,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Case => "CASE",
            Self::Other(_) => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatteryStatus {
    Charging,
    NotCharging,
    Disconnected,
    Other(u8),
}

impl BatteryStatus {
    pub const CHARGING_TAG: u8 = 1;
    pub const NOT_CHARGING_TAG: u8 = 2;
    pub const DISCONNECTED_TAG: u8 = 4;

    pub fn from_wire(tag: u8) -> Self {
        match tag {
            Self::CHARGING_TAG => Self::Charging,
            Self::NOT_CHARGING_TAG => Self::NotCharging,
            Self::DISCONNECTED_TAG => Self::Disconnected,
            other => Self::Other(other),
        }
    }

    pub fn wire_tag(&self) -> u8 {
        match self {
            Self::Charging => Self::CHARGING_TAG,
            Self::NotCharging => Self::NOT_CHARGING_TAG,
            Self::Disconnected => Self::DISCONNECTED_TAG,
            Self::Other(tag) => *tag,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Charging => "CHARGING",
            Self::NotCharging => "NOT_CHARGING",
            Self::Disconnected => "DISCONNECTED",
            Self::Other(_) => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub component: BatteryComponent,
    /// Charge level, 0-100
    pub level: u8,
    pub status: BatteryStatus,
}

impl BatteryReading {
    pub fn new(component: BatteryComponent, level: u8, status: BatteryStatus) -> Self {
        Self {
            component,
            level,
            status,
        }
    }

    /// Reading used before the first battery notification arrives.
    pub fn disconnected(component: BatteryComponent) -> Self {
        Self::new(component, 0, BatteryStatus::Disconnected)
    }
}

/// One reading per component, always reported left, right, case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatterySnapshot {
    pub left: BatteryReading,
    pub right: BatteryReading,
    pub case: BatteryReading,
}

impl Default for BatterySnapshot {
    fn default() -> Self {
        Self {
            left: BatteryReading::disconnected(BatteryComponent::Left),
            right: BatteryReading::disconnected(BatteryComponent::Right),
            case: BatteryReading::disconnected(BatteryComponent::Case),
        }
    }
}

impl BatterySnapshot {
    pub fn readings(&self) -> [BatteryReading; 3] {
        [self.left, self.right, self.case]
    }

    /// Both pods report charging (usually means they sit in the case)
    pub fn pods_charging(&self) -> bool {
        self.left.status == BatteryStatus::Charging && self.right.status == BatteryStatus::Charging
    }
}

/// Listening mode. Wire tag is the variant index plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoiseControlMode {
    Off,
    NoiseCancellation,
    Transparency,
    Adaptive,
}

impl NoiseControlMode {
    pub const ALL: [NoiseControlMode; 4] = [
        Self::Off,
        Self::NoiseCancellation,
        Self::Transparency,
        Self::Adaptive,
    ];

    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Off),
            2 => Some(Self::NoiseCancellation),
            3 => Some(Self::Transparency),
            4 => Some(Self::Adaptive),
            _ => None,
        }
    }

    pub fn wire_tag(&self) -> u8 {
        match self {
            Self::Off => 1,
            Self::NoiseCancellation => 2,
            Self::Transparency => 3,
            Self::Adaptive => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::NoiseCancellation => "ON",
            Self::Transparency => "TRANSPARENCY",
            Self::Adaptive => "ADAPTIVE",
        }
    }
}

/// Raw noise-control status byte plus its decoded mode (`None` = unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseControlStatus {
    pub raw: u8,
    pub mode: Option<NoiseControlMode>,
}

impl NoiseControlStatus {
    pub fn from_wire(raw: u8) -> Self {
        Self {
            raw,
            mode: NoiseControlMode::from_wire(raw),
        }
    }

    pub fn name(&self) -> &'static str {
        self.mode.map(|m| m.name()).unwrap_or("UNKNOWN")
    }
}

impl Default for NoiseControlStatus {
    fn default() -> Self {
        Self::from_wire(NoiseControlMode::Off.wire_tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarState {
    InEar,
    OutOfEar,
    InCase,
    Other(u8),
}

impl EarState {
    pub const IN_EAR: u8 = 0x00;
    pub const OUT_OF_EAR: u8 = 0x01;
    pub const IN_CASE: u8 = 0x02;

    pub fn from_wire(byte: u8) -> Self {
        match byte {
            Self::IN_EAR => Self::InEar,
            Self::OUT_OF_EAR => Self::OutOfEar,
            Self::IN_CASE => Self::InCase,
            other => Self::Other(other),
        }
    }
}

/// The two ear-detection status bytes, kept exactly as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarDetectionStatus {
    pub bytes: [u8; 2],
}

impl Default for EarDetectionStatus {
    fn default() -> Self {
        Self {
            bytes: [EarState::IN_EAR, EarState::IN_EAR],
        }
    }
}

impl EarDetectionStatus {
    pub fn new(first: u8, second: u8) -> Self {
        Self {
            bytes: [first, second],
        }
    }

    pub fn states(&self) -> [EarState; 2] {
        [
            EarState::from_wire(self.bytes[0]),
            EarState::from_wire(self.bytes[1]),
        ]
    }

    pub fn any_in_ear(&self) -> bool {
        self.bytes.contains(&EarState::IN_EAR)
    }

    pub fn both_in_ear(&self) -> bool {
        self.bytes.iter().all(|b| *b == EarState::IN_EAR)
    }
}

/// What a conversational-awareness level says about the wearer's speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechActivity {
    SpeakingStarted,
    SpeakingStopped,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversationalAwarenessLevel(pub u8);

impl ConversationalAwarenessLevel {
    pub fn speech_activity(&self) -> SpeechActivity {
        match self.0 {
            1 | 2 => SpeechActivity::SpeakingStarted,
            8 | 9 => SpeechActivity::SpeakingStopped,
            _ => SpeechActivity::Other,
        }
    }
}

/// Head orientation in degrees, relative to the calibrated neutral pose.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub pitch: f32,
    pub yaw: f32,
}

/// Raw acceleration fields, no calibration applied.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Acceleration {
    pub vertical: f32,
    pub horizontal: f32,
}

/// State changes pushed to device-state subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    EarDetection {
        previous: EarDetectionStatus,
        current: EarDetectionStatus,
    },
    NoiseControl(NoiseControlStatus),
    Battery(BatterySnapshot),
    ConversationalAwareness(ConversationalAwarenessLevel),
}
