pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sensor subsystem identifiers as they appear on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum DataId {
    /// AHRS orientation output
    Orientation,
    Altimeter,
    BottomTrack,
    Other(u8),
}

impl DataId {
    pub const ORIENTATION: u8 = 0xD2;
    pub const ALTIMETER: u8 = 0xAA;
    pub const BOTTOM_TRACK: u8 = 0xB4;

    pub fn name(&self) -> &'static str {
        match self {
            DataId::Orientation => "orientation",
            DataId::Altimeter => "altimeter",
            DataId::BottomTrack => "bottom-track",
            DataId::Other(_) => "other",
        }
    }
}

impl From<u8> for DataId {
    fn from(id: u8) -> Self {
        match id {
            Self::ORIENTATION => DataId::Orientation,
            Self::ALTIMETER => DataId::Altimeter,
            Self::BOTTOM_TRACK => DataId::BottomTrack,
            other => DataId::Other(other),
        }
    }
}

impl From<DataId> for u8 {
    fn from(id: DataId) -> Self {
        match id {
            DataId::Orientation => DataId::ORIENTATION,
            DataId::Altimeter => DataId::ALTIMETER,
            DataId::BottomTrack => DataId::BOTTOM_TRACK,
            DataId::Other(raw) => raw,
        }
    }
}

/// One decoded record from the sensor stream: a subsystem tag plus named numeric fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub id: DataId,
    pub fields: HashMap<String, f64>,
}

impl Packet {
    pub fn new(id: DataId) -> Self {
        Self {
            id,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: f64) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    pub roll: f64,
    pub pitch: f64,
    /// Heading in degrees
    pub yaw: f64,
    pub depth: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VelocitySample {
    /// Body-frame velocity [m/s]
    pub vx: f64,
    pub vy: f64,
    pub vz: Option<f64>,
    pub fom_x: f64,
    pub fom_y: f64,
    pub fom_z: Option<f64>,
    pub status_bits: u32,
    /// Slant range per beam [m]
    pub beam_distances: [Option<f64>; 3],
}

impl VelocitySample {
    pub const STATUS_X_VALID: u32 = 1 << 9;
    pub const STATUS_Y_VALID: u32 = 1 << 10;

    pub fn new(vx: f64, vy: f64, fom_x: f64, fom_y: f64) -> Self {
        Self {
            vx,
            vy,
            vz: None,
            fom_x,
            fom_y,
            fom_z: None,
            status_bits: Self::STATUS_X_VALID | Self::STATUS_Y_VALID,
            beam_distances: [None; 3],
        }
    }

    pub fn with_status(mut self, status_bits: u32) -> Self {
        self.status_bits = status_bits;
        self
    }

    pub fn x_valid(&self) -> bool {
        self.status_bits & Self::STATUS_X_VALID != 0
    }

    pub fn y_valid(&self) -> bool {
        self.status_bits & Self::STATUS_Y_VALID != 0
    }

    /// Same sample with the velocity zeroed, quality fields kept.
    pub fn halted(&self) -> Self {
        Self {
            vx: 0.0,
            vy: 0.0,
            vz: self.vz.map(|_| 0.0),
            ..*self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AltitudeSample {
    pub altitude: f64,
}

/// Output of the packet classifier, one variant per subsystem.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sample {
    Orientation(OrientationSample),
    Velocity(VelocitySample),
    Altitude(AltitudeSample),
}
