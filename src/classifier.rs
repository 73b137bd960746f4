//! Packet classification: subsystem dispatch and field extraction.

use crate::error::ClassifyError;
use crate::types::{AltitudeSample, DataId, OrientationSample, Packet, Sample, VelocitySample};

// Orientation (AHRS) fields
pub const FIELD_ROLL: &str = "ahrsData.roll";
pub const FIELD_PITCH: &str = "ahrsData.pitch";
pub const FIELD_HEADING: &str = "ahrsData.heading";
pub const FIELD_DEPTH: &str = "depth";

// Altimeter fields
pub const FIELD_ALTITUDE: &str = "altimeterDistance";

// Bottom-track fields
pub const FIELD_VEL_X: &str = "velocityX";
pub const FIELD_VEL_Y: &str = "velocityY";
pub const FIELD_VEL_Z: &str = "velocityZ";
pub const FIELD_FOM_X: &str = "fomX";
pub const FIELD_FOM_Y: &str = "fomY";
pub const FIELD_FOM_Z: &str = "fomZ";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_BEAMS: [&str; 3] = ["distanceBeam1", "distanceBeam2", "distanceBeam3"];

/// Classify a packet by subsystem.
///
/// `Ok(None)` for subsystems the estimator does not consume. A packet missing a
/// required field yields an error and no partial sample.
pub fn classify(packet: &Packet) -> Result<Option<Sample>, ClassifyError> {
    match packet.id {
        DataId::Orientation => orientation(packet).map(|s| Some(Sample::Orientation(s))),
        DataId::Altimeter => altitude(packet).map(|s| Some(Sample::Altitude(s))),
        DataId::BottomTrack => velocity(packet).map(|s| Some(Sample::Velocity(s))),
        DataId::Other(raw) => {
            log::debug!("[classify] ignoring packet id 0x{:02X}", raw);
            Ok(None)
        }
    }
}

fn required(packet: &Packet, field: &'static str) -> Result<f64, ClassifyError> {
    packet.field(field).ok_or(ClassifyError::MissingField {
        subsystem: packet.id,
        field,
    })
}

fn orientation(packet: &Packet) -> Result<OrientationSample, ClassifyError> {
    Ok(OrientationSample {
        roll: required(packet, FIELD_ROLL)?,
        pitch: required(packet, FIELD_PITCH)?,
        yaw: required(packet, FIELD_HEADING)?,
        depth: required(packet, FIELD_DEPTH)?,
    })
}

fn altitude(packet: &Packet) -> Result<AltitudeSample, ClassifyError> {
    Ok(AltitudeSample {
        altitude: required(packet, FIELD_ALTITUDE)?,
    })
}

fn velocity(packet: &Packet) -> Result<VelocitySample, ClassifyError> {
    let vx = required(packet, FIELD_VEL_X)?;
    let vy = required(packet, FIELD_VEL_Y)?;
    let fom_x = required(packet, FIELD_FOM_X)?;
    let fom_y = required(packet, FIELD_FOM_Y)?;

    // Status arrives as a float field; anything unrepresentable reads as "no bits set".
    let status_bits = packet
        .field(FIELD_STATUS)
        .filter(|s| s.is_finite() && *s >= 0.0 && *s <= u32::MAX as f64)
        .map(|s| s as u32)
        .unwrap_or(0);

    Ok(VelocitySample {
        vx,
        vy,
        vz: packet.field(FIELD_VEL_Z),
        fom_x,
        fom_y,
        fom_z: packet.field(FIELD_FOM_Z),
        status_bits,
        beam_distances: FIELD_BEAMS.map(|name| packet.field(name)),
    })
}
