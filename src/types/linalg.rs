//! Planar frame types for dead reckoning
//!
//! Body frame is vehicle-relative (x forward, y right). The navigation frame is
//! fixed at session start; heading rotates one into the other.

use nalgebra::{Rotation2, Vector2};

// ===== Frame Vectors =====
pub type BodyVec = Vector2<f64>; // (vx, vy) as reported by the sensor
pub type NavVec = Vector2<f64>; // (x, y) in the navigation frame

pub type HeadingRotation = Rotation2<f64>;

/// Rotation taking body-frame vectors into the navigation frame for a heading in degrees.
pub fn body_to_nav(heading_deg: f64) -> HeadingRotation {
    Rotation2::new(heading_deg.to_radians())
}
