use serde::{Deserialize, Serialize};

use crate::types::{body_to_nav, BodyVec, NavVec};

/// Dead-reckoned position in the navigation frame (origin = session start).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    pub x: f64,
    pub y: f64,
    /// Accumulated path length [m], never decreases
    pub total_path_length: f64,
}

impl NavigationState {
    pub fn position(&self) -> NavVec {
        NavVec::new(self.x, self.y)
    }

    /// Straight-line distance from the origin [m]
    pub fn drift(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Strap-down planar integrator. Sole owner and mutator of `NavigationState`.
pub struct FrameIntegrator {
    state: NavigationState,
    steps: u64,
}

impl FrameIntegrator {
    pub fn new() -> Self {
        Self {
            state: NavigationState::default(),
            steps: 0,
        }
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Rotate a body-frame velocity into the navigation frame and integrate over `dt`.
    ///
    /// A `None` heading (never observed) makes this a no-op. `dt` is applied as given.
    pub fn integrate(&mut self, vx: f64, vy: f64, yaw_deg: Option<f64>, dt: f64) {
        let Some(yaw_deg) = yaw_deg else {
            return;
        };

        let nav_velocity = rotate_to_nav(BodyVec::new(vx, vy), yaw_deg);
        let delta = nav_velocity * dt;

        self.state.x += delta.x;
        self.state.y += delta.y;
        self.state.total_path_length += delta.norm();
        self.steps += 1;
    }
}

impl Default for FrameIntegrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Body→navigation rotation:
///   vx_nav = cos θ·vx − sin θ·vy
///   vy_nav = sin θ·vx + cos θ·vy
pub fn rotate_to_nav(body: BodyVec, yaw_deg: f64) -> NavVec {
    body_to_nav(yaw_deg) * body
}
