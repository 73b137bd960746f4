//! Per-sample validity gating of bottom-track velocity.

use serde::{Deserialize, Serialize};

use crate::types::VelocitySample;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Reject when fom_x or fom_y exceeds this value
    pub fom_threshold: Option<f64>,
    /// Reject when both |vx| and |vy| are below this value [m/s]
    pub velocity_noise_floor: Option<f64>,
    /// Require the sensor's X and Y velocity-valid status bits
    pub status_bit_check: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            fom_threshold: Some(1.5),
            velocity_noise_floor: Some(0.01),
            status_bit_check: false,
        }
    }
}

impl GateConfig {
    /// Gate that accepts everything.
    pub fn open() -> Self {
        Self {
            fom_threshold: None,
            velocity_noise_floor: None,
            status_bit_check: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Figure of merit above threshold
    Quality { fom_x: f64, fom_y: f64, threshold: f64 },
    /// Motion indistinguishable from sensor noise
    NoiseFloor { vx: f64, vy: f64, floor: f64 },
    /// Sensor flagged X or Y velocity invalid
    StatusInvalid { status_bits: u32 },
}

impl Rejection {
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::Quality { .. } => "quality",
            Rejection::NoiseFloor { .. } => "noise-floor",
            Rejection::StatusInvalid { .. } => "status-invalid",
        }
    }
}

/// Verdict for one velocity sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Verdict {
    Accept,
    Reject(Rejection),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Check a sample against the enabled rules.
///
/// Status is checked first, then quality, then the noise floor, so a sample failing
/// several rules reports the most fundamental one.
pub fn evaluate(sample: &VelocitySample, config: &GateConfig) -> Verdict {
    if config.status_bit_check && !(sample.x_valid() && sample.y_valid()) {
        return Verdict::Reject(Rejection::StatusInvalid {
            status_bits: sample.status_bits,
        });
    }

    if let Some(threshold) = config.fom_threshold {
        if sample.fom_x > threshold || sample.fom_y > threshold {
            return Verdict::Reject(Rejection::Quality {
                fom_x: sample.fom_x,
                fom_y: sample.fom_y,
                threshold,
            });
        }
    }

    if let Some(floor) = config.velocity_noise_floor {
        if sample.vx.abs() < floor && sample.vy.abs() < floor {
            return Verdict::Reject(Rejection::NoiseFloor {
                vx: sample.vx,
                vy: sample.vy,
                floor,
            });
        }
    }

    Verdict::Accept
}

pub fn is_valid(sample: &VelocitySample, config: &GateConfig) -> bool {
    evaluate(sample, config).is_valid()
}

/// Validity gate holding the carried velocity between cycles.
pub struct ValidityGate {
    config: GateConfig,
    carried: Option<VelocitySample>,
}

impl ValidityGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            carried: None,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Latest velocity sample seen, zeroed after a status-invalid rejection.
    pub fn carried(&self) -> Option<&VelocitySample> {
        self.carried.as_ref()
    }

    /// Gate a sample. Rejections are logged here; callers only see the verdict.
    pub fn admit(&mut self, sample: &VelocitySample) -> Verdict {
        let verdict = evaluate(sample, &self.config);
        match verdict {
            Verdict::Accept => {
                self.carried = Some(*sample);
            }
            Verdict::Reject(rejection @ Rejection::StatusInvalid { status_bits }) => {
                log::warn!(
                    "[gate] {}: velocity status invalid (status=0x{:X}), skipping",
                    rejection.label(),
                    status_bits
                );
                // Never let a stale velocity ride into a later cycle.
                self.carried = Some(sample.halted());
            }
            Verdict::Reject(rejection @ Rejection::Quality { fom_x, fom_y, threshold }) => {
                log::warn!(
                    "[gate] {}: FOM too high (x={:.2}, y={:.2} > {:.2}), skipping integration",
                    rejection.label(),
                    fom_x,
                    fom_y,
                    threshold
                );
                self.carried = Some(*sample);
            }
            Verdict::Reject(rejection @ Rejection::NoiseFloor { vx, vy, floor }) => {
                log::debug!(
                    "[gate] {}: |vx|={:.4}, |vy|={:.4} below {:.3} m/s",
                    rejection.label(),
                    vx.abs(),
                    vy.abs(),
                    floor
                );
                self.carried = Some(*sample);
            }
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_good_sample() {
        let sample = VelocitySample::new(0.3, 0.0, 0.2, 0.2);
        assert!(is_valid(&sample, &GateConfig::default()));
    }

    #[test]
    fn test_quality_rejection() {
        let sample = VelocitySample::new(1.0, 0.0, 2.0, 0.1);
        assert_eq!(
            evaluate(&sample, &GateConfig::default()),
            Verdict::Reject(Rejection::Quality {
                fom_x: 2.0,
                fom_y: 0.1,
                threshold: 1.5
            })
        );
    }

    #[test]
    fn test_noise_floor_needs_both_axes_small() {
        let config = GateConfig::default();
        let still = VelocitySample::new(0.005, -0.004, 0.1, 0.1);
        let sideways = VelocitySample::new(0.005, 0.2, 0.1, 0.1);

        assert!(matches!(
            evaluate(&still, &config),
            Verdict::Reject(Rejection::NoiseFloor { .. })
        ));
        assert!(is_valid(&sideways, &config));
    }

    #[test]
    fn test_status_check_toggle() {
        let sample = VelocitySample::new(0.5, 0.5, 0.1, 0.1).with_status(1 << 10);

        assert!(is_valid(&sample, &GateConfig::default()));

        let strict = GateConfig {
            status_bit_check: true,
            ..GateConfig::default()
        };
        assert_eq!(
            evaluate(&sample, &strict),
            Verdict::Reject(Rejection::StatusInvalid { status_bits: 1 << 10 })
        );
    }

    #[test]
    fn test_open_gate_accepts_everything() {
        let sample = VelocitySample::new(0.0, 0.0, 99.0, 99.0).with_status(0);
        assert!(is_valid(&sample, &GateConfig::open()));
    }

    #[test]
    fn test_status_rejection_zeroes_carried_velocity() {
        let mut gate = ValidityGate::new(GateConfig {
            status_bit_check: true,
            ..GateConfig::default()
        });

        gate.admit(&VelocitySample::new(0.8, 0.1, 0.2, 0.2));
        assert_eq!(gate.carried().map(|s| s.vx), Some(0.8));

        let verdict = gate.admit(&VelocitySample::new(0.9, 0.2, 0.2, 0.2).with_status(0));
        assert!(!verdict.is_valid());
        let carried = gate.carried().unwrap();
        assert_eq!((carried.vx, carried.vy), (0.0, 0.0));
    }

    #[test]
    fn test_quality_rejection_keeps_fom_for_monitor() {
        let mut gate = ValidityGate::new(GateConfig::default());
        gate.admit(&VelocitySample::new(1.0, 0.0, 2.0, 0.4));
        assert_eq!(gate.carried().map(|s| s.fom_x), Some(2.0));
    }
}
