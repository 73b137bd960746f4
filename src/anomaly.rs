use serde::{Deserialize, Serialize};

use crate::filters::NavigationState;
use crate::types::{AltitudeSample, OrientationSample, VelocitySample};

/// What the heading-jump check compares against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YawJumpBaseline {
    /// Heading cached at the previous report, whether or not a sample arrived since.
    ReportCycle,
    /// Largest change between consecutive orientation samples since the previous report.
    PerSample,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub report_interval_secs: f64,
    pub homed_threshold: f64,
    pub target_altitude: f64,
    pub alt_lock_threshold: f64,
    pub alt_ceiling: f64,
    pub fom_threshold: f64,
    pub yaw_jump_threshold: f64,
    pub yaw_jump_baseline: YawJumpBaseline,
    /// Measure heading change on the circle (≤ 180°) instead of the raw difference
    pub wrap_yaw_delta: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 1.0,
            homed_threshold: 0.10,
            target_altitude: 1.0,
            alt_lock_threshold: 0.15,
            alt_ceiling: 3.0,
            fom_threshold: 1.5,
            yaw_jump_threshold: 45.0,
            yaw_jump_baseline: YawJumpBaseline::ReportCycle,
            wrap_yaw_delta: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyEvent {
    /// Back within the homed radius of the start point
    Homed { drift: f64 },
    AltLocked { altitude: f64, error: f64 },
    /// Altitude above ceiling, bottom lock at risk
    AltWarning { altitude: f64, ceiling: f64 },
    FomWarning { fom_x: f64, fom_y: f64, threshold: f64 },
    YawJump { delta: f64 },
}

impl AnomalyEvent {
    pub fn describe(&self) -> String {
        match self {
            AnomalyEvent::Homed { drift } => {
                format!("HOMED: returned to starting point ({:.2} m)", drift)
            }
            AnomalyEvent::AltLocked { error, .. } => {
                format!("ALT LOCKED: holding altitude (ΔAlt {:+.2} m)", error)
            }
            AnomalyEvent::AltWarning { altitude, ceiling } => format!(
                "ALT WARNING: {:.2} m above {:.2} m ceiling, bottom track may drop out",
                altitude, ceiling
            ),
            AnomalyEvent::FomWarning { fom_x, fom_y, threshold } => format!(
                "FOM WARNING: x={:.2} y={:.2} over {:.2}, bottom track may be unreliable",
                fom_x, fom_y, threshold
            ),
            AnomalyEvent::YawJump { delta } => format!("YAW JUMP: Δ{:.1}°", delta),
        }
    }
}

/// Latest values the monitor evaluates on a report cycle.
#[derive(Clone, Copy, Debug)]
pub struct MonitorInputs<'a> {
    pub nav: &'a NavigationState,
    pub orientation: Option<&'a OrientationSample>,
    pub altitude: Option<&'a AltitudeSample>,
    pub velocity: Option<&'a VelocitySample>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MonitorState {
    pub last_yaw: Option<f64>,
    pub last_report_time: f64,
}

pub struct AnomalyMonitor {
    config: MonitorConfig,
    state: MonitorState,
    prev_sample_yaw: Option<f64>,
    pending_sample_jump: f64,
}

impl AnomalyMonitor {
    /// `start_time` seeds the reporting cadence.
    pub fn new(config: MonitorConfig, start_time: f64) -> Self {
        Self {
            config,
            state: MonitorState {
                last_yaw: None,
                last_report_time: start_time,
            },
            prev_sample_yaw: None,
            pending_sample_jump: 0.0,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn is_due(&self, now: f64) -> bool {
        now - self.state.last_report_time > self.config.report_interval_secs
    }

    /// Track every orientation sample (only used by the per-sample baseline).
    pub fn observe_heading(&mut self, yaw: f64) {
        if self.config.yaw_jump_baseline == YawJumpBaseline::PerSample {
            if let Some(prev) = self.prev_sample_yaw {
                self.pending_sample_jump = self.pending_sample_jump.max(self.yaw_delta(prev, yaw));
            }
        }
        self.prev_sample_yaw = Some(yaw);
    }

    /// Run one report cycle. Thresholds are evaluated fresh each time, no hysteresis.
    pub fn evaluate(&mut self, inputs: MonitorInputs<'_>, now: f64) -> Vec<AnomalyEvent> {
        let mut events = Vec::new();
        let cfg = &self.config;

        let drift = inputs.nav.drift();
        if drift < cfg.homed_threshold {
            events.push(AnomalyEvent::Homed { drift });
        }

        if let Some(alt) = inputs.altitude {
            let error = alt.altitude - cfg.target_altitude;
            if error.abs() < cfg.alt_lock_threshold {
                events.push(AnomalyEvent::AltLocked {
                    altitude: alt.altitude,
                    error,
                });
            }
            if alt.altitude > cfg.alt_ceiling {
                events.push(AnomalyEvent::AltWarning {
                    altitude: alt.altitude,
                    ceiling: cfg.alt_ceiling,
                });
            }
        }

        if let Some(vel) = inputs.velocity {
            if vel.fom_x > cfg.fom_threshold || vel.fom_y > cfg.fom_threshold {
                events.push(AnomalyEvent::FomWarning {
                    fom_x: vel.fom_x,
                    fom_y: vel.fom_y,
                    threshold: cfg.fom_threshold,
                });
            }
        }

        let yaw = inputs.orientation.map(|o| o.yaw);
        let jump = match cfg.yaw_jump_baseline {
            YawJumpBaseline::ReportCycle => match (yaw, self.state.last_yaw) {
                (Some(current), Some(last)) => Some(self.yaw_delta(last, current)),
                _ => None,
            },
            YawJumpBaseline::PerSample => Some(self.pending_sample_jump),
        };
        if let Some(delta) = jump {
            if delta > self.config.yaw_jump_threshold {
                events.push(AnomalyEvent::YawJump { delta });
            }
        }

        // ReportCycle baseline: keep the most recent known heading, even if none
        // arrived this cycle.
        if yaw.is_some() {
            self.state.last_yaw = yaw;
        }
        self.state.last_report_time = now;
        self.pending_sample_jump = 0.0;

        events
    }

    fn yaw_delta(&self, from: f64, to: f64) -> f64 {
        let raw = (to - from).abs();
        if self.config.wrap_yaw_delta {
            let wrapped = raw % 360.0;
            wrapped.min(360.0 - wrapped)
        } else {
            raw
        }
    }
}
