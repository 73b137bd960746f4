// estimator.rs: Pure computation layer for the DVL dead reckoner
//
// Everything in this module is independent of:
//   - tokio / async runtime
//   - the sensor connection and its command set
//   - stdout formatting
//
// It takes packets and timestamps in, produces navigation state and events out,
// so it can be driven from a live session, a replayed log, or a unit test.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::anomaly::{AnomalyMonitor, MonitorConfig, MonitorInputs};
use crate::classifier::classify;
use crate::error::ClassifyError;
use crate::filters::{FrameIntegrator, NavigationState};
use crate::gate::{GateConfig, Rejection, ValidityGate, Verdict};
use crate::health_monitor::HealthMonitor;
use crate::report::{PacketCounters, Report};
use crate::types::{AltitudeSample, DataId, OrientationSample, Packet, Sample, VelocitySample};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Presets matching the three field-test setups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Plain tracking with FOM and noise-floor gating
    Tracking,
    /// Status-bit gating, no altimeter
    YawAware,
    /// Altitude hold reporting, no gating
    AltitudeHold,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    // ── Validity gate ──
    pub gate: GateConfig,

    // ── Anomaly monitor ──
    pub monitor: MonitorConfig,

    // ── Session timing ──
    pub packet_timeout_secs: f64,
    /// Upper bound on a single integration step; `None` integrates stalls verbatim
    pub max_dt_secs: Option<f64>,
    pub health_silence_secs: f64,

    // ── Sensor setup ──
    pub enable_altimeter: bool,
    pub bottom_track_mode: Option<String>,
    pub save_sensor_config: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            monitor: MonitorConfig::default(),
            packet_timeout_secs: 2.0,
            max_dt_secs: None,
            health_silence_secs: 5.0,
            enable_altimeter: true,
            bottom_track_mode: Some("CRAWLER".to_string()),
            save_sensor_config: true,
        }
    }
}

impl EstimatorConfig {
    pub fn for_profile(profile: Profile) -> Self {
        let base = Self::default();
        match profile {
            Profile::Tracking => base,
            Profile::YawAware => Self {
                gate: GateConfig {
                    status_bit_check: true,
                    ..GateConfig::default()
                },
                monitor: MonitorConfig {
                    report_interval_secs: 2.0,
                    homed_threshold: 1.0,
                    fom_threshold: 1.5,
                    ..MonitorConfig::default()
                },
                packet_timeout_secs: 3.0,
                enable_altimeter: false,
                ..base
            },
            Profile::AltitudeHold => Self {
                gate: GateConfig::open(),
                monitor: MonitorConfig {
                    fom_threshold: 0.5,
                    ..MonitorConfig::default()
                },
                ..base
            },
        }
    }

    /// Load a JSON config; missing keys fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum NavEvent {
    PacketIncomplete(ClassifyError),
    SampleRejected(Rejection),
    /// Valid velocity but no heading observed yet
    HeadingUnknown,
    /// Altimeter reported no distance
    BottomLockLost,
    DtClamped { dt: f64, limit: f64 },
    Report(Report),
}

// ─── Single-shot output ──────────────────────────────────────────────────────

/// One fused sample across all three subsystems.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusedSnapshot {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub depth: f64,
    pub altitude: f64,
    pub fom_x: f64,
    pub fom_y: f64,
    pub fom_z: Option<f64>,
    pub beam_distances: [Option<f64>; 3],
}

impl FusedSnapshot {
    pub fn format_lines(&self) -> Vec<String> {
        let opt = |v: Option<f64>, unit: &str| match v {
            Some(v) => format!("{:.2}{}", v, unit),
            None => "n/a".to_string(),
        };
        vec![
            format!("Roll:     {:.2}°", self.roll),
            format!("Pitch:    {:.2}°", self.pitch),
            format!("Yaw:      {:.2}°", self.yaw),
            format!("Depth:    {:.2} m", self.depth),
            format!("Altitude: {:.2} m", self.altitude),
            format!("FOM X:    {:.2}", self.fom_x),
            format!("FOM Y:    {:.2}", self.fom_y),
            format!("FOM Z:    {}", opt(self.fom_z, "")),
            format!("B1:       {}", opt(self.beam_distances[0], " m")),
            format!("B2:       {}", opt(self.beam_distances[1], " m")),
            format!("B3:       {}", opt(self.beam_distances[2], " m")),
        ]
    }
}

// ─── The dead reckoner ───────────────────────────────────────────────────────

/// Owns every piece of mutable navigation state for one session.
pub struct DeadReckoner {
    config: EstimatorConfig,

    gate: ValidityGate,
    integrator: FrameIntegrator,
    monitor: AnomalyMonitor,
    health: HealthMonitor,

    // Latest-value samples
    orientation: Option<OrientationSample>,
    altitude: Option<AltitudeSample>,

    // Timing (seconds since session start)
    start_time: f64,
    // Previous velocity cycle, accepted or rejected
    last_cycle_time: f64,

    // Displacement baseline for the interval delta
    last_report_position: (f64, f64),

    counters: PacketCounters,
}

impl DeadReckoner {
    pub fn new(config: EstimatorConfig, start_time: f64) -> Self {
        Self {
            gate: ValidityGate::new(config.gate.clone()),
            integrator: FrameIntegrator::new(),
            monitor: AnomalyMonitor::new(config.monitor.clone(), start_time),
            health: HealthMonitor::new(config.health_silence_secs, config.enable_altimeter, start_time),
            orientation: None,
            altitude: None,
            start_time,
            last_cycle_time: start_time,
            last_report_position: (0.0, 0.0),
            counters: PacketCounters::default(),
            config,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn nav_state(&self) -> &NavigationState {
        self.integrator.state()
    }

    pub fn orientation(&self) -> Option<&OrientationSample> {
        self.orientation.as_ref()
    }

    pub fn altitude(&self) -> Option<&AltitudeSample> {
        self.altitude.as_ref()
    }

    pub fn velocity(&self) -> Option<&VelocitySample> {
        self.gate.carried()
    }

    pub fn counters(&self) -> &PacketCounters {
        &self.counters
    }

    /// Process one packet received at `now`. Runs a report cycle when one is due.
    pub fn feed_packet(&mut self, packet: &Packet, now: f64) -> Vec<NavEvent> {
        let mut events = Vec::new();

        self.counters.received += 1;
        self.health.record_packet(packet.id, now);

        match classify(packet) {
            Ok(Some(sample)) => events.extend(self.apply_sample(sample, now)),
            Ok(None) => self.counters.ignored += 1,
            Err(err) => {
                log::warn!("[classify] {}", err);
                self.counters.incomplete += 1;
                if packet.id == DataId::Altimeter {
                    self.altitude = None;
                    events.push(NavEvent::BottomLockLost);
                }
                events.push(NavEvent::PacketIncomplete(err));
            }
        }

        if self.monitor.is_due(now) {
            events.push(NavEvent::Report(self.report(now)));
        }

        events
    }

    fn apply_sample(&mut self, sample: Sample, now: f64) -> Vec<NavEvent> {
        let mut events = Vec::new();
        match sample {
            Sample::Orientation(o) => {
                self.monitor.observe_heading(o.yaw);
                self.orientation = Some(o);
            }
            Sample::Altitude(a) => {
                self.altitude = Some(a);
            }
            Sample::Velocity(v) => match self.gate.admit(&v) {
                Verdict::Accept => {
                    let dt = self.velocity_dt(now, &mut events);
                    let yaw = self.orientation.map(|o| o.yaw);
                    if yaw.is_some() {
                        self.integrator.integrate(v.vx, v.vy, yaw, dt);
                        self.counters.integrated += 1;
                    } else {
                        self.counters.no_heading += 1;
                        events.push(NavEvent::HeadingUnknown);
                    }
                }
                Verdict::Reject(rejection) => {
                    self.last_cycle_time = now;
                    self.counters.record_rejection(&rejection);
                    events.push(NavEvent::SampleRejected(rejection));
                }
            },
        }
        events
    }

    /// Time since the previous velocity cycle, clamped to `max_dt_secs` when set.
    fn velocity_dt(&mut self, now: f64, events: &mut Vec<NavEvent>) -> f64 {
        let dt = (now - self.last_cycle_time).max(0.0);
        self.last_cycle_time = now;
        match self.config.max_dt_secs {
            Some(limit) if dt > limit => {
                log::warn!("[nav] dt {:.3}s exceeds {:.3}s, clamping", dt, limit);
                events.push(NavEvent::DtClamped { dt, limit });
                limit
            }
            _ => dt,
        }
    }

    /// Bounded wait elapsed with no packet. Not an error.
    pub fn record_timeout(&mut self) {
        self.counters.timeouts += 1;
        self.health.record_timeout();
    }

    /// Run a report cycle now, regardless of cadence.
    pub fn report(&mut self, now: f64) -> Report {
        let nav = *self.integrator.state();
        let anomalies = self.monitor.evaluate(
            MonitorInputs {
                nav: &nav,
                orientation: self.orientation.as_ref(),
                altitude: self.altitude.as_ref(),
                velocity: self.gate.carried(),
            },
            now,
        );

        let interval_displacement = (
            nav.x - self.last_report_position.0,
            nav.y - self.last_report_position.1,
        );
        self.last_report_position = (nav.x, nav.y);

        let target = self.config.monitor.target_altitude;
        Report {
            timestamp: crate::report::current_timestamp(),
            uptime_secs: now - self.start_time,
            nav,
            drift: nav.drift(),
            interval_displacement,
            yaw: self.orientation.map(|o| o.yaw),
            depth: self.orientation.map(|o| o.depth),
            altitude: self.altitude.map(|a| a.altitude),
            target_altitude: self.config.enable_altimeter.then_some(target),
            altitude_error: self.altitude.map(|a| a.altitude - target),
            fom: self.gate.carried().map(|v| (v.fom_x, v.fom_y)),
            counters: self.counters.clone(),
            health: self.health.check_health(now),
            anomalies,
        }
    }

    /// All three subsystems observed at least once.
    pub fn fused_snapshot(&self) -> Option<FusedSnapshot> {
        let o = self.orientation?;
        let a = self.altitude?;
        let v = self.gate.carried()?;
        Some(FusedSnapshot {
            roll: o.roll,
            pitch: o.pitch,
            yaw: o.yaw,
            depth: o.depth,
            altitude: a.altitude,
            fom_x: v.fom_x,
            fom_y: v.fom_y,
            fom_z: v.fom_z,
            beam_distances: v.beam_distances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyEvent;
    use crate::classifier::*;
    use approx::assert_abs_diff_eq;

    fn ahrs(yaw: f64) -> Packet {
        Packet::new(DataId::Orientation)
            .with_field(FIELD_ROLL, 0.0)
            .with_field(FIELD_PITCH, 0.0)
            .with_field(FIELD_HEADING, yaw)
            .with_field(FIELD_DEPTH, 2.0)
    }

    fn bt(vx: f64, vy: f64, fom_x: f64) -> Packet {
        Packet::new(DataId::BottomTrack)
            .with_field(FIELD_VEL_X, vx)
            .with_field(FIELD_VEL_Y, vy)
            .with_field(FIELD_FOM_X, fom_x)
            .with_field(FIELD_FOM_Y, 0.1)
            .with_field(FIELD_STATUS, ((1 << 9) | (1 << 10)) as f64)
    }

    fn alt(altitude: f64) -> Packet {
        Packet::new(DataId::Altimeter).with_field(FIELD_ALTITUDE, altitude)
    }

    fn quiet_config() -> EstimatorConfig {
        EstimatorConfig {
            monitor: MonitorConfig {
                report_interval_secs: 1000.0,
                ..MonitorConfig::default()
            },
            ..EstimatorConfig::default()
        }
    }

    #[test]
    fn test_straight_line_at_heading_zero() {
        let mut nav = DeadReckoner::new(quiet_config(), 0.0);
        nav.feed_packet(&ahrs(0.0), 0.0);
        for i in 1..=5 {
            nav.feed_packet(&bt(1.0, 0.0, 0.2), i as f64 * 0.1);
        }
        let state = nav.nav_state();
        assert_abs_diff_eq!(state.x, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(state.y, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(state.total_path_length, 0.5, epsilon = 1e-9);
        assert_eq!(nav.counters().integrated, 5);
    }

    #[test]
    fn test_velocity_before_heading_is_not_integrated() {
        let mut nav = DeadReckoner::new(quiet_config(), 0.0);
        let events = nav.feed_packet(&bt(1.0, 0.0, 0.2), 0.1);
        assert!(matches!(events.as_slice(), [NavEvent::HeadingUnknown]));
        assert_eq!(*nav.nav_state(), NavigationState::default());
    }

    #[test]
    fn test_high_fom_never_moves_position() {
        let mut nav = DeadReckoner::new(quiet_config(), 0.0);
        nav.feed_packet(&ahrs(45.0), 0.0);
        for (i, v) in [0.5, 3.0, -7.0, 100.0].iter().enumerate() {
            let events = nav.feed_packet(&bt(*v, -*v, 2.0), (i + 1) as f64 * 0.1);
            assert!(matches!(
                events.as_slice(),
                [NavEvent::SampleRejected(Rejection::Quality { .. })]
            ));
        }
        assert_eq!(*nav.nav_state(), NavigationState::default());
        assert_eq!(nav.counters().rejected_quality, 4);
    }

    #[test]
    fn test_dt_spans_interleaved_packets() {
        let mut nav = DeadReckoner::new(quiet_config(), 0.0);
        nav.feed_packet(&ahrs(0.0), 0.0);
        for i in 1..=10 {
            let t = i as f64 * 0.1;
            nav.feed_packet(&ahrs(0.0), t - 0.05);
            nav.feed_packet(&alt(1.0), t - 0.02);
            nav.feed_packet(&bt(1.0, 0.0, 0.2), t);
        }
        assert_abs_diff_eq!(nav.nav_state().x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(nav.nav_state().total_path_length, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rejected_sample_closes_its_cycle() {
        let mut nav = DeadReckoner::new(quiet_config(), 0.0);
        nav.feed_packet(&ahrs(0.0), 0.0);
        nav.feed_packet(&bt(1.0, 0.0, 0.2), 0.1);
        nav.feed_packet(&bt(1.0, 0.0, 2.0), 0.6);
        nav.feed_packet(&bt(1.0, 0.0, 0.2), 0.7);
        assert_abs_diff_eq!(nav.nav_state().x, 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_max_dt_clamp() {
        let config = EstimatorConfig {
            max_dt_secs: Some(0.5),
            ..quiet_config()
        };
        let mut nav = DeadReckoner::new(config, 0.0);
        nav.feed_packet(&ahrs(0.0), 0.0);
        let events = nav.feed_packet(&bt(1.0, 0.0, 0.2), 4.0);
        assert!(events.iter().any(|e| matches!(e, NavEvent::DtClamped { .. })));
        assert_abs_diff_eq!(nav.nav_state().x, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_incomplete_altimeter_clears_altitude() {
        let mut nav = DeadReckoner::new(quiet_config(), 0.0);
        nav.feed_packet(&alt(1.2), 0.1);
        assert!(nav.altitude().is_some());

        let events = nav.feed_packet(&Packet::new(DataId::Altimeter), 0.2);
        assert!(events.iter().any(|e| matches!(e, NavEvent::BottomLockLost)));
        assert!(nav.altitude().is_none());
        assert_eq!(nav.counters().incomplete, 1);
    }

    #[test]
    fn test_report_emitted_on_cadence() {
        let mut nav = DeadReckoner::new(EstimatorConfig::default(), 0.0);
        assert!(nav.feed_packet(&ahrs(10.0), 0.5).is_empty());

        let events = nav.feed_packet(&ahrs(10.0), 1.2);
        let report = events
            .iter()
            .find_map(|e| match e {
                NavEvent::Report(r) => Some(r),
                _ => None,
            })
            .expect("report due");
        assert_eq!(report.yaw, Some(10.0));
        // Still at origin
        assert!(report.anomalies.iter().any(|a| matches!(a, AnomalyEvent::Homed { .. })));
    }

    #[test]
    fn test_interval_displacement() {
        let mut nav = DeadReckoner::new(quiet_config(), 0.0);
        nav.feed_packet(&ahrs(0.0), 0.0);
        nav.feed_packet(&bt(1.0, 0.0, 0.2), 1.0);
        let first = nav.report(1.0);
        nav.feed_packet(&bt(0.0, 0.5, 0.2), 2.0);
        let second = nav.report(2.0);
        assert_abs_diff_eq!(first.interval_displacement.0, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(second.interval_displacement.0, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(second.interval_displacement.1, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_fused_snapshot_needs_all_subsystems() {
        let mut nav = DeadReckoner::new(quiet_config(), 0.0);
        nav.feed_packet(&ahrs(12.0), 0.1);
        nav.feed_packet(&bt(0.2, 0.0, 0.3), 0.2);
        assert!(nav.fused_snapshot().is_none());

        nav.feed_packet(&alt(0.9), 0.3);
        let snapshot = nav.fused_snapshot().unwrap();
        assert_eq!(snapshot.yaw, 12.0);
        assert_eq!(snapshot.altitude, 0.9);
        assert_eq!(snapshot.fom_x, 0.3);
        assert_eq!(snapshot.format_lines().len(), 11);
    }

    #[test]
    fn test_profiles() {
        let yaw = EstimatorConfig::for_profile(Profile::YawAware);
        assert!(yaw.gate.status_bit_check);
        assert!(!yaw.enable_altimeter);
        assert_eq!(yaw.packet_timeout_secs, 3.0);

        let hold = EstimatorConfig::for_profile(Profile::AltitudeHold);
        assert_eq!(hold.gate, GateConfig::open());
        assert_eq!(hold.monitor.fom_threshold, 0.5);

        assert_eq!(EstimatorConfig::for_profile(Profile::Tracking), EstimatorConfig::default());
    }

    #[test]
    fn test_config_json_partial() {
        let json = r#"{"packet_timeout_secs": 3.0, "gate": {"status_bit_check": true}}"#;
        let config: EstimatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.packet_timeout_secs, 3.0);
        assert!(config.gate.status_bit_check);
        assert_eq!(config.gate.fom_threshold, Some(1.5));
        assert_eq!(config.monitor, MonitorConfig::default());
    }
}
