use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly::AnomalyEvent;
use crate::filters::NavigationState;
use crate::gate::Rejection;
use crate::health_monitor::HealthReport;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketCounters {
    pub received: u64,
    pub timeouts: u64,
    pub incomplete: u64,
    pub ignored: u64,
    pub integrated: u64,
    pub no_heading: u64,
    pub rejected_quality: u64,
    pub rejected_noise_floor: u64,
    pub rejected_status: u64,
}

impl PacketCounters {
    pub fn record_rejection(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::Quality { .. } => self.rejected_quality += 1,
            Rejection::NoiseFloor { .. } => self.rejected_noise_floor += 1,
            Rejection::StatusInvalid { .. } => self.rejected_status += 1,
        }
    }

    pub fn rejected(&self) -> u64 {
        self.rejected_quality + self.rejected_noise_floor + self.rejected_status
    }
}

/// One periodic status report
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Report {
    pub timestamp: f64,
    pub uptime_secs: f64,
    pub nav: NavigationState,
    pub drift: f64,
    // Movement since the previous report
    pub interval_displacement: (f64, f64),
    pub yaw: Option<f64>,
    pub depth: Option<f64>,
    pub altitude: Option<f64>,
    pub target_altitude: Option<f64>,
    pub altitude_error: Option<f64>,
    pub fom: Option<(f64, f64)>,
    pub counters: PacketCounters,
    pub health: HealthReport,
    pub anomalies: Vec<AnomalyEvent>,
}

impl Report {
    /// Human-readable report lines
    pub fn format_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        let yaw = self
            .yaw
            .map(|y| format!("{:.1}°", y))
            .unwrap_or_else(|| "--".to_string());
        lines.push(format!(
            "[{}] X: {:.2} m | Y: {:.2} m | Yaw: {}",
            format_time(self.timestamp),
            self.nav.x,
            self.nav.y,
            yaw
        ));
        lines.push(format!(
            "Distance from Start: {:.2} m | Total Path: {:.2} m | ΔXY: ({:+.2}, {:+.2}) m",
            self.drift,
            self.nav.total_path_length,
            self.interval_displacement.0,
            self.interval_displacement.1
        ));

        if let Some(altitude) = self.altitude {
            match (self.target_altitude, self.altitude_error) {
                (Some(target), Some(error)) => lines.push(format!(
                    "Altitude: {:.2} m | Target: {:.2} m | ΔAlt: {:+.2} m",
                    altitude, target, error
                )),
                _ => lines.push(format!("Altitude: {:.2} m", altitude)),
            }
        }

        if let Some((fom_x, fom_y)) = self.fom {
            lines.push(format!("FOM X: {:.2} | FOM Y: {:.2}", fom_x, fom_y));
        }

        if !self.health.is_healthy() {
            let silent: Vec<String> = self
                .health
                .silent
                .iter()
                .map(|s| format!("{} silent {:.1}s", s.name, s.silent_secs))
                .collect();
            lines.push(format!("Data gap: {}", silent.join(", ")));
        }

        for anomaly in &self.anomalies {
            lines.push(anomaly.describe());
        }

        lines
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn current_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn format_time(timestamp: f64) -> String {
    Utc.timestamp_millis_opt((timestamp * 1000.0) as i64)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> Report {
        Report {
            timestamp: 1_700_000_000.0,
            uptime_secs: 12.0,
            nav: NavigationState {
                x: 1.0,
                y: -2.0,
                total_path_length: 3.5,
            },
            drift: 5.0_f64.sqrt(),
            interval_displacement: (0.1, -0.2),
            yaw: Some(87.3),
            depth: Some(3.0),
            altitude: Some(1.05),
            target_altitude: Some(1.0),
            altitude_error: Some(0.05),
            fom: Some((0.2, 0.3)),
            counters: PacketCounters::default(),
            health: HealthReport::default(),
            anomalies: vec![AnomalyEvent::AltLocked {
                altitude: 1.05,
                error: 0.05,
            }],
        }
    }

    #[test]
    fn test_format_lines() {
        let lines = sample_report().format_lines();
        assert!(lines[0].contains("X: 1.00 m | Y: -2.00 m | Yaw: 87.3°"));
        assert!(lines[1].contains("Total Path: 3.50 m"));
        assert!(lines.iter().any(|l| l.contains("Target: 1.00 m")));
        assert!(lines.last().unwrap().starts_with("ALT LOCKED"));
    }

    #[test]
    fn test_json_line_tags_anomalies() {
        let json = sample_report().to_json_line().unwrap();
        assert!(json.contains(r#""kind":"ALT_LOCKED""#));
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample_report());
    }

    #[test]
    fn test_rejection_counters() {
        let mut counters = PacketCounters::default();
        counters.record_rejection(&Rejection::StatusInvalid { status_bits: 0 });
        counters.record_rejection(&Rejection::NoiseFloor { vx: 0.0, vy: 0.0, floor: 0.01 });
        assert_eq!(counters.rejected_status, 1);
        assert_eq!(counters.rejected(), 2);
    }
}
