use serde::{Deserialize, Serialize};

use crate::types::DataId;

/// Tracks packet arrival for one sensor subsystem
#[derive(Clone, Debug)]
pub struct SubsystemHealth {
    pub name: &'static str,
    pub expected: bool,
    last_update: f64,
    silence_threshold: f64,
}

impl SubsystemHealth {
    pub fn new(name: &'static str, silence_threshold_secs: f64, expected: bool, now: f64) -> Self {
        SubsystemHealth {
            name,
            expected,
            last_update: now,
            silence_threshold: silence_threshold_secs,
        }
    }

    pub fn update(&mut self, now: f64) {
        self.last_update = now;
    }

    pub fn time_since_last_update(&self, now: f64) -> f64 {
        (now - self.last_update).max(0.0)
    }

    pub fn is_silent(&self, now: f64) -> bool {
        self.expected && self.time_since_last_update(now) > self.silence_threshold
    }
}

/// Link-level health across the three subsystems plus stream timeouts
pub struct HealthMonitor {
    pub orientation: SubsystemHealth,
    pub altimeter: SubsystemHealth,
    pub bottom_track: SubsystemHealth,
    timeouts: u64,
    consecutive_timeouts: u64,
}

impl HealthMonitor {
    pub fn new(silence_threshold_secs: f64, expect_altimeter: bool, now: f64) -> Self {
        HealthMonitor {
            orientation: SubsystemHealth::new("orientation", silence_threshold_secs, true, now),
            altimeter: SubsystemHealth::new("altimeter", silence_threshold_secs, expect_altimeter, now),
            bottom_track: SubsystemHealth::new("bottom-track", silence_threshold_secs, true, now),
            timeouts: 0,
            consecutive_timeouts: 0,
        }
    }

    pub fn record_packet(&mut self, id: DataId, now: f64) {
        self.consecutive_timeouts = 0;
        match id {
            DataId::Orientation => self.orientation.update(now),
            DataId::Altimeter => self.altimeter.update(now),
            DataId::BottomTrack => self.bottom_track.update(now),
            DataId::Other(_) => {}
        }
    }

    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
        self.consecutive_timeouts += 1;
    }

    pub fn check_health(&self, now: f64) -> HealthReport {
        let silent = [&self.orientation, &self.altimeter, &self.bottom_track]
            .into_iter()
            .filter(|s| s.is_silent(now))
            .map(|s| SilentSubsystem {
                name: s.name.to_string(),
                silent_secs: s.time_since_last_update(now),
            })
            .collect();

        HealthReport {
            silent,
            timeouts: self.timeouts,
            consecutive_timeouts: self.consecutive_timeouts,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SilentSubsystem {
    pub name: String,
    pub silent_secs: f64,
}

/// Report of link health status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub silent: Vec<SilentSubsystem>,
    pub timeouts: u64,
    pub consecutive_timeouts: u64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.silent.is_empty()
    }
}
