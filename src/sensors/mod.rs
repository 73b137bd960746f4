// Sensor stream collaborators.
//
// The session controller only ever talks to a `SensorStream`; the concrete
// device (simulated, replayed log, scripted mock) is chosen by the caller.

pub mod mock;
pub mod replay;
pub mod simulated;

pub use mock::{MockStep, MockStream};
pub use replay::ReplayStream;
pub use simulated::SimulatedStream;

use std::fmt;
use std::time::Duration;

use crate::error::StreamResult;
use crate::estimator::EstimatorConfig;
use crate::types::Packet;

/// One sensor setting, applied before streaming begins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigOption {
    OrientationOutput,
    AltimeterOutput,
    BottomTrackOutput,
    BottomTrackMode(String),
    SaveConfig,
}

impl ConfigOption {
    /// Command line as sent to the sensor, `\r\n` terminated.
    pub fn command(&self) -> String {
        format!("{}\r\n", self)
    }
}

impl fmt::Display for ConfigOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOption::OrientationOutput => write!(f, "SETAHRS,DS=\"ON\""),
            ConfigOption::AltimeterOutput => write!(f, "SETALTI,DS=\"ON\""),
            ConfigOption::BottomTrackOutput => write!(f, "SETBT,DS=\"ON\""),
            ConfigOption::BottomTrackMode(mode) => write!(f, "SETBT,MODE=\"{}\"", mode),
            ConfigOption::SaveConfig => write!(f, "SAVE,CONFIG"),
        }
    }
}

/// Settings implied by a run configuration, in the order they are sent.
pub fn config_options(config: &EstimatorConfig) -> Vec<ConfigOption> {
    let mut options = vec![ConfigOption::OrientationOutput];
    if config.enable_altimeter {
        options.push(ConfigOption::AltimeterOutput);
    }
    options.push(ConfigOption::BottomTrackOutput);
    if let Some(mode) = &config.bottom_track_mode {
        options.push(ConfigOption::BottomTrackMode(mode.clone()));
    }
    if config.save_sensor_config {
        options.push(ConfigOption::SaveConfig);
    }
    options
}

/// Packet source for a session.
///
/// `next_packet` must return `Ok(None)` once `timeout` elapses without a
/// packet, and must be safe to drop mid-wait so the session can race it
/// against cancellation.
#[allow(async_fn_in_trait)]
pub trait SensorStream {
    async fn connect(&mut self) -> StreamResult<()>;
    async fn configure(&mut self, options: &[ConfigOption]) -> StreamResult<()>;
    async fn begin_streaming(&mut self) -> StreamResult<()>;
    async fn next_packet(&mut self, timeout: Duration) -> StreamResult<Option<Packet>>;
    async fn end_streaming(&mut self) -> StreamResult<()>;
    async fn disconnect(&mut self) -> StreamResult<()>;
}
