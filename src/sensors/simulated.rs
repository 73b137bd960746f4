use std::f64::consts::PI;
use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};

use super::{ConfigOption, SensorStream};
use crate::classifier::*;
use crate::error::{StreamError, StreamResult};
use crate::types::{DataId, Packet, VelocitySample};

const FORWARD_SPEED: f64 = 0.2; // m/s
const YAW_RATE: f64 = 6.0; // deg/s, one lap per minute
const CRUISE_ALTITUDE: f64 = 1.0; // m
const DEPTH: f64 = 4.5; // m

/// Bench stream: a vehicle driving a slow circle at fixed altitude.
///
/// Packets rotate orientation → altimeter → bottom track, one per tick.
/// Every 40th bottom-track packet carries a poor FOM so the gate has
/// something to reject.
pub struct SimulatedStream {
    period: Duration,
    altimeter: bool,
    connected: bool,
    ticker: Option<Interval>,
    seq: u64,
    bottom_track_count: u64,
}

impl SimulatedStream {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            altimeter: true,
            connected: false,
            ticker: None,
            seq: 0,
            bottom_track_count: 0,
        }
    }

    fn next_mock_packet(&mut self) -> Packet {
        let kinds: &[DataId] = if self.altimeter {
            &[DataId::Orientation, DataId::Altimeter, DataId::BottomTrack]
        } else {
            &[DataId::Orientation, DataId::BottomTrack]
        };
        let kind = kinds[(self.seq % kinds.len() as u64) as usize];
        let t = self.seq as f64 * self.period.as_secs_f64();
        self.seq += 1;

        match kind {
            DataId::Orientation => mock_orientation(t),
            DataId::Altimeter => mock_altitude(t),
            _ => {
                self.bottom_track_count += 1;
                let fom = if self.bottom_track_count % 40 == 0 { 2.0 } else { 0.08 };
                mock_bottom_track(t, fom)
            }
        }
    }
}

impl SensorStream for SimulatedStream {
    async fn connect(&mut self) -> StreamResult<()> {
        log::info!("[sim] connected (period {:?})", self.period);
        self.connected = true;
        Ok(())
    }

    async fn configure(&mut self, options: &[ConfigOption]) -> StreamResult<()> {
        if !self.connected {
            return Err(StreamError::NotConnected);
        }
        self.altimeter = options.contains(&ConfigOption::AltimeterOutput);
        for option in options {
            log::debug!("[sim] {}", option);
        }
        Ok(())
    }

    async fn begin_streaming(&mut self) -> StreamResult<()> {
        if !self.connected {
            return Err(StreamError::NotConnected);
        }
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        Ok(())
    }

    async fn next_packet(&mut self, timeout: Duration) -> StreamResult<Option<Packet>> {
        let ticker = self.ticker.as_mut().ok_or(StreamError::NotConnected)?;
        let ticked = tokio::time::timeout(timeout, ticker.tick()).await.is_ok();
        Ok(ticked.then(|| self.next_mock_packet()))
    }

    async fn end_streaming(&mut self) -> StreamResult<()> {
        self.ticker = None;
        Ok(())
    }

    async fn disconnect(&mut self) -> StreamResult<()> {
        if self.connected {
            log::info!("[sim] disconnected after {} packets", self.seq);
        }
        self.connected = false;
        Ok(())
    }
}

fn heading_at(t: f64) -> f64 {
    (t * YAW_RATE) % 360.0
}

fn mock_orientation(t: f64) -> Packet {
    Packet::new(DataId::Orientation)
        .with_field(FIELD_ROLL, (t * 0.7).sin() * 1.5)
        .with_field(FIELD_PITCH, (t * 0.4).cos() * 1.0)
        .with_field(FIELD_HEADING, heading_at(t))
        .with_field(FIELD_DEPTH, DEPTH + (t * 0.1).sin() * 0.05)
}

fn mock_altitude(t: f64) -> Packet {
    Packet::new(DataId::Altimeter)
        .with_field(FIELD_ALTITUDE, CRUISE_ALTITUDE + (t * 2.0 * PI / 20.0).sin() * 0.03)
}

fn mock_bottom_track(t: f64, fom: f64) -> Packet {
    let status = VelocitySample::STATUS_X_VALID | VelocitySample::STATUS_Y_VALID;
    let packet = Packet::new(DataId::BottomTrack)
        .with_field(FIELD_VEL_X, FORWARD_SPEED + (t * 1.3).sin() * 0.005)
        .with_field(FIELD_VEL_Y, (t * 0.9).cos() * 0.005)
        .with_field(FIELD_VEL_Z, 0.0)
        .with_field(FIELD_FOM_X, fom)
        .with_field(FIELD_FOM_Y, 0.08)
        .with_field(FIELD_FOM_Z, 0.1)
        .with_field(FIELD_STATUS, status as f64);
    FIELD_BEAMS
        .iter()
        .fold(packet, |p, beam| p.with_field(beam, CRUISE_ALTITUDE * 1.15))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::types::Sample;

    #[tokio::test(start_paused = true)]
    async fn test_packets_cycle_through_subsystems() {
        let mut stream = SimulatedStream::new(Duration::from_millis(50));
        stream.connect().await.unwrap();
        stream
            .configure(&[ConfigOption::OrientationOutput, ConfigOption::AltimeterOutput])
            .await
            .unwrap();
        stream.begin_streaming().await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..6 {
            let packet = stream.next_packet(Duration::from_secs(1)).await.unwrap().unwrap();
            assert!(classify(&packet).unwrap().is_some());
            ids.push(packet.id);
        }
        assert_eq!(&ids[..3], &[DataId::Orientation, DataId::Altimeter, DataId::BottomTrack]);
        assert_eq!(&ids[..3], &ids[3..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_altimeter_off_when_not_configured() {
        let mut stream = SimulatedStream::new(Duration::from_millis(50));
        stream.connect().await.unwrap();
        stream.configure(&[ConfigOption::OrientationOutput]).await.unwrap();
        stream.begin_streaming().await.unwrap();

        for _ in 0..10 {
            let packet = stream.next_packet(Duration::from_secs(1)).await.unwrap().unwrap();
            assert_ne!(packet.id, DataId::Altimeter);
        }
    }

    #[tokio::test]
    async fn test_not_streaming_is_an_error() {
        let mut stream = SimulatedStream::new(Duration::from_millis(50));
        assert!(matches!(
            stream.next_packet(Duration::from_millis(10)).await,
            Err(StreamError::NotConnected)
        ));
    }

    #[test]
    fn test_bottom_track_is_valid_motion() {
        let packet = mock_bottom_track(3.0, 0.08);
        match classify(&packet).unwrap() {
            Some(Sample::Velocity(v)) => {
                assert!(v.x_valid() && v.y_valid());
                assert!(v.vx > 0.1);
            }
            other => panic!("unexpected sample {:?}", other),
        }
    }
}
