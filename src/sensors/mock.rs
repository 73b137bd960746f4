use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ConfigOption, SensorStream};
use crate::error::{StreamError, StreamResult};
use crate::types::Packet;

/// One scripted step of a `MockStream`.
#[derive(Clone, Debug)]
pub enum MockStep {
    /// Deliver `packet` after `delay`
    Packet { delay: Duration, packet: Packet },
    /// Stay silent for the whole wait
    Silence,
    /// Fail the wait with an unavailable-device error
    Fail(String),
}

/// Scripted sensor stream for exercising the session without hardware.
///
/// Every collaborator call is appended to a shared call log so a test can
/// inspect it after the session has taken ownership of the stream. Once
/// the script runs out the stream reports end of stream.
pub struct MockStream {
    script: VecDeque<MockStep>,
    calls: Arc<Mutex<Vec<String>>>,
    fail_on: Option<&'static str>,
}

impl MockStream {
    pub fn new(script: impl IntoIterator<Item = MockStep>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_on: None,
        }
    }

    /// Packets delivered back to back, `period` apart.
    pub fn paced(packets: impl IntoIterator<Item = Packet>, period: Duration) -> Self {
        Self::new(
            packets
                .into_iter()
                .map(|packet| MockStep::Packet { delay: period, packet }),
        )
    }

    /// Make one lifecycle call (`connect`, `configure`, ...) fail.
    pub fn failing_on(mut self, operation: &'static str) -> Self {
        self.fail_on = Some(operation);
        self
    }

    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: &'static str) -> StreamResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.to_string());
        }
        if self.fail_on == Some(call) {
            return Err(StreamError::Unavailable(format!("mock {} failure", call)));
        }
        Ok(())
    }
}

impl SensorStream for MockStream {
    async fn connect(&mut self) -> StreamResult<()> {
        self.record("connect")
    }

    async fn configure(&mut self, options: &[ConfigOption]) -> StreamResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.extend(options.iter().map(|o| o.to_string()));
        }
        self.record("configure")
    }

    async fn begin_streaming(&mut self) -> StreamResult<()> {
        self.record("begin_streaming")
    }

    async fn next_packet(&mut self, timeout: Duration) -> StreamResult<Option<Packet>> {
        match self.script.front() {
            None => Err(StreamError::EndOfStream),
            Some(MockStep::Silence) => {
                tokio::time::sleep(timeout).await;
                self.script.pop_front();
                Ok(None)
            }
            Some(MockStep::Fail(reason)) => {
                let reason = reason.clone();
                self.script.pop_front();
                Err(StreamError::Unavailable(reason))
            }
            Some(MockStep::Packet { delay, .. }) if *delay > timeout => {
                // Packet arrives after this wait; keep it for the next one.
                let remaining = *delay - timeout;
                tokio::time::sleep(timeout).await;
                if let Some(MockStep::Packet { delay, .. }) = self.script.front_mut() {
                    *delay = remaining;
                }
                Ok(None)
            }
            Some(MockStep::Packet { delay, .. }) => {
                tokio::time::sleep(*delay).await;
                match self.script.pop_front() {
                    Some(MockStep::Packet { packet, .. }) => Ok(Some(packet)),
                    _ => Ok(None),
                }
            }
        }
    }

    async fn end_streaming(&mut self) -> StreamResult<()> {
        self.record("end_streaming")
    }

    async fn disconnect(&mut self) -> StreamResult<()> {
        self.record("disconnect")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataId;

    #[tokio::test(start_paused = true)]
    async fn test_late_packet_times_out_first() {
        let packet = Packet::new(DataId::Altimeter);
        let mut stream = MockStream::new([MockStep::Packet {
            delay: Duration::from_secs(3),
            packet: packet.clone(),
        }]);

        let wait = Duration::from_secs(2);
        assert_eq!(stream.next_packet(wait).await.unwrap(), None);
        assert_eq!(stream.next_packet(wait).await.unwrap(), Some(packet));
        assert!(matches!(stream.next_packet(wait).await, Err(StreamError::EndOfStream)));
    }

    #[tokio::test]
    async fn test_call_log_and_injected_failure() {
        let mut stream = MockStream::new(Vec::new()).failing_on("begin_streaming");
        let log = stream.call_log();

        stream.connect().await.unwrap();
        stream.configure(&[ConfigOption::SaveConfig]).await.unwrap();
        assert!(stream.begin_streaming().await.is_err());

        assert_eq!(
            *log.lock().unwrap(),
            vec!["connect", "SAVE,CONFIG", "configure", "begin_streaming"]
        );
    }
}
