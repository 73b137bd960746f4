use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;

use super::{ConfigOption, SensorStream};
use crate::error::{StreamError, StreamResult};
use crate::types::Packet;

/// Replays a recorded packet log (JSON lines, optionally `.gz`).
///
/// Packets are released one per `interval`. Lines that do not parse as a
/// packet are skipped with a warning. Running off the end of the log is
/// reported as `StreamError::EndOfStream`.
pub struct ReplayStream {
    path: PathBuf,
    interval: Duration,
    packets: Option<VecDeque<Packet>>,
    waited: Duration,
    streaming: bool,
}

impl ReplayStream {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            packets: None,
            waited: Duration::ZERO,
            streaming: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.packets.as_ref().map_or(0, |p| p.len())
    }
}

fn open_log(path: &Path) -> std::io::Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Parse a JSON-lines packet log.
pub fn load_packets(reader: impl Read) -> std::io::Result<VecDeque<Packet>> {
    let mut packets = VecDeque::new();
    let mut skipped = 0usize;
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Packet>(line) {
            Ok(packet) => packets.push_back(packet),
            Err(e) => {
                skipped += 1;
                log::warn!("[replay] line {}: {}", lineno + 1, e);
            }
        }
    }
    if skipped > 0 {
        log::warn!("[replay] skipped {} unreadable lines", skipped);
    }
    Ok(packets)
}

impl SensorStream for ReplayStream {
    async fn connect(&mut self) -> StreamResult<()> {
        let path = self.path.clone();
        let packets = tokio::task::spawn_blocking(move || load_packets(open_log(&path)?))
            .await
            .map_err(|e| StreamError::Unavailable(format!("log loader failed: {}", e)))??;
        log::info!("[replay] {} packets from {}", packets.len(), self.path.display());
        self.packets = Some(packets);
        Ok(())
    }

    async fn configure(&mut self, options: &[ConfigOption]) -> StreamResult<()> {
        if self.packets.is_none() {
            return Err(StreamError::NotConnected);
        }
        log::debug!("[replay] ignoring {} sensor settings", options.len());
        Ok(())
    }

    async fn begin_streaming(&mut self) -> StreamResult<()> {
        if self.packets.is_none() {
            return Err(StreamError::NotConnected);
        }
        self.streaming = true;
        Ok(())
    }

    async fn next_packet(&mut self, timeout: Duration) -> StreamResult<Option<Packet>> {
        if !self.streaming || self.packets.is_none() {
            return Err(StreamError::NotConnected);
        }
        if self.remaining() == 0 {
            return Err(StreamError::EndOfStream);
        }

        let wait = self.interval.saturating_sub(self.waited);
        if wait > timeout {
            tokio::time::sleep(timeout).await;
            self.waited += timeout;
            return Ok(None);
        }
        tokio::time::sleep(wait).await;
        self.waited = Duration::ZERO;
        Ok(self.packets.as_mut().and_then(|p| p.pop_front()))
    }

    async fn end_streaming(&mut self) -> StreamResult<()> {
        self.streaming = false;
        Ok(())
    }

    async fn disconnect(&mut self) -> StreamResult<()> {
        if let Some(left) = self.packets.take() {
            if !left.is_empty() {
                log::info!("[replay] {} packets not replayed", left.len());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FIELD_ALTITUDE;
    use crate::types::DataId;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const LOG: &str = concat!(
        r#"{"id": 170, "fields": {"altimeterDistance": 1.2}}"#,
        "\n",
        "not json\n",
        "\n",
        r#"{"id": 180, "fields": {"velocityX": 0.5, "velocityY": 0.0, "fomX": 0.1, "fomY": 0.1}}"#,
        "\n",
    );

    fn temp_log(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dvl_nav_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_load_packets_skips_bad_lines() {
        let packets = load_packets(LOG.as_bytes()).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].id, DataId::Altimeter);
        assert_eq!(packets[0].field(FIELD_ALTITUDE), Some(1.2));
        assert_eq!(packets[1].id, DataId::BottomTrack);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gz_replay_then_end_of_stream() {
        let path = temp_log("replay.jsonl.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(LOG.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let mut stream = ReplayStream::new(&path, Duration::from_millis(100));
        stream.connect().await.unwrap();
        stream.begin_streaming().await.unwrap();

        let wait = Duration::from_secs(1);
        assert!(stream.next_packet(wait).await.unwrap().is_some());
        assert!(stream.next_packet(wait).await.unwrap().is_some());
        assert!(matches!(stream.next_packet(wait).await, Err(StreamError::EndOfStream)));

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_pacing_yields_timeouts() {
        let path = temp_log("slow.jsonl");
        std::fs::write(&path, LOG).unwrap();

        let mut stream = ReplayStream::new(&path, Duration::from_secs(5));
        stream.connect().await.unwrap();
        stream.begin_streaming().await.unwrap();

        let wait = Duration::from_secs(2);
        assert_eq!(stream.next_packet(wait).await.unwrap(), None);
        assert_eq!(stream.next_packet(wait).await.unwrap(), None);
        assert!(stream.next_packet(wait).await.unwrap().is_some());

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_large_gz_log_loads_off_the_runtime() {
        let path = temp_log("large.jsonl.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        for i in 0..5000 {
            writeln!(encoder, r#"{{"id": 170, "fields": {{"altimeterDistance": {}}}}}"#, i).unwrap();
        }
        encoder.finish().unwrap();

        let mut stream = ReplayStream::new(&path, Duration::ZERO);
        let ticker = tokio::spawn(tokio::time::sleep(Duration::from_millis(1)));
        stream.connect().await.unwrap();
        ticker.await.unwrap();
        assert_eq!(stream.remaining(), 5000);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_missing_file_fails_connect() {
        let mut stream = ReplayStream::new(temp_log("does-not-exist.jsonl"), Duration::ZERO);
        assert!(matches!(stream.connect().await, Err(StreamError::Io(_))));
    }
}
