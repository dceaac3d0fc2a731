//! Replay provider.
//!
//! Treats the interface name as the path of a JSON-lines file, one dissected
//! [`Frame`] per line, and feeds it to a [`ChannelSource`] from a background
//! thread. With pacing enabled the thread sleeps for the recorded gap between
//! consecutive frames, so the session sees traffic arrive as it was captured.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error_handling::types::CaptureError;

use super::channel_capture::{ChannelSource, FrameFeeder};
use super::provider::{CaptureProvider, FrameSource};
use super::types::Frame;

/// Upper bound on a single paced gap between frames.
const MAX_PACE_GAP: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct ReplayProvider {
    pace: bool,
}

impl ReplayProvider {
    pub fn new(pace: bool) -> Self {
        Self { pace }
    }
}

impl CaptureProvider for ReplayProvider {
    fn open(&self, interface: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        let path = PathBuf::from(interface);
        let file = File::open(&path).map_err(|e| {
            CaptureError::ProviderOpen(format!(
                "cannot open replay file {}: {} (the replay provider reads JSON-lines \
                 frame files; live capture needs the `pcap` provider)",
                path.display(),
                e
            ))
        })?;
        info!("Replaying frames from {}", path.display());

        let (feeder, source) = ChannelSource::pair(interface);
        let pace = self.pace;
        // Detached: the feed thread exits once it sees the source closed.
        thread::Builder::new()
            .name("replay-feed".into())
            .spawn(move || feed_lines(BufReader::new(file), feeder, pace))
            .map_err(|e| CaptureError::ProviderOpen(e.to_string()))?;

        Ok(Box::new(source))
    }
}

fn feed_lines<R: BufRead>(reader: R, feeder: FrameFeeder, pace: bool) {
    let mut previous: Option<chrono::DateTime<chrono::Utc>> = None;
    for (lineno, line) in reader.lines().enumerate() {
        if feeder.is_closed() {
            debug!("Replay stopped at line {}", lineno + 1);
            return;
        }
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                feeder.fail(format!("read error at line {}: {}", lineno + 1, e));
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let frame: Frame = match serde_json::from_str(&line) {
            Ok(f) => f,
            Err(e) => {
                warn!("Skipping malformed replay line {}: {}", lineno + 1, e);
                continue;
            }
        };
        if pace {
            if let (Some(prev), Some(now)) = (previous, frame.sniff_time) {
                if let Ok(gap) = (now - prev).to_std() {
                    thread::sleep(gap.min(MAX_PACE_GAP));
                }
            }
            previous = frame.sniff_time.or(previous);
        }
        if feeder.send(frame).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn replays_file_and_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(
            f,
            r#"{{"sniff_time":"2025-04-22T19:30:17Z","length":"60","layers":[{{"name":"eth","fields":{{"src":"a","dst":"b"}}}}]}}"#
        )
        .unwrap();
        writeln!(f, "not json").unwrap();
        writeln!(f).unwrap();
        writeln!(
            f,
            r#"{{"sniff_time":"2025-04-22T19:30:18Z","length":"61","layers":[]}}"#
        )
        .unwrap();
        drop(f);

        let provider = ReplayProvider::new(false);
        let mut source = provider.open(path.to_str().unwrap()).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.field("eth", "src"), Some("a"));
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.length.as_deref(), Some("61"));
        assert_eq!(source.next_frame().unwrap(), None);
        source.close();
    }

    #[test]
    fn interface_name_without_file_explains_the_failure() {
        let provider = ReplayProvider::new(false);
        match provider.open("eth0") {
            Err(CaptureError::ProviderOpen(reason)) => {
                assert!(reason.contains("replay file eth0"));
                assert!(reason.contains("`pcap` provider"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opened a replay file that does not exist"),
        }
    }
}
