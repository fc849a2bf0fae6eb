//! Local spool capture
//!
//! A capture handle that writes frames as NDJSON lines into the artifact and
//! keeps a timestamped in-memory window so instant replays can be exported.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;
use replayvault_core::{CaptureFactory, CaptureHandle, Error, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SpoolLine<'a> {
    Header { created: String },
    Frame { offset_ms: u64, frame: &'a str },
}

pub struct SpoolCapture {
    path: PathBuf,
    writer: BufWriter<File>,
    started_at: Option<Instant>,
    paused: bool,
    recent: VecDeque<(Instant, Bytes)>,
    retain: Duration,
}

impl SpoolCapture {
    pub fn open(path: &Path, retain: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::Capture(format!("Failed to open artifact {:?}: {}", path, e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            started_at: None,
            paused: false,
            recent: VecDeque::new(),
            retain,
        })
    }

    fn write_line(&mut self, line: &SpoolLine<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Drop frames that fell out of the retained window
    fn trim(&mut self, now: Instant) {
        while let Some((at, _)) = self.recent.front() {
            if now.duration_since(*at) > self.retain {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

impl CaptureHandle for SpoolCapture {
    fn start(&mut self) -> Result<()> {
        if self.started_at.is_some() {
            return Ok(());
        }
        self.write_line(&SpoolLine::Header {
            created: Utc::now().to_rfc3339(),
        })?;
        self.writer.flush()?;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.paused = true;
        self.writer.flush()?;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.paused = false;
        Ok(())
    }

    fn feed(&mut self, frame: &[u8]) -> Result<()> {
        let Some(started_at) = self.started_at else {
            return Err(Error::Capture(format!("capture {:?} not started", self.path)));
        };
        if self.paused {
            return Ok(());
        }

        let now = Instant::now();
        let offset_ms = now.duration_since(started_at).as_millis() as u64;
        let text = String::from_utf8_lossy(frame);
        self.write_line(&SpoolLine::Frame {
            offset_ms,
            frame: &text,
        })?;

        self.recent.push_back((now, Bytes::copy_from_slice(frame)));
        self.trim(now);
        Ok(())
    }

    fn snapshot_recent(&self, window: Duration) -> Result<Bytes> {
        let now = Instant::now();
        let mut out = BytesMut::new();
        for (at, frame) in &self.recent {
            if now.duration_since(*at) <= window {
                out.put_slice(frame);
                out.put_u8(b'\n');
            }
        }
        Ok(out.freeze())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        tracing::debug!(path = ?self.path, "Closed spool capture");
        Ok(())
    }
}

/// Opens [`SpoolCapture`] handles
#[derive(Debug, Clone)]
pub struct SpoolCaptureFactory {
    retain: Duration,
}

impl SpoolCaptureFactory {
    /// `retain` bounds how much recent data is kept for instant replays
    pub fn new(retain: Duration) -> Self {
        Self { retain }
    }
}

impl CaptureFactory for SpoolCaptureFactory {
    fn open(&self, artifact_path: &Path) -> Result<Box<dyn CaptureHandle>> {
        Ok(Box::new(SpoolCapture::open(artifact_path, self.retain)?))
    }
}
