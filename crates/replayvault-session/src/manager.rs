//! Session manager
//!
//! Owns the table of active recordings, keyed by participant id, and drives
//! each session through Idle → Recording ⇄ Paused → Stopped.
//!
//! A participant has at most one active session. Stopped sessions are removed
//! from the table, so every later call for them is a no-op.

use crate::config::{FilterPolicy, RecorderConfig};
use crate::template::ArtifactPathResolver;
use bytes::Bytes;
use chrono::{Local, NaiveDateTime};
use replayvault_core::{
    CaptureFactory, CaptureHandle, Error, Participant, Result, SessionId, SessionState,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Read-only view of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub participant: Participant,
    pub state: SessionState,
    pub artifact_path: PathBuf,
    pub started_at: NaiveDateTime,
}

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session is recording
    Started(SessionId),
    /// The participant already has a Recording or Paused session
    AlreadyActive(SessionId),
    /// The filter policy excludes the participant
    Filtered,
}

/// What a leave event did to the participant's session
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    Paused,
    Stopped(SessionInfo),
    NoSession,
}

struct Session {
    id: SessionId,
    participant: Participant,
    state: SessionState,
    capture: Box<dyn CaptureHandle>,
    artifact_path: PathBuf,
    started_at: NaiveDateTime,
}

impl Session {
    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            participant: self.participant.clone(),
            state: self.state,
            artifact_path: self.artifact_path.clone(),
            started_at: self.started_at,
        }
    }
}

/// Session behaviour taken from the recorder configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    pub pause_instead_of_stop_on_quit: bool,
    pub async_close: bool,
}

pub struct SessionManager {
    sessions: HashMap<String, Session>,
    factory: Arc<dyn CaptureFactory>,
    filter: FilterPolicy,
    resolver: ArtifactPathResolver,
    options: SessionOptions,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn CaptureFactory>,
        filter: FilterPolicy,
        resolver: ArtifactPathResolver,
        options: SessionOptions,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            factory,
            filter,
            resolver,
            options,
        }
    }

    pub fn from_config(config: &RecorderConfig, factory: Arc<dyn CaptureFactory>) -> Self {
        Self::new(
            factory,
            config.filter.clone(),
            ArtifactPathResolver::new(&config.record_path_template, &config.artifact_extension),
            SessionOptions {
                pause_instead_of_stop_on_quit: config.pause_instead_of_stop_on_quit,
                async_close: config.async_close,
            },
        )
    }

    /// Start recording a participant now
    pub fn start(&mut self, participant: &Participant) -> Result<StartOutcome> {
        self.start_at(participant, Local::now().naive_local())
    }

    /// Start recording a participant with an explicit creation time
    pub fn start_at(
        &mut self,
        participant: &Participant,
        now: NaiveDateTime,
    ) -> Result<StartOutcome> {
        if let Some(existing) = self.sessions.get(&participant.id) {
            tracing::debug!(
                participant = %participant,
                session_id = %existing.id,
                state = %existing.state,
                "Session already active, ignoring start"
            );
            return Ok(StartOutcome::AlreadyActive(existing.id));
        }

        if !self.filter.should_record(participant) {
            tracing::info!(participant = %participant, "Participant excluded by filter, not recording");
            return Ok(StartOutcome::Filtered);
        }

        // A stale file at the path is replaced, a live session's file never is
        let artifact_path = self.resolver.resolve_unique(participant, now, |candidate| {
            self.sessions
                .values()
                .any(|session| session.artifact_path == candidate)
        });
        let capture = match self.open_artifact(&artifact_path) {
            Ok(capture) => capture,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&artifact_path)
                    && cleanup.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!(path = ?artifact_path, error = %cleanup, "Failed to remove aborted artifact");
                }
                tracing::error!(
                    participant = %participant,
                    path = ?artifact_path,
                    error = %e,
                    "Failed to start recording"
                );
                return Err(e);
            }
        };

        let session = Session {
            id: SessionId::new(),
            participant: participant.clone(),
            state: SessionState::Recording,
            capture,
            artifact_path,
            started_at: now,
        };
        let id = session.id;

        tracing::info!(
            participant = %participant,
            session_id = %id,
            path = ?session.artifact_path,
            "Started recording"
        );
        self.sessions.insert(participant.id.clone(), session);

        Ok(StartOutcome::Started(id))
    }

    /// Create a fresh, empty artifact and open a started capture on it
    fn open_artifact(&self, path: &Path) -> Result<Box<dyn CaptureHandle>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if path.exists() {
            fs::remove_file(path)?;
        }
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;

        let mut capture = self.factory.open(path)?;
        if let Err(e) = capture.start() {
            if let Err(close_err) = capture.close() {
                tracing::warn!(path = ?path, error = %close_err, "Failed to close capture after start failure");
            }
            return Err(e);
        }
        Ok(capture)
    }

    /// Recording → Paused. Returns whether a transition happened.
    pub fn pause(&mut self, participant_id: &str) -> Result<bool> {
        let Some(session) = self.sessions.get_mut(participant_id) else {
            return Ok(false);
        };
        if session.state != SessionState::Recording {
            return Ok(false);
        }

        session.capture.pause()?;
        session.state = SessionState::Paused;
        tracing::info!(participant = %session.participant, session_id = %session.id, "Paused recording");
        Ok(true)
    }

    /// Paused → Recording. Returns whether a transition happened.
    pub fn resume(&mut self, participant_id: &str) -> Result<bool> {
        let Some(session) = self.sessions.get_mut(participant_id) else {
            return Ok(false);
        };
        if session.state != SessionState::Paused {
            return Ok(false);
        }

        session.capture.resume()?;
        session.state = SessionState::Recording;
        tracing::info!(participant = %session.participant, session_id = %session.id, "Resumed recording");
        Ok(true)
    }

    /// Recording|Paused → Stopped
    ///
    /// The capture is closed exactly once. With `async_close` the close runs on
    /// the blocking pool of the current tokio runtime, if there is one.
    pub fn stop(&mut self, participant_id: &str, async_close: bool) -> Option<SessionInfo> {
        let session = self.sessions.remove(participant_id)?;
        let mut info = session.info();
        info.state = SessionState::Stopped;

        let Session {
            id,
            capture,
            artifact_path,
            ..
        } = session;

        let runtime = if async_close {
            tokio::runtime::Handle::try_current().ok()
        } else {
            None
        };

        match runtime {
            Some(handle) => {
                handle.spawn_blocking(move || close_capture(id, capture, &artifact_path));
            }
            None => close_capture(id, capture, &artifact_path),
        }

        tracing::info!(
            participant = %info.participant,
            session_id = %info.id,
            path = ?info.artifact_path,
            async_close,
            "Stopped recording"
        );
        Some(info)
    }

    /// Stop every active session
    pub fn stop_all(&mut self, async_close: bool) -> Vec<SessionInfo> {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.iter()
            .filter_map(|id| self.stop(id, async_close))
            .collect()
    }

    /// A participant joined: resume a paused session, otherwise start one
    pub fn participant_joined(&mut self, participant: &Participant) -> Result<StartOutcome> {
        if let Some(session) = self.sessions.get(&participant.id)
            && session.state == SessionState::Paused
        {
            let id = session.id;
            self.resume(&participant.id)?;
            return Ok(StartOutcome::AlreadyActive(id));
        }
        self.start(participant)
    }

    /// A participant left: pause or stop according to the configured policy
    pub fn participant_left(&mut self, participant_id: &str) -> Result<LeaveOutcome> {
        if !self.sessions.contains_key(participant_id) {
            return Ok(LeaveOutcome::NoSession);
        }

        if self.options.pause_instead_of_stop_on_quit {
            self.pause(participant_id)?;
            return Ok(LeaveOutcome::Paused);
        }

        Ok(self
            .stop(participant_id, self.options.async_close)
            .map(LeaveOutcome::Stopped)
            .unwrap_or(LeaveOutcome::NoSession))
    }

    /// Forward captured data; dropped unless the session is Recording
    pub fn feed(&mut self, participant_id: &str, frame: &[u8]) -> Result<bool> {
        match self.sessions.get_mut(participant_id) {
            Some(session) if session.state == SessionState::Recording => {
                session.capture.feed(frame)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Copy the recent window from a participant's open capture
    pub fn snapshot_recent(&self, participant_id: &str, window: Duration) -> Result<Bytes> {
        let session = self
            .sessions
            .get(participant_id)
            .ok_or_else(|| Error::NoActiveCapture(participant_id.to_string()))?;
        session.capture.snapshot_recent(window)
    }

    /// Current state; participants without a session are Idle
    pub fn state(&self, participant_id: &str) -> SessionState {
        self.sessions
            .get(participant_id)
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn session(&self, participant_id: &str) -> Option<SessionInfo> {
        self.sessions.get(participant_id).map(Session::info)
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.values().map(Session::info).collect()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn store_root(&self) -> PathBuf {
        self.resolver.store_root()
    }
}

fn close_capture(id: SessionId, capture: Box<dyn CaptureHandle>, artifact_path: &Path) {
    if let Err(e) = capture.close() {
        tracing::error!(session_id = %id, path = ?artifact_path, error = %e, "Failed to close capture");
    }
}
