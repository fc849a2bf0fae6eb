//! Recording engine
//!
//! Ties the session table, the instant replay buffer and the background
//! retention and eviction tasks into one owned context. Host events are
//! handled synchronously by whoever owns the engine.

use crate::cleanup::{RetentionSweeper, RetentionTask, remove_orphaned_temp_dirs, spawn_retention_task};
use crate::config::RecorderConfig;
use crate::manager::{LeaveOutcome, SessionManager, StartOutcome};
use crate::replay::{InstantReplayBuffer, ReaperTask, spawn_reaper};
use replayvault_core::{CaptureFactory, HostEvent, Participant, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How often expired instant replays are looked for
const REAPER_PERIOD: Duration = Duration::from_secs(5);

pub struct RecordingEngine {
    config: RecorderConfig,
    sessions: SessionManager,
    replays: Arc<InstantReplayBuffer>,
    retention_task: Option<RetentionTask>,
    reaper_task: Option<ReaperTask>,
}

impl RecordingEngine {
    /// Validate the configuration, clean up after a previous run and start
    /// the background tasks
    ///
    /// An invalid configuration fails before anything on disk is touched.
    pub async fn start(config: RecorderConfig, factory: Arc<dyn CaptureFactory>) -> Result<Self> {
        config.validate()?;

        let sessions = SessionManager::from_config(&config, factory);
        let replays = Arc::new(InstantReplayBuffer::from_config(&config));

        if config.delete_tmp_artifacts_on_startup {
            let removed = remove_orphaned_temp_dirs(&sessions.store_root());
            let purged = if config.instant_replay.enabled {
                replays.purge_untracked()
            } else {
                0
            };
            tracing::info!(
                temp_dirs = removed,
                instant_replays = purged,
                "Startup cleanup finished"
            );
        }

        let retention_task = config.retention.enabled.then(|| {
            let sweeper = RetentionSweeper::new(
                sessions.store_root(),
                config.retention.clone(),
                &config.artifact_extension,
            );
            spawn_retention_task(Arc::new(sweeper), config.retention.sweep_interval())
        });

        let reaper_task = config
            .instant_replay
            .enabled
            .then(|| spawn_reaper(replays.clone(), REAPER_PERIOD));

        tracing::info!(
            store = ?sessions.store_root(),
            retention = config.retention.enabled,
            instant_replay = config.instant_replay.enabled,
            "Recording engine started"
        );

        Ok(Self {
            config,
            sessions,
            replays,
            retention_task,
            reaper_task,
        })
    }

    /// Apply one host event
    pub fn handle_event(&mut self, event: HostEvent) -> Result<()> {
        tracing::debug!(event = event.kind(), participant = %event.participant(), "Host event");

        match event {
            HostEvent::ParticipantJoined {
                participant,
                context,
            } => {
                match self.sessions.participant_joined(&participant)? {
                    StartOutcome::Started(id) => tracing::debug!(
                        participant = %participant,
                        session_id = %id,
                        context = context.as_deref().unwrap_or(""),
                        "Participant joined"
                    ),
                    StartOutcome::Filtered => {
                        tracing::debug!(participant = %participant, "Participant not recorded")
                    }
                    StartOutcome::AlreadyActive(_) => {}
                }
                Ok(())
            }
            HostEvent::ParticipantLeft { participant } => {
                if let LeaveOutcome::NoSession = self.sessions.participant_left(&participant.id)? {
                    tracing::debug!(participant = %participant, "Participant left without a session");
                }
                Ok(())
            }
            HostEvent::HotkeyTriggered { participant } => {
                self.instant_replay(&participant)?;
                Ok(())
            }
            HostEvent::Activity {
                participant,
                payload,
            } => {
                let frame = serde_json::to_vec(&payload)?;
                self.sessions.feed(&participant.id, &frame)?;
                Ok(())
            }
        }
    }

    /// Export an instant replay, or do nothing when the feature is off
    pub fn instant_replay(&self, participant: &Participant) -> Result<Option<PathBuf>> {
        if !self.config.instant_replay.enabled {
            tracing::debug!(participant = %participant, "Instant replay disabled, ignoring hotkey");
            return Ok(None);
        }
        self.replays
            .create_snapshot(participant, &self.sessions)
            .map(Some)
    }

    /// Stop every session and the background tasks
    pub async fn shutdown(mut self) {
        let stopped = self.sessions.stop_all(self.config.async_close);
        tracing::info!(sessions = stopped.len(), "Stopped all recordings");

        if let Some(task) = self.retention_task.take() {
            task.shutdown().await;
        }
        if let Some(task) = self.reaper_task.take() {
            task.shutdown().await;
        }
        tracing::info!("Recording engine shut down");
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn replays(&self) -> &Arc<InstantReplayBuffer> {
        &self.replays
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }
}
