//! Instant replay buffer
//!
//! Keeps at most one exported snapshot per participant. Each snapshot expires
//! a fixed time after it was created; expiry deletes the backing file. The
//! buffer only ever deletes files it created itself, and those live under
//! their own store root, apart from session artifacts.

use crate::config::RecorderConfig;
use crate::manager::SessionManager;
use crate::template::ArtifactPathResolver;
use chrono::{Local, NaiveDateTime};
use dashmap::DashMap;
use replayvault_core::{Participant, Result};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq)]
pub struct InstantReplayEntry {
    pub owner_id: String,
    pub artifact_path: PathBuf,
    pub inserted_at: Instant,
}

pub struct InstantReplayBuffer {
    entries: DashMap<String, InstantReplayEntry>,
    resolver: ArtifactPathResolver,
    window: Duration,
    ttl: Duration,
}

impl InstantReplayBuffer {
    pub fn new(resolver: ArtifactPathResolver, window: Duration, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            resolver,
            window,
            ttl,
        }
    }

    /// Snapshots cover `windowMinutes` and live for the same amount of time
    pub fn from_config(config: &RecorderConfig) -> Self {
        let window = config.instant_replay.window();
        Self::new(
            ArtifactPathResolver::new(
                &config.instant_replay.path_template,
                &config.artifact_extension,
            ),
            window,
            window,
        )
    }

    /// Export the recent window of a participant's active capture
    pub fn create_snapshot(
        &self,
        participant: &Participant,
        sessions: &SessionManager,
    ) -> Result<PathBuf> {
        self.create_snapshot_at(
            participant,
            sessions,
            Local::now().naive_local(),
            Instant::now(),
        )
    }

    pub fn create_snapshot_at(
        &self,
        participant: &Participant,
        sessions: &SessionManager,
        created: NaiveDateTime,
        now: Instant,
    ) -> Result<PathBuf> {
        let data = match sessions.snapshot_recent(&participant.id, self.window) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(participant = %participant, error = %e, "Cannot create instant replay");
                return Err(e);
            }
        };

        let path = self.resolver.resolve_unique(participant, created, |candidate| {
            self.entries.iter().any(|entry| {
                entry.owner_id != participant.id && entry.artifact_path == candidate
            })
        });
        if let Err(e) = write_fresh(&path, &data) {
            tracing::warn!(
                participant = %participant,
                path = ?path,
                error = %e,
                "Failed to write instant replay"
            );
            return Err(e.into());
        }

        let entry = InstantReplayEntry {
            owner_id: participant.id.clone(),
            artifact_path: path.clone(),
            inserted_at: now,
        };

        if let Some(prior) = self.entries.insert(participant.id.clone(), entry)
            && prior.artifact_path != path
        {
            delete_artifact(&prior.artifact_path, "replaced");
        }

        tracing::info!(
            participant = %participant,
            path = ?path,
            bytes = data.len(),
            "Created instant replay"
        );
        Ok(path)
    }

    /// Remove entries whose TTL has elapsed and delete their files
    pub fn evict_expired(&self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| self.is_expired(entry.value(), now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in expired {
            // The entry may have been replaced since the scan
            if let Some((_, entry)) = self
                .entries
                .remove_if(&key, |_, entry| self.is_expired(entry, now))
            {
                delete_artifact(&entry.artifact_path, "expired");
                evicted += 1;
            }
        }
        evicted
    }

    fn is_expired(&self, entry: &InstantReplayEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) >= self.ttl
    }

    /// Delete files under the replay store that the buffer does not track
    ///
    /// At startup the buffer is empty, so this removes snapshots left behind
    /// by a previous run that never got to expire them.
    pub fn purge_untracked(&self) -> usize {
        let root = self.resolver.store_root();
        if !root.exists() {
            return 0;
        }

        let tracked: HashSet<PathBuf> = self
            .entries
            .iter()
            .map(|entry| entry.artifact_path.clone())
            .collect();
        let extension = self.resolver.extension();

        let mut removed = 0;
        for entry in walkdir::WalkDir::new(&root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(extension)
                || tracked.contains(path)
            {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Failed to remove orphaned instant replay")
                }
            }
        }

        if removed > 0 {
            tracing::info!(root = ?root, removed, "Removed orphaned instant replays");
        }
        removed
    }

    pub fn get(&self, participant_id: &str) -> Option<InstantReplayEntry> {
        self.entries.get(participant_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn write_fresh(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        fs::remove_file(path)?;
    }
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn delete_artifact(path: &Path, reason: &str) {
    match fs::remove_file(path) {
        Ok(()) => tracing::info!(path = ?path, reason, "Deleted instant replay"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = ?path, reason, error = %e, "Failed to delete instant replay"),
    }
}

/// Handle for the background eviction task
pub struct ReaperTask {
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
}

impl ReaperTask {
    /// Signal the reaper task to shutdown gracefully
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Spawn a background task that evicts expired snapshots every `period`
pub fn spawn_reaper(buffer: Arc<InstantReplayBuffer>, period: Duration) -> ReaperTask {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    tokio::spawn(async move {
        tracing::debug!("Starting instant replay reaper (period: {:?})", period);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!("Instant replay reaper shutting down");
                    break;
                }
                _ = sleep(period) => {
                    let evicted = buffer.evict_expired(Instant::now());
                    if evicted > 0 {
                        tracing::debug!("Evicted {} instant replays", evicted);
                    }
                }
            }
        }
    });

    ReaperTask { shutdown_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SpoolCaptureFactory;
    use crate::config::FilterPolicy;
    use crate::manager::SessionOptions;
    use chrono::NaiveDate;
    use replayvault_core::Error;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        sessions: SessionManager,
        buffer: InstantReplayBuffer,
    }

    fn fixture(ttl: Duration) -> Fixture {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("rec/{name}");
        let instant = dir.path().join("instant/{name}");
        let sessions = SessionManager::new(
            Arc::new(SpoolCaptureFactory::new(Duration::from_secs(600))),
            FilterPolicy::default(),
            ArtifactPathResolver::new(record.to_string_lossy(), "mcpr"),
            SessionOptions::default(),
        );
        let buffer = InstantReplayBuffer::new(
            ArtifactPathResolver::new(instant.to_string_lossy(), "mcpr"),
            Duration::from_secs(300),
            ttl,
        );
        Fixture {
            dir,
            sessions,
            buffer,
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn alice() -> Participant {
        Participant::new("alice", "a-1")
    }

    #[test]
    fn test_snapshot_without_capture_fails() {
        let f = fixture(Duration::from_secs(60));
        let result = f.buffer.create_snapshot(&alice(), &f.sessions);
        assert!(matches!(result, Err(Error::NoActiveCapture(_))));
        assert!(f.buffer.is_empty());
    }

    #[test]
    fn test_snapshot_writes_recent_data() {
        let mut f = fixture(Duration::from_secs(60));
        f.sessions.start(&alice()).unwrap();
        f.sessions.feed("a-1", b"frame-1").unwrap();

        let path = f
            .buffer
            .create_snapshot_at(&alice(), &f.sessions, at(10, 0, 0), Instant::now())
            .unwrap();

        assert!(path.starts_with(f.dir.path().join("instant/alice")));
        assert_eq!(std::fs::read(&path).unwrap(), b"frame-1\n");
        assert_eq!(f.buffer.get("a-1").unwrap().artifact_path, path);
    }

    #[test]
    fn test_same_name_snapshots_do_not_collide() {
        let mut f = fixture(Duration::from_secs(60));
        let steve = Participant::new("steve", "id-1");
        let other_steve = Participant::new("steve", "id-2");
        f.sessions.start(&steve).unwrap();
        f.sessions.start(&other_steve).unwrap();
        f.sessions.feed("id-1", b"first").unwrap();
        f.sessions.feed("id-2", b"second").unwrap();
        let now = Instant::now();

        let one = f
            .buffer
            .create_snapshot_at(&steve, &f.sessions, at(10, 0, 0), now)
            .unwrap();
        let two = f
            .buffer
            .create_snapshot_at(&other_steve, &f.sessions, at(10, 0, 0), now)
            .unwrap();

        assert_ne!(one, two);
        assert_eq!(std::fs::read(&one).unwrap(), b"first\n");
        assert_eq!(std::fs::read(&two).unwrap(), b"second\n");
        assert_eq!(f.buffer.len(), 2);

        // Replacing in the same second reuses the owner's own path
        let again = f
            .buffer
            .create_snapshot_at(&other_steve, &f.sessions, at(10, 0, 0), now)
            .unwrap();
        assert_eq!(again, two);
        assert!(one.exists());
    }

    #[test]
    fn test_second_snapshot_replaces_first() {
        let mut f = fixture(Duration::from_secs(60));
        f.sessions.start(&alice()).unwrap();
        let now = Instant::now();

        let first = f
            .buffer
            .create_snapshot_at(&alice(), &f.sessions, at(10, 0, 0), now)
            .unwrap();
        let second = f
            .buffer
            .create_snapshot_at(&alice(), &f.sessions, at(10, 0, 30), now)
            .unwrap();

        assert!(!first.exists());
        assert!(second.exists());
        assert_eq!(f.buffer.len(), 1);
        assert_eq!(f.buffer.get("a-1").unwrap().artifact_path, second);
    }

    #[test]
    fn test_snapshot_in_same_second_keeps_new_file() {
        let mut f = fixture(Duration::from_secs(60));
        f.sessions.start(&alice()).unwrap();
        let now = Instant::now();

        let first = f
            .buffer
            .create_snapshot_at(&alice(), &f.sessions, at(10, 0, 0), now)
            .unwrap();
        let second = f
            .buffer
            .create_snapshot_at(&alice(), &f.sessions, at(10, 0, 0), now)
            .unwrap();

        assert_eq!(first, second);
        assert!(second.exists());
        assert_eq!(f.buffer.len(), 1);
    }

    #[test]
    fn test_evict_expired_deletes_file() {
        let mut f = fixture(Duration::from_secs(60));
        f.sessions.start(&alice()).unwrap();
        let inserted = Instant::now();
        let path = f
            .buffer
            .create_snapshot_at(&alice(), &f.sessions, at(10, 0, 0), inserted)
            .unwrap();

        assert_eq!(f.buffer.evict_expired(inserted + Duration::from_secs(59)), 0);
        assert!(path.exists());

        assert_eq!(f.buffer.evict_expired(inserted + Duration::from_secs(60)), 1);
        assert!(!path.exists());
        assert!(f.buffer.is_empty());
    }

    #[test]
    fn test_evict_tolerates_missing_file() {
        let mut f = fixture(Duration::from_secs(1));
        f.sessions.start(&alice()).unwrap();
        let inserted = Instant::now();
        let path = f
            .buffer
            .create_snapshot_at(&alice(), &f.sessions, at(10, 0, 0), inserted)
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(f.buffer.evict_expired(inserted + Duration::from_secs(5)), 1);
        assert!(f.buffer.is_empty());
    }

    #[test]
    fn test_purge_untracked_keeps_live_entries() {
        let mut f = fixture(Duration::from_secs(60));
        f.sessions.start(&alice()).unwrap();
        let live = f
            .buffer
            .create_snapshot_at(&alice(), &f.sessions, at(10, 0, 0), Instant::now())
            .unwrap();

        let orphan = f.dir.path().join("instant/bob/2024-05-01_00-00-00.mcpr");
        std::fs::create_dir_all(orphan.parent().unwrap()).unwrap();
        std::fs::write(&orphan, b"left over").unwrap();
        let unrelated = f.dir.path().join("instant/bob/notes.txt");
        std::fs::write(&unrelated, b"keep").unwrap();

        assert_eq!(f.buffer.purge_untracked(), 1);
        assert!(live.exists());
        assert!(!orphan.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn test_reaper_evicts_in_background() {
        let mut f = fixture(Duration::from_millis(20));
        f.sessions.start(&alice()).unwrap();
        let path = f.buffer.create_snapshot(&alice(), &f.sessions).unwrap();

        let buffer = Arc::new(f.buffer);
        let reaper = spawn_reaper(buffer.clone(), Duration::from_millis(10));

        for _ in 0..100 {
            if buffer.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        reaper.shutdown().await;

        assert!(buffer.is_empty());
        assert!(!path.exists());
    }
}
