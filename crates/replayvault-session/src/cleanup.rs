//! Artifact retention and startup cleanup
//!
//! The retention sweep walks every `<root>/<participant>/` tree, at any depth,
//! and deletes artifacts whose file name says they are older than the
//! configured age. Files whose names cannot be parsed are never touched.

use crate::config::RetentionPolicy;
use chrono::{Local, NaiveDate};
use replayvault_core::artifact::ArtifactRecord;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, timeout};

/// Why a single deletion did not complete
#[derive(Debug, thiserror::Error)]
enum DeleteError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("no deletion slot free within {0:?}")]
    Starved(Duration),

    #[error("delete task failed: {0}")]
    Join(String),
}

/// Counters for one sweep cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub directories_scanned: u64,
    pub files_examined: u64,
    pub files_deleted: u64,
    pub skipped_unparseable: u64,
    pub delete_failures: u64,
    pub delete_timeouts: u64,
    /// Deletions never attempted because every slot stayed taken
    pub delete_starved: u64,
    pub directory_errors: u64,
}

impl SweepStats {
    fn absorb(&mut self, other: &SweepStats) {
        self.directories_scanned += other.directories_scanned;
        self.files_examined += other.files_examined;
        self.files_deleted += other.files_deleted;
        self.skipped_unparseable += other.skipped_unparseable;
        self.delete_failures += other.delete_failures;
        self.delete_timeouts += other.delete_timeouts;
        self.delete_starved += other.delete_starved;
        self.directory_errors += other.directory_errors;
    }
}

/// Files found below one participant directory
#[derive(Debug, Default)]
pub struct Listing {
    pub files: Vec<PathBuf>,
    /// Nested directories that could not be read
    pub unreadable: Vec<(PathBuf, io::Error)>,
}

/// Filesystem access used by the sweep
pub trait ArtifactFs: Send + Sync {
    /// Regular files at any depth below `dir`
    ///
    /// Fails only when `dir` itself cannot be read.
    fn list_files(&self, dir: &Path) -> io::Result<Listing>;

    /// Runs on the blocking pool and may block for as long as the filesystem does.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl ArtifactFs for LocalFs {
    fn list_files(&self, dir: &Path) -> io::Result<Listing> {
        let mut listing = Listing::default();
        for entry in walkdir::WalkDir::new(dir) {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() {
                        listing.files.push(entry.into_path());
                    }
                }
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                    listing.unreadable.push((path, e.into()));
                }
            }
        }
        Ok(listing)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

pub struct RetentionSweeper {
    root: PathBuf,
    policy: RetentionPolicy,
    extension: String,
    fs: Arc<dyn ArtifactFs>,
    deletes: Arc<Semaphore>,
}

impl RetentionSweeper {
    pub fn new(root: impl Into<PathBuf>, policy: RetentionPolicy, extension: impl Into<String>) -> Self {
        Self::with_fs(root, policy, extension, Arc::new(LocalFs))
    }

    pub fn with_fs(
        root: impl Into<PathBuf>,
        policy: RetentionPolicy,
        extension: impl Into<String>,
        fs: Arc<dyn ArtifactFs>,
    ) -> Self {
        let permits = policy.max_concurrent_deletes.max(1);
        Self {
            root: root.into(),
            policy,
            extension: extension.into(),
            fs,
            deletes: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Run one sweep cycle, computing ages relative to `today`
    pub async fn sweep(&self, today: NaiveDate) -> SweepStats {
        let start = std::time::Instant::now();
        let mut stats = SweepStats::default();

        if !self.root.exists() {
            tracing::debug!(root = ?self.root, "Retention root does not exist, nothing to sweep");
            return stats;
        }

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(root = ?self.root, error = %e, "Failed to enumerate retention root");
                stats.directory_errors += 1;
                return stats;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    tracing::warn!(root = ?self.root, error = %e, "Failed to read directory entry");
                    stats.directory_errors += 1;
                    continue;
                }
            };
            if !path.is_dir() {
                continue;
            }

            match self.sweep_directory(&path, today).await {
                Ok(dir_stats) => stats.absorb(&dir_stats),
                Err(e) => {
                    tracing::warn!(directory = ?path, error = %e, "Skipping directory that could not be enumerated");
                    stats.directory_errors += 1;
                }
            }
        }

        tracing::info!(
            root = ?self.root,
            directories = stats.directories_scanned,
            examined = stats.files_examined,
            deleted = stats.files_deleted,
            unparseable = stats.skipped_unparseable,
            failures = stats.delete_failures,
            timeouts = stats.delete_timeouts,
            starved = stats.delete_starved,
            duration_ms = start.elapsed().as_millis() as u64,
            "Retention sweep completed"
        );
        stats
    }

    async fn sweep_directory(&self, directory: &Path, today: NaiveDate) -> io::Result<SweepStats> {
        let listing = self.fs.list_files(directory)?;
        let mut stats = SweepStats {
            directories_scanned: 1,
            directory_errors: listing.unreadable.len() as u64,
            ..Default::default()
        };
        for (path, e) in &listing.unreadable {
            tracing::warn!(directory = ?path, error = %e, "Skipping directory that could not be enumerated");
        }

        let mut expired = Vec::new();
        for path in listing.files {
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            stats.files_examined += 1;

            let Some(record) = ArtifactRecord::from_path(&path) else {
                tracing::warn!(path = ?path, "Artifact name has no parseable timestamp, skipping");
                stats.skipped_unparseable += 1;
                continue;
            };

            if record.age_days(today) > i64::from(self.policy.max_age_days) {
                expired.push(record.path);
            }
        }

        let mut deletions = JoinSet::new();
        for path in expired {
            let fs = self.fs.clone();
            let deletes = self.deletes.clone();
            let limit = self.policy.delete_timeout();
            deletions.spawn(async move {
                let result = delete_with_timeout(fs, deletes, &path, limit).await;
                (path, result)
            });
        }

        while let Some(joined) = deletions.join_next().await {
            match joined {
                Ok((path, Ok(()))) => {
                    tracing::debug!(path = ?path, "Deleted expired artifact");
                    stats.files_deleted += 1;
                }
                Ok((path, Err(DeleteError::Timeout(limit)))) => {
                    tracing::warn!(path = ?path, timeout = ?limit, "Artifact deletion timed out");
                    stats.delete_timeouts += 1;
                }
                Ok((path, Err(DeleteError::Starved(limit)))) => {
                    tracing::warn!(
                        path = ?path,
                        timeout = ?limit,
                        "No deletion slot freed up within the timeout, skipping"
                    );
                    stats.delete_starved += 1;
                }
                Ok((path, Err(e))) => {
                    tracing::warn!(path = ?path, error = %e, "Failed to delete expired artifact");
                    stats.delete_failures += 1;
                }
                Err(e) => {
                    tracing::error!(directory = ?directory, error = %e, "Deletion task panicked");
                    stats.delete_failures += 1;
                }
            }
        }

        let attempted = stats.files_deleted + stats.delete_failures + stats.delete_timeouts + stats.delete_starved;
        if attempted == 0 {
            tracing::info!(
                directory = ?directory,
                examined = stats.files_examined,
                "Nothing to delete"
            );
        } else {
            tracing::info!(
                directory = ?directory,
                examined = stats.files_examined,
                deleted = stats.files_deleted,
                "Deleted expired artifacts"
            );
        }

        Ok(stats)
    }
}

/// Delete one file on the blocking pool
///
/// The permit moves into the blocking closure, so a hung deletion keeps its
/// slot until the filesystem returns. Waiting for a slot and the removal
/// share one `limit`; running out while still waiting is reported as
/// `Starved`.
async fn delete_with_timeout(
    fs: Arc<dyn ArtifactFs>,
    deletes: Arc<Semaphore>,
    path: &Path,
    limit: Duration,
) -> Result<(), DeleteError> {
    let started = Instant::now();
    let permit = match timeout(limit, deletes.acquire_owned()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(e)) => return Err(DeleteError::Join(e.to_string())),
        Err(_) => return Err(DeleteError::Starved(limit)),
    };

    let target = path.to_path_buf();
    let removal = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        fs.remove(&target)
    });

    match timeout(limit.saturating_sub(started.elapsed()), removal).await {
        Ok(Ok(result)) => result.map_err(DeleteError::from),
        Ok(Err(e)) => Err(DeleteError::Join(e.to_string())),
        Err(_) => Err(DeleteError::Timeout(limit)),
    }
}

/// Remove leftover `*.tmp` directories below `root`
///
/// Best-effort: failures are logged and the walk continues.
pub fn remove_orphaned_temp_dirs(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }

    let mut orphans = Vec::new();
    let mut walker = walkdir::WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = ?root, error = %e, "Failed to walk artifact tree");
                continue;
            }
        };
        let is_temp = entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(".tmp"));
        if is_temp {
            orphans.push(entry.into_path());
            walker.skip_current_dir();
        }
    }

    let mut removed = 0;
    for dir in orphans {
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(path = ?dir, "Removed orphaned temp directory");
                removed += 1;
            }
            Err(e) => tracing::warn!(path = ?dir, error = %e, "Failed to remove temp directory"),
        }
    }
    removed
}

/// Handle for the background retention task
pub struct RetentionTask {
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
}

impl RetentionTask {
    /// Signal the retention task to shutdown gracefully
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Spawn a background task that sweeps now and then every `period`
pub fn spawn_retention_task(sweeper: Arc<RetentionSweeper>, period: Duration) -> RetentionTask {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    tokio::spawn(async move {
        tracing::info!(
            "Starting retention task for {:?} (interval: {:?}, max age: {}d)",
            sweeper.root(),
            period,
            sweeper.policy().max_age_days
        );

        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Retention task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let stats = sweeper.sweep(Local::now().date_naive()).await;
                    if stats.directory_errors > 0 {
                        tracing::warn!(
                            "Retention cycle hit {} unreadable directories",
                            stats.directory_errors
                        );
                    }
                    if stats.delete_starved > 0 {
                        tracing::warn!(
                            starved = stats.delete_starved,
                            permits = sweeper.policy().max_concurrent_deletes,
                            "Every deletion slot stayed busy for the whole timeout; earlier deletions may be hung"
                        );
                    }
                }
            }
        }
    });

    RetentionTask { shutdown_tx }
}
