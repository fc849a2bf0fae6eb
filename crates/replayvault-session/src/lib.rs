//! ReplayVault Session Recording
//!
//! This crate drives per-participant recordings:
//! - Filter policy and artifact path templates
//! - Session lifecycle management
//! - Instant replay exports with time-bounded retention
//! - Age based retention sweep of stored artifacts

pub mod capture;
pub mod cleanup;
pub mod config;
pub mod engine;
pub mod filter;
pub mod manager;
pub mod replay;
pub mod template;

pub use capture::{SpoolCapture, SpoolCaptureFactory};
pub use cleanup::{
    ArtifactFs, Listing, LocalFs, RetentionSweeper, RetentionTask, SweepStats, remove_orphaned_temp_dirs,
    spawn_retention_task,
};
pub use config::{CheckBy, FilterPolicy, InstantReplayConfig, RecordMode, RecorderConfig, RetentionPolicy};
pub use engine::RecordingEngine;
pub use manager::{LeaveOutcome, SessionInfo, SessionManager, SessionOptions, StartOutcome};
pub use replay::{InstantReplayBuffer, InstantReplayEntry, ReaperTask, spawn_reaper};
pub use template::ArtifactPathResolver;
