//! Capture handle trait definitions
//!
//! The capture codec and file format belong to an external recording library.
//! The engine only drives the lifecycle of a handle bound to one artifact.

use crate::Result;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;

/// An open recording bound to a single artifact file
pub trait CaptureHandle: Send {
    /// Begin feeding captured data into the artifact
    fn start(&mut self) -> Result<()>;

    /// Stop feeding but keep the artifact open
    fn pause(&mut self) -> Result<()>;

    /// Continue feeding after a pause
    fn resume(&mut self) -> Result<()>;

    /// Hand one frame of captured data to the handle
    fn feed(&mut self, frame: &[u8]) -> Result<()>;

    /// Copy approximately the last `window` of captured data
    fn snapshot_recent(&self, window: Duration) -> Result<Bytes>;

    /// Finalize and close the artifact. Called exactly once.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens capture handles for artifact paths
pub trait CaptureFactory: Send + Sync {
    fn open(&self, artifact_path: &Path) -> Result<Box<dyn CaptureHandle>>;
}
