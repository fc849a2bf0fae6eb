//! ReplayVault Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout ReplayVault:
//! - Participant and session identity types
//! - Host event types
//! - Capture handle abstractions
//! - Artifact naming
//! - Core error types

pub mod artifact;
pub mod capture;
pub mod error;
pub mod events;
pub mod types;

pub use artifact::ArtifactRecord;
pub use capture::{CaptureFactory, CaptureHandle};
pub use error::{Error, Result};
pub use events::HostEvent;
pub use types::{Participant, SessionId, SessionState};
