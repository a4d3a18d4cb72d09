// SPDX-License-Identifier: GPL-3.0-only

//! Messages between the viewer and the reconstruction session
//!
//! Input flows in as [`SessionCommand`]s over a std channel, drained by the
//! session between ticks. Results flow back as [`SessionEvent`]s over a
//! bounded channel; frame events are dropped when the viewer falls behind.

use super::session::TickReport;
use super::tracking::{SessionState, TrackingState};
use crate::backends::engine::{Mesh, ShadedImage};
use crate::errors::FusionError;
use crate::pipelines::mesh::MeshFormat;
use futures::channel::mpsc;
use std::path::PathBuf;
use std::sync::Arc;

/// Sender half for operator commands
pub type SessionCommandSender = std::sync::mpsc::Sender<SessionCommand>;

/// Receiver half for operator commands
pub type SessionCommandReceiver = std::sync::mpsc::Receiver<SessionCommand>;

/// Sender half for session events
pub type SessionEventSender = mpsc::Sender<SessionEvent>;

/// Receiver half for session events
pub type SessionEventReceiver = mpsc::Receiver<SessionEvent>;

/// Operator command delivered from the viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Extract and save the mesh; `None` picks a timestamped default path
    SaveMesh(Option<PathBuf>),
    /// Clear the volume and restart tracking
    Reset,
    /// Load the most recently saved mesh back from disk
    ReloadLastMesh,
}

/// A mesh written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMesh {
    pub path: PathBuf,
    pub format: MeshFormat,
    pub vertices: usize,
    pub triangles: usize,
}

/// A mesh read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadedMesh {
    pub path: PathBuf,
    pub mesh: Mesh,
}

/// Successful result of a [`SessionCommand`]
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    MeshSaved(SavedMesh),
    Reset,
    MeshReloaded(ReloadedMesh),
}

/// Published result of one tick
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    /// Shaded ray-cast of the volume
    pub image: Arc<ShadedImage>,
    pub report: TickReport,
    pub tracking: TrackingState,
    pub state: SessionState,
}

/// Notification from the session to the viewer
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new shaded frame is available
    Frame(FrameUpdate),
    /// A command finished
    CommandCompleted(CommandOutcome),
    /// A command failed; the session keeps running
    CommandFailed(FusionError),
    /// A fatal error stopped the session
    Failed(FusionError),
}
