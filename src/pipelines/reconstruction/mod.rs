// SPDX-License-Identifier: GPL-3.0-only

//! Live reconstruction session
//!
//! ```text
//!  viewer ──SessionCommand──► ┌──────────────────────┐
//!                             │ ReconstructionSession│──► engine (VolumeHandle)
//!  viewer ◄──SessionEvent──── └──────────────────────┘
//!                                  ▲ capture loop thread (SessionRunner)
//! ```
//!
//! - [`session`]: tick sequence, reset policy, mesh save and reload
//! - [`tracking`]: lifecycle state and per-frame tracking counters
//! - [`commands`]: channel message types
//! - [`frame_loop`]: thread that ticks the session

pub mod commands;
pub mod frame_loop;
pub mod session;
pub mod tracking;

pub use commands::{
    CommandOutcome, FrameUpdate, ReloadedMesh, SavedMesh, SessionCommand, SessionCommandSender,
    SessionEvent,
};
pub use frame_loop::{CaptureLoopController, LoopAction, SessionRunner};
pub use session::{
    FrameInfo, ReconstructionSession, ResetReason, TickOutcome, TickReport, VolumeHandle,
};
pub use tracking::{SessionState, TrackingState};

use crate::backends::engine::CpuReconstruction;
use crate::backends::sensor::{FrameSource, open_sensor};
use crate::config::Config;
use crate::errors::FusionResult;

/// Open the configured sensor and a CPU engine and wire them into a session
pub fn open_session(config: &Config) -> FusionResult<ReconstructionSession<CpuReconstruction>> {
    config.validate()?;
    let sensor = open_sensor(&config.sensor, config.tracking.skip_threshold_ms)?;
    let source = FrameSource::open(sensor, config.resolution)?;
    let engine = CpuReconstruction::new(config.volume, config.resolution)?;
    ReconstructionSession::new(source, engine, config)
}
