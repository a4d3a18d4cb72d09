// SPDX-License-Identifier: GPL-3.0-only

//! Reconstruction session
//!
//! One tick:
//!
//! ```text
//! acquire (no lock) ──► [lock volume]
//!                         skip check ──► reset?
//!                         depth_to_float
//!                         integrate ──► Tracked(pose) | TrackingLost
//!                         loss policy ──► reset?
//!                         raycast + shade
//!                       [unlock] ──► publish shaded image
//! ```
//!
//! The session is the only writer of the pose, the tracking counters and the
//! shaded image. The engine sits behind a [`VolumeHandle`] so mesh extraction
//! can run from another thread; every engine call holds the volume lock.

use super::commands::{
    CommandOutcome, ReloadedMesh, SavedMesh, SessionCommand, SessionCommandReceiver,
    SessionCommandSender,
};
use super::tracking::{SessionState, TrackingState};
use crate::backends::engine::{
    FloatDepthFrame, IntegrateOutcome, Mesh, PointCloud, ReconstructionEngine, ShadedImage,
    VolumeConfig,
};
use crate::backends::sensor::{Acquisition, DepthResolution, FrameSource};
use crate::config::{Config, MeshSettings, TrackingPolicy};
use crate::errors::{FusionError, FusionResult, MeshError};
use crate::math::Matrix4;
use crate::pipelines::mesh;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why the volume was cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// Initial reset when the session starts
    Startup,
    /// Operator request
    Manual,
    /// Frame timestamp jumped past the skip threshold
    TimestampSkipped,
    /// Too many consecutive frames failed to align
    TrackingLost,
    /// Clearing the workspace after a mesh was saved
    MeshSaved,
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ResetReason::Startup => "startup",
            ResetReason::Manual => "manual",
            ResetReason::TimestampSkipped => "timestamp skipped",
            ResetReason::TrackingLost => "tracking lost",
            ResetReason::MeshSaved => "mesh saved",
        };
        f.write_str(reason)
    }
}

/// Identity of an acquired frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_number: u32,
    pub timestamp_ms: i64,
}

/// What happened to the frame of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No frame arrived; nothing changed
    TimedOut,
    /// Frame aligned and fused
    Tracked,
    /// Frame could not be aligned; pose kept
    TrackingLost,
}

/// Result of a completed tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub frame: Option<FrameInfo>,
    pub outcome: TickOutcome,
    /// Resets performed during the tick, in order
    pub resets: Vec<ResetReason>,
}

impl TickReport {
    fn timed_out() -> Self {
        Self {
            frame: None,
            outcome: TickOutcome::TimedOut,
            resets: Vec::new(),
        }
    }

    /// A frame was processed and a new image published
    pub fn has_frame(&self) -> bool {
        self.frame.is_some()
    }

    pub fn was_reset(&self, reason: ResetReason) -> bool {
        self.resets.contains(&reason)
    }
}

/// Lock-guarded, shareable access to the reconstruction engine
pub struct VolumeHandle<E> {
    engine: Arc<Mutex<E>>,
    /// Set by mesh extraction, consumed by the next tick
    extracted: Arc<AtomicBool>,
}

impl<E> Clone for VolumeHandle<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            extracted: Arc::clone(&self.extracted),
        }
    }
}

impl<E: ReconstructionEngine> VolumeHandle<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            extracted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Exclusive access to the engine
    pub fn lock(&self) -> FusionResult<MutexGuard<'_, E>> {
        self.engine.lock().map_err(|_| FusionError::LockPoisoned)
    }

    /// Snapshot the volume into a mesh under the volume lock
    ///
    /// Extraction can stall the capture loop for longer than the skip
    /// threshold, so the next tick skips timestamp-skip detection.
    pub fn extract_mesh(&self, voxel_step: u32) -> FusionResult<Mesh> {
        let mut engine = self.lock()?;
        let result = engine.extract_mesh(voxel_step);
        self.extracted.store(true, Ordering::SeqCst);
        Ok(result?)
    }

    /// Engine mutation counter
    pub fn volume_version(&self) -> FusionResult<u64> {
        Ok(self.lock()?.volume_version())
    }

    fn take_extracted(&self) -> bool {
        self.extracted.swap(false, Ordering::SeqCst)
    }
}

/// Drives one sensor and one reconstruction volume
pub struct ReconstructionSession<E: ReconstructionEngine> {
    id: Uuid,
    state: SessionState,
    source: FrameSource,
    volume: VolumeHandle<E>,
    volume_config: VolumeConfig,
    policy: TrackingPolicy,
    translate_reset_pose: bool,
    mesh_settings: MeshSettings,
    world_to_camera: Matrix4,
    tracking: TrackingState,
    float_depth: FloatDepthFrame,
    point_cloud: PointCloud,
    shaded: ShadedImage,
    last_saved_mesh: Option<PathBuf>,
    command_tx: SessionCommandSender,
    command_rx: SessionCommandReceiver,
}

impl<E: ReconstructionEngine> ReconstructionSession<E> {
    /// Wire a frame source and an engine together
    ///
    /// Buffers are sized from the source's resolution. The session starts
    /// `Uninitialized`; call [`start`](Self::start) before ticking.
    pub fn new(source: FrameSource, engine: E, config: &Config) -> FusionResult<Self> {
        config.validate()?;

        let resolution: DepthResolution = source.resolution();
        if engine.resolution() != resolution {
            return Err(FusionError::Config(format!(
                "engine is sized for {} depth frames but the sensor streams {}",
                engine.resolution(),
                resolution
            )));
        }
        if engine.volume_config() != config.volume {
            return Err(FusionError::Config(
                "engine volume does not match the configured volume".to_string(),
            ));
        }
        let (command_tx, command_rx) = std::sync::mpsc::channel();
        let id = Uuid::new_v4();

        info!(
            session = %id,
            sensor = source.sensor_name(),
            resolution = %resolution,
            "Created reconstruction session"
        );

        Ok(Self {
            id,
            state: SessionState::Uninitialized,
            source,
            volume: VolumeHandle::new(engine),
            volume_config: config.volume,
            policy: config.tracking,
            translate_reset_pose: config.translate_reset_pose_by_min_depth,
            mesh_settings: config.mesh.clone(),
            world_to_camera: Matrix4::identity(),
            tracking: TrackingState::default(),
            float_depth: FloatDepthFrame::new(resolution),
            point_cloud: PointCloud::new(resolution),
            shaded: ShadedImage::for_resolution(resolution),
            last_saved_mesh: None,
            command_tx,
            command_rx,
        })
    }

    /// Reset the volume and begin accepting ticks
    pub fn start(&mut self) -> FusionResult<()> {
        match self.state {
            SessionState::Uninitialized => {}
            state if state.is_active() => return Ok(()),
            state => return Err(FusionError::NotRunning(state)),
        }

        self.reset_with(ResetReason::Startup)?;
        self.state = SessionState::Running;
        info!(session = %self.id, "Reconstruction session started");
        Ok(())
    }

    fn ensure_active(&self) -> FusionResult<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(FusionError::NotRunning(self.state))
        }
    }

    /// Process one depth frame
    ///
    /// Acquisition happens outside the volume lock. A timeout returns a
    /// `TimedOut` report and leaves all state untouched. Errors abort the tick
    /// and leave the session in its last good state.
    pub fn tick(&mut self) -> FusionResult<TickReport> {
        self.ensure_active()?;

        let frame = match self.source.acquire(self.policy.acquire_timeout()) {
            Ok(Acquisition::Frame {
                frame_number,
                timestamp_ms,
            }) => FrameInfo {
                frame_number,
                timestamp_ms,
            },
            Ok(Acquisition::TimedOut) => {
                debug!(session = %self.id, "No depth frame this tick");
                return Ok(TickReport::timed_out());
            }
            Err(e) => {
                error!(session = %self.id, error = %e, "Depth acquisition failed");
                return Err(e.into());
            }
        };

        let volume = self.volume.clone();
        let mut engine = volume.lock()?;
        let mut resets = Vec::new();

        let after_extraction = volume.take_extracted();
        if self.policy.auto_reset_on_timeout
            && !after_extraction
            && self
                .tracking
                .is_timestamp_skip(frame.timestamp_ms, self.policy.skip_threshold_ms)
        {
            info!(
                session = %self.id,
                previous = ?self.tracking.last_frame_timestamp,
                current = frame.timestamp_ms,
                "Frame timestamp skipped"
            );
            self.reset_locked(&mut *engine, ResetReason::TimestampSkipped)?;
            resets.push(ResetReason::TimestampSkipped);
        }
        self.tracking.last_frame_timestamp = self.source.last_timestamp_ms();

        engine.depth_to_float(
            self.source.depth(),
            &mut self.float_depth,
            self.volume_config.min_depth_threshold,
            self.volume_config.max_depth_threshold,
            self.volume_config.mirror_depth_frame,
        )?;

        let outcome = match engine.integrate(
            &self.float_depth,
            self.policy.align_iterations,
            self.volume_config.max_integration_weight,
            &self.world_to_camera,
        )? {
            IntegrateOutcome::Tracked(pose) => {
                self.world_to_camera = pose;
                self.tracking.record_tracked();
                TickOutcome::Tracked
            }
            IntegrateOutcome::TrackingLost => {
                self.tracking.record_lost();
                warn!(
                    session = %self.id,
                    lost_frames = self.tracking.consecutive_lost_frames,
                    "Camera tracking failed. Align the camera to the last tracked position."
                );
                TickOutcome::TrackingLost
            }
        };

        if self.policy.auto_reset_on_tracking_loss
            && self
                .tracking
                .should_reset_after_loss(self.policy.lost_frame_reset_threshold)
        {
            self.reset_locked(&mut *engine, ResetReason::TrackingLost)?;
            resets.push(ResetReason::TrackingLost);
            warn!(session = %self.id, "Camera tracking failed, volume reset automatically");
        }

        engine.raycast(&self.world_to_camera, &mut self.point_cloud)?;
        engine.shade(&self.point_cloud, &self.world_to_camera, &mut self.shaded)?;
        drop(engine);

        self.state = if self.tracking.tracking_failed {
            SessionState::TrackingLost
        } else {
            SessionState::Running
        };

        Ok(TickReport {
            frame: Some(frame),
            outcome,
            resets,
        })
    }

    /// Clear the volume, put the camera back at the origin, zero the counters
    pub fn reset(&mut self) -> FusionResult<()> {
        self.ensure_active()?;
        self.reset_with(ResetReason::Manual)?;
        self.state = SessionState::Running;
        Ok(())
    }

    fn reset_with(&mut self, reason: ResetReason) -> FusionResult<()> {
        let volume = self.volume.clone();
        let mut engine = volume.lock()?;
        self.reset_locked(&mut *engine, reason)
    }

    fn reset_locked(&mut self, engine: &mut E, reason: ResetReason) -> FusionResult<()> {
        self.world_to_camera.set_identity();

        // Shift the volume so the near clip plane sits on its front face
        let world_to_volume = self.translate_reset_pose.then(|| {
            let mut m = engine.default_world_to_volume();
            m.m[3][2] -= self.volume_config.nearest_clip() * self.volume_config.voxels_per_meter;
            m
        });

        engine.reset(&self.world_to_camera, world_to_volume.as_ref())?;
        self.tracking.clear();

        info!(session = %self.id, reason = %reason, "Reconstruction has been reset");
        Ok(())
    }

    /// Extract the mesh, write it, then reset the volume
    ///
    /// With no path, a timestamped file in the configured output directory is
    /// used. Extraction or export failures leave the session untouched.
    pub fn save_mesh(&mut self, path: Option<PathBuf>) -> FusionResult<SavedMesh> {
        self.ensure_active()?;

        let mesh = self.volume.extract_mesh(self.mesh_settings.voxel_step)?;
        let (path, format) = match path {
            Some(path) => mesh::resolve_output_path(path, self.mesh_settings.format),
            None => {
                let format = self.mesh_settings.format;
                let dir = self.mesh_settings.output_dir();
                (mesh::default_mesh_path(&dir, format), format)
            }
        };

        mesh::export_mesh(&mesh, &path, format, self.mesh_settings.flip_yz)?;

        let saved = SavedMesh {
            path: path.clone(),
            format,
            vertices: mesh.vertex_count(),
            triangles: mesh.triangle_count(),
        };
        self.last_saved_mesh = Some(path);

        self.reset_with(ResetReason::MeshSaved)?;
        self.state = SessionState::Running;
        Ok(saved)
    }

    /// Read the most recently saved mesh back from disk
    pub fn reload_last_mesh(&self) -> FusionResult<ReloadedMesh> {
        let path = self.last_saved_mesh.clone().ok_or(MeshError::NothingSaved)?;
        let mesh = mesh::import_mesh(&path, self.mesh_settings.flip_yz)?;
        info!(
            session = %self.id,
            path = %path.display(),
            triangles = mesh.triangle_count(),
            "Reloaded last saved mesh"
        );
        Ok(ReloadedMesh { path, mesh })
    }

    /// Execute one operator command
    pub fn handle_command(&mut self, command: SessionCommand) -> FusionResult<CommandOutcome> {
        debug!(session = %self.id, command = ?command, "Handling command");
        match command {
            SessionCommand::SaveMesh(path) => self.save_mesh(path).map(CommandOutcome::MeshSaved),
            SessionCommand::Reset => self.reset().map(|_| CommandOutcome::Reset),
            SessionCommand::ReloadLastMesh => {
                self.reload_last_mesh().map(CommandOutcome::MeshReloaded)
            }
        }
    }

    /// Drain queued commands without blocking, in arrival order
    pub fn process_pending_commands(&mut self) -> Vec<FusionResult<CommandOutcome>> {
        let mut results = Vec::new();
        while let Ok(command) = self.command_rx.try_recv() {
            results.push(self.handle_command(command));
        }
        results
    }

    /// Queue handle for commands from other threads
    pub fn command_sender(&self) -> SessionCommandSender {
        self.command_tx.clone()
    }

    /// Handle to the engine; clone it to extract from other threads
    pub fn volume(&self) -> &VolumeHandle<E> {
        &self.volume
    }

    /// Stop the sensor stream; the session accepts no more ticks
    pub fn shutdown(&mut self) {
        if self.state == SessionState::ShutDown {
            return;
        }
        self.source.close();
        self.state = SessionState::ShutDown;
        info!(session = %self.id, "Reconstruction session shut down");
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tracking(&self) -> TrackingState {
        self.tracking
    }

    /// Current world-to-camera pose
    pub fn world_to_camera(&self) -> Matrix4 {
        self.world_to_camera
    }

    /// Shaded ray-cast published by the last tick
    pub fn shaded_image(&self) -> &ShadedImage {
        &self.shaded
    }

    /// Ray-cast point cloud of the last tick
    pub fn point_cloud(&self) -> &PointCloud {
        &self.point_cloud
    }

    pub fn resolution(&self) -> DepthResolution {
        self.source.resolution()
    }

    pub fn last_saved_mesh(&self) -> Option<&Path> {
        self.last_saved_mesh.as_deref()
    }
}

impl<E: ReconstructionEngine> Drop for ReconstructionSession<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
