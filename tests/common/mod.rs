// SPDX-License-Identifier: GPL-3.0-only

//! Scripted collaborators for session tests

#![allow(dead_code)]

use depth_fusion::backends::engine::{
    FloatDepthFrame, IntegrateOutcome, Mesh, PointCloud, ReconstructionEngine, VolumeConfig,
};
use depth_fusion::backends::sensor::{
    DepthPixel, DepthResolution, DepthSensor, FrameSource, FrameWait, RawFrame, SensorResult,
    StreamHandle, encode_depth_pixels,
};
use depth_fusion::config::Config;
use depth_fusion::errors::{EngineError, SensorError};
use depth_fusion::math::{Matrix4, Vector3};
use depth_fusion::pipelines::reconstruction::ReconstructionSession;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const RESOLUTION: DepthResolution = DepthResolution::R80x60;

/// One scripted acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Deliver a frame with this timestamp
    Frame(i64),
    /// No frame within the timeout
    Timeout,
    /// The sensor goes away
    Fail,
}

/// Queue shared between a test and its [`ScriptedSensor`]
#[derive(Clone, Default)]
pub struct Script(Arc<Mutex<VecDeque<Step>>>);

impl Script {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self(Arc::new(Mutex::new(steps.into_iter().collect())))
    }

    /// Frames every 33 ms starting at `start`
    pub fn frames(start: i64, count: usize) -> Self {
        Self::new((0..count).map(|i| Step::Frame(start + i as i64 * 33)))
    }

    pub fn push(&self, step: Step) {
        self.0.lock().unwrap().push_back(step);
    }

    pub fn remaining(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn front(&self) -> Option<Step> {
        self.0.lock().unwrap().front().copied()
    }

    fn pop(&self) -> Option<Step> {
        self.0.lock().unwrap().pop_front()
    }
}

/// Sensor that plays back a [`Script`]; an empty script times out
pub struct ScriptedSensor {
    script: Script,
    frame_number: u32,
    data: Vec<u8>,
}

impl ScriptedSensor {
    pub fn new(script: Script) -> Self {
        let pixels = vec![DepthPixel::new(1000, 0); RESOLUTION.pixel_count()];
        Self {
            script,
            frame_number: 0,
            data: encode_depth_pixels(&pixels),
        }
    }
}

impl DepthSensor for ScriptedSensor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open_depth_stream(&mut self, _resolution: DepthResolution) -> SensorResult<StreamHandle> {
        Ok(StreamHandle(1))
    }

    fn wait_for_frame(&mut self, _timeout: Duration) -> SensorResult<FrameWait> {
        match self.script.front() {
            Some(Step::Frame(_)) => Ok(FrameWait::Ready),
            Some(Step::Fail) => {
                self.script.pop();
                Err(SensorError::Disconnected)
            }
            Some(Step::Timeout) => {
                self.script.pop();
                Ok(FrameWait::TimedOut)
            }
            None => Ok(FrameWait::TimedOut),
        }
    }

    fn next_frame(
        &mut self,
        _handle: StreamHandle,
        _timeout: Duration,
    ) -> SensorResult<Option<RawFrame>> {
        let Some(Step::Frame(timestamp_ms)) = self.script.pop() else {
            return Ok(None);
        };
        self.frame_number += 1;
        Ok(Some(RawFrame {
            frame_number: self.frame_number,
            timestamp_ms,
            data: self.data.clone(),
        }))
    }

    fn release_frame(&mut self, _handle: StreamHandle, _frame: RawFrame) -> SensorResult<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Scripted integration result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Track,
    Lose,
    Fail,
}

/// Engine that follows a script and records what it was asked to do
pub struct FakeEngine {
    /// Integration results, `Track` once exhausted
    pub alignment: VecDeque<Align>,
    /// Every reset, with the world-to-volume it was given
    pub resets: Vec<Option<Matrix4>>,
    pub integrations: u32,
    pub raycasts: u32,
    pub extractions: u32,
    /// Volume version seen by each extraction
    pub extracted_at: Vec<u64>,
    pub fail_extraction: bool,
    /// Time extraction holds the volume
    pub extract_delay: Duration,
    /// Camera step applied on every tracked frame
    pub step: Vector3,
    /// Geometry reported to the session, `test_config()` by default
    pub volume: VolumeConfig,
    pub resolution: DepthResolution,
    pub fused_frames: u32,
    pub version: u64,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            alignment: VecDeque::new(),
            resets: Vec::new(),
            integrations: 0,
            raycasts: 0,
            extractions: 0,
            extracted_at: Vec::new(),
            fail_extraction: false,
            extract_delay: Duration::ZERO,
            step: Vector3::new(0.0, 0.0, 0.01),
            volume: test_config().volume,
            resolution: RESOLUTION,
            fused_frames: 0,
            version: 0,
        }
    }
}

impl FakeEngine {
    pub fn scripted(alignment: impl IntoIterator<Item = Align>) -> Self {
        Self {
            alignment: alignment.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Engine whose mesh extraction always fails
    pub fn failing_extraction() -> Self {
        Self {
            fail_extraction: true,
            ..Self::default()
        }
    }

    /// Engine that holds the volume for `delay` during extraction
    pub fn with_extract_delay(delay: Duration) -> Self {
        Self {
            extract_delay: delay,
            ..Self::default()
        }
    }

    pub fn fused_frames(&self) -> u32 {
        self.fused_frames
    }
}

impl ReconstructionEngine for FakeEngine {
    fn depth_to_float(
        &mut self,
        depth: &[DepthPixel],
        out: &mut FloatDepthFrame,
        min_depth: f32,
        max_depth: f32,
        mirror: bool,
    ) -> Result<(), EngineError> {
        depth_fusion::backends::engine::convert_depth(depth, out, min_depth, max_depth, mirror)
    }

    fn integrate(
        &mut self,
        _depth: &FloatDepthFrame,
        _max_align_iterations: u16,
        _max_integration_weight: u16,
        world_to_camera: &Matrix4,
    ) -> Result<IntegrateOutcome, EngineError> {
        self.integrations += 1;
        match self.alignment.pop_front().unwrap_or(Align::Track) {
            Align::Track => {
                self.fused_frames += 1;
                self.version += 1;
                let mut pose = *world_to_camera;
                pose.set_translation(pose.translation() - self.step);
                Ok(IntegrateOutcome::Tracked(pose))
            }
            Align::Lose => Ok(IntegrateOutcome::TrackingLost),
            Align::Fail => Err(EngineError::Integration("device lost".to_string())),
        }
    }

    fn raycast(&mut self, _world_to_camera: &Matrix4, out: &mut PointCloud) -> Result<(), EngineError> {
        self.raycasts += 1;
        out.clear();
        if self.fused_frames > 0 {
            for (i, normal) in out.normals.iter_mut().enumerate() {
                *normal = Vector3::new(0.0, 0.0, -1.0);
                out.points[i] = Vector3::new(0.0, 0.0, 1.0);
            }
        }
        Ok(())
    }

    fn extract_mesh(&mut self, _voxel_step: u32) -> Result<Mesh, EngineError> {
        self.extractions += 1;
        self.extracted_at.push(self.version);
        std::thread::sleep(self.extract_delay);
        if self.fail_extraction {
            return Err(EngineError::Extraction("out of memory".to_string()));
        }
        let mut mesh = Mesh::new();
        if self.fused_frames > 0 {
            mesh.push_triangle(
                [
                    Vector3::new(0.0, 0.0, 1.0),
                    Vector3::new(0.1, 0.0, 1.0),
                    Vector3::new(0.0, 0.1, 1.0),
                ],
                Vector3::new(0.0, 0.0, 1.0),
            );
        }
        Ok(mesh)
    }

    fn reset(
        &mut self,
        _world_to_camera: &Matrix4,
        world_to_volume: Option<&Matrix4>,
    ) -> Result<(), EngineError> {
        self.resets.push(world_to_volume.copied());
        self.fused_frames = 0;
        self.version += 1;
        Ok(())
    }

    fn default_world_to_volume(&self) -> Matrix4 {
        Matrix4::identity()
    }

    fn volume_config(&self) -> VolumeConfig {
        self.volume
    }

    fn resolution(&self) -> DepthResolution {
        self.resolution
    }

    fn volume_version(&self) -> u64 {
        self.version
    }
}

/// Config for 80x60 test sessions
pub fn test_config() -> Config {
    Config {
        resolution: RESOLUTION,
        volume: VolumeConfig {
            voxels_per_meter: 32.0,
            voxel_count_x: 64,
            voxel_count_y: 48,
            voxel_count_z: 64,
            ..VolumeConfig::default()
        },
        ..Config::default()
    }
}

/// Unique scratch directory under the system temp dir
pub fn scratch_dir(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("depth-fusion-{}-{}", tag, uuid::Uuid::new_v4()))
}

/// Session over a scripted sensor and a fake engine
pub fn fake_session(
    script: &Script,
    engine: FakeEngine,
    config: &Config,
) -> ReconstructionSession<FakeEngine> {
    let source = FrameSource::open(Box::new(ScriptedSensor::new(script.clone())), RESOLUTION)
        .expect("scripted sensor opens");
    ReconstructionSession::new(source, engine, config).expect("valid config")
}

/// Started session, ready to tick
pub fn started_session(
    script: &Script,
    engine: FakeEngine,
    config: &Config,
) -> ReconstructionSession<FakeEngine> {
    let mut session = fake_session(script, engine, config);
    session.start().expect("session starts");
    session
}
