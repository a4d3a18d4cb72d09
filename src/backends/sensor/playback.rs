// SPDX-License-Identifier: GPL-3.0-only

//! Recorded depth playback
//!
//! Streams a directory of 16-bit grayscale PNG depth images (millimeters) as
//! if they came from a live sensor. Playback loops, and every loop jumps the
//! timestamp forward by a gap of at least the skip threshold, so the session
//! sees each loop boundary as a discontinuity however short the recording is.

use super::{
    DepthPixel, DepthResolution, DepthSensor, FrameWait, RawFrame, SensorResult, StreamHandle,
    encode_depth_pixels,
};
use crate::constants::{timing, tracking};
use crate::errors::SensorError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Depth sensor that replays PNG depth images from disk
pub struct PlaybackSensor {
    name: String,
    files: Vec<PathBuf>,
    position: usize,
    frame_number: u32,
    loops: u32,
    /// Timestamp of the first frame of the current loop
    loop_origin_ms: i64,
    loop_gap_ms: i64,
    open: bool,
}

impl PlaybackSensor {
    /// Collect the `*.png` files of `directory`, sorted by file name
    pub fn open(directory: &Path) -> SensorResult<Self> {
        let entries = std::fs::read_dir(directory).map_err(|e| {
            SensorError::StreamFailed(format!("Cannot read {}: {}", directory.display(), e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("png"))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(SensorError::NoSensorFound);
        }

        info!(
            directory = %directory.display(),
            frames = files.len(),
            "Opened depth recording"
        );

        Ok(Self {
            name: format!("playback:{}", directory.display()),
            files,
            position: 0,
            frame_number: 0,
            loops: 0,
            loop_origin_ms: 0,
            loop_gap_ms: tracking::RESET_ON_TIMESTAMP_SKIPPED_MS,
            open: false,
        })
    }

    /// Extra time inserted between the last frame of a loop and the first
    /// frame of the next; match it to the session's skip threshold
    pub fn with_loop_gap(mut self, gap_ms: i64) -> Self {
        self.loop_gap_ms = gap_ms.max(0);
        self
    }

    /// Number of recorded frames
    pub fn frame_count(&self) -> usize {
        self.files.len()
    }

    fn load_frame(path: &Path) -> SensorResult<Vec<u8>> {
        let image = image::open(path)
            .map_err(|e| SensorError::StreamFailed(format!("{}: {}", path.display(), e)))?
            .into_luma16();

        let pixels: Vec<DepthPixel> = image
            .pixels()
            .map(|p| DepthPixel::new(p.0[0], 0))
            .collect();

        debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "Loaded recorded depth frame"
        );
        Ok(encode_depth_pixels(&pixels))
    }
}

impl DepthSensor for PlaybackSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_depth_stream(&mut self, resolution: DepthResolution) -> SensorResult<StreamHandle> {
        // Size mismatches surface per frame when the data is copied
        debug!(resolution = %resolution, "Starting playback");
        self.open = true;
        self.position = 0;
        self.frame_number = 0;
        self.loop_origin_ms = 0;
        Ok(StreamHandle(0))
    }

    fn wait_for_frame(&mut self, _timeout: Duration) -> SensorResult<FrameWait> {
        if !self.open {
            return Err(SensorError::StreamNotOpen);
        }
        Ok(FrameWait::Ready)
    }

    fn next_frame(
        &mut self,
        _handle: StreamHandle,
        _timeout: Duration,
    ) -> SensorResult<Option<RawFrame>> {
        if !self.open {
            return Err(SensorError::StreamNotOpen);
        }

        let path = &self.files[self.position];
        let data = Self::load_frame(path)?;
        let frame = RawFrame {
            frame_number: self.frame_number,
            timestamp_ms: self.loop_origin_ms + self.position as i64 * timing::FRAME_INTERVAL_MS,
            data,
        };

        self.frame_number = self.frame_number.wrapping_add(1);
        self.position += 1;
        if self.position == self.files.len() {
            self.loop_origin_ms +=
                self.files.len() as i64 * timing::FRAME_INTERVAL_MS + self.loop_gap_ms;
            self.position = 0;
            self.loops += 1;
            warn!(loops = self.loops, "Depth recording looped");
        }
        Ok(Some(frame))
    }

    fn release_frame(&mut self, _handle: StreamHandle, _frame: RawFrame) -> SensorResult<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}
