// SPDX-License-Identifier: GPL-3.0-only

//! Pull-based depth frame acquisition
//!
//! `FrameSource` owns the sensor and the session's single depth buffer. Each
//! acquisition overwrites the buffer in place; the session borrows it
//! read-only for the rest of the tick.

use super::{DepthPixel, DepthResolution, DepthSensor, FrameWait, RawFrame, SensorResult, StreamHandle};
use crate::errors::SensorError;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of a successful acquisition call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// A frame was copied into the depth buffer
    Frame { frame_number: u32, timestamp_ms: i64 },
    /// No frame within the timeout; the buffer is unchanged
    TimedOut,
}

/// Owns a depth sensor stream and the depth buffer it fills
pub struct FrameSource {
    sensor: Box<dyn DepthSensor>,
    stream: Option<StreamHandle>,
    resolution: DepthResolution,
    pixels: Vec<DepthPixel>,
    last_timestamp_ms: Option<i64>,
}

impl FrameSource {
    /// Open the sensor's depth stream and allocate the depth buffer
    pub fn open(mut sensor: Box<dyn DepthSensor>, resolution: DepthResolution) -> SensorResult<Self> {
        let stream = sensor.open_depth_stream(resolution)?;

        info!(
            sensor = sensor.name(),
            resolution = %resolution,
            "Depth stream opened"
        );

        Ok(Self {
            sensor,
            stream: Some(stream),
            resolution,
            pixels: vec![DepthPixel::default(); resolution.pixel_count()],
            last_timestamp_ms: None,
        })
    }

    /// Wait up to `timeout` for the next frame and copy it into the depth buffer
    ///
    /// `timeout` bounds the whole call: retrieving the frame only gets what
    /// the frame-ready wait left over. The sensor frame is always released
    /// before returning, including when the copy fails.
    pub fn acquire(&mut self, timeout: Duration) -> SensorResult<Acquisition> {
        let stream = self.stream.ok_or(SensorError::StreamNotOpen)?;
        let started = Instant::now();

        if self.sensor.wait_for_frame(timeout)? == FrameWait::TimedOut {
            debug!("Timed out waiting for depth frame signal");
            return Ok(Acquisition::TimedOut);
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        let Some(frame) = self.sensor.next_frame(stream, remaining)? else {
            debug!("Depth frame signaled but not delivered in time");
            return Ok(Acquisition::TimedOut);
        };

        let frame_number = frame.frame_number;
        let timestamp_ms = frame.timestamp_ms;
        let copied = self.copy_extended_depth(&frame);
        let released = self.sensor.release_frame(stream, frame);

        copied?;
        released?;

        self.last_timestamp_ms = Some(timestamp_ms);
        Ok(Acquisition::Frame {
            frame_number,
            timestamp_ms,
        })
    }

    /// Copy the frame's extended depth bytes into the depth buffer
    ///
    /// The source length must match the buffer exactly.
    fn copy_extended_depth(&mut self, frame: &RawFrame) -> SensorResult<()> {
        let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut self.pixels);
        if frame.data.len() != dst.len() {
            warn!(
                expected = dst.len(),
                actual = frame.data.len(),
                "Depth frame size does not match the depth buffer"
            );
            return Err(SensorError::BufferSizeMismatch {
                expected: dst.len(),
                actual: frame.data.len(),
            });
        }
        dst.copy_from_slice(&frame.data);
        Ok(())
    }

    /// Depth buffer contents from the last successful acquisition
    pub fn depth(&self) -> &[DepthPixel] {
        &self.pixels
    }

    pub fn resolution(&self) -> DepthResolution {
        self.resolution
    }

    /// Timestamp of the last frame copied into the buffer
    pub fn last_timestamp_ms(&self) -> Option<i64> {
        self.last_timestamp_ms
    }

    pub fn sensor_name(&self) -> &str {
        self.sensor.name()
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Stop the stream; further acquisitions fail with `StreamNotOpen`
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            info!(sensor = self.sensor.name(), "Closing depth stream");
            self.sensor.close();
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sensor::encode_depth_pixels;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct QueueSensor {
        frames: VecDeque<RawFrame>,
        released: Arc<AtomicUsize>,
    }

    impl DepthSensor for QueueSensor {
        fn name(&self) -> &str {
            "queue"
        }

        fn open_depth_stream(&mut self, _: DepthResolution) -> SensorResult<StreamHandle> {
            Ok(StreamHandle(1))
        }

        fn wait_for_frame(&mut self, _: Duration) -> SensorResult<FrameWait> {
            Ok(if self.frames.is_empty() {
                FrameWait::TimedOut
            } else {
                FrameWait::Ready
            })
        }

        fn next_frame(&mut self, _: StreamHandle, _: Duration) -> SensorResult<Option<RawFrame>> {
            Ok(self.frames.pop_front())
        }

        fn release_frame(&mut self, _: StreamHandle, _: RawFrame) -> SensorResult<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn source_with(frames: Vec<RawFrame>) -> (FrameSource, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        let sensor = QueueSensor {
            frames: frames.into(),
            released: Arc::clone(&released),
        };
        let source = FrameSource::open(Box::new(sensor), DepthResolution::R80x60).unwrap();
        (source, released)
    }

    #[test]
    fn test_acquire_copies_pixels() {
        let pixels = vec![DepthPixel::new(1200, 0); DepthResolution::R80x60.pixel_count()];
        let frame = RawFrame {
            frame_number: 7,
            timestamp_ms: 231,
            data: encode_depth_pixels(&pixels),
        };
        let (mut source, released) = source_with(vec![frame]);

        let result = source.acquire(Duration::from_millis(10)).unwrap();
        assert_eq!(
            result,
            Acquisition::Frame {
                frame_number: 7,
                timestamp_ms: 231
            }
        );
        assert!(source.depth().iter().all(|p| p.depth == 1200));
        assert_eq!(source.last_timestamp_ms(), Some(231));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_size_mismatch_is_an_error_and_frame_is_released() {
        let frame = RawFrame {
            frame_number: 1,
            timestamp_ms: 0,
            data: vec![0u8; 100],
        };
        let (mut source, released) = source_with(vec![frame]);

        let err = source.acquire(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, SensorError::BufferSizeMismatch { actual: 100, .. }));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(source.last_timestamp_ms(), None);
    }

    #[test]
    fn test_timeout_leaves_buffer_untouched() {
        let (mut source, _) = source_with(Vec::new());
        assert_eq!(
            source.acquire(Duration::from_millis(1)).unwrap(),
            Acquisition::TimedOut
        );
        assert!(source.depth().iter().all(|p| p.depth == 0));
    }

    /// Ready signal and frame delivery that each sleep through their budget
    struct SlowSensor {
        wait_ms: u64,
        next_budgets: Arc<Mutex<Vec<Duration>>>,
    }

    impl DepthSensor for SlowSensor {
        fn name(&self) -> &str {
            "slow"
        }

        fn open_depth_stream(&mut self, _: DepthResolution) -> SensorResult<StreamHandle> {
            Ok(StreamHandle(1))
        }

        fn wait_for_frame(&mut self, _: Duration) -> SensorResult<FrameWait> {
            std::thread::sleep(Duration::from_millis(self.wait_ms));
            Ok(FrameWait::Ready)
        }

        fn next_frame(&mut self, _: StreamHandle, timeout: Duration) -> SensorResult<Option<RawFrame>> {
            self.next_budgets.lock().unwrap().push(timeout);
            std::thread::sleep(timeout);
            Ok(None)
        }

        fn release_frame(&mut self, _: StreamHandle, _: RawFrame) -> SensorResult<()> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn test_acquire_is_bounded_by_a_single_timeout() {
        let next_budgets = Arc::new(Mutex::new(Vec::new()));
        let sensor = SlowSensor {
            wait_ms: 80,
            next_budgets: Arc::clone(&next_budgets),
        };
        let mut source = FrameSource::open(Box::new(sensor), DepthResolution::R80x60).unwrap();
        let timeout = Duration::from_millis(100);

        let started = Instant::now();
        assert_eq!(source.acquire(timeout).unwrap(), Acquisition::TimedOut);
        let elapsed = started.elapsed();

        let budgets = next_budgets.lock().unwrap();
        assert_eq!(budgets.len(), 1);
        assert!(budgets[0] <= Duration::from_millis(20), "frame budget {:?}", budgets[0]);
        assert!(elapsed < Duration::from_millis(150), "acquire took {:?}", elapsed);
    }

    #[test]
    fn test_closed_stream() {
        let (mut source, _) = source_with(Vec::new());
        source.close();
        assert_eq!(
            source.acquire(Duration::from_millis(1)).unwrap_err(),
            SensorError::StreamNotOpen
        );
    }
}
