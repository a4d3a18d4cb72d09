// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use depth_fusion::backends::engine::VolumeConfig;
use depth_fusion::constants::{mesh, timing, tracking, volume};

#[test]
fn test_default_volume_is_valid() {
    let config = VolumeConfig::default();
    assert!(config.validate().is_ok());
    assert!(volume::DEFAULT_MIN_DEPTH_M < volume::DEFAULT_MAX_DEPTH_M);
    assert!(volume::DEFAULT_INTEGRATION_WEIGHT <= volume::MAX_INTEGRATION_WEIGHT);
}

#[test]
fn test_skip_threshold_exceeds_frame_interval() {
    // A healthy stream must never trip the skip check
    assert!(tracking::RESET_ON_TIMESTAMP_SKIPPED_MS > timing::FRAME_INTERVAL_MS * 2);
}

#[test]
fn test_stl_record_sizes() {
    // 12 floats plus the attribute word
    assert_eq!(mesh::STL_TRIANGLE_LEN, 12 * 4 + 2);
    assert_eq!(mesh::STL_HEADER_LEN, 80);
}
