// SPDX-License-Identifier: GPL-3.0-only

//! Collaborators driven by the reconstruction session
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Reconstruction Session            │
//! └──────────┬──────────────────────┬───────────┘
//!            │                      │
//! ┌──────────▼─────────┐ ┌──────────▼───────────┐
//! │       Sensor       │ │        Engine        │
//! │ synthetic/playback │ │   CPU TSDF volume    │
//! └────────────────────┘ └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`sensor`]: depth sensor trait, frame acquisition, bundled sensors
//! - [`engine`]: reconstruction engine trait, volume buffers, CPU engine

pub mod engine;
pub mod sensor;
