// SPDX-License-Identifier: GPL-3.0-only

//! Depth Fusion - live volumetric reconstruction from a depth sensor
//!
//! Depth frames are tracked against the reconstruction, fused into a voxel
//! volume, ray-cast back into a shaded image for display, and on request
//! extracted as a triangle mesh and written to STL or OBJ.
//!
//! # Architecture
//!
//! - [`backends`]: depth sensors and the reconstruction engine
//! - [`pipelines`]: the reconstruction session and the mesh pipeline
//! - [`config`]: user configuration handling
//! - [`terminal`]: terminal viewer
//!
//! # Example
//!
//! ```no_run
//! use depth_fusion::config::Config;
//! use depth_fusion::pipelines::reconstruction::open_session;
//!
//! let config = Config::default();
//! let mut session = open_session(&config)?;
//! session.start()?;
//! for _ in 0..30 {
//!     session.tick()?;
//! }
//! let saved = session.save_mesh(None)?;
//! println!("{}", saved.path.display());
//! # Ok::<(), depth_fusion::errors::FusionError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod math;
pub mod pipelines;
pub mod terminal;

// Re-export commonly used types
pub use backends::engine::{CpuReconstruction, Mesh, ReconstructionEngine};
pub use config::Config;
pub use errors::{FusionError, FusionResult};
pub use pipelines::reconstruction::{ReconstructionSession, SessionCommand, SessionEvent};
