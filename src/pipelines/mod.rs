// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines
//!
//! ```text
//! ┌────────────┐     ┌────────────────────┐     ┌──────────────┐
//! │ Depth frame│ ──▶ │  Reconstruction    │ ──▶ │ Shaded image │
//! │ (mm, u16)  │     │  - track + fuse    │     │  (viewer)    │
//! │            │     │  - raycast + shade │     │              │
//! └────────────┘     └─────────┬──────────┘     └──────────────┘
//!                              │ extract
//!                              ▼
//!                    ┌────────────────────┐     ┌──────────────┐
//!                    │   Mesh pipeline    │ ──▶ │ STL/OBJ file │
//!                    └────────────────────┘     └──────────────┘
//! ```
//!
//! - [`reconstruction`]: the session that drives sensor and engine
//! - [`mesh`]: mesh export, reload and software preview

pub mod mesh;
pub mod reconstruction;
