// SPDX-License-Identifier: GPL-3.0-only

//! Headless CLI commands
//!
//! - Inspecting a saved mesh file
//! - Rendering a mesh preview to PNG
//! - Showing or writing the configuration

use depth_fusion::backends::sensor::DepthResolution;
use depth_fusion::config::{Config, SensorSource};
use depth_fusion::pipelines::mesh::{self, MeshStats, Orbit, render_mesh_preview, save_image_png};
use std::path::{Path, PathBuf};

/// Overrides from the command line, applied on top of the config file
#[derive(Debug, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub resolution: Option<DepthResolution>,
    pub playback: Option<PathBuf>,
}

/// Load the config file (or defaults) and apply command line overrides
pub fn load_config(overrides: &Overrides) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &overrides.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(resolution) = overrides.resolution {
        config.resolution = resolution;
    }
    if let Some(directory) = &overrides.playback {
        config.sensor = SensorSource::Playback {
            directory: directory.clone(),
        };
    }
    config.validate()?;
    Ok(config)
}

/// Parse `WIDTHxHEIGHT` into a supported depth resolution
pub fn parse_resolution(value: &str) -> Result<DepthResolution, String> {
    DepthResolution::ALL
        .into_iter()
        .find(|r| r.to_string().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| {
            let supported: Vec<String> = DepthResolution::ALL.iter().map(|r| r.to_string()).collect();
            format!("unsupported resolution '{}' (supported: {})", value, supported.join(", "))
        })
}

/// Print statistics of a saved mesh
pub fn inspect(path: &Path, flip_yz: bool) -> Result<(), Box<dyn std::error::Error>> {
    let format = mesh::MeshFormat::from_path(path)?;
    let mesh = mesh::import_mesh(path, flip_yz)?;
    let stats = MeshStats::of(&mesh);

    println!("{} ({})", path.display(), format);
    println!("  Vertices:  {}", stats.vertices);
    println!("  Triangles: {}", stats.triangles);
    if let Some((lo, hi)) = stats.bounds {
        println!("  Min:       {:.3} {:.3} {:.3}", lo.x, lo.y, lo.z);
        println!("  Max:       {:.3} {:.3} {:.3}", hi.x, hi.y, hi.z);
    }
    Ok(())
}

/// Render a mesh preview to a PNG file
pub fn render(
    path: &Path,
    output: &Path,
    width: u32,
    height: u32,
    yaw_deg: f32,
    flip_yz: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = mesh::import_mesh(path, flip_yz)?;
    let mut orbit = Orbit::default();
    orbit.rotate(yaw_deg.to_radians(), 0.0);
    let image = render_mesh_preview(&mesh, width, height, &orbit);
    save_image_png(&image, output)?;
    println!("Preview saved: {}", output.display());
    Ok(())
}

/// Print the effective configuration, optionally writing it to disk
pub fn show_config(config: &Config, write: bool) -> Result<(), Box<dyn std::error::Error>> {
    match Config::config_path() {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no config directory on this platform"),
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    if write {
        let path = config.save()?;
        println!("Config written: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("320x240"), Ok(DepthResolution::R320x240));
        assert_eq!(parse_resolution(" 80X60 "), Ok(DepthResolution::R80x60));
        assert!(parse_resolution("1920x1080").unwrap_err().contains("640x480"));
    }

    #[test]
    fn test_overrides_apply() {
        let dir = std::env::temp_dir().join(format!("depth-fusion-cli-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        Config::default().save_to(&path).unwrap();

        let config = load_config(&Overrides {
            config: Some(path),
            resolution: Some(DepthResolution::R80x60),
            playback: Some(PathBuf::from("/recordings/desk")),
        })
        .unwrap();
        assert_eq!(config.resolution, DepthResolution::R80x60);
        assert_eq!(
            config.sensor,
            SensorSource::Playback {
                directory: PathBuf::from("/recordings/desk")
            }
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
