// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=DEPTH_FUSION_VERSION");

    // Packagers can pin the version string explicitly
    let version = std::env::var("DEPTH_FUSION_VERSION").unwrap_or_else(|_| describe_build());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Crate version with the short commit hash appended when building from git
///
/// "0.1.0" becomes "0.1.0+abcdef1", or "0.1.0+abcdef1.dirty" with local changes.
fn describe_build() -> String {
    let base = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());

    let Some(hash) = git(&["rev-parse", "--short", "HEAD"]) else {
        return base;
    };

    let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
        .map(|s| !s.is_empty())
        .unwrap_or(false);

    if dirty {
        format!("{}+{}.dirty", base, hash)
    } else {
        format!("{}+{}", base, hash)
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
