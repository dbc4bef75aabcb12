//! Release build step.
//!
//! Invokes the external cargo toolchain against the configured source tree
//! and locates the produced binary. Re-running against an unchanged tree is
//! cheap (cargo's own incremental check) and yields a behaviorally
//! identical binary.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::config::SourceConfig;
use crate::process::Cmd;

/// A release binary produced by the build step.
#[derive(Debug, Clone)]
pub struct BuiltBinary {
    pub path: PathBuf,
}

impl BuiltBinary {
    /// Check that the binary exists, is a file, and is executable.
    pub fn is_valid(&self) -> bool {
        let Ok(meta) = std::fs::metadata(&self.path) else {
            return false;
        };
        if !meta.is_file() {
            return false;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if meta.permissions().mode() & 0o111 == 0 {
                return false;
            }
        }
        true
    }
}

/// Compile the configured package with the release profile.
pub fn build_release(source: &SourceConfig) -> Result<BuiltBinary> {
    let manifest_dir = &source.manifest_dir;
    if !manifest_dir.join("Cargo.toml").exists() {
        bail!(
            "source tree has no Cargo.toml at {}",
            manifest_dir.display()
        );
    }

    println!("[build] compiling {} (release)...", source.package);
    Cmd::new("cargo")
        .args(["build", "--release", "--package"])
        .arg(&source.package)
        .current_dir(manifest_dir)
        .error_msg("cargo build failed")
        .run()?;

    let path = manifest_dir
        .join("target/release")
        .join(source.binary_name());
    let built = BuiltBinary { path };

    if !built.is_valid() {
        bail!(
            "build succeeded but no executable binary at {}",
            built.path.display()
        );
    }

    println!("  Built: {}", built.path.display());
    Ok(built)
}
