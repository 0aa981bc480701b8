//! Configuration for a wheelsmith run.
//! This is what the orchestrator and publish steps consume; the CLI layer
//! builds it from flags and environment overrides.

use std::path::PathBuf;

use crate::system_tools::SystemTools;

/// Global configuration for a release run.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Package name as published to PyPI.
    pub package_name: String,

    /// Python module name inside the wheel. Defaults to the package name with
    /// dashes replaced by underscores.
    pub module_name: String,

    /// Name of the standalone binary built by cargo.
    pub binary_name: String,

    /// Prefix for archive file names (`<prefix>-<triple>.tar.gz`).
    pub archive_prefix: String,

    /// Directory where wheel artifacts are written.
    pub wheel_dir: PathBuf,

    /// Directory where binary archives and checksums are written.
    pub artifacts_dir: PathBuf,

    /// Whether to also build a source distribution.
    pub sdist: bool,

    /// Resolved external tools.
    pub system_tools: SystemTools,
}

impl Configuration {
    /// Path of the README rewritten during PyPI publishing.
    pub fn readme_path(&self) -> PathBuf {
        PathBuf::from("README.md")
    }
}

impl Default for Configuration {
    fn default() -> Self {
        let package_name = env!("CARGO_PKG_NAME").to_string();
        Self {
            module_name: package_name.replace('-', "_"),
            binary_name: package_name.clone(),
            archive_prefix: package_name.clone(),
            package_name,
            wheel_dir: PathBuf::from("target/wheels"),
            artifacts_dir: PathBuf::from("artifacts"),
            sdist: false,
            system_tools: SystemTools::new(),
        }
    }
}
