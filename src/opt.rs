//! Command-line options.

use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

use crate::{target::Arch, tool_configuration::Configuration};

/// Application subcommands.
#[derive(Parser)]
pub enum SubCommands {
    /// Build wheels and binary archives for the target matrix
    Build(BuildOpts),

    /// Run the full release pipeline: build the matrix, publish to PyPI,
    /// and create a GitHub release. Each stage can be skipped.
    Release(ReleaseOpts),

    /// Publish already-built wheels to PyPI
    Publish(PublishOpts),

    /// Create a GitHub release from already-built artifacts
    GithubRelease(GithubReleaseOpts),
}

#[derive(Parser)]
#[clap(version)]
pub struct App {
    /// Subcommand.
    #[clap(subcommand)]
    pub subcommand: SubCommands,

    /// Enable verbose logging.
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

/// Naming and layout options shared by every subcommand. All of them can be
/// driven from the environment for CI use.
#[derive(Parser, Clone, Debug)]
pub struct CommonOpts {
    /// Package name as published to PyPI.
    #[clap(long, env = "PACKAGE_NAME", default_value = env!("CARGO_PKG_NAME"))]
    pub package_name: String,

    /// Python module name inside the wheel. Defaults to the package name
    /// with dashes replaced by underscores.
    #[clap(long, env = "MODULE_NAME")]
    pub module_name: Option<String>,

    /// Name of the standalone binary built by cargo. Defaults to the
    /// package name.
    #[clap(long, env = "BINARY_NAME")]
    pub binary_name: Option<String>,

    /// Prefix for archive file names. Defaults to the binary name.
    #[clap(long, env = "ARCHIVE_PREFIX")]
    pub archive_prefix: Option<String>,

    /// Directory where binary archives and checksums are written.
    #[clap(long, env = "ARTIFACTS_DIR", default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Directory where wheels are written.
    #[clap(long, default_value = "target/wheels")]
    pub wheel_dir: PathBuf,
}

impl CommonOpts {
    /// Resolves the naming defaults into a run configuration.
    pub fn into_configuration(self, sdist: bool) -> Configuration {
        let binary_name = self
            .binary_name
            .unwrap_or_else(|| self.package_name.clone());
        Configuration {
            module_name: self
                .module_name
                .unwrap_or_else(|| self.package_name.replace('-', "_")),
            archive_prefix: self.archive_prefix.unwrap_or_else(|| binary_name.clone()),
            binary_name,
            package_name: self.package_name,
            wheel_dir: self.wheel_dir,
            artifacts_dir: self.artifacts_dir,
            sdist,
            system_tools: Default::default(),
        }
    }
}

#[derive(Parser)]
pub struct BuildOpts {
    /// Restrict the matrix to one architecture.
    #[arg(long)]
    pub arch: Option<Arch>,

    /// Also build a source distribution.
    #[arg(long)]
    pub sdist: bool,

    #[command(flatten)]
    pub common: CommonOpts,
}

#[derive(Parser)]
pub struct ReleaseOpts {
    /// Release tag, `vMAJOR.MINOR.PATCH` with an optional `-suffix`.
    pub tag: String,

    /// Skip the build-matrix stage and release existing artifacts.
    #[arg(long)]
    pub skip_build: bool,

    /// Skip publishing to PyPI.
    #[arg(long)]
    pub skip_pypi: bool,

    /// Skip creating the GitHub release.
    #[arg(long)]
    pub skip_github: bool,

    /// Directory of release assets. Defaults to the artifacts directory.
    #[arg(long)]
    pub assets: Option<PathBuf>,

    /// Restrict the matrix to one architecture.
    #[arg(long)]
    pub arch: Option<Arch>,

    /// Also build and publish a source distribution.
    #[arg(long)]
    pub sdist: bool,

    #[command(flatten)]
    pub common: CommonOpts,
}

#[derive(Parser)]
pub struct PublishOpts {
    /// Also upload the source distribution from the wheel directory.
    #[arg(long)]
    pub sdist: bool,

    #[command(flatten)]
    pub common: CommonOpts,
}

#[derive(Parser)]
pub struct GithubReleaseOpts {
    /// Release tag, `vMAJOR.MINOR.PATCH` with an optional `-suffix`.
    pub tag: String,

    /// Directory of release assets. Defaults to the artifacts directory.
    #[arg(long)]
    pub assets: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonOpts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        App::command().debug_assert();
    }

    #[test]
    fn naming_defaults_cascade() {
        let common = CommonOpts {
            package_name: "my-tool".into(),
            module_name: None,
            binary_name: None,
            archive_prefix: None,
            artifacts_dir: "artifacts".into(),
            wheel_dir: "target/wheels".into(),
        };
        let config = common.into_configuration(false);
        assert_eq!(config.module_name, "my_tool");
        assert_eq!(config.binary_name, "my-tool");
        assert_eq!(config.archive_prefix, "my-tool");
    }

    #[test]
    fn explicit_overrides_win() {
        let common = CommonOpts {
            package_name: "my-tool".into(),
            module_name: Some("custom".into()),
            binary_name: Some("mt".into()),
            archive_prefix: Some("mt-dist".into()),
            artifacts_dir: "out".into(),
            wheel_dir: "wheels".into(),
        };
        let config = common.into_configuration(true);
        assert_eq!(config.module_name, "custom");
        assert_eq!(config.binary_name, "mt");
        assert_eq!(config.archive_prefix, "mt-dist");
        assert!(config.sdist);
    }
}
