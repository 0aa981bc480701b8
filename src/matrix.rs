//! The build-matrix orchestrator: walks an ordered list of targets, builds a
//! wheel and a binary for each, packages successful binaries, and reports an
//! aggregate outcome. Per-target failure never aborts the matrix; only a run
//! that produces nothing fails overall.

use std::path::PathBuf;

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL_CONDENSED, Table};
use serde::Serialize;

use crate::{
    archive::{self, ArchiveError},
    hash,
    system_tools::{SystemTools, ToolError},
    target::Target,
    tool_configuration::Configuration,
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build tool missing")]
    Tool(#[from] ToolError),
    #[error("build command failed")]
    Io(#[from] std::io::Error),
    #[error("build completed but expected output {0} does not exist")]
    MissingOutput(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("no targets selected, nothing to build")]
    NoTargets,
    #[error("all {attempted} targets failed to produce a binary artifact")]
    NoArtifacts { attempted: usize },
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Outcome of the wheel half of a target build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum WheelOutcome {
    Built { wheel: PathBuf },
    Failed,
    Skipped,
}

/// Outcome of the binary half of a target build. `Built` implies the archive
/// and its checksum sidecar exist on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum BinaryOutcome {
    Built { archive: PathBuf, checksum: PathBuf },
    Failed,
    Skipped { reason: String },
}

/// Per-target result. Created exactly once per target per run and never
/// mutated afterwards; the two halves are reported independently.
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub target: Target,
    pub wheel: WheelOutcome,
    pub binary: BinaryOutcome,
}

/// All results of one orchestrator run, in target order.
#[derive(Debug, Serialize)]
pub struct ArtifactSet {
    results: Vec<BuildResult>,
}

impl ArtifactSet {
    pub fn results(&self) -> &[BuildResult] {
        &self.results
    }

    pub fn any_binary_built(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.binary, BinaryOutcome::Built { .. }))
    }

    pub fn binaries_built(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.binary, BinaryOutcome::Built { .. }))
            .count()
    }

    pub fn wheels_built(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.wheel, WheelOutcome::Built { .. }))
            .count()
    }

    /// Paths of every produced artifact (archives and checksum sidecars).
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        self.results
            .iter()
            .filter_map(|r| match &r.binary {
                BinaryOutcome::Built { archive, checksum } => {
                    Some(vec![archive.clone(), checksum.clone()])
                }
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Human-readable per-target summary.
    pub fn summary_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Target", "Wheel", "Binary"]);
        for result in &self.results {
            let wheel = match &result.wheel {
                WheelOutcome::Built { .. } => "built",
                WheelOutcome::Failed => "failed",
                WheelOutcome::Skipped => "skipped",
            };
            let binary = match &result.binary {
                BinaryOutcome::Built { .. } => "built",
                BinaryOutcome::Failed => "failed",
                BinaryOutcome::Skipped { .. } => "skipped",
            };
            table.add_row(vec![result.target.to_string(), wheel.into(), binary.into()]);
        }
        table
    }
}

/// Report written next to the artifacts so CI can consume the outcome.
#[derive(Serialize)]
struct BuildReport<'a> {
    tools: &'a SystemTools,
    results: &'a [BuildResult],
}

/// Builds the wheel artifact for one target. The matrix runs on a
/// single-threaded runtime, so builder futures need not be `Send`.
#[async_trait::async_trait(?Send)]
pub trait WheelBuilder {
    async fn build_wheel(
        &self,
        target: &Target,
        config: &Configuration,
    ) -> Result<PathBuf, BuildError>;
}

/// Builds the standalone binary for one target. `missing_toolchain` is probed
/// before any build step so targets without their cross toolchain are skipped
/// rather than attempted.
#[async_trait::async_trait(?Send)]
pub trait BinaryBuilder {
    fn missing_toolchain(&self, target: &Target) -> Option<String>;

    async fn build_binary(
        &self,
        target: &Target,
        config: &Configuration,
    ) -> Result<PathBuf, BuildError>;
}

/// Runs the matrix over `targets` in order, strictly sequentially.
///
/// Wheel and binary failures are independent and non-fatal per target. The
/// run as a whole fails only when every target failed to produce a binary
/// artifact (soft success: one target is enough for exit 0).
pub async fn run(
    targets: &[Target],
    config: &Configuration,
    wheels: &dyn WheelBuilder,
    binaries: &dyn BinaryBuilder,
) -> Result<ArtifactSet, MatrixError> {
    if targets.is_empty() {
        return Err(MatrixError::NoTargets);
    }

    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        tracing::info!("Processing target {target} ({})", target.triple());

        // a re-run must never silently reuse a previous run's output
        clean_stale_artifacts(config, target);

        if let Some(reason) = binaries.missing_toolchain(target) {
            tracing::warn!("Skipping {target}: {reason}");
            results.push(BuildResult {
                target: *target,
                wheel: WheelOutcome::Skipped,
                binary: BinaryOutcome::Skipped { reason },
            });
            continue;
        }

        let wheel = match wheels.build_wheel(target, config).await {
            Ok(wheel) => {
                tracing::info!("Wheel built for {target}: {}", wheel.display());
                WheelOutcome::Built { wheel }
            }
            Err(err) => {
                tracing::warn!("Wheel build failed for {target}: {err}");
                WheelOutcome::Failed
            }
        };

        let binary = match binaries.build_binary(target, config).await {
            Ok(binary) => match package_binary(&binary, config, target) {
                Ok((archive, checksum)) => {
                    tracing::info!("Packaged {target}: {}", archive.display());
                    BinaryOutcome::Built { archive, checksum }
                }
                Err(err) => {
                    tracing::warn!("Packaging failed for {target}: {err}");
                    BinaryOutcome::Failed
                }
            },
            Err(err) => {
                tracing::warn!("Binary build failed for {target}: {err}");
                BinaryOutcome::Failed
            }
        };

        results.push(BuildResult {
            target: *target,
            wheel,
            binary,
        });
    }

    let set = ArtifactSet { results };
    tracing::info!(
        "Matrix finished: {}/{} binaries, {}/{} wheels\n{}",
        set.binaries_built(),
        targets.len(),
        set.wheels_built(),
        targets.len(),
        set.summary_table()
    );
    write_report(&set, config);

    if !set.any_binary_built() {
        return Err(MatrixError::NoArtifacts {
            attempted: targets.len(),
        });
    }
    Ok(set)
}

#[derive(Debug, thiserror::Error)]
enum PackageError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("failed to write checksum sidecar")]
    Checksum(#[from] std::io::Error),
}

fn package_binary(
    binary: &std::path::Path,
    config: &Configuration,
    target: &Target,
) -> Result<(PathBuf, PathBuf), PackageError> {
    let archive = archive::create_archive(
        binary,
        &config.artifacts_dir,
        &config.archive_prefix,
        target,
    )?;
    let checksum = hash::write_checksum_file(&archive)?;
    Ok((archive, checksum))
}

/// Removes this target's outputs from a previous run: the archive, its
/// checksum sidecar, and any wheel carrying the target's platform tag. A
/// failed rebuild must leave nothing for the publish stage to sweep up.
/// Best effort: a failed removal is logged and the build proceeds.
fn clean_stale_artifacts(config: &Configuration, target: &Target) {
    let archive = config
        .artifacts_dir
        .join(archive::archive_file_name(&config.archive_prefix, target));
    let mut checksum = archive.as_os_str().to_owned();
    checksum.push(".sha256");

    remove_stale(&archive);
    remove_stale(&PathBuf::from(checksum));

    let Ok(entries) = fs_err::read_dir(&config.wheel_dir) else {
        return;
    };
    let prefix = format!("{}-", config.module_name);
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) {
            continue;
        }
        let Some(stem) = name.strip_suffix(".whl") else {
            continue;
        };
        // the platform component may be a compressed tag set joined by `.`
        let platform = stem.rsplit('-').next().unwrap_or_default();
        if platform
            .split('.')
            .any(|tag| target.matches_wheel_platform(tag))
        {
            remove_stale(&entry.path());
        }
    }
}

fn remove_stale(path: &std::path::Path) {
    match fs_err::remove_file(path) {
        Ok(()) => tracing::debug!("Removed stale artifact {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("Could not remove {}: {err}", path.display()),
    }
}

fn write_report(set: &ArtifactSet, config: &Configuration) {
    let report = BuildReport {
        tools: &config.system_tools,
        results: set.results(),
    };
    let path = config.artifacts_dir.join("build-report.json");
    let write = || -> std::io::Result<()> {
        fs_err::create_dir_all(&config.artifacts_dir)?;
        let json = serde_json::to_string_pretty(&report)?;
        fs_err::write(&path, json)
    };
    if let Err(err) = write() {
        tracing::warn!("Could not write {}: {err}", path.display());
    }
}
