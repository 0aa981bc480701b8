//! The real wheel and binary builders, shelling out to `maturin` and `cargo`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use crate::{
    matrix::{BinaryBuilder, BuildError, WheelBuilder},
    system_tools::{SystemTools, Tool, ToolError},
    target::Target,
    tool_configuration::Configuration,
    utils::run_command,
};

/// Builds wheels via `maturin build --release --target <triple>`.
pub struct MaturinWheelBuilder {
    maturin: PathBuf,
    // the source distribution is identical for all targets; build it once
    sdist_pending: AtomicBool,
}

/// Builds binaries via `cargo build --release --target <triple>` with an
/// explicit per-target environment map.
pub struct CargoBinaryBuilder {
    cargo: PathBuf,
    installed_targets: Vec<String>,
}

/// Both builders, resolved up front. Construction is the fatal preflight:
/// a missing cargo, rustup or maturin aborts before any target is attempted.
pub struct Builders {
    pub wheels: MaturinWheelBuilder,
    pub binaries: CargoBinaryBuilder,
}

impl Builders {
    pub fn discover(tools: &SystemTools, sdist: bool) -> Result<Self, ToolError> {
        tools.require(&[Tool::Cargo, Tool::Rustup, Tool::Maturin])?;

        let maturin = tools.find_tool(Tool::Maturin)?;
        let cargo = tools.find_tool(Tool::Cargo)?;
        let rustup = tools.find_tool(Tool::Rustup)?;
        let installed_targets = installed_rust_targets(&rustup)?;

        Ok(Builders {
            wheels: MaturinWheelBuilder {
                maturin,
                sdist_pending: AtomicBool::new(sdist),
            },
            binaries: CargoBinaryBuilder {
                cargo,
                installed_targets,
            },
        })
    }
}

fn installed_rust_targets(rustup: &Path) -> Result<Vec<String>, ToolError> {
    let output = std::process::Command::new(rustup)
        .args(["target", "list", "--installed"])
        .output()
        .map_err(|source| ToolError::Version {
            tool: Tool::Rustup,
            source,
        })?;
    if !output.status.success() {
        // an empty list here would skip every target with a bogus reason
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Version {
            tool: Tool::Rustup,
            source: std::io::Error::other(format!(
                "`rustup target list --installed` failed: {}",
                stderr.trim()
            )),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

#[async_trait::async_trait(?Send)]
impl WheelBuilder for MaturinWheelBuilder {
    async fn build_wheel(
        &self,
        target: &Target,
        config: &Configuration,
    ) -> Result<PathBuf, BuildError> {
        fs_err::create_dir_all(&config.wheel_dir)?;
        let started = SystemTime::now();

        let wheel_dir = config.wheel_dir.to_string_lossy().to_string();
        let mut args = vec![
            "build",
            "--release",
            "--target",
            target.triple(),
            "--out",
            wheel_dir.as_str(),
        ];
        if self.sdist_pending.swap(false, Ordering::SeqCst) {
            args.push("--sdist");
        }

        run_command(
            &self.maturin,
            &args,
            None,
            &target.build_env(),
            &HashMap::new(),
        )
        .await?;

        newest_wheel(&config.wheel_dir, &config.module_name, started)
            .ok_or_else(|| BuildError::MissingOutput(config.wheel_dir.clone()))
    }
}

/// The wheel maturin just wrote: newest `.whl` for our distribution modified
/// after the build began. Wheel file names use the underscored module name.
fn newest_wheel(wheel_dir: &Path, module_name: &str, since: SystemTime) -> Option<PathBuf> {
    let entries = fs_err::read_dir(wheel_dir).ok()?;
    entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            if path.extension()? != "whl" {
                return None;
            }
            let name = path.file_name()?.to_string_lossy().into_owned();
            if !name.starts_with(&format!("{module_name}-")) {
                return None;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            (modified >= since).then_some((modified, path))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

#[async_trait::async_trait(?Send)]
impl BinaryBuilder for CargoBinaryBuilder {
    fn missing_toolchain(&self, target: &Target) -> Option<String> {
        let triple = target.triple();
        if !self.installed_targets.iter().any(|t| t == triple) {
            return Some(format!(
                "rust target {triple} is not installed (rustup target add {triple})"
            ));
        }
        if let Some(linker) = target.required_cross_linker() {
            if which::which(linker).is_err() {
                return Some(format!("cross linker {linker} not found on PATH"));
            }
        }
        None
    }

    async fn build_binary(
        &self,
        target: &Target,
        config: &Configuration,
    ) -> Result<PathBuf, BuildError> {
        run_command(
            &self.cargo,
            &[
                "build",
                "--release",
                "--target",
                target.triple(),
                "--bin",
                config.binary_name.as_str(),
            ],
            None,
            &target.build_env(),
            &HashMap::new(),
        )
        .await?;

        let binary = Path::new("target")
            .join(target.triple())
            .join("release")
            .join(target.binary_file_name(&config.binary_name));
        if !binary.is_file() {
            return Err(BuildError::MissingOutput(binary));
        }
        Ok(binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_rustup_is_an_error_not_an_empty_target_list() {
        // `false` ignores its arguments and exits non-zero
        if let Ok(always_fails) = which::which("false") {
            assert!(installed_rust_targets(&always_fails).is_err());
        }
    }

    #[test]
    fn newest_wheel_picks_the_latest_build() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("pkg-0.0.9-py3.whl"), b"old").unwrap();
        fs_err::write(dir.path().join("pkg-0.1.0-py3.whl"), b"new").unwrap();

        let found = newest_wheel(dir.path(), "pkg", SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(found.extension().unwrap(), "whl");
    }

    #[test]
    fn other_distributions_are_not_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("otherpkg-1.0.0-py3.whl"), b"x").unwrap();
        assert!(newest_wheel(dir.path(), "pkg", SystemTime::UNIX_EPOCH).is_none());
    }

    #[test]
    fn non_wheel_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("pkg-0.1.0.tar.gz"), b"sdist").unwrap();
        assert!(newest_wheel(dir.path(), "pkg", SystemTime::UNIX_EPOCH).is_none());
    }
}
