//! GitHub release creation through the `gh` CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::{
    system_tools::{Tool, ToolError},
    tool_configuration::Configuration,
    utils::run_command,
    version::ReleaseTag,
};

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("gh is not authenticated; run `gh auth login` first")]
    NotAuthenticated,
    #[error("working tree is not clean; commit or stash before tagging a release")]
    DirtyWorkingTree,
    #[error("assets directory {0} does not exist or is empty; build first or pass --assets")]
    NoAssets(PathBuf),
    #[error("gh release command failed")]
    Release(#[from] std::io::Error),
}

/// Release assets: the archives and their checksum sidecars, in name order.
fn collect_assets(assets_dir: &Path) -> Result<Vec<PathBuf>, GithubError> {
    let entries = fs_err::read_dir(assets_dir)
        .map_err(|_| GithubError::NoAssets(assets_dir.to_path_buf()))?;

    let assets: Vec<PathBuf> = entries
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let name = path.file_name()?.to_string_lossy().into_owned();
            let is_archive = name.ends_with(".tar.gz") || name.ends_with(".zip");
            let is_checksum = name.ends_with(".sha256");
            (is_archive || is_checksum).then_some(path)
        })
        .sorted()
        .collect();

    if assets.is_empty() {
        return Err(GithubError::NoAssets(assets_dir.to_path_buf()));
    }
    Ok(assets)
}

fn check_authenticated(config: &Configuration) -> Result<(), GithubError> {
    let mut cmd = config.system_tools.call(Tool::Gh)?;
    let status = cmd
        .args(["auth", "status"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;
    if !status.success() {
        return Err(GithubError::NotAuthenticated);
    }
    Ok(())
}

/// Creating a release tags the repository; refuse to tag uncommitted state.
fn check_clean_working_tree(config: &Configuration) -> Result<(), GithubError> {
    let mut cmd = config.system_tools.call(Tool::Git)?;
    let output = cmd.args(["status", "--porcelain"]).output()?;
    if !output.stdout.is_empty() {
        return Err(GithubError::DirtyWorkingTree);
    }
    Ok(())
}

/// Creates a GitHub release for `tag` with the artifacts as assets.
/// Pre-release tags (a `-suffix` after the patch number) are marked as such.
pub async fn create_release(
    tag: &ReleaseTag,
    assets_dir: &Path,
    config: &Configuration,
) -> Result<(), GithubError> {
    let gh = config.system_tools.find_tool(Tool::Gh)?;
    check_authenticated(config)?;
    check_clean_working_tree(config)?;
    let assets = collect_assets(assets_dir)?;

    let title = format!("{} {}", config.package_name, tag);
    let mut args = vec![
        "release",
        "create",
        tag.as_str(),
        "--title",
        title.as_str(),
        "--generate-notes",
    ];
    if tag.is_prerelease() {
        args.push("--prerelease");
    }
    let asset_args: Vec<String> = assets
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    args.extend(asset_args.iter().map(String::as_str));

    run_command(&gh, &args, None, &[], &HashMap::new()).await?;
    tracing::info!(
        "Created GitHub release {tag} with {} asset(s)",
        assets.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_assets_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            collect_assets(dir.path()),
            Err(GithubError::NoAssets(_))
        ));
    }

    #[test]
    fn missing_assets_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            collect_assets(&dir.path().join("gone")),
            Err(GithubError::NoAssets(_))
        ));
    }

    #[test]
    fn only_archives_and_checksums_are_assets() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("t-a.tar.gz"), b"a").unwrap();
        fs_err::write(dir.path().join("t-a.tar.gz.sha256"), b"c").unwrap();
        fs_err::write(dir.path().join("t-b.zip"), b"b").unwrap();
        fs_err::write(dir.path().join("build-report.json"), b"{}").unwrap();

        let assets = collect_assets(dir.path()).unwrap();
        let names: Vec<_> = assets
            .iter()
            .map(|a| a.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["t-a.tar.gz", "t-a.tar.gz.sha256", "t-b.zip"]);
    }
}
