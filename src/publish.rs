//! Publishing wheels to PyPI through `maturin upload`.

use std::future::Future;
use std::path::PathBuf;

use itertools::Itertools;

use crate::{
    readme_guard::{ReadmeError, ReadmeGuard},
    system_tools::{Tool, ToolError},
    tool_configuration::Configuration,
    utils::{run_command, secret_replacements},
};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("PYPI_API_TOKEN is not set; cannot authenticate against PyPI")]
    MissingToken,
    #[error("wheel directory {0} does not exist or contains no wheels; build first or pass --skip-pypi")]
    NoWheels(PathBuf),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Readme(#[from] ReadmeError),
    #[error("upload command failed")]
    Upload(#[from] std::io::Error),
    #[error("upload interrupted")]
    Interrupted,
}

/// Files handed to the uploader: wheels, plus the sdist when requested.
fn distribution_files(config: &Configuration) -> Result<Vec<PathBuf>, PublishError> {
    let entries = fs_err::read_dir(&config.wheel_dir)
        .map_err(|_| PublishError::NoWheels(config.wheel_dir.clone()))?;

    let files: Vec<PathBuf> = entries
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let name = path.file_name()?.to_string_lossy().into_owned();
            let is_wheel = name.ends_with(".whl");
            let is_sdist = config.sdist && name.ends_with(".tar.gz");
            (is_wheel || is_sdist).then_some(path)
        })
        .sorted()
        .collect();

    if !files.iter().any(|f| f.extension().is_some_and(|e| e == "whl")) {
        return Err(PublishError::NoWheels(config.wheel_dir.clone()));
    }
    Ok(files)
}

enum Uploader {
    Maturin(std::path::PathBuf),
    Twine(std::path::PathBuf),
}

/// maturin is the primary uploader; twine covers environments that only have
/// the Python toolchain installed.
fn resolve_uploader(config: &Configuration) -> Result<Uploader, PublishError> {
    match config.system_tools.find_tool(Tool::Maturin) {
        Ok(maturin) => Ok(Uploader::Maturin(maturin)),
        Err(err) => {
            if config.system_tools.is_available(Tool::Twine) {
                Ok(Uploader::Twine(config.system_tools.find_tool(Tool::Twine)?))
            } else {
                Err(err.into())
            }
        }
    }
}

/// Uploads every wheel (and the sdist, when built) to PyPI. The README is
/// held in its PyPI-simplified form for the duration of the upload and
/// restored afterwards no matter how the upload ends.
pub async fn publish_pypi(config: &Configuration) -> Result<(), PublishError> {
    let token = std::env::var("PYPI_API_TOKEN").map_err(|_| PublishError::MissingToken)?;
    let files = distribution_files(config)?;
    let uploader = resolve_uploader(config)?;

    let mut guard = match ReadmeGuard::acquire(&config.readme_path()) {
        Ok(guard) => Some(guard),
        Err(ReadmeError::Missing(path)) => {
            tracing::warn!("{} not found, uploading without rewrite", path.display());
            None
        }
        Err(err) => return Err(err.into()),
    };

    let result = race_interrupt(upload(&uploader, &token, &files), wait_for_interrupt()).await;

    let restore = match guard.as_mut() {
        Some(guard) => guard.restore(),
        None => Ok(()),
    };
    finish(result, restore)?;

    tracing::info!("Uploaded {} distribution file(s) to PyPI", files.len());
    Ok(())
}

/// Races the upload against Ctrl-C, so an interrupt still walks the readme
/// restore path instead of killing the process mid-rewrite.
async fn race_interrupt<U, I>(upload: U, interrupt: I) -> Result<(), PublishError>
where
    U: Future<Output = Result<(), std::io::Error>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        result = upload => Ok(result?),
        _ = interrupt => {
            tracing::warn!("Interrupted, restoring the readme before exiting");
            Err(PublishError::Interrupted)
        }
    }
}

async fn wait_for_interrupt() {
    // when no handler can be installed there is nothing to wait for
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// The upload outcome is the one worth reporting; a restore failure after a
/// failed upload is logged, not returned.
fn finish(
    upload: Result<(), PublishError>,
    restore: Result<(), ReadmeError>,
) -> Result<(), PublishError> {
    if let Err(err) = &restore {
        tracing::error!("Could not restore the readme after the upload: {err}");
    }
    upload?;
    restore?;
    Ok(())
}

async fn upload(
    uploader: &Uploader,
    token: &str,
    files: &[PathBuf],
) -> Result<(), std::io::Error> {
    let mut args = vec!["upload", "--skip-existing"];
    let file_args: Vec<String> = files
        .iter()
        .map(|f| f.to_string_lossy().into_owned())
        .collect();
    args.extend(file_args.iter().map(String::as_str));

    // the token goes through the child environment, never the command line
    let (program, envs) = match uploader {
        Uploader::Maturin(maturin) => (
            maturin,
            vec![
                ("MATURIN_PYPI_TOKEN".to_string(), token.to_string()),
                ("MATURIN_USERNAME".to_string(), "__token__".to_string()),
            ],
        ),
        Uploader::Twine(twine) => (
            twine,
            vec![
                ("TWINE_USERNAME".to_string(), "__token__".to_string()),
                ("TWINE_PASSWORD".to_string(), token.to_string()),
                ("TWINE_NON_INTERACTIVE".to_string(), "1".to_string()),
            ],
        ),
    };
    run_command(program, &args, None, &envs, &secret_replacements([token])).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_tools::SystemTools;

    fn test_config(dir: &std::path::Path, sdist: bool) -> Configuration {
        Configuration {
            wheel_dir: dir.to_path_buf(),
            sdist,
            system_tools: SystemTools::new(),
            ..Configuration::default()
        }
    }

    #[tokio::test]
    async fn interrupt_restores_the_readme_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let readme = dir.path().join("README.md");
        let original = "# tool\n<picture><img src=\"logo.svg\"></picture>\n";
        fs_err::write(&readme, original).unwrap();

        let mut guard = ReadmeGuard::acquire(&readme).unwrap();
        assert_ne!(fs_err::read_to_string(&readme).unwrap(), original);

        // the interrupt wins over an upload that never completes
        let outcome = race_interrupt(
            std::future::pending::<Result<(), std::io::Error>>(),
            std::future::ready(()),
        )
        .await;
        guard.restore().unwrap();

        assert!(matches!(outcome, Err(PublishError::Interrupted)));
        assert_eq!(fs_err::read_to_string(&readme).unwrap(), original);
    }

    #[tokio::test]
    async fn completed_upload_wins_over_a_pending_interrupt() {
        let outcome =
            race_interrupt(std::future::ready(Ok(())), std::future::pending::<()>()).await;
        assert!(outcome.is_ok());
    }

    #[test]
    fn upload_errors_outrank_restore_errors() {
        let upload = Err(PublishError::Upload(std::io::Error::other("upload died")));
        let restore = Err(ReadmeError::Io(std::io::Error::other("rename failed")));
        assert!(matches!(
            finish(upload, restore),
            Err(PublishError::Upload(_))
        ));
    }

    #[test]
    fn restore_errors_surface_when_the_upload_succeeded() {
        let restore = Err(ReadmeError::Io(std::io::Error::other("rename failed")));
        assert!(matches!(finish(Ok(()), restore), Err(PublishError::Readme(_))));
    }

    #[test]
    fn missing_wheel_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("nope"), false);
        assert!(matches!(
            distribution_files(&config),
            Err(PublishError::NoWheels(_))
        ));
    }

    #[test]
    fn sdist_only_dir_still_needs_a_wheel() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("pkg-0.1.0.tar.gz"), b"sdist").unwrap();
        let config = test_config(dir.path(), true);
        assert!(matches!(
            distribution_files(&config),
            Err(PublishError::NoWheels(_))
        ));
    }

    #[test]
    fn sdist_is_included_only_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("pkg-0.1.0-py3.whl"), b"wheel").unwrap();
        fs_err::write(dir.path().join("pkg-0.1.0.tar.gz"), b"sdist").unwrap();
        fs_err::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let without = distribution_files(&test_config(dir.path(), false)).unwrap();
        assert_eq!(without.len(), 1);

        let with = distribution_files(&test_config(dir.path(), true)).unwrap();
        assert_eq!(with.len(), 2);
    }
}
