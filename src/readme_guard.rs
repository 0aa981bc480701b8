//! Scoped README rewrite for PyPI packaging.
//!
//! PyPI's renderer does not understand the `<picture>` light/dark blocks used
//! on GitHub, so the README is simplified to plain `<img>` tags while the
//! upload runs. The original is backed up first and restored on every exit
//! path, including a previous run that was interrupted mid-publish.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum ReadmeError {
    #[error("readme {0} does not exist")]
    Missing(PathBuf),
    #[error("io error while rewriting readme")]
    Io(#[from] std::io::Error),
}

fn picture_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<picture[^>]*>(.*?)</picture>").expect("picture regex is valid")
    })
}

fn img_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<img[^>]*>").expect("img regex is valid"))
}

/// Collapses `<picture>` blocks to the plain `<img>` tag they contain. Blocks
/// without an inner image are removed entirely.
pub fn simplify_for_pypi(content: &str) -> String {
    picture_block_regex()
        .replace_all(content, |caps: &regex::Captures<'_>| {
            img_tag_regex()
                .find(&caps[1])
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Holds the README in its simplified form for the lifetime of the guard.
/// Dropping the guard restores the original, whether the publish succeeded,
/// failed, or panicked.
#[derive(Debug)]
pub struct ReadmeGuard {
    path: PathBuf,
    backup: PathBuf,
    restored: bool,
}

impl ReadmeGuard {
    pub fn backup_path(readme: &Path) -> PathBuf {
        let mut backup = readme.as_os_str().to_owned();
        backup.push(".orig");
        PathBuf::from(backup)
    }

    /// Backs the README up and writes the simplified version in its place.
    ///
    /// A stale backup left behind by an interrupted run is restored first, so
    /// the transformation is always applied to the true original.
    pub fn acquire(readme: &Path) -> Result<Self, ReadmeError> {
        let backup = Self::backup_path(readme);
        if backup.exists() {
            tracing::warn!(
                "Found stale backup {}, restoring it before rewriting",
                backup.display()
            );
            fs_err::rename(&backup, readme)?;
        }
        if !readme.is_file() {
            return Err(ReadmeError::Missing(readme.to_path_buf()));
        }

        let original = fs_err::read_to_string(readme)?;
        fs_err::write(&backup, &original)?;
        fs_err::write(readme, simplify_for_pypi(&original))?;
        tracing::info!("Rewrote {} for PyPI rendering", readme.display());

        Ok(ReadmeGuard {
            path: readme.to_path_buf(),
            backup,
            restored: false,
        })
    }

    /// Puts the original content back. Safe to call more than once.
    pub fn restore(&mut self) -> Result<(), ReadmeError> {
        if self.restored {
            return Ok(());
        }
        if self.backup.exists() {
            fs_err::rename(&self.backup, &self.path)?;
            tracing::info!("Restored original {}", self.path.display());
        }
        self.restored = true;
        Ok(())
    }
}

impl Drop for ReadmeGuard {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            tracing::error!(
                "Failed to restore {} from {}: {err}",
                self.path.display(),
                self.backup.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GITHUB_BLOCK: &str = r#"<p align="center">
  <picture align="center">
    <source media="(prefers-color-scheme: dark)" srcset="https://example.com/dark.svg">
    <source media="(prefers-color-scheme: light)" srcset="https://example.com/light.svg">
    <img alt="benchmark chart" src="https://example.com/light.svg">
  </picture>
</p>"#;

    #[test]
    fn picture_block_collapses_to_inner_img() {
        let simplified = simplify_for_pypi(GITHUB_BLOCK);
        assert!(!simplified.contains("<picture"));
        assert!(!simplified.contains("<source"));
        assert!(simplified.contains(r#"<img alt="benchmark chart" src="https://example.com/light.svg">"#));
    }

    #[test]
    fn plain_markdown_is_untouched(){
        let content = "# Title\n\nJust text, no pictures.\n";
        assert_eq!(simplify_for_pypi(content), content);
    }

    #[test]
    fn guard_restores_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let readme = dir.path().join("README.md");
        let original = format!("# Tool\n\n{GITHUB_BLOCK}\n");
        fs_err::write(&readme, &original).unwrap();

        {
            let _guard = ReadmeGuard::acquire(&readme).unwrap();
            let rewritten = fs_err::read_to_string(&readme).unwrap();
            assert!(!rewritten.contains("<picture"));
            assert!(ReadmeGuard::backup_path(&readme).exists());
        }

        assert_eq!(fs_err::read_to_string(&readme).unwrap(), original);
        assert!(!ReadmeGuard::backup_path(&readme).exists());
    }

    #[test]
    fn guard_restores_on_panic() {
        let dir = tempfile::tempdir().unwrap();
        let readme = dir.path().join("README.md");
        let original = format!("intro\n{GITHUB_BLOCK}\noutro\n");
        fs_err::write(&readme, &original).unwrap();

        let readme_clone = readme.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = ReadmeGuard::acquire(&readme_clone).unwrap();
            panic!("publish blew up");
        });
        assert!(result.is_err());
        assert_eq!(fs_err::read_to_string(&readme).unwrap(), original);
    }

    #[test]
    fn stale_backup_from_interrupted_run_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let readme = dir.path().join("README.md");
        let backup = ReadmeGuard::backup_path(&readme);

        // simulate an interrupt: simplified content live, original in backup
        fs_err::write(&readme, "simplified leftovers").unwrap();
        fs_err::write(&backup, "the true original").unwrap();

        let mut guard = ReadmeGuard::acquire(&readme).unwrap();
        guard.restore().unwrap();
        assert_eq!(
            fs_err::read_to_string(&readme).unwrap(),
            "the true original"
        );
    }

    #[test]
    fn restore_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let readme = dir.path().join("README.md");
        fs_err::write(&readme, "content").unwrap();

        let mut guard = ReadmeGuard::acquire(&readme).unwrap();
        guard.restore().unwrap();
        guard.restore().unwrap();
        assert_eq!(fs_err::read_to_string(&readme).unwrap(), "content");
    }

    #[test]
    fn missing_readme_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReadmeGuard::acquire(&dir.path().join("README.md")).unwrap_err();
        assert!(matches!(err, ReadmeError::Missing(_)));
    }
}
