//! Binary archive creation: `<prefix>-<triple>.tar.gz` on unix targets,
//! `<prefix>-<triple>.zip` on windows targets.

use std::io;
use std::path::{Path, PathBuf};

use flate2::{write::GzEncoder, Compression};
use fs_err::File;

use crate::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFlavor {
    TarGz,
    Zip,
}

impl ArchiveFlavor {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFlavor::TarGz => "tar.gz",
            ArchiveFlavor::Zip => "zip",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("binary {0} does not exist")]
    MissingBinary(PathBuf),
    #[error("io error while creating archive")]
    Io(#[from] io::Error),
    #[error("zip error while creating archive")]
    Zip(#[from] zip::result::ZipError),
}

/// Archive file name for a target, without any directory component.
pub fn archive_file_name(prefix: &str, target: &Target) -> String {
    format!(
        "{prefix}-{}.{}",
        target.triple(),
        target.archive_flavor().extension()
    )
}

/// Packages `binary` into the artifacts directory as the target's archive,
/// with the binary at the archive root. Returns the archive path.
pub fn create_archive(
    binary: &Path,
    artifacts_dir: &Path,
    prefix: &str,
    target: &Target,
) -> Result<PathBuf, ArchiveError> {
    if !binary.is_file() {
        return Err(ArchiveError::MissingBinary(binary.to_path_buf()));
    }
    fs_err::create_dir_all(artifacts_dir)?;

    let archive_path = artifacts_dir.join(archive_file_name(prefix, target));
    let entry_name = binary
        .file_name()
        .ok_or_else(|| ArchiveError::MissingBinary(binary.to_path_buf()))?
        .to_string_lossy()
        .to_string();

    match target.archive_flavor() {
        ArchiveFlavor::TarGz => {
            let file = File::create(&archive_path)?;
            let encoder = GzEncoder::new(file, Compression::default());
            let mut builder = tar::Builder::new(encoder);
            builder.append_path_with_name(binary, &entry_name)?;
            builder.into_inner()?.finish()?;
        }
        ArchiveFlavor::Zip => {
            let file = File::create(&archive_path)?;
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .unix_permissions(0o755);
            writer.start_file(entry_name.as_str(), options)?;
            let mut reader = File::open(binary)?;
            io::copy(&mut reader, &mut writer)?;
            writer.finish()?;
        }
    }

    Ok(archive_path)
}
