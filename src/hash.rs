//! SHA-256 digests and `.sha256` checksum sidecars.

use std::io;
use std::path::{Path, PathBuf};

use fs_err::File;
use sha2::{Digest, Sha256};

/// Streaming SHA-256 over a file, hex encoded.
pub fn sha256_digest(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Writes `<archive>.sha256` next to the archive, in coreutils format:
/// `<hex-digest>  <filename>` so `sha256sum -c` accepts it.
pub fn write_checksum_file(archive: &Path) -> io::Result<PathBuf> {
    let digest = sha256_digest(archive)?;
    let file_name = archive
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "archive path has no file name"))?
        .to_string_lossy();

    let mut checksum_path = archive.as_os_str().to_owned();
    checksum_path.push(".sha256");
    let checksum_path = PathBuf::from(checksum_path);

    fs_err::write(&checksum_path, format!("{digest}  {file_name}\n"))?;
    Ok(checksum_path)
}

/// Recomputes the digest of the file a sidecar describes and compares it to
/// the recorded one.
pub fn verify_checksum_file(checksum_path: &Path) -> io::Result<bool> {
    let content = fs_err::read_to_string(checksum_path)?;
    let Some((recorded, file_name)) = content.trim_end().split_once("  ") else {
        return Ok(false);
    };
    let archive = match checksum_path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    };
    Ok(sha256_digest(&archive)? == recorded)
}
