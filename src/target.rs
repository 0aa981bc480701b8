//! Release targets: the (OS, architecture, toolchain) triples we build for.

use std::fmt;

use clap::ValueEnum;
use serde::{Serialize, Serializer};

use crate::archive::ArchiveFlavor;

/// Operating system half of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

impl Os {
    /// The OS wheelsmith itself is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "macos") {
            Os::Macos
        } else {
            Os::Linux
        }
    }
}

/// CPU architecture half of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Arch {
    #[value(name = "x86_64", alias = "x64", alias = "amd64")]
    X86_64,
    #[value(name = "aarch64", alias = "arm64")]
    Aarch64,
    #[value(name = "i686", alias = "x86")]
    I686,
}

/// Toolchain variant of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Toolchain {
    Gnu,
    Musl,
    Msvc,
    Darwin,
}

/// A single build target. The set of valid combinations is closed, so the
/// type is an enum rather than a free product of its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    LinuxX86_64Gnu,
    LinuxX86_64Musl,
    LinuxAarch64Gnu,
    LinuxAarch64Musl,
    LinuxI686Gnu,
    MacosX86_64,
    MacosAarch64,
    WindowsX86_64Msvc,
    WindowsX86_64Gnu,
    WindowsI686Msvc,
}

impl Target {
    pub fn os(&self) -> Os {
        match self {
            Target::LinuxX86_64Gnu
            | Target::LinuxX86_64Musl
            | Target::LinuxAarch64Gnu
            | Target::LinuxAarch64Musl
            | Target::LinuxI686Gnu => Os::Linux,
            Target::MacosX86_64 | Target::MacosAarch64 => Os::Macos,
            Target::WindowsX86_64Msvc | Target::WindowsX86_64Gnu | Target::WindowsI686Msvc => {
                Os::Windows
            }
        }
    }

    pub fn arch(&self) -> Arch {
        match self {
            Target::LinuxX86_64Gnu
            | Target::LinuxX86_64Musl
            | Target::MacosX86_64
            | Target::WindowsX86_64Msvc
            | Target::WindowsX86_64Gnu => Arch::X86_64,
            Target::LinuxAarch64Gnu | Target::LinuxAarch64Musl | Target::MacosAarch64 => {
                Arch::Aarch64
            }
            Target::LinuxI686Gnu | Target::WindowsI686Msvc => Arch::I686,
        }
    }

    pub fn toolchain(&self) -> Toolchain {
        match self {
            Target::LinuxX86_64Gnu
            | Target::LinuxAarch64Gnu
            | Target::LinuxI686Gnu
            | Target::WindowsX86_64Gnu => Toolchain::Gnu,
            Target::LinuxX86_64Musl | Target::LinuxAarch64Musl => Toolchain::Musl,
            Target::MacosX86_64 | Target::MacosAarch64 => Toolchain::Darwin,
            Target::WindowsX86_64Msvc | Target::WindowsI686Msvc => Toolchain::Msvc,
        }
    }

    /// The Rust target triple passed to `cargo` and `maturin`.
    pub fn triple(&self) -> &'static str {
        match self {
            Target::LinuxX86_64Gnu => "x86_64-unknown-linux-gnu",
            Target::LinuxX86_64Musl => "x86_64-unknown-linux-musl",
            Target::LinuxAarch64Gnu => "aarch64-unknown-linux-gnu",
            Target::LinuxAarch64Musl => "aarch64-unknown-linux-musl",
            Target::LinuxI686Gnu => "i686-unknown-linux-gnu",
            Target::MacosX86_64 => "x86_64-apple-darwin",
            Target::MacosAarch64 => "aarch64-apple-darwin",
            Target::WindowsX86_64Msvc => "x86_64-pc-windows-msvc",
            Target::WindowsX86_64Gnu => "x86_64-pc-windows-gnu",
            Target::WindowsI686Msvc => "i686-pc-windows-msvc",
        }
    }

    /// Archive container for this target's binary.
    pub fn archive_flavor(&self) -> ArchiveFlavor {
        match self.os() {
            Os::Windows => ArchiveFlavor::Zip,
            _ => ArchiveFlavor::TarGz,
        }
    }

    /// File name of the built binary inside the cargo target directory.
    pub fn binary_file_name(&self, binary_name: &str) -> String {
        match self.os() {
            Os::Windows => format!("{binary_name}.exe"),
            _ => binary_name.to_string(),
        }
    }

    /// True when a wheel platform tag (the last dash-separated component of a
    /// wheel file name, possibly a `.`-joined set) belongs to this target.
    pub fn matches_wheel_platform(&self, tag: &str) -> bool {
        let glibc = |tag: &str| tag.starts_with("manylinux") || tag.starts_with("linux");
        match self {
            Target::LinuxX86_64Gnu => glibc(tag) && tag.ends_with("x86_64"),
            Target::LinuxAarch64Gnu => glibc(tag) && tag.ends_with("aarch64"),
            Target::LinuxI686Gnu => glibc(tag) && tag.ends_with("i686"),
            Target::LinuxX86_64Musl => tag.starts_with("musllinux") && tag.ends_with("x86_64"),
            Target::LinuxAarch64Musl => tag.starts_with("musllinux") && tag.ends_with("aarch64"),
            Target::MacosX86_64 => {
                tag.starts_with("macosx") && (tag.ends_with("x86_64") || tag.ends_with("universal2"))
            }
            Target::MacosAarch64 => {
                tag.starts_with("macosx") && (tag.ends_with("arm64") || tag.ends_with("universal2"))
            }
            Target::WindowsX86_64Msvc | Target::WindowsX86_64Gnu => tag == "win_amd64",
            Target::WindowsI686Msvc => tag == "win32",
        }
    }

    /// The external linker this target needs beyond a plain host toolchain,
    /// if any. Missing linkers make the target skippable, not fatal.
    pub fn required_cross_linker(&self) -> Option<&'static str> {
        match self {
            Target::LinuxX86_64Musl | Target::LinuxAarch64Musl => Some("musl-gcc"),
            Target::LinuxAarch64Gnu => Some("aarch64-linux-gnu-gcc"),
            Target::WindowsX86_64Gnu => Some("x86_64-w64-mingw32-gcc"),
            _ => None,
        }
    }

    /// Per-target toolchain selection as an explicit environment map for the
    /// child process. Nothing here mutates the orchestrator's own environment.
    pub fn build_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if let Some(linker) = self.required_cross_linker() {
            let triple_key = self.triple().to_uppercase().replace('-', "_");
            vars.push((format!("CARGO_TARGET_{triple_key}_LINKER"), linker.to_string()));
            vars.push((
                format!("CC_{}", self.triple().replace('-', "_")),
                linker.to_string(),
            ));
        }
        vars
    }

    /// The ordered matrix of targets built on a given host OS.
    pub fn matrix_for(host: Os) -> Vec<Target> {
        match host {
            Os::Linux => vec![
                Target::LinuxX86_64Gnu,
                Target::LinuxX86_64Musl,
                Target::LinuxAarch64Gnu,
                Target::LinuxAarch64Musl,
                Target::LinuxI686Gnu,
            ],
            Os::Macos => vec![Target::MacosX86_64, Target::MacosAarch64],
            Os::Windows => vec![
                Target::WindowsX86_64Msvc,
                Target::WindowsI686Msvc,
                Target::WindowsX86_64Gnu,
            ],
        }
    }

    /// The matrix for the current host, optionally filtered to one
    /// architecture.
    pub fn default_matrix(arch: Option<Arch>) -> Vec<Target> {
        let mut targets = Self::matrix_for(Os::current());
        if let Some(arch) = arch {
            targets.retain(|t| t.arch() == arch);
        }
        targets
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.os(), self.arch(), self.toolchain())
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.triple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triples_are_well_formed() {
        for host in [Os::Linux, Os::Macos, Os::Windows] {
            for target in Target::matrix_for(host) {
                let triple = target.triple();
                assert!(triple.split('-').count() >= 3, "bad triple {triple}");
                assert_eq!(target.os(), host);
            }
        }
    }

    #[test]
    fn display_form() {
        assert_eq!(Target::LinuxX86_64Gnu.to_string(), "linux/x86_64/gnu");
        assert_eq!(Target::MacosAarch64.to_string(), "macos/aarch64/darwin");
        assert_eq!(Target::WindowsI686Msvc.to_string(), "windows/i686/msvc");
    }

    #[test]
    fn windows_targets_zip_everything_else_tarballs() {
        for host in [Os::Linux, Os::Macos, Os::Windows] {
            for target in Target::matrix_for(host) {
                match target.os() {
                    Os::Windows => assert_eq!(target.archive_flavor(), ArchiveFlavor::Zip),
                    _ => assert_eq!(target.archive_flavor(), ArchiveFlavor::TarGz),
                }
            }
        }
    }

    #[test]
    fn arch_filter_preserves_order() {
        let matrix = Target::matrix_for(Os::Linux);
        let filtered: Vec<_> = matrix
            .iter()
            .copied()
            .filter(|t| t.arch() == Arch::Aarch64)
            .collect();
        assert_eq!(
            filtered,
            vec![Target::LinuxAarch64Gnu, Target::LinuxAarch64Musl]
        );
    }

    #[test]
    fn cross_targets_declare_a_linker() {
        assert_eq!(
            Target::LinuxX86_64Musl.required_cross_linker(),
            Some("musl-gcc")
        );
        assert_eq!(Target::LinuxX86_64Gnu.required_cross_linker(), None);
        assert_eq!(Target::MacosAarch64.required_cross_linker(), None);
    }

    #[test]
    fn build_env_is_explicit_not_global() {
        let env = Target::LinuxX86_64Musl.build_env();
        assert!(env
            .iter()
            .any(|(k, v)| k == "CARGO_TARGET_X86_64_UNKNOWN_LINUX_MUSL_LINKER" && v == "musl-gcc"));
        assert!(Target::LinuxX86_64Gnu.build_env().is_empty());
    }

    #[test]
    fn wheel_platform_tags_map_to_their_target() {
        assert!(Target::LinuxX86_64Gnu.matches_wheel_platform("manylinux_2_17_x86_64"));
        assert!(Target::LinuxX86_64Gnu.matches_wheel_platform("linux_x86_64"));
        assert!(!Target::LinuxX86_64Gnu.matches_wheel_platform("musllinux_1_2_x86_64"));
        assert!(!Target::LinuxX86_64Gnu.matches_wheel_platform("manylinux_2_17_aarch64"));
        assert!(Target::LinuxX86_64Musl.matches_wheel_platform("musllinux_1_2_x86_64"));
        assert!(Target::MacosAarch64.matches_wheel_platform("macosx_11_0_arm64"));
        assert!(!Target::MacosAarch64.matches_wheel_platform("macosx_10_12_x86_64"));
        assert!(Target::WindowsX86_64Msvc.matches_wheel_platform("win_amd64"));
        assert!(!Target::WindowsI686Msvc.matches_wheel_platform("win_amd64"));
    }

    #[test]
    fn binary_file_name_gets_exe_on_windows() {
        assert_eq!(
            Target::WindowsX86_64Msvc.binary_file_name("tool"),
            "tool.exe"
        );
        assert_eq!(Target::LinuxX86_64Gnu.binary_file_name("tool"), "tool");
    }
}
