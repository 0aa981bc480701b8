//! wheelsmith builds release wheels and standalone binary archives across a
//! target matrix, checksums them, and publishes the results to PyPI and
//! GitHub. All heavy lifting is delegated to external tools (`cargo`,
//! `maturin`, `gh`); this crate orchestrates them and tolerates per-target
//! failure.

pub mod archive;
pub mod build;
pub mod console_utils;
pub mod github;
pub mod hash;
pub mod matrix;
pub mod opt;
pub mod publish;
pub mod readme_guard;
pub mod system_tools;
pub mod target;
pub mod tool_configuration;
pub mod utils;
pub mod version;
