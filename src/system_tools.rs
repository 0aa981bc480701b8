//! External tools wheelsmith drives (cargo, rustup, maturin, gh, ...).

use serde::{Serialize, Serializer};
use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    fmt,
    path::PathBuf,
    process::Command,
};

/// Required tools abort the run when missing; optional tools only disable the
/// step that needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Wheelsmith,
    Cargo,
    Rustup,
    Maturin,
    Gh,
    Git,
    Twine,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tool::Wheelsmith => "wheelsmith",
            Tool::Cargo => "cargo",
            Tool::Rustup => "rustup",
            Tool::Maturin => "maturin",
            Tool::Gh => "gh",
            Tool::Git => "git",
            Tool::Twine => "twine",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("required tool `{tool}` was not found on PATH: {source}")]
    NotFound {
        tool: Tool,
        #[source]
        source: which::Error,
    },
    #[error("failed to query `{tool}` version")]
    Version {
        tool: Tool,
        #[source]
        source: std::io::Error,
    },
}

/// Discovers and memoizes tool locations and versions. Versions end up in the
/// build report so a release can be traced back to the toolchain that made it.
#[derive(Debug, Clone, Default)]
pub struct SystemTools {
    used_tools: RefCell<HashMap<Tool, String>>,
    found_tools: RefCell<HashMap<Tool, PathBuf>>,
}

impl SystemTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_tool(&self, tool: Tool) -> Result<PathBuf, ToolError> {
        if let Some(path) = self.found_tools.borrow().get(&tool) {
            return Ok(path.clone());
        }

        let (path, version) = match tool {
            Tool::Wheelsmith => {
                let path =
                    std::env::current_exe().map_err(|source| ToolError::Version { tool, source })?;
                (path, env!("CARGO_PKG_VERSION").to_string())
            }
            _ => {
                let path = which::which(tool.to_string())
                    .map_err(|source| ToolError::NotFound { tool, source })?;
                let output = Command::new(&path)
                    .arg("--version")
                    .output()
                    .map_err(|source| ToolError::Version { tool, source })?;
                let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (path, version)
            }
        };

        self.found_tools.borrow_mut().insert(tool, path.clone());
        let prev = self.used_tools.borrow().get(&tool).cloned();
        if let Some(prev) = prev {
            if prev != version {
                tracing::warn!("Tool {tool} changed version mid-run: {prev} vs {version}");
            }
        } else {
            self.used_tools.borrow_mut().insert(tool, version);
        }

        Ok(path)
    }

    /// A std `Command` with the resolved tool path. Callers convert to a
    /// tokio command when they need streamed output.
    pub fn call(&self, tool: Tool) -> Result<Command, ToolError> {
        let path = self.find_tool(tool)?;
        Ok(Command::new(path))
    }

    /// Resolve all `tools` up front. This is the fatal preflight before any
    /// target is attempted.
    pub fn require(&self, tools: &[Tool]) -> Result<(), ToolError> {
        for tool in tools {
            let path = self.find_tool(*tool)?;
            tracing::debug!("Found {tool} at {}", path.display());
        }
        Ok(())
    }

    /// True if an optional tool is present, without failing the run.
    pub fn is_available(&self, tool: Tool) -> bool {
        self.find_tool(tool).is_ok()
    }
}

impl Serialize for SystemTools {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut ordered = BTreeMap::new();
        let used_tools = self.used_tools.borrow();
        for (tool, version) in used_tools.iter() {
            ordered.insert(tool.to_string(), version.clone());
        }
        ordered
            .entry(Tool::Wheelsmith.to_string())
            .or_insert_with(|| env!("CARGO_PKG_VERSION").to_string());

        ordered.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheelsmith_reports_its_own_version() {
        let tools = SystemTools::new();
        tools.find_tool(Tool::Wheelsmith).unwrap();
        let json = serde_json::to_value(&tools).unwrap();
        assert_eq!(
            json.get("wheelsmith").and_then(|v| v.as_str()),
            Some(env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn found_tools_are_memoized() {
        let tools = SystemTools::new();
        if let Ok(first) = tools.find_tool(Tool::Cargo) {
            let second = tools.find_tool(Tool::Cargo).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn serializes_even_with_no_tools_probed() {
        let tools = SystemTools::new();
        let json = serde_json::to_value(&tools).unwrap();
        assert!(json.get("wheelsmith").is_some());
    }
}
