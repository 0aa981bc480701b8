//! Subprocess plumbing shared by the builders and publish steps.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncBufReadExt as _;

/// Runs an external command, streaming stdout and stderr through tracing.
/// Strings in `replacements` are substituted in each line before logging, so
/// secrets handed to the child never reach the log output.
///
/// Environment is passed explicitly per invocation; the parent environment is
/// inherited but never mutated.
pub async fn run_command(
    program: &Path,
    args: &[&str],
    cwd: Option<&Path>,
    envs: &[(String, String)],
    replacements: &HashMap<String, String>,
) -> io::Result<()> {
    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    tracing::debug!(
        "Running {} {}",
        program.display(),
        redact(&args.join(" "), replacements)
    );

    let mut child = command.spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("failed to capture stderr"))?;

    let mut stdout_lines = tokio::io::BufReader::new(stdout).lines();
    let mut stderr_lines = tokio::io::BufReader::new(stderr).lines();
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !(stdout_done && stderr_done) {
        let line = tokio::select! {
            line = stdout_lines.next_line(), if !stdout_done => {
                if matches!(line, Ok(None)) {
                    stdout_done = true;
                }
                line
            }
            line = stderr_lines.next_line(), if !stderr_done => {
                if matches!(line, Ok(None)) {
                    stderr_done = true;
                }
                line
            }
        };

        match line {
            Ok(Some(line)) => tracing::info!("{}", redact(&line, replacements)),
            Ok(None) => {}
            Err(err) => tracing::warn!("Error reading child output: {err}"),
        }
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(io::Error::other(format!(
            "{} exited with {status}",
            program.display()
        )));
    }

    Ok(())
}

fn redact(line: &str, replacements: &HashMap<String, String>) -> String {
    replacements
        .iter()
        .fold(line.to_string(), |acc, (from, to)| acc.replace(from, to))
}

/// Replacement map that masks each secret value in logged output.
pub fn secret_replacements<'a>(
    secrets: impl IntoIterator<Item = &'a str>,
) -> HashMap<String, String> {
    secrets
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| (s.to_string(), "********".to_string()))
        .collect()
}
