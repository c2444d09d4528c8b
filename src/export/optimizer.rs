//! Runs the external binary optimizer on a written I3D file.

use crate::error::{ExportError, Result};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Build the optimizer invocation for `file`. The file is optimized in place.
pub fn command(optimizer: &Path, file: &Path, game_path: Option<&Path>) -> Command {
    let mut cmd = Command::new(optimizer);
    cmd.arg("-in").arg(file).arg("-out").arg(file);
    if let Some(game) = game_path {
        cmd.arg("-gamePath").arg(game);
    }
    cmd
}

/// Run the optimizer and return the last line it printed.
pub fn run(optimizer: &Path, file: &Path, game_path: Option<&Path>) -> Result<String> {
    if !optimizer.is_file() {
        return Err(ExportError::Optimizer(format!(
            "optimizer not found at {}",
            optimizer.display()
        )));
    }

    debug!("Running {} on {}", optimizer.display(), file.display());
    let output = command(optimizer, file, game_path)
        .output()
        .map_err(|e| ExportError::Optimizer(format!("failed to start optimizer: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let last_line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(str::trim)
            .unwrap_or(last_line.as_str());
        return Err(ExportError::Optimizer(format!(
            "optimizer exited with {}: {}",
            output.status, detail
        )));
    }

    info!("Optimizer: {}", last_line);
    Ok(last_line)
}
