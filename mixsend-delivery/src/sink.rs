//! Alternate delivery sinks: writing to a file, or piping to a command.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use mixsend_common::outgoing;
use tokio::{fs, io::AsyncWriteExt, process::Command};
use tracing::warn;
use ulid::Ulid;

use crate::error::DeliveryError;

/// Name prefix of files written by the outfile sink.
pub const OUTFILE_PREFIX: &str = "outfile-";

/// Writes `payload` to a freshly named file in `directory`.
///
/// # Errors
///
/// Returns [`DeliveryError::Sink`] if the file cannot be created or written.
pub async fn write_outfile(directory: &Path, payload: &[u8]) -> Result<PathBuf, DeliveryError> {
    let path = directory.join(format!("{OUTFILE_PREFIX}{}", Ulid::new()));
    outgoing!("Writing output to {}", path.display());

    let failed = |e: std::io::Error| {
        warn!(file = %path.display(), "Outfile write failed: {e}");
        DeliveryError::Sink {
            sink: "outfile",
            reason: e.to_string(),
        }
    };

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map_err(failed)?;
    file.write_all(payload).await.map_err(failed)?;
    file.flush().await.map_err(failed)?;

    Ok(path)
}

/// Runs `command` (split on whitespace) and writes `payload` to its stdin.
///
/// # Errors
///
/// Returns [`DeliveryError::Sink`] if the command cannot be started, its
/// stdin cannot be written, or it exits unsuccessfully.
pub async fn pipe(command: &str, payload: &[u8]) -> Result<(), DeliveryError> {
    let failed = |reason: String| {
        warn!(command, "Pipe delivery failed: {reason}");
        DeliveryError::Sink {
            sink: "pipe",
            reason,
        }
    };

    let mut args = command.split_whitespace();
    let program = args
        .next()
        .ok_or_else(|| failed("empty command".to_string()))?;

    outgoing!("Piping message to {}", program);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| failed(e.to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(payload)
            .await
            .map_err(|e| failed(e.to_string()))?;
        // Closing stdin lets the command see end of input.
        drop(stdin);
    }

    let status = child.wait().await.map_err(|e| failed(e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(failed(format!("exited with {status}")))
    }
}
