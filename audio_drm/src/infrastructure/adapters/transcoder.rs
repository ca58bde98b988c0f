// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Subprocess wrapper around an ffmpeg-compatible transcoder binary (§4.4
//! duration probe, §4.5 step 2 cut, §4.6 mid-track seek). The domain has no
//! port for this - it is pure infrastructure plumbing with no business rule
//! the core needs to own, same as the teacher treats its external codec
//! tools as infrastructure adapters rather than domain ports.

use audio_drm_domain::error::DrmError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Result of a §4.5 step-2 cut: the output file and whether `-c copy`
/// avoided re-encoding (always true in this design; kept for observability).
#[derive(Debug, Clone)]
pub struct ChapterCut {
    pub output_path: PathBuf,
}

#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    /// Plaintext duration in seconds, or `None` if the probe failed. §4.4:
    /// "non-fatal" - callers default to a duration of 0 on `None`.
    async fn probe_duration_seconds(&self, path: &Path) -> Option<u32>;

    /// §4.5 step 2: `-ss <start> [-t <duration>] -c copy -f <container>`.
    /// `end_seconds = None` means "run to end of stream".
    async fn cut(&self, input: &Path, output: &Path, start_seconds: f64, end_seconds: Option<f64>, container: &str) -> Result<ChapterCut, DrmError>;

    /// §4.6 mid-track seek: spawns the transcoder against the already
    /// decrypted-to-temp master at `input`, `-ss <start> -c copy`, streaming
    /// the transcoder's stdout back to the caller. Returns the spawned
    /// child so the caller can kill it on client disconnect (§5
    /// cancellation).
    async fn seek_stream(&self, input: &Path, start_seconds: f64, container: &str) -> Result<Child, DrmError>;
}

/// `ffmpeg`-backed implementation. `binary_path` defaults to `ffmpeg` on
/// `$PATH`; every invocation is bounded by `timeout` and receives `SIGKILL`
/// past it (§5 "transcoder receiving SIGKILL after a hard timeout").
pub struct FfmpegTranscoder {
    binary_path: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(binary_path: impl Into<String>, timeout: Duration) -> Self {
        Self { binary_path: binary_path.into(), timeout }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.stdin(Stdio::null()).stderr(Stdio::piped());
        cmd
    }
}

#[async_trait::async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe_duration_seconds(&self, path: &Path) -> Option<u32> {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(["-i"]).arg(path).args(["-f", "null", "-"]).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());

        let output = tokio::time::timeout(self.timeout, cmd.output()).await.ok()?.ok()?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_ffmpeg_duration(&stderr)
    }

    async fn cut(&self, input: &Path, output: &Path, start_seconds: f64, end_seconds: Option<f64>, container: &str) -> Result<ChapterCut, DrmError> {
        let mut cmd = self.base_command();
        cmd.arg("-i").arg(input).args(["-ss", &format!("{start_seconds}")]);
        if let Some(end) = end_seconds {
            let duration = (end - start_seconds).max(0.0);
            cmd.args(["-t", &format!("{duration}")]);
        }
        cmd.args(["-c", "copy", "-f", container, "-y"]).arg(output).stdout(Stdio::null());

        let child = cmd.spawn().map_err(|e| DrmError::io(format!("failed to spawn transcoder: {e}")))?;
        let output_result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DrmError::exhausted("transcoder timed out"))?
            .map_err(|e| DrmError::io(format!("transcoder wait failed: {e}")))?;

        if !output_result.status.success() {
            let _ = tokio::fs::remove_file(output).await;
            return Err(DrmError::io(format!(
                "transcoder exited with {}: {}",
                output_result.status,
                String::from_utf8_lossy(&output_result.stderr)
            )));
        }

        Ok(ChapterCut { output_path: output.to_path_buf() })
    }

    async fn seek_stream(&self, input: &Path, start_seconds: f64, container: &str) -> Result<Child, DrmError> {
        let mut cmd = self.base_command();
        cmd.arg("-i")
            .arg(input)
            .args(["-ss", &format!("{start_seconds}")])
            .args(["-c", "copy", "-f", container])
            .arg("pipe:1")
            .stdout(Stdio::piped());

        cmd.spawn().map_err(|e| DrmError::io(format!("failed to spawn transcoder: {e}")))
    }
}

/// ffmpeg writes `Duration: HH:MM:SS.ss` to stderr; this picks the first
/// occurrence and converts to whole seconds.
fn parse_ffmpeg_duration(stderr: &str) -> Option<u32> {
    let line = stderr.lines().find(|l| l.trim_start().starts_with("Duration:"))?;
    let after = line.trim_start().strip_prefix("Duration:")?.trim();
    let ts = after.split(',').next()?.trim();
    let mut parts = ts.split(':');
    let hours: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: f64 = parts.next()?.trim().parse().ok()?;
    let seconds: f64 = parts.next()?.trim().parse().ok()?;
    Some((hours * 3600.0 + minutes * 60.0 + seconds).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_ffmpeg_duration_line() {
        let stderr = "ffmpeg version 6.0\n  Duration: 01:02:03.45, start: 0.000000, bitrate: 128 kb/s\n";
        assert_eq!(parse_ffmpeg_duration(stderr), Some(3723));
    }

    #[test]
    fn returns_none_when_no_duration_line_present() {
        let stderr = "ffmpeg version 6.0\nUnknown input\n";
        assert_eq!(parse_ffmpeg_duration(stderr), None);
    }

    #[test]
    fn rounds_fractional_seconds() {
        let stderr = "  Duration: 00:00:00.60, start: 0.000000\n";
        assert_eq!(parse_ffmpeg_duration(stderr), Some(1));
    }
}
