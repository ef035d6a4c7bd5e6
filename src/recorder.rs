//! Screen recording singleton.
//!
//! At most one recorder child (ffmpeg x11grab) exists per server process.
//! Stop is graceful: SIGINT lets ffmpeg finalize the container, with a
//! SIGKILL escalation if it refuses to die. A missing or empty output file
//! is reported in the stop payload rather than raised, since recorder
//! failures are expected and handled by the caller.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{ApiError, Result};

/// Time the recorder gets to finalize its output after SIGINT.
const STOP_GRACE: Duration = Duration::from_secs(2);

struct Recording {
    child: Child,
    pid: u32,
    output: PathBuf,
    started: Instant,
    fps: u32,
}

pub struct ScreenRecorder {
    slot: Mutex<Option<Recording>>,
    display: String,
}

#[derive(Debug, Serialize)]
pub struct StartReport {
    pub pid: u32,
}

#[derive(Debug, Serialize)]
pub struct StopReport {
    pub size_bytes: u64,
    pub duration_secs: f64,
    pub output_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordingStatus {
    pub recording: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl ScreenRecorder {
    pub fn new(display: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(None),
            display: display.into(),
        }
    }

    /// Idle → Recording. Fails with AlreadyRecording if a recording is in
    /// flight; the original recording is left untouched.
    pub async fn start(&self, output: PathBuf, fps: u32) -> Result<StartReport> {
        if fps == 0 {
            return Err(ApiError::InvalidArgument("fps must be positive".into()));
        }
        let cmd = self.recorder_command(&output, fps);
        self.start_with(cmd, output, fps).await
    }

    async fn start_with(&self, mut cmd: Command, output: PathBuf, fps: u32) -> Result<StartReport> {
        let mut slot = self.slot.lock().await;
        if let Some(recording) = slot.as_ref() {
            return Err(ApiError::AlreadyRecording(recording.pid));
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let child = cmd.spawn().map_err(ApiError::Spawn)?;
        let pid = child
            .id()
            .ok_or_else(|| ApiError::Internal("recorder exited during spawn".into()))?;
        info!(pid, output = %output.display(), fps, "recording started");

        *slot = Some(Recording {
            child,
            pid,
            output,
            started: Instant::now(),
            fps,
        });
        Ok(StartReport { pid })
    }

    /// Recording → Idle. Fails with NotRecording if idle. Output problems
    /// (missing or zero-length file) are reported in the payload, never
    /// raised: the stop itself succeeded, only the content is suspect.
    pub async fn stop(&self) -> Result<StopReport> {
        let mut slot = self.slot.lock().await;
        let mut recording = slot.take().ok_or(ApiError::NotRecording)?;
        let duration = recording.started.elapsed();

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(recording.pid as i32), Signal::SIGINT);
        }
        if tokio::time::timeout(STOP_GRACE, recording.child.wait())
            .await
            .is_err()
        {
            warn!(pid = recording.pid, "recorder ignored SIGINT, killing");
            let _ = recording.child.kill().await;
        }

        let (size_bytes, error) = match tokio::fs::metadata(&recording.output).await {
            Ok(meta) if meta.len() > 0 => (meta.len(), None),
            Ok(_) => (0, Some("recorder produced an empty file".to_string())),
            Err(_) => (0, Some("recorder produced no output file".to_string())),
        };
        info!(
            pid = recording.pid,
            size_bytes,
            duration_secs = duration.as_secs_f64(),
            "recording stopped"
        );

        Ok(StopReport {
            size_bytes,
            duration_secs: duration.as_secs_f64(),
            output_path: recording.output,
            error,
        })
    }

    /// Pure read of the slot; never mutates.
    pub async fn status(&self) -> RecordingStatus {
        let slot = self.slot.lock().await;
        match slot.as_ref() {
            Some(recording) => RecordingStatus {
                recording: true,
                elapsed_secs: Some(recording.started.elapsed().as_secs_f64()),
                output_path: Some(recording.output.clone()),
                fps: Some(recording.fps),
                pid: Some(recording.pid),
            },
            None => RecordingStatus {
                recording: false,
                elapsed_secs: None,
                output_path: None,
                fps: None,
                pid: None,
            },
        }
    }

    fn recorder_command(&self, output: &Path, fps: u32) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-y")
            .arg("-f")
            .arg("x11grab")
            .arg("-framerate")
            .arg(fps.to_string())
            .arg("-i")
            .arg(&self.display)
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}
