//! Child process supervision: spawn, capture, timeout, guaranteed teardown.
//!
//! Every execution gets its own process group so that timeout and
//! cancellation can take down the whole tree the shell spawned, not just
//! the shell itself.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};

/// Extra time a child gets to exit after SIGTERM before SIGKILL is sent.
pub const KILL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub command: String,
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub env: HashMap<String, String>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

/// One chunk of a streaming execution. `Exit` is always the final chunk of a
/// process that spawned; spawn and wait failures are surfaced in-band.
#[derive(Debug, PartialEq)]
pub enum StreamChunk {
    Line(String),
    Exit(i32),
    Error(String),
}

fn shell_command(req: &RunRequest) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&req.command)
        .current_dir(&req.cwd)
        .envs(&req.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Run a command to completion, buffering its output.
///
/// The wall-clock timeout is enforced regardless of child behavior: on
/// expiry the process group is terminated, escalating to SIGKILL after
/// [`KILL_GRACE`], and the child is reaped before the error is returned.
pub async fn run(req: RunRequest) -> Result<RunOutcome> {
    let start = Instant::now();
    let id = uuid::Uuid::new_v4();
    debug!(execution_id = %id, command = %req.command, cwd = %req.cwd.display(), "spawning");

    let mut child = shell_command(&req).spawn().map_err(ApiError::Spawn)?;
    let pid = child.id();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let wait_and_collect = async {
        // Both pipes are drained concurrently with the wait so a chatty
        // child can never deadlock on a full pipe.
        let (out, err) = tokio::join!(drain(stdout), drain(stderr));
        let status = child.wait().await;
        (out, err, status)
    };

    match tokio::time::timeout(req.timeout, wait_and_collect).await {
        Ok((out, err, status)) => {
            let status = status?;
            let outcome = RunOutcome {
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                duration: start.elapsed(),
            };
            debug!(execution_id = %id, exit_code = outcome.exit_code, "finished");
            Ok(outcome)
        }
        Err(_) => {
            warn!(execution_id = %id, timeout_secs = req.timeout.as_secs(), "timed out, killing process group");
            terminate_group(pid, &mut child).await;
            Err(ApiError::Timeout(req.timeout.as_secs()))
        }
    }
}

/// Run a command, exposing merged stdout/stderr as an incremental sequence
/// of line chunks terminated by an exit-code sentinel.
///
/// Single-pass and not restartable. If the receiver is dropped before the
/// sentinel, the child's process group is terminated and reaped exactly as
/// on timeout.
pub fn stream(req: RunRequest) -> mpsc::Receiver<StreamChunk> {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut child = match shell_command(&req).spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = tx
                    .send(StreamChunk::Error(format!("failed to spawn process: {e}")))
                    .await;
                return;
            }
        };
        let pid = child.id();

        let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        loop {
            tokio::select! {
                line = line_rx.recv() => match line {
                    Some(line) => {
                        if tx.send(StreamChunk::Line(line)).await.is_err() {
                            debug!(?pid, "stream abandoned, killing process group");
                            terminate_group(pid, &mut child).await;
                            return;
                        }
                    }
                    // Both pipes closed: the child is done writing.
                    None => break,
                },
                _ = tx.closed() => {
                    debug!(?pid, "stream abandoned, killing process group");
                    terminate_group(pid, &mut child).await;
                    return;
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = tx.closed() => None,
        };
        match status {
            Some(Ok(status)) => {
                let _ = tx.send(StreamChunk::Exit(status.code().unwrap_or(-1))).await;
            }
            Some(Err(e)) => {
                let _ = tx.send(StreamChunk::Error(e.to_string())).await;
            }
            None => terminate_group(pid, &mut child).await,
        }
    });

    rx
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

async fn forward_lines<R: AsyncRead + Unpin>(pipe: R, tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

/// Terminate a child and everything in its process group, then reap it.
/// SIGTERM first so well-behaved children can clean up, SIGKILL after the
/// grace window for the ones that ignore it.
pub(crate) async fn terminate_group(pid: Option<u32>, child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(pid as i32);
        let _ = killpg(pgid, Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
        let _ = killpg(pgid, Signal::SIGKILL);
    }
    // Reaps the child; also the non-unix fallback kill.
    let _ = child.kill().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(command: &str, timeout: Duration) -> RunRequest {
        RunRequest {
            command: command.into(),
            cwd: std::env::temp_dir(),
            timeout,
            env: HashMap::new(),
        }
    }

    fn process_is_gone(pid: i32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid), None).is_err()
    }

    async fn pid_from_file(path: &std::path::Path) -> i32 {
        // The shell writes its pid before sleeping; give it a moment.
        for _ in 0..50 {
            if let Ok(text) = tokio::fs::read_to_string(path).await {
                if let Ok(pid) = text.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("pid file never appeared at {}", path.display());
    }

    #[tokio::test]
    async fn captures_stdout_stderr_and_exit_code() {
        let outcome = run(req(
            "echo out; echo err >&2; exit 3",
            Duration::from_secs(10),
        ))
        .await
        .unwrap();
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
        assert_eq!(outcome.exit_code, 3);
    }

    #[tokio::test]
    async fn zero_exit_on_success() {
        let outcome = run(req("true", Duration::from_secs(10))).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.is_empty());
    }

    #[tokio::test]
    async fn env_overrides_reach_the_child() {
        let mut r = req("echo $SANDBOXD_TEST_VAR", Duration::from_secs(10));
        r.env
            .insert("SANDBOXD_TEST_VAR".into(), "override-wins".into());
        let outcome = run(r).await.unwrap();
        assert_eq!(outcome.stdout.trim(), "override-wins");
    }

    #[tokio::test]
    async fn spawn_failure_is_not_a_timeout_or_exit_code() {
        let mut r = req("true", Duration::from_secs(10));
        r.cwd = PathBuf::from("/nonexistent-sandboxd-test-dir");
        let err = run(r).await.unwrap_err();
        assert!(matches!(err, ApiError::Spawn(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn timeout_returns_promptly_and_leaves_no_process() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("pid");
        let command = format!("echo $$ > {}; sleep 30", pidfile.display());

        let start = Instant::now();
        let err = run(req(&command, Duration::from_secs(1))).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout(1)), "got {err:?}");
        assert!(
            start.elapsed() < Duration::from_secs(3),
            "took {:?}",
            start.elapsed()
        );

        let pid = pid_from_file(&pidfile).await;
        assert!(process_is_gone(pid), "shell {pid} still running");
    }

    #[tokio::test]
    async fn concurrent_runs_do_not_cross_outputs() {
        let runs = (0..8).map(|i| run(req(&format!("echo {i}"), Duration::from_secs(10))));
        let outcomes = futures_util::future::join_all(runs).await;
        for (i, outcome) in outcomes.into_iter().enumerate() {
            let outcome = outcome.unwrap();
            assert_eq!(outcome.exit_code, 0);
            assert_eq!(outcome.stdout.trim(), i.to_string());
        }
    }

    #[tokio::test]
    async fn stream_yields_lines_then_exit_sentinel() {
        let mut rx = stream(req("echo one; echo two; exit 5", Duration::from_secs(10)));
        let mut lines = Vec::new();
        let mut exit = None;
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::Line(line) => lines.push(line),
                StreamChunk::Exit(code) => exit = Some(code),
                StreamChunk::Error(e) => panic!("unexpected error chunk: {e}"),
            }
        }
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(exit, Some(5));
    }

    #[tokio::test]
    async fn stream_merges_stderr() {
        let mut rx = stream(req("echo only-err >&2", Duration::from_secs(10)));
        let mut saw = false;
        while let Some(chunk) = rx.recv().await {
            if chunk == StreamChunk::Line("only-err".into()) {
                saw = true;
            }
        }
        assert!(saw);
    }

    #[tokio::test]
    async fn stream_spawn_failure_is_in_band() {
        let mut r = req("true", Duration::from_secs(10));
        r.cwd = PathBuf::from("/nonexistent-sandboxd-test-dir");
        let mut rx = stream(r);
        match rx.recv().await {
            Some(StreamChunk::Error(msg)) => {
                assert!(msg.contains("failed to spawn process"))
            }
            other => panic!("expected error chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn abandoned_stream_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("pid");
        let command = format!("echo $$ > {}; echo ready; sleep 30", pidfile.display());

        let mut rx = stream(req(&command, Duration::from_secs(10)));
        loop {
            match rx.recv().await {
                Some(StreamChunk::Line(line)) if line == "ready" => break,
                Some(_) => continue,
                None => panic!("stream ended before first line"),
            }
        }
        drop(rx);

        let pid = pid_from_file(&pidfile).await;
        // Allow the SIGTERM grace window to elapse.
        tokio::time::sleep(KILL_GRACE + Duration::from_millis(700)).await;
        assert!(process_is_gone(pid), "shell {pid} survived abandonment");
    }
}
