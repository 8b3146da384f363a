//! Subprocess execution with a bounded wait.

use fixcheck_core::{CommandExecution, CommandRequest, KILLED_EXIT_CODE};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to wait for the pipe readers once the child is gone, shared by
/// both streams.
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-stream capture limit (10MB).
const MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;

const TRUNCATION_MARKER: &str = "\n[output truncated at 10MB]";

const COLLECTION_TIMEOUT_MARKER: &str = "\n[output collection timed out]";

/// Runs shell commands for `command` steps.
pub struct CommandRunner;

impl CommandRunner {
    /// Execute a single command and return what happened.
    ///
    /// Never fails: launch errors come back with `launched == false` and the
    /// error text in `stderr`. Once the child is gone its process group is
    /// killed on Unix, so nothing it started outlives this call. On timeout
    /// the child is killed and reaped before this returns.
    pub async fn execute(request: &CommandRequest) -> CommandExecution {
        let start = Instant::now();

        let mut child = match spawn_shell(request) {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %request.command, error = %e, "Failed to launch command");
                return CommandExecution::launch_failed(&request.command, e.to_string());
            }
        };
        let pid = child.id();
        debug!(command = %request.command, pid = ?pid, "Spawned command");

        // Drain both pipes while waiting, otherwise a chatty child blocks on a
        // full pipe buffer and never exits.
        let stdout = SharedCapture::default();
        let stderr = SharedCapture::default();
        let readers: Vec<JoinHandle<()>> = [
            child
                .stdout
                .take()
                .map(|s| tokio::spawn(read_stream(s, Arc::clone(&stdout)))),
            child
                .stderr
                .take()
                .map(|s| tokio::spawn(read_stream(s, Arc::clone(&stderr)))),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut wait_error = None;
        let (exit_code, timed_out) =
            match tokio::time::timeout(request.timeout, child.wait()).await {
                Ok(Ok(status)) => (status.code().unwrap_or(KILLED_EXIT_CODE), false),
                Ok(Err(e)) => {
                    terminate(&mut child).await;
                    wait_error = Some(e.to_string());
                    (KILLED_EXIT_CODE, false)
                }
                Err(_) => {
                    warn!(
                        command = %request.command,
                        timeout_secs = request.timeout.as_secs(),
                        "Command timed out, killing"
                    );
                    terminate(&mut child).await;
                    (KILLED_EXIT_CODE, true)
                }
            };

        // Background jobs of the shell share its group and may still hold
        // the pipes open.
        if let Some(pid) = pid {
            kill_process_group(pid);
        }

        let complete = drain_readers(readers, OUTPUT_COLLECTION_TIMEOUT).await;
        let stdout = lock(&stdout).text();
        let mut stderr = lock(&stderr).text();

        if !complete {
            warn!(command = %request.command, "Output collection timed out, keeping partial output");
            stderr.push_str(COLLECTION_TIMEOUT_MARKER);
        }
        if let Some(e) = wait_error {
            stderr.push_str(&format!("\n[failed to wait for process: {e}]"));
        }
        if timed_out {
            stderr.push_str(&format!(
                "\n[process killed after {}s timeout]",
                request.timeout.as_secs()
            ));
        }

        CommandExecution {
            command: request.command.clone(),
            exit_code,
            stdout,
            stderr,
            timed_out,
            launched: true,
            duration_ms: start.elapsed().as_millis() as u64,
            pid,
        }
    }
}

/// Spawn `command` through the platform shell with piped output.
fn spawn_shell(request: &CommandRequest) -> std::io::Result<Child> {
    let mut cmd = Command::from(shell_command(&request.command));
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &request.working_dir {
        cmd.current_dir(dir);
    }

    cmd.spawn()
}

/// `sh -c <command>`, with the child leading its own process group so the
/// whole tree can be signalled at once.
#[cfg(unix)]
fn shell_command(command: &str) -> std::process::Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = std::process::Command::new("sh");
    cmd.arg("-c").arg(command).process_group(0);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> std::process::Command {
    let mut cmd = std::process::Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Kill the child and reap it.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }
    // Already dead once the group is gone; this reaps it.
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Kill after timeout reported an error");
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!(pid, error = %e, "killpg failed"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Bytes read from one pipe, capped at `MAX_OUTPUT_SIZE`.
#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Capture {
    fn push(&mut self, chunk: &[u8]) {
        let remaining = MAX_OUTPUT_SIZE.saturating_sub(self.bytes.len());
        let to_copy = chunk.len().min(remaining);
        self.bytes.extend_from_slice(&chunk[..to_copy]);
        if to_copy < chunk.len() {
            self.truncated = true;
        }
    }

    fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

/// Written by a reader task, read back after collection even if the task
/// never finished.
type SharedCapture = Arc<Mutex<Capture>>;

fn lock(capture: &SharedCapture) -> MutexGuard<'_, Capture> {
    capture.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read a stream into `capture` until EOF.
///
/// The stream is drained even past the size limit so the writer never sees
/// a broken pipe.
async fn read_stream<R: AsyncRead + Unpin>(mut stream: R, capture: SharedCapture) {
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => lock(&capture).push(&chunk[..n]),
        }
    }
}

/// Wait for every reader under one shared deadline. Returns `false` if the
/// deadline passed; unfinished readers are aborted.
async fn drain_readers(readers: Vec<JoinHandle<()>>, limit: Duration) -> bool {
    let aborts: Vec<_> = readers.iter().map(|r| r.abort_handle()).collect();
    let joined = tokio::time::timeout(limit, async {
        for reader in readers {
            if let Err(e) = reader.await {
                debug!(error = %e, "Output reader failed");
            }
        }
    })
    .await;

    if joined.is_err() {
        for abort in aborts {
            abort.abort();
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixcheck_core::LAUNCH_FAILED_EXIT_CODE;

    fn request(command: &str) -> CommandRequest {
        CommandRequest::new(command, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let result = CommandRunner::execute(&request("echo hello")).await;
        assert!(result.succeeded());
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_execute_failing_command_captures_stderr() {
        let result = CommandRunner::execute(&request("echo broken >&2; exit 1")).await;
        assert!(!result.succeeded());
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("broken"));
    }

    #[tokio::test]
    async fn test_execute_honours_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let req = request("cat marker.txt").in_dir(dir.path());
        let result = CommandRunner::execute(&req).await;
        assert!(result.succeeded(), "stderr: {}", result.stderr);
        assert_eq!(result.stdout.trim(), "here");
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_launch_failure() {
        let req = request("true").in_dir("/nonexistent-dir-that-does-not-exist");
        let result = CommandRunner::execute(&req).await;
        assert!(!result.launched);
        assert_eq!(result.exit_code, LAUNCH_FAILED_EXIT_CODE);
        assert!(!result.stderr.is_empty());
        assert!(result.pid.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_and_reaps_child() {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let req = CommandRequest::new("echo started; sleep 30", Duration::from_secs(1));
        let start = Instant::now();
        let result = CommandRunner::execute(&req).await;

        assert!(result.timed_out);
        assert!(result.launched);
        assert_eq!(result.exit_code, KILLED_EXIT_CODE);
        assert!(result.stderr.contains("killed after 1s timeout"));
        assert!(result.stdout.contains("started"));
        assert!(start.elapsed() < Duration::from_secs(10));

        let pid = result.pid.expect("child pid");
        assert!(
            kill(Pid::from_raw(pid as i32), None).is_err(),
            "child {pid} should be gone"
        );
    }

    /// True while `pid` exists and is not a zombie.
    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .is_some_and(|state| state != 'Z'),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_background_job_killed_and_output_kept() {
        let req = request("sleep 30 & echo $!; echo hi");
        let start = Instant::now();
        let result = CommandRunner::execute(&req).await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(result.succeeded(), "stderr: {}", result.stderr);
        assert!(!result.timed_out);
        assert!(result.stdout.contains("hi"));
        assert!(!result.stderr.contains("collection timed out"));

        let background: i32 = result
            .stdout
            .lines()
            .next()
            .and_then(|line| line.trim().parse().ok())
            .expect("background pid on first line");

        let deadline = Instant::now() + Duration::from_secs(2);
        while is_running(background) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(
            !is_running(background),
            "background job {background} outlived the command"
        );
    }

    fn capture_of(data: &[u8]) -> String {
        let mut capture = Capture::default();
        for chunk in data.chunks(8192) {
            capture.push(chunk);
        }
        capture.text()
    }

    #[tokio::test]
    async fn test_read_stream_small_input() {
        let capture = SharedCapture::default();
        read_stream(&b"hello world"[..], Arc::clone(&capture)).await;
        assert_eq!(lock(&capture).text(), "hello world");
    }

    #[test]
    fn test_capture_truncates_at_limit() {
        let data = vec![b'x'; MAX_OUTPUT_SIZE + 1000];
        let result = capture_of(&data);
        assert!(result.ends_with(TRUNCATION_MARKER));
        assert_eq!(result.len(), MAX_OUTPUT_SIZE + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_capture_exact_limit() {
        let data = vec![b'y'; MAX_OUTPUT_SIZE];
        let result = capture_of(&data);
        assert!(!result.contains("[output truncated"));
        assert_eq!(result.len(), MAX_OUTPUT_SIZE);
    }

    #[tokio::test]
    async fn test_drain_readers_keeps_partial_output_on_deadline() {
        let capture = SharedCapture::default();
        let (mut writer, reader) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut writer, b"partial")
            .await
            .unwrap();
        let handle = tokio::spawn(read_stream(reader, Arc::clone(&capture)));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Writer stays open, so the reader never sees EOF.
        assert!(!drain_readers(vec![handle], Duration::from_millis(200)).await);
        assert_eq!(lock(&capture).text(), "partial");
        drop(writer);
    }
}
