use crate::trace::TraceWriter;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The duration to wait after sending SIGINT before escalating to SIGTERM.
const SIGINT_TIMEOUT: Duration = Duration::from_millis(7500);
/// The duration to wait after sending SIGTERM before escalating to SIGKILL.
const SIGTERM_TIMEOUT: Duration = Duration::from_millis(2500);

/// Error type for non-zero process exit codes.
#[derive(Debug, thiserror::Error)]
#[error("Exit code {exit_code} returned from process: file name '{file_name}', arguments '{arguments}'.")]
pub struct ProcessExitCodeError {
    pub exit_code: i32,
    pub file_name: String,
    pub arguments: String,
}

/// Everything needed to launch one child process.
///
/// The child does not inherit the parent's environment: `environment` is
/// the complete set of variables it will see.
#[derive(Debug, Clone, Default)]
pub struct ProcessStartInfo {
    pub argv: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
}

impl ProcessStartInfo {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            ..Default::default()
        }
    }

    fn file_name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    fn arguments(&self) -> String {
        self.argv.iter().skip(1).cloned().collect::<Vec<_>>().join(" ")
    }
}

/// How a child process ended.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub cancelled: bool,
    /// Everything the child wrote to stderr.
    pub stderr: Vec<u8>,
    file_name: String,
    arguments: String,
}

impl ProcessOutcome {
    /// Turn a cancellation or non-zero exit into an error.
    pub fn ensure_success(&self) -> Result<()> {
        if self.cancelled {
            anyhow::bail!("Process '{}' was cancelled", self.file_name);
        }
        if self.exit_code != 0 {
            return Err(ProcessExitCodeError {
                exit_code: self.exit_code,
                file_name: self.file_name.clone(),
                arguments: self.arguments.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// Spawns a single child process, streams its stdout line by line through a
/// channel, tees its stderr to our own stderr while capturing it, and
/// supports graceful cancellation (SIGINT, then SIGTERM, then SIGKILL).
///
/// An invoker runs exactly one process: `execute` consumes it, which closes
/// the stdout channel once the reader task has drained the pipe.
pub struct ProcessInvoker {
    trace: Arc<dyn TraceWriter>,
    stdout_tx: mpsc::UnboundedSender<String>,
    stdout_rx: Option<mpsc::UnboundedReceiver<String>>,
    tee_stderr: bool,
}

impl ProcessInvoker {
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        Self {
            trace,
            stdout_tx,
            stdout_rx: Some(stdout_rx),
            tee_stderr: true,
        }
    }

    /// Whether stderr is copied to this process's stderr as it arrives.
    pub fn with_stderr_tee(mut self, tee: bool) -> Self {
        self.tee_stderr = tee;
        self
    }

    /// Take the stdout receiver. Can only be called once; subsequent calls return `None`.
    pub fn take_stdout_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.stdout_rx.take()
    }

    /// Run the process to completion.
    ///
    /// Returns `Err` only when the process could not be started or waited on;
    /// exit status and cancellation are reported through [`ProcessOutcome`].
    /// Both stream readers are joined before this returns.
    pub async fn execute(
        self,
        start_info: ProcessStartInfo,
        cancellation_token: CancellationToken,
    ) -> Result<ProcessOutcome> {
        let file_name = start_info.file_name().to_string();
        let arguments = start_info.arguments();
        if file_name.is_empty() {
            anyhow::bail!("Cannot start a process without a file name");
        }

        self.trace.info("Starting process:");
        self.trace.info(&format!("  File name: '{file_name}'"));
        self.trace.info(&format!("  Arguments: '{arguments}'"));
        if let Some(dir) = &start_info.working_directory {
            self.trace.info(&format!("  Working directory: '{}'", dir.display()));
        }

        let program = self.resolve_program(&start_info);
        let mut cmd = Command::new(&program);
        cmd.args(start_info.argv.iter().skip(1));
        if let Some(dir) = &start_info.working_directory {
            cmd.current_dir(dir);
        }
        cmd.env_clear();
        cmd.envs(&start_info.environment);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());

        let start = std::time::Instant::now();
        let mut child = cmd.spawn().with_context(|| {
            format!("Failed to start process '{file_name}' with arguments '{arguments}'")
        })?;

        let pid = child.id().unwrap_or(0);
        self.trace
            .info(&format!("Process started with process id {pid}, waiting for process exit."));

        let stdout = child.stdout.take();
        let stdout_tx = self.stdout_tx.clone();
        let trace_out = self.trace.clone();
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                // Drain to EOF even when nobody listens, or the child gets SIGPIPE.
                let mut reader = BufReader::new(stdout);
                let mut buf = Vec::new();
                let mut forward = true;
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf).await {
                        Ok(0) => break,
                        Ok(_) => {
                            if forward && stdout_tx.send(decode_line(&buf)).is_err() {
                                forward = false;
                            }
                        }
                        Err(e) => {
                            trace_out.info(&format!("Failed to read STDOUT: {e}"));
                            break;
                        }
                    }
                }
            }
            trace_out.verbose("STDOUT stream read finished.");
        });

        let stderr = child.stderr.take();
        let tee = self.tee_stderr;
        let trace_err = self.trace.clone();
        let stderr_task = tokio::spawn(async move {
            let mut captured = Vec::new();
            if let Some(mut stderr) = stderr {
                let mut own_stderr = tokio::io::stderr();
                let mut buf = [0u8; 8192];
                loop {
                    match stderr.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            captured.extend_from_slice(&buf[..n]);
                            if tee {
                                let _ = own_stderr.write_all(&buf[..n]).await;
                            }
                        }
                    }
                }
                let _ = own_stderr.flush().await;
            }
            trace_err.verbose("STDERR stream read finished.");
            captured
        });

        let exit_code: i32;
        let cancelled;

        tokio::select! {
            status = child.wait() => {
                cancelled = false;
                exit_code = status.context("Failed to wait for process")?.code().unwrap_or(-1);
            }
            _ = cancellation_token.cancelled() => {
                cancelled = true;
                self.trace.info("Cancellation requested.");
                exit_code = self.cancel_and_kill_process(&mut child).await;
            }
        }

        let _ = stdout_task.await;
        let stderr = stderr_task.await.unwrap_or_default();

        let elapsed = start.elapsed();
        self.trace.info(&format!(
            "Finished process {pid} with exit code {exit_code}, and elapsed time {elapsed:.2?}."
        ));

        Ok(ProcessOutcome {
            exit_code,
            cancelled,
            stderr,
            file_name,
            arguments,
        })
    }

    /// Look the program up on the child's PATH rather than ours, so that
    /// PATH edits made by earlier steps take effect.
    fn resolve_program(&self, start_info: &ProcessStartInfo) -> PathBuf {
        let file_name = start_info.file_name();
        let cwd = start_info
            .working_directory
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        match which::which_in(file_name, start_info.environment.get("PATH"), &cwd) {
            Ok(path) => path,
            Err(_) => {
                self.trace
                    .verbose(&format!("'{file_name}' not found on the step PATH, spawning as given."));
                Path::new(file_name).to_path_buf()
            }
        }
    }

    async fn cancel_and_kill_process(&self, child: &mut tokio::process::Child) -> i32 {
        if self.send_signal_and_wait(child, Signal::Int, SIGINT_TIMEOUT).await {
            self.trace.info("Process cancelled successfully through SIGINT.");
            return exit_code_of(child).await;
        }

        if self.send_signal_and_wait(child, Signal::Term, SIGTERM_TIMEOUT).await {
            self.trace.info("Process terminated successfully through SIGTERM.");
            return exit_code_of(child).await;
        }

        self.trace
            .info("Killing process since both cancel and terminate signals have been ignored.");
        let _ = child.kill().await;
        exit_code_of(child).await
    }

    /// Send a signal to the child process and wait up to `timeout` for it to exit.
    /// Returns `true` if the process exited within the timeout.
    #[cfg(unix)]
    async fn send_signal_and_wait(
        &self,
        child: &mut tokio::process::Child,
        signal: Signal,
        timeout: Duration,
    ) -> bool {
        let Some(pid) = child.id() else {
            // already reaped
            return true;
        };

        let sig = match signal {
            Signal::Int => nix::sys::signal::Signal::SIGINT,
            Signal::Term => nix::sys::signal::Signal::SIGTERM,
        };

        self.trace.info(&format!("Sending {sig:?} to process {pid}."));
        if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), sig).is_err() {
            self.trace
                .info(&format!("{sig:?} signal failed to send to process {pid}."));
            return false;
        }

        tokio::select! {
            result = child.wait() => result.is_ok(),
            _ = tokio::time::sleep(timeout) => {
                self.trace.info(&format!(
                    "Process did not honor {sig:?} within {:.1}s.",
                    timeout.as_secs_f64()
                ));
                false
            }
        }
    }

    #[cfg(not(unix))]
    async fn send_signal_and_wait(
        &self,
        child: &mut tokio::process::Child,
        _signal: Signal,
        timeout: Duration,
    ) -> bool {
        tokio::select! {
            result = child.wait() => result.is_ok(),
            _ = tokio::time::sleep(timeout) => false,
        }
    }
}

async fn exit_code_of(child: &mut tokio::process::Child) -> i32 {
    child
        .wait()
        .await
        .map(|s| s.code().unwrap_or(-1))
        .unwrap_or(-1)
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Int,
    Term,
}

/// One stdout line without its terminator. Invalid UTF-8 is replaced, not fatal.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::NullTraceWriter;

    fn make_invoker() -> ProcessInvoker {
        ProcessInvoker::new(Arc::new(NullTraceWriter)).with_stderr_tee(false)
    }

    fn sh(script: &str) -> ProcessStartInfo {
        let mut info = ProcessStartInfo::new(vec!["sh".into(), "-c".into(), script.into()]);
        info.environment
            .insert("PATH".into(), std::env::var("PATH").unwrap_or_default());
        info
    }

    async fn run_collecting(info: ProcessStartInfo) -> (ProcessOutcome, Vec<String>) {
        let mut invoker = make_invoker();
        let mut rx = invoker.take_stdout_receiver().unwrap();
        let (outcome, lines) = tokio::join!(invoker.execute(info, CancellationToken::new()), async {
            let mut lines = Vec::new();
            while let Some(line) = rx.recv().await {
                lines.push(line);
            }
            lines
        });
        (outcome.unwrap(), lines)
    }

    #[tokio::test]
    async fn execute_streams_stdout_in_order() {
        let (outcome, lines) = run_collecting(sh("echo one; echo two; echo three")).await;
        assert_eq!(outcome.exit_code, 0);
        assert!(!outcome.cancelled);
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn execute_captures_stderr() {
        let (outcome, lines) = run_collecting(sh("echo oops 1>&2")).await;
        assert!(lines.is_empty());
        assert_eq!(String::from_utf8_lossy(&outcome.stderr), "oops\n");
    }

    #[tokio::test]
    async fn execute_uses_only_given_environment() {
        let mut info = sh("echo \"[$MY_TEST_VAR][$HOME]\"");
        info.environment
            .insert("MY_TEST_VAR".into(), "test_value_123".into());
        let (_, lines) = run_collecting(info).await;
        assert_eq!(lines, vec!["[test_value_123][]"]);
    }

    #[tokio::test]
    async fn execute_honors_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = sh("pwd");
        info.working_directory = Some(dir.path().to_path_buf());
        let (_, lines) = run_collecting(info).await;
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            PathBuf::from(&lines[0]).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_raised() {
        let (outcome, _) = run_collecting(sh("exit 3")).await;
        assert_eq!(outcome.exit_code, 3);
        let err = outcome.ensure_success().unwrap_err();
        assert!(err.to_string().contains("Exit code 3"));
    }

    #[tokio::test]
    async fn execute_nonexistent_fails_to_start() {
        let invoker = make_invoker();
        let result = invoker
            .execute(
                ProcessStartInfo::new(vec!["nonexistent_command_xyz_123".into()]),
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_rejects_empty_argv() {
        let result = make_invoker()
            .execute(ProcessStartInfo::default(), CancellationToken::new())
            .await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_interrupts_process() {
        let token = CancellationToken::new();
        let invoker = make_invoker();
        let child_token = token.clone();
        let handle =
            tokio::spawn(async move { invoker.execute(sh("exec sleep 30"), child_token).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();

        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.ensure_success().is_err());
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_stop_reading() {
        let (outcome, lines) = run_collecting(sh(
            "printf 'ok\\n\\377\\376\\r\\n'; i=0; while [ $i -lt 20000 ]; do echo line$i; i=$((i+1)); done; echo done",
        ))
        .await;

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(lines.len(), 20003);
        assert_eq!(lines[0], "ok");
        assert_eq!(lines[1], "\u{fffd}\u{fffd}");
        assert_eq!(lines.last().map(String::as_str), Some("done"));
    }

    #[test]
    fn decode_line_strips_terminators() {
        assert_eq!(decode_line(b"a\r\n"), "a");
        assert_eq!(decode_line(b"b\n"), "b");
        assert_eq!(decode_line(b"tail"), "tail");
    }
}
