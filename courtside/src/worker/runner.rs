//! Worker process lifecycle: permit, spawn, stdin, output capture, exit.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::ChildStdin;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::AnalysisScript;
use crate::config::WorkerConfig;

const DRAIN_AFTER_KILL: Duration = Duration::from_secs(2);

/// One pending worker run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub script: AnalysisScript,
    pub args: Vec<OsString>,
    pub stdin: Option<Vec<u8>>,
}

impl Invocation {
    pub fn new(script: AnalysisScript) -> Self {
        Self {
            script,
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Payload written to the worker's stdin before it is closed.
    pub fn stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }
}

/// How a worker run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Exit code 0; `output` is everything written to stdout.
    Success { output: String },
    /// Non-zero exit (code is `None` when killed by a signal), or the input
    /// payload could not be delivered.
    Failure { code: Option<i32>, error: String },
    /// The process could not be started at all.
    StartError { message: String },
    /// Still running after the configured timeout; the process was killed.
    TimedOut { after: Duration, error: String },
    /// Cancelled through its handle or by shutdown; the process was killed.
    Cancelled,
}

impl WorkerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerOutcome::Success { .. })
    }
}

/// Handle to a worker run executing on its own task.
///
/// Dropping the handle does not stop the worker; use [`JobHandle::cancel`].
pub struct JobHandle {
    task: JoinHandle<WorkerOutcome>,
    cancel: CancellationToken,
}

impl JobHandle {
    /// Kill the worker (or abandon it if it is still waiting for a permit).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish.
    pub async fn outcome(self) -> WorkerOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Worker task did not complete");
                WorkerOutcome::Failure {
                    code: None,
                    error: format!("Worker task did not complete: {e}"),
                }
            }
        }
    }
}

/// Decrements the active-worker gauge when a run ends, however it ends.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Exit {
    Status(std::io::Result<ExitStatus>),
    InputFailed(std::io::Error),
    TimedOut,
    Cancelled,
}

/// Launches analysis workers, at most `max_concurrent` at a time.
pub struct JobRunner {
    interpreter: String,
    script_dir: PathBuf,
    timeout: Duration,
    max_workers: usize,
    semaphore: Arc<Semaphore>,
    spawned: AtomicUsize,
    active: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
}

impl JobRunner {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            script_dir: config.script_dir.clone(),
            timeout: config.timeout,
            max_workers: config.max_concurrent,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            spawned: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start `invocation` on a background task and return immediately.
    pub fn spawn(self: &Arc<Self>, invocation: Invocation) -> JobHandle {
        let cancel = self.cancellation_token.child_token();
        let runner = Arc::clone(self);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { runner.execute(invocation, task_cancel).await });
        JobHandle { task, cancel }
    }

    /// Run `invocation` to completion on the current task.
    pub async fn run(&self, invocation: Invocation) -> WorkerOutcome {
        self.execute(invocation, self.cancellation_token.child_token())
            .await
    }

    /// Number of processes this runner has attempted to start.
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Number of runs currently holding a worker permit.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Kill every running worker and refuse new ones.
    pub fn shutdown(&self) {
        info!("Stopping analysis workers");
        self.cancellation_token.cancel();
        self.semaphore.close();
    }

    async fn execute(&self, invocation: Invocation, cancel: CancellationToken) -> WorkerOutcome {
        let script = invocation.script;

        let _permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return WorkerOutcome::StartError {
                        message: "Worker pool is shut down".to_string(),
                    };
                }
            },
            _ = cancel.cancelled() => return WorkerOutcome::Cancelled,
        };
        let _active = ActiveGuard::new(self.active.clone());

        let script_path = self.script_dir.join(script.relative_path());
        let mut cmd = process_utils::worker_command(
            &self.interpreter,
            &script_path,
            &invocation.args,
            invocation.stdin.is_some(),
        );
        info!(%script, command = %process_utils::describe(&cmd), "Starting worker");

        let start = Instant::now();
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(%script, error = %e, "Failed to start worker");
                return WorkerOutcome::StartError {
                    message: e.to_string(),
                };
            }
        };

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(collect_stream(out, script, "stdout")));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(collect_stream(err, script, "stderr")));

        // Input delivery counts against the worker timeout.
        let stdin = child.stdin.take();
        let run = async {
            if let Some(payload) = invocation.stdin.as_deref()
                && let Err(e) = write_input(stdin, payload).await
            {
                return Exit::InputFailed(e);
            }
            Exit::Status(child.wait().await)
        };

        let exit = tokio::select! {
            result = tokio::time::timeout(self.timeout, run) => match result {
                Ok(exit) => exit,
                Err(_) => Exit::TimedOut,
            },
            _ = cancel.cancelled() => Exit::Cancelled,
        };

        let killed = matches!(exit, Exit::TimedOut | Exit::Cancelled | Exit::InputFailed(_));
        if killed && let Err(e) = child.kill().await {
            warn!(%script, error = %e, "Failed to kill worker");
        }

        let (stdout, stderr) = drain(stdout_task, stderr_task, killed).await;
        let elapsed = start.elapsed();

        match exit {
            Exit::Status(Ok(status)) if status.success() => {
                info!(%script, elapsed_secs = elapsed.as_secs_f64(), "Worker finished");
                WorkerOutcome::Success { output: stdout }
            }
            Exit::Status(Ok(status)) => {
                error!(%script, code = ?status.code(), "Worker exited with failure");
                WorkerOutcome::Failure {
                    code: status.code(),
                    error: stderr,
                }
            }
            Exit::Status(Err(e)) => {
                error!(%script, error = %e, "Failed to wait for worker");
                WorkerOutcome::Failure {
                    code: None,
                    error: format!("Failed to wait for worker: {e}"),
                }
            }
            Exit::InputFailed(e) => {
                warn!(%script, error = %e, "Failed to write worker input");
                WorkerOutcome::Failure {
                    code: None,
                    error: format!("Failed to write worker input: {e}"),
                }
            }
            Exit::TimedOut => {
                error!(%script, timeout_secs = self.timeout.as_secs(), "Worker timed out and was killed");
                WorkerOutcome::TimedOut {
                    after: self.timeout,
                    error: stderr,
                }
            }
            Exit::Cancelled => {
                warn!(%script, "Worker cancelled");
                WorkerOutcome::Cancelled
            }
        }
    }
}

/// Write `payload` to the worker and close its stdin.
async fn write_input(stdin: Option<ChildStdin>, payload: &[u8]) -> std::io::Result<()> {
    let mut stdin = stdin.ok_or_else(|| std::io::Error::other("stdin was not piped"))?;
    stdin.write_all(payload).await?;
    stdin.shutdown().await
}

/// Read a child stream to EOF, echoing each line at debug level.
async fn collect_stream<R>(stream: R, script: AnalysisScript, name: &'static str) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut collected = Vec::new();
    loop {
        let line_start = collected.len();
        match reader.read_until(b'\n', &mut collected).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&collected[line_start..]);
                debug!(%script, stream = name, "{}", line.trim_end());
            }
            Err(e) => {
                warn!(%script, stream = name, error = %e, "Failed to read worker output");
                break;
            }
        }
    }
    collected
}

/// Collect both output streams. After a kill, grandchildren may still hold
/// the pipes open, so draining is bounded by [`DRAIN_AFTER_KILL`].
async fn drain(
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    killed: bool,
) -> (String, String) {
    let both = async { (join_stream(stdout).await, join_stream(stderr).await) };
    if killed {
        tokio::time::timeout(DRAIN_AFTER_KILL, both)
            .await
            .unwrap_or_default()
    } else {
        both.await
    }
}

async fn join_stream(task: Option<JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(task) => match task.await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        },
        None => String::new(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Lay out `script` as the pose-estimation script under a temp dir and
    /// return a runner that executes it with `sh`.
    fn sh_runner(script: &str, timeout: Duration, max: usize) -> (TempDir, Arc<JobRunner>) {
        let temp = TempDir::new().unwrap();
        let path = temp
            .path()
            .join(AnalysisScript::PoseEstimation.relative_path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, script).unwrap();

        let config = WorkerConfig {
            interpreter: "sh".to_string(),
            script_dir: temp.path().to_path_buf(),
            max_concurrent: max,
            timeout,
        };
        (temp, Arc::new(JobRunner::new(&config)))
    }

    fn invocation() -> Invocation {
        Invocation::new(AnalysisScript::PoseEstimation)
    }

    #[tokio::test]
    async fn test_success_collects_stdout() {
        let (_temp, runner) = sh_runner("echo \"got $1\"\n", Duration::from_secs(10), 1);
        let outcome = runner.run(invocation().arg("video.mp4")).await;
        assert_eq!(
            outcome,
            WorkerOutcome::Success {
                output: "got video.mp4\n".to_string()
            }
        );
        assert_eq!(runner.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_carries_code_and_stderr() {
        let (_temp, runner) = sh_runner("printf boom >&2\nexit 1\n", Duration::from_secs(10), 1);
        let outcome = runner.run(invocation()).await;
        assert_eq!(
            outcome,
            WorkerOutcome::Failure {
                code: Some(1),
                error: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_stdin_payload_is_delivered() {
        let (_temp, runner) = sh_runner("cat\n", Duration::from_secs(10), 1);
        let outcome = runner.run(invocation().stdin(r#"{"court":[1,2]}"#)).await;
        assert_eq!(
            outcome,
            WorkerOutcome::Success {
                output: r#"{"court":[1,2]}"#.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_closed_stdin_is_failure() {
        let (_temp, runner) = sh_runner("exec 0<&-\nsleep 1\n", Duration::from_secs(10), 1);
        let payload = vec![b'x'; 4 * 1024 * 1024];
        match runner.run(invocation().stdin(payload)).await {
            WorkerOutcome::Failure { code, error } => {
                assert_eq!(code, None);
                assert!(error.starts_with("Failed to write worker input"), "{error}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(runner.active_count(), 0);
    }

    #[tokio::test]
    async fn test_unread_stdin_is_bounded_by_timeout() {
        let (_temp, runner) = sh_runner("exec sleep 30\n", Duration::from_millis(300), 1);
        let payload = vec![b'x'; 4 * 1024 * 1024];
        let started = Instant::now();
        let outcome = runner.run(invocation().stdin(payload)).await;
        assert!(matches!(outcome, WorkerOutcome::TimedOut { .. }), "{outcome:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(runner.active_count(), 0);
    }

    #[tokio::test]
    async fn test_large_output_is_not_truncated() {
        let (_temp, runner) = sh_runner(
            "i=0; while [ $i -lt 5000 ]; do echo line-$i; echo err-$i >&2; i=$((i+1)); done\n",
            Duration::from_secs(30),
            1,
        );
        match runner.run(invocation()).await {
            WorkerOutcome::Success { output } => {
                assert_eq!(output.lines().count(), 5000);
                assert!(output.ends_with("line-4999\n"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_start_error() {
        let temp = TempDir::new().unwrap();
        let config = WorkerConfig {
            interpreter: "definitely-not-an-interpreter-xyz".to_string(),
            script_dir: temp.path().to_path_buf(),
            max_concurrent: 1,
            timeout: Duration::from_secs(5),
        };
        let runner = JobRunner::new(&config);
        let outcome = runner.run(invocation()).await;
        assert!(matches!(outcome, WorkerOutcome::StartError { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_worker() {
        let (_temp, runner) = sh_runner("exec sleep 30\n", Duration::from_millis(200), 1);
        let started = Instant::now();
        let outcome = runner.run(invocation()).await;
        assert!(matches!(outcome, WorkerOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(runner.active_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_through_handle() {
        let (_temp, runner) = sh_runner("exec sleep 30\n", Duration::from_secs(60), 1);
        let handle = runner.spawn(invocation());
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        assert_eq!(handle.outcome().await, WorkerOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_pool_limits_concurrency() {
        let (_temp, runner) = sh_runner("sleep 0.3\n", Duration::from_secs(10), 1);
        let first = runner.spawn(invocation());
        let second = runner.spawn(invocation());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runner.active_count(), 1);

        assert!(first.outcome().await.is_success());
        assert!(second.outcome().await.is_success());
        assert_eq!(runner.spawn_count(), 2);
        assert_eq!(runner.active_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let (_temp, runner) = sh_runner("exit 0\n", Duration::from_secs(10), 1);
        runner.shutdown();
        let outcome = runner.run(invocation()).await;
        assert!(matches!(
            outcome,
            WorkerOutcome::StartError { .. } | WorkerOutcome::Cancelled
        ));
        assert_eq!(runner.spawn_count(), 0);
    }
}
