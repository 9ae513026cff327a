//! Process runner.
//!
//! `run` executes one [`ExecRequest`] and always returns an [`ExecOutcome`]:
//! launch failures, workdir failures and timeouts are reported inside the
//! outcome rather than as errors.

use crate::error::ExecError;
use crate::limits::{DRAIN_GRACE, FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};
use crate::output::{filter_lines, ExecOutcome, TailBuffer};
use crate::request::ExecRequest;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Execute a request to completion, deadline, or caller cancellation.
///
/// The process runs in its own process group. When `request.limits.timeout`
/// elapses or `cancel` fires, the whole group is killed with SIGKILL, the
/// child is reaped, and the outcome is marked timed out with exit code 124.
/// Output captured up to that point is kept.
///
/// Completion is the exit of the process itself. If a descendant keeps
/// stdout or stderr open, draining stops after [`DRAIN_GRACE`], the group is
/// killed, and the real exit code is still reported.
pub async fn run(request: &ExecRequest, cancel: &CancellationToken) -> ExecOutcome {
    let start = Instant::now();
    let cap = request.limits.output_cap();
    let mut stdout = TailBuffer::new(cap);
    let mut stderr = TailBuffer::new(cap);

    let cwd = if request.cwd.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        request.cwd.clone()
    };

    if let Err(source) = tokio::fs::create_dir_all(&cwd).await {
        let error = ExecError::Workdir {
            path: cwd.display().to_string(),
            source,
        };
        warn!(error = %error, "execution aborted before spawn");
        return finish(request, stdout, stderr, FAILURE_EXIT_CODE, false, vec![error]);
    }

    let mut cmd = Command::new(&request.bin);
    cmd.args(&request.argv)
        .current_dir(&cwd)
        .envs(&request.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .process_group(0);

    debug!(
        bin = %request.bin.display(),
        argc = request.argv.len(),
        cwd = %cwd.display(),
        timeout = ?request.limits.timeout,
        "spawning process"
    );

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            let error = ExecError::Spawn {
                bin: request.bin.display().to_string(),
                source,
            };
            warn!(error = %error, "execution failed to start");
            return finish(request, stdout, stderr, FAILURE_EXIT_CODE, false, vec![error]);
        }
    };

    let mut group = ProcessGroup::of(child.id());

    let (Some(mut out_pipe), Some(mut err_pipe)) = (child.stdout.take(), child.stderr.take())
    else {
        group.kill();
        let _ = child.wait().await;
        let error = ExecError::Wait(std::io::Error::other("output pipes were not available"));
        return finish(request, stdout, stderr, FAILURE_EXIT_CODE, false, vec![error]);
    };

    let mut notes = Vec::new();
    let (exit_code, timed_out) = {
        // Both drains stay polled while process exit races the deadline, so a
        // full pipe never stalls the child and an inherited pipe never stalls us.
        let mut drains = pin!(async {
            tokio::join!(
                drain(&mut out_pipe, &mut stdout),
                drain(&mut err_pipe, &mut stderr),
            );
        });
        let mut expiry = pin!(deadline(cancel, request.limits.timeout));
        let mut drained = false;

        let finished = loop {
            tokio::select! {
                status = child.wait() => break Some(status),
                () = &mut drains, if !drained => drained = true,
                () = &mut expiry => break None,
            }
        };

        let result = match finished {
            Some(status) => (exit_code(status, &mut notes), false),
            None => {
                warn!(
                    bin = %request.bin.display(),
                    elapsed = ?start.elapsed(),
                    "deadline reached, killing process group"
                );
                group.kill();
                let _ = child.start_kill();
                if let Err(e) = child.wait().await {
                    debug!(error = %e, "reaping killed process failed");
                }
                (TIMEOUT_EXIT_CODE, true)
            }
        };

        // A descendant may still hold a pipe open after the process is gone.
        if !drained && tokio::time::timeout(DRAIN_GRACE, &mut drains).await.is_err() {
            warn!(
                bin = %request.bin.display(),
                "output still open after exit, killing process group"
            );
            group.kill();
            notes.push(ExecError::DrainAbandoned(DRAIN_GRACE));
        }
        group.disarm();
        result
    };

    let outcome = finish(request, stdout, stderr, exit_code, timed_out, notes);
    info!(
        bin = %request.bin.display(),
        exit_code = outcome.exit_code,
        timed_out = outcome.timed_out,
        truncated = outcome.truncated,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "execution finished"
    );
    outcome
}

/// Run `bin --version` and return its second whitespace-separated field.
pub async fn query_version(bin: &Path) -> Option<String> {
    let request = ExecRequest::new(bin, vec!["--version".to_string()])
        .with_timeout(Duration::from_secs(10))
        .with_max_output_bytes(4096);
    let outcome = run(&request, &CancellationToken::new()).await;
    if !outcome.success() {
        debug!(bin = %bin.display(), exit_code = outcome.exit_code, "version query failed");
        return None;
    }
    outcome.stdout.split_whitespace().nth(1).map(str::to_string)
}

/// Resolves when the caller cancels or the optional timeout elapses.
async fn deadline(cancel: &CancellationToken, timeout: Option<Duration>) {
    match timeout {
        Some(limit) => {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(limit) => {}
            }
        }
        None => cancel.cancelled().await,
    }
}

/// Copy a pipe into a tail buffer until EOF.
///
/// Cancel-safe: dropping the future loses no bytes that were already read,
/// so the timeout path can resume draining the same pipe.
async fn drain<R>(pipe: &mut R, sink: &mut TailBuffer)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => sink.write(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "output pipe read failed");
                break;
            }
        }
    }
}

fn exit_code(status: std::io::Result<ExitStatus>, notes: &mut Vec<ExecError>) -> i32 {
    match status {
        Ok(status) => match (status.code(), status.signal()) {
            (Some(code), _) => code,
            (None, Some(signal)) => {
                notes.push(ExecError::Signaled(signal));
                128 + signal
            }
            (None, None) => FAILURE_EXIT_CODE,
        },
        Err(e) => {
            notes.push(ExecError::Wait(e));
            FAILURE_EXIT_CODE
        }
    }
}

/// Apply line filters, append runner errors to stderr, and build the outcome.
fn finish(
    request: &ExecRequest,
    stdout: TailBuffer,
    stderr: TailBuffer,
    exit_code: i32,
    timed_out: bool,
    notes: Vec<ExecError>,
) -> ExecOutcome {
    let (stdout, stdout_lost) = stdout.into_text();
    let (stderr, stderr_lost) = stderr.into_text();

    let mut merged = TailBuffer::new(request.limits.output_cap());
    merged.write(filter_lines(&stderr, &request.stderr_exclude).as_bytes());
    for note in &notes {
        merged.append_note(&note.to_string());
    }
    let (stderr, merged_lost) = merged.into_text();

    ExecOutcome {
        exit_code,
        stdout: filter_lines(&stdout, &request.stdout_exclude),
        stderr,
        truncated: stdout_lost || stderr_lost || merged_lost,
        timed_out,
    }
}

/// Handle on the child's process group.
///
/// Kills the whole group when dropped unless disarmed, so an abandoned
/// execution leaves no descendants behind.
struct ProcessGroup {
    pgid: Option<libc::pid_t>,
}

impl ProcessGroup {
    fn of(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| libc::pid_t::try_from(pid).ok()),
        }
    }

    /// Send SIGKILL to every process in the group, once.
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: killpg has no memory-safety preconditions.
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc == -1 {
                debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
            }
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}
