//! `ProcessWorkerBackend`/`ProcessWorkerSpawner`: a real, persistent
//! child-process worker driven over a line-delimited JSON protocol on
//! stdin/stdout, the concrete embedding `worker.rs`'s module doc
//! describes (spec §4.6). Mirrors `sheaf_installer::process`'s
//! poll-for-completion shape so cancellation and timeouts take effect
//! between polls rather than blocking forever on a pipe read.

use crate::error::DaemonError;
use crate::protocol::{ExecutionRequest, ExecutionResult};
use crate::worker::{WorkerBackend, WorkerSpawner, ENV_SUBPROCESS_MODE, ENV_TARGET_INTERPRETER};
use sheaf_core::CancellationToken;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawns a real interpreter subprocess per worker, in "subprocess
/// mode" with its inherited environment scrubbed of the variables
/// named in `DEFAULT_SCRUBBED_ENV_VARS` (spec §4.6's isolation rule).
pub struct ProcessWorkerSpawner;

impl WorkerSpawner for ProcessWorkerSpawner {
    fn spawn(
        &self,
        interpreter_executable: &Path,
        scrubbed_env_vars: &[&str],
    ) -> Result<Box<dyn WorkerBackend>, DaemonError> {
        let interpreter = interpreter_executable.display().to_string();
        let mut command = Command::new(interpreter_executable);
        command
            .env(ENV_SUBPROCESS_MODE, "1")
            .env(ENV_TARGET_INTERPRETER, &interpreter)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for var in scrubbed_env_vars {
            command.env_remove(var);
        }

        let mut child = command.spawn().map_err(|e| DaemonError::SpawnFailed {
            interpreter: interpreter.clone(),
            detail: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| DaemonError::SpawnFailed {
            interpreter: interpreter.clone(),
            detail: "worker process did not expose a stdin pipe".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| DaemonError::SpawnFailed {
            interpreter: interpreter.clone(),
            detail: "worker process did not expose a stdout pipe".to_string(),
        })?;

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(ProcessWorkerBackend { child, stdin, stdout_lines: rx, alive: true }))
    }
}

/// A live worker subprocess. One request is ever in flight at a time;
/// the pool never calls `execute` concurrently on the same backend.
pub struct ProcessWorkerBackend {
    child: Child,
    stdin: ChildStdin,
    stdout_lines: Receiver<std::io::Result<String>>,
    alive: bool,
}

impl WorkerBackend for ProcessWorkerBackend {
    fn execute(
        &mut self,
        request: &ExecutionRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, DaemonError> {
        if !self.alive {
            return Err(DaemonError::WorkerCrashed(request.target_interpreter.to_string()));
        }

        let mut line = serde_json::to_string(request)
            .map_err(|e| DaemonError::SpawnFailed {
                interpreter: request.target_interpreter.to_string(),
                detail: e.to_string(),
            })?;
        line.push('\n');
        if let Err(e) = self.stdin.write_all(line.as_bytes()).and_then(|()| self.stdin.flush()) {
            self.alive = false;
            return Err(DaemonError::Io(e));
        }

        let start = Instant::now();
        loop {
            match self.stdout_lines.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(response_line)) => {
                    return serde_json::from_str(&response_line).map_err(|e| {
                        DaemonError::SpawnFailed {
                            interpreter: request.target_interpreter.to_string(),
                            detail: e.to_string(),
                        }
                    });
                }
                Ok(Err(e)) => {
                    self.alive = false;
                    return Err(DaemonError::Io(e));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.alive = false;
                    return Err(DaemonError::WorkerCrashed(request.target_interpreter.to_string()));
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            if cancel.is_cancelled() {
                return Err(DaemonError::Cancelled);
            }
            if start.elapsed() > timeout {
                return Err(DaemonError::Timeout {
                    interpreter: request.target_interpreter.to_string(),
                    timeout,
                });
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn shutdown(&mut self) {
        self.alive = false;
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
