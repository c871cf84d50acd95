//! Subprocess runner: Implementation of `ModelRunner`.
//!
//! Each inference run spawns the disease's prediction script under an
//! external interpreter:
//!
//! ```text
//! <interpreter> <scripts_dir>/<script> <payload> <models_dir>/<model_dir>
//! ```
//!
//! where `<payload>` is the base64-encoded JSON feature vector for tabular
//! models (base64 avoids shell-quoting corruption of the JSON) or the
//! radiograph path for the image model. The child runs with a hard
//! wall-clock deadline and a capped output capture; stdout and stderr are
//! drained on dedicated threads so a chatty model cannot deadlock on a full
//! pipe, and the wait for those threads is itself bounded: killing the child
//! does not close a pipe a forked grandchild still holds open.

mod env;
mod parser;

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::domain::{Disease, ModelOutput};
use crate::ports::{ModelInput, ModelRunner};

/// Cap on captured bytes per stream.
const MAX_CAPTURE_BYTES: u64 = 10 * 1024 * 1024;

/// How often the child is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for the capture threads once the child is gone. A
/// grandchild that inherited the pipes can hold their write ends open past
/// the child's death; after this grace the capture is abandoned rather than
/// blocking the request.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Error type for inference runs.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The child ran past its wall-clock budget and was killed.
    #[error("model run exceeded its {budget_secs}s wall-clock budget")]
    Timeout { budget_secs: u64 },

    /// The child failed without a structured error payload.
    #[error("{message}")]
    Invocation { message: String, stderr: String },

    /// The program reported `success: false`; the message passes through to
    /// the caller.
    #[error("{message}")]
    Model { message: String, stderr: String },

    /// Output contained no valid trailing JSON.
    #[error("unusable model output: {detail}")]
    Parse { detail: String },

    #[error("failed to encode model payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("model process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem layout and interpreter for the external prediction programs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Interpreter binary, e.g. `python3`.
    pub interpreter: PathBuf,
    /// Directory holding the `predict_*.py` scripts.
    pub scripts_dir: PathBuf,
    /// Directory holding one model artifact directory per disease.
    pub models_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            scripts_dir: PathBuf::from("scripts"),
            models_dir: PathBuf::from("public/models"),
        }
    }
}

/// Raw capture of one child process run.
#[derive(Debug)]
pub(crate) struct Captured {
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    /// Exit code; `None` when the child was killed by a signal (including
    /// our own deadline kill).
    pub exit_code: Option<i32>,
}

impl Captured {
    fn exit_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn status_display(&self) -> String {
        match self.exit_code {
            Some(code) => format!("status {code}"),
            None => "a signal".to_string(),
        }
    }
}

/// Runner that shells out to the per-disease prediction scripts.
pub struct SubprocessRunner {
    config: RunnerConfig,
}

impl SubprocessRunner {
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    fn invoke(
        &self,
        disease: Disease,
        payload: &str,
        budget: Duration,
    ) -> Result<Captured, RunnerError> {
        let script = self.config.scripts_dir.join(disease.script());
        let model = self.config.models_dir.join(disease.model_dir());

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg(&script)
            .arg(payload)
            .arg(&model)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(lib_dir) = env::resolve_openmp_dir() {
            let existing = std::env::var(env::LOADER_PATH_VAR).ok();
            cmd.env(
                env::LOADER_PATH_VAR,
                env::prepend_search_path(&lib_dir, existing.as_deref()),
            );
            tracing::debug!(
                "resolved OpenMP runtime at {} for {}",
                lib_dir.display(),
                disease
            );
        }

        tracing::info!(
            "running {} model: {} {} <payload> {}",
            disease,
            self.config.interpreter.display(),
            script.display(),
            model.display()
        );

        let mut child = cmd.spawn()?;
        let stdout_pipe = child.stdout.take().expect("stdout piped");
        let stderr_pipe = child.stderr.take().expect("stderr piped");
        let stdout_rx = spawn_capture(stdout_pipe);
        let stderr_rx = spawn_capture(stderr_pipe);

        let deadline = Instant::now() + budget;
        let mut timed_out = false;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if Instant::now() >= deadline {
                timed_out = true;
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = drain_capture(&stdout_rx);
        let stderr = drain_capture(&stderr_rx);

        if timed_out {
            tracing::warn!(
                "{} model killed after exceeding its {}s budget",
                disease,
                budget.as_secs()
            );
        }

        Ok(Captured {
            stdout,
            stderr,
            timed_out,
            exit_code: status.and_then(|s| s.code()),
        })
    }
}

impl ModelRunner for SubprocessRunner {
    type Error = RunnerError;

    fn predict(&self, disease: Disease, input: &ModelInput) -> Result<ModelOutput, RunnerError> {
        let payload = match input {
            ModelInput::Features(features) => BASE64.encode(serde_json::to_vec(features)?),
            ModelInput::Image(path) => path.display().to_string(),
        };

        let budget = disease.timeout();
        let captured = self.invoke(disease, &payload, budget)?;
        parser::interpret(&captured, budget.as_secs())
    }
}

/// Drain a child pipe to a string on its own thread, capped at
/// [`MAX_CAPTURE_BYTES`]. The result arrives on the channel once the pipe
/// reaches EOF.
fn spawn_capture<R: Read + Send + 'static>(pipe: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.take(MAX_CAPTURE_BYTES).read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Collect one capture, waiting at most [`DRAIN_GRACE`]. An overdue capture
/// means something other than the child still holds the pipe; its output is
/// forfeited and the abandoned thread exits on its own at EOF.
fn drain_capture(rx: &mpsc::Receiver<String>) -> String {
    match rx.recv_timeout(DRAIN_GRACE) {
        Ok(output) => output,
        Err(_) => {
            tracing::warn!("model output pipe still open after child exit, abandoning capture");
            String::new()
        }
    }
}
