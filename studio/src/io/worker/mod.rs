//! Python worker that hosts the atomistic collaborators.
//!
//! The embedded script is written to a temporary directory and run with the
//! configured interpreter. Each call sends one JSON line on the worker's stdin
//! and reads one JSON line back. The worker stays alive between calls so a
//! loaded model is reused. Its stderr is passed through for tracebacks.

mod collaborators;
pub mod protocol;

pub use collaborators::{
    WorkerCalculator, WorkerIntegratorFactory, WorkerLoader, WorkerRelaxerBuilder,
};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;
use structure::CollaboratorError;
use tempfile::TempDir;
use tracing::{debug, warn};

const WORKER_SCRIPT: &str = include_str!("worker.py");
const SCRIPT_NAME: &str = "studio_worker.py";

#[derive(Debug)]
struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    fn exchange(&mut self, line: &str) -> Result<String, CollaboratorError> {
        let io_error = |e: std::io::Error| CollaboratorError::new(format!("worker I/O failed: {e}"));
        self.stdin.write_all(line.as_bytes()).map_err(io_error)?;
        self.stdin.write_all(b"\n").map_err(io_error)?;
        self.stdin.flush().map_err(io_error)?;

        let mut reply = String::new();
        let read = self.stdout.read_line(&mut reply).map_err(io_error)?;
        if read == 0 {
            return Err(CollaboratorError::new(
                "worker exited without replying; check stderr for a python traceback",
            ));
        }
        Ok(reply)
    }
}

#[derive(Serialize)]
struct Request<'a, T: ?Sized> {
    op: &'a str,
    payload: &'a T,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Turn one reply line into the call's result or the worker's error message.
fn parse_reply(line: &str) -> Result<Value, CollaboratorError> {
    let reply: Reply = serde_json::from_str(line.trim())
        .map_err(|e| CollaboratorError::new(format!("malformed worker reply: {e}")))?;
    match reply {
        Reply {
            error: Some(message),
            ..
        } => Err(CollaboratorError::new(message)),
        Reply {
            result: Some(value),
            ..
        } => Ok(value),
        Reply { .. } => Ok(Value::Null),
    }
}

#[derive(Debug)]
pub struct PythonWorker {
    python: String,
    script_dir: TempDir,
    process: Mutex<Option<WorkerProcess>>,
}

impl PythonWorker {
    pub fn new(python: impl Into<String>) -> Result<Self, CollaboratorError> {
        let script_dir = tempfile::Builder::new()
            .prefix("structure-studio")
            .tempdir()
            .map_err(|e| CollaboratorError::new(format!("cannot create worker directory: {e}")))?;
        fs::write(script_dir.path().join(SCRIPT_NAME), WORKER_SCRIPT)
            .map_err(|e| CollaboratorError::new(format!("cannot write worker script: {e}")))?;
        Ok(Self {
            python: python.into(),
            script_dir,
            process: Mutex::new(None),
        })
    }

    fn script_path(&self) -> PathBuf {
        self.script_dir.path().join(SCRIPT_NAME)
    }

    fn spawn(&self) -> Result<WorkerProcess, CollaboratorError> {
        debug!("Starting worker: {} {}", self.python, self.script_path().display());
        let mut child = Command::new(&self.python)
            .arg(self.script_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                CollaboratorError::new(format!("cannot start python ({}): {e}", self.python))
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CollaboratorError::new("worker stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CollaboratorError::new("worker stdout unavailable"))?;
        Ok(WorkerProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Run `op` in the worker. Calls are serialized; a broken worker is
    /// dropped and started again on the next call.
    pub fn call<In, Out>(&self, op: &str, payload: &In) -> Result<Out, CollaboratorError>
    where
        In: Serialize + ?Sized,
        Out: DeserializeOwned,
    {
        let line = serde_json::to_string(&Request { op, payload })
            .map_err(|e| CollaboratorError::new(format!("cannot encode {op} request: {e}")))?;

        let mut guard = self
            .process
            .lock()
            .map_err(|_| CollaboratorError::new("worker lock poisoned"))?;
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let process = guard
            .as_mut()
            .ok_or_else(|| CollaboratorError::new("worker unavailable"))?;

        let reply = match process.exchange(&line) {
            Ok(reply) => reply,
            Err(e) => {
                if let Some(mut dead) = guard.take() {
                    let _ = dead.child.kill();
                    let _ = dead.child.wait();
                }
                return Err(e);
            }
        };
        drop(guard);

        let value = parse_reply(&reply)?;
        serde_json::from_value(value)
            .map_err(|e| CollaboratorError::new(format!("unexpected {op} reply: {e}")))
    }
}

impl Drop for PythonWorker {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.process.lock() {
            if let Some(mut process) = guard.take() {
                if let Err(e) = process.child.kill() {
                    warn!("Failed to stop worker: {}", e);
                }
                let _ = process.child.wait();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_with_result() {
        let value = parse_reply(r#"{"result": {"accelerator": false}}"#).unwrap();
        assert_eq!(value["accelerator"], false);
    }

    #[test]
    fn test_reply_with_error() {
        let err = parse_reply(r#"{"error": "CUDA out of memory"}"#).unwrap_err();
        assert_eq!(err.message(), "CUDA out of memory");
    }

    #[test]
    fn test_empty_reply_is_null() {
        assert_eq!(parse_reply("{}\n").unwrap(), Value::Null);
        assert!(parse_reply("Traceback (most recent call last):").is_err());
    }

    #[test]
    fn test_script_is_written_on_creation() {
        let worker = PythonWorker::new("python3").unwrap();
        let script = fs::read_to_string(worker.script_path()).unwrap();
        assert!(script.contains("def main"));
    }
}
